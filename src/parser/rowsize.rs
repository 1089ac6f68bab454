use std::io::Read;

use crate::error::Result;
use crate::logger::{log_debug, log_warn};
use crate::parser::byteorder::ByteReader;

/// Fields extracted from the row-size subheader.
///
/// `to_data`, `addtext_off` and the `pgw*` region have no confirmed
/// semantics; they are read to advance the cursor and surfaced for debug.
#[derive(Debug, Clone, Copy, Default)]
pub struct RowSizeInfo {
    pub row_length: u64,
    pub row_count: u64,
    pub deleted_rows: u64,
    pub col_format_p1: i64,
    pub col_format_p2: i64,
    pub sw_len: i16,
    pub compr_len: i16,
    pub proc_len: i16,
    pub text_off: i16,
    pub to_data: i16,
    pub addtext_off: i16,
    /// Governs the first-data-page alignment adjustment during row decode.
    pub data_offset_flag: i16,
}

impl RowSizeInfo {
    /// The text pool's first chunk only embeds a proc string when the
    /// `todata` marker is not 12.
    #[must_use]
    pub const fn has_proc(&self) -> bool {
        self.to_data != 12
    }
}

/// One entry of the 12-slot signature location table.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubheaderLocation {
    pub signature: i64,
    pub first_page: i64,
    pub first_position: i16,
    pub last_page: i64,
    pub last_position: i16,
}

fn expect_zero_words<R: Read>(
    reader: &mut ByteReader<R>,
    count: usize,
    uses_u64: bool,
    what: &str,
) -> Result<()> {
    for _ in 0..count {
        let value = reader.read_word_i64(uses_u64)?;
        if value != 0 {
            log_warn(&format!("row-size subheader: {what} is {value}, expected 0"));
        }
    }
    Ok(())
}

fn expect_zero_u16<R: Read>(reader: &mut ByteReader<R>, count: usize, what: &str) -> Result<()> {
    for _ in 0..count {
        let value = reader.read_u16()?;
        if value != 0 {
            log_warn(&format!("row-size subheader: {what} is {value}, expected 0"));
        }
    }
    Ok(())
}

/// Parses the row-size subheader body (cursor already past the signature).
///
/// The field sequence is a fixed checklist per layout; unknown fields are
/// consumed to keep the cursor aligned and validated as zero only where the
/// format requires, with deviations downgraded to warnings.
///
/// # Errors
///
/// Fails on I/O errors or truncation of the subheader.
pub fn parse_row_size<R: Read>(reader: &mut ByteReader<R>, uses_u64: bool) -> Result<RowSizeInfo> {
    let w = uses_u64;
    let mut info = RowSizeInfo::default();

    for _ in 0..4 {
        let _head = reader.read_word_i64(w)?;
    }

    info.row_length = reader.read_word(w)?;
    info.row_count = reader.read_word(w)?;
    info.deleted_rows = reader.read_word(w)?;
    let _unknown = reader.read_word_i64(w)?;

    info.col_format_p1 = reader.read_word_i64(w)?;
    info.col_format_p2 = reader.read_word_i64(w)?;
    let _p3 = reader.read_word_i64(w)?;
    let _p4 = reader.read_word_i64(w)?;

    let page_size_echo = reader.read_word_i64(w)?;
    let _unknown = reader.read_word_i64(w)?;
    let row_count_mix = reader.read_word_i64(w)?;
    // End-of-initial-header markers on the wide layout, unknowns on the
    // narrow one.
    let _end1 = reader.read_word_i64(w)?;
    let _end2 = reader.read_word_i64(w)?;
    log_debug(&format!(
        "row-size: rowlength {} rows {} delobs {} pgsize-echo {page_size_echo} rcmix {row_count_mix}",
        info.row_length, info.row_count, info.deleted_rows
    ));

    expect_zero_words(reader, 37, w, "reserved word")?;

    let _page_index = reader.read_i32()?;

    if w {
        expect_zero_words(reader, 8, w, "pad word")?;
        let _pad = reader.read_u32()?;
    } else {
        for _ in 0..8 {
            let _pad = reader.read_i32()?;
        }
        let _pad = reader.read_u32()?;
        let _pad = reader.read_u32()?;
    }

    // Counter block; values observed but meaning unknown.
    let _val1 = reader.read_word_i64(w)?;
    let _val2 = reader.read_i16()?;
    expect_zero_u16(reader, if w { 3 } else { 1 }, "counter pad")?;

    let pgwsh = reader.read_word_i64(w)?;
    let pgwpossh = reader.read_i16()?;
    expect_zero_u16(reader, if w { 3 } else { 1 }, "pgw pad")?;

    let pgwsh2 = reader.read_word_i64(w)?;
    let pgwpossh2 = reader.read_i16()?;
    expect_zero_u16(reader, if w { 3 } else { 1 }, "pgw pad")?;

    let _page_count_echo = reader.read_word_i64(w)?;
    let _val = reader.read_u16()?;
    expect_zero_u16(reader, if w { 3 } else { 1 }, "page-count pad")?;

    let _one = reader.read_word_i64(w)?;

    info.addtext_off = reader.read_i16()?;
    expect_zero_u16(reader, if w { 3 } else { 1 }, "addtextoff pad")?;
    log_debug(&format!(
        "row-size: pgwsh {pgwsh}/{pgwpossh} pgwsh2 {pgwsh2}/{pgwpossh2} addtextoff {}",
        info.addtext_off
    ));

    expect_zero_words(reader, 10, w, "reserved word")?;

    for _ in 0..4 {
        let _marker = reader.read_u16()?;
    }
    info.to_data = reader.read_i16()?;

    info.sw_len = reader.read_i16()?;
    for _ in 0..3 {
        let _marker = reader.read_u16()?;
    }

    let _marker = reader.read_u16()?;
    let _marker = reader.read_u16()?;
    info.compr_len = reader.read_i16()?;
    let _marker = reader.read_u16()?;

    let _marker = reader.read_u16()?;
    let _marker = reader.read_u16()?;
    let _marker = reader.read_u16()?;
    info.text_off = reader.read_i16()?;
    info.proc_len = reader.read_i16()?;

    for _ in 0..8 {
        let _reserved = reader.read_u32()?;
    }

    let _marker = reader.read_u16()?;
    let _marker = reader.read_u16()?;

    let subheader_count_total = reader.read_i16()?;
    let name_max_len = reader.read_i16()?;
    let label_max_len = reader.read_i16()?;
    log_debug(&format!(
        "row-size: sh_num {subheader_count_total} cn_maxlen {name_max_len} l_maxlen {label_max_len}"
    ));

    for _ in 0..3 {
        let _version_word = reader.read_u32()?;
    }

    let _rows_on_page = reader.read_i16()?;

    expect_zero_u16(reader, 1, "tail pad")?;
    let _tail = reader.read_u32()?;
    expect_zero_u16(reader, 3, "tail pad")?;
    let _row_count_echo = reader.read_u32()?;
    expect_zero_u16(reader, 1, "tail pad")?;
    let _deleted_echo = reader.read_i32()?;
    expect_zero_u16(reader, 4, "tail pad")?;
    info.data_offset_flag = reader.read_i16()?;
    expect_zero_u16(reader, 4, "tail pad")?;

    if !matches!(info.data_offset_flag, 1 | 256 | 1280) {
        log_warn(&format!(
            "row-size subheader: dataoffset is unexpectedly {}",
            info.data_offset_flag
        ));
    }

    Ok(info)
}

/// Parses the signature location table (cursor past the signature).
///
/// Twelve `(signature, first-page/position, last-page/position)` tuples whose
/// use is internal to SAS; they are retained for debugging only.
///
/// # Errors
///
/// Fails on I/O errors or truncation of the subheader.
pub fn parse_subheader_counts<R: Read>(
    reader: &mut ByteReader<R>,
    uses_u64: bool,
) -> Result<Vec<SubheaderLocation>> {
    let w = uses_u64;
    let _text_pool_offset = reader.read_word_i64(w)?;
    let _unknown = reader.read_word_i64(w)?;

    let _populated = reader.read_i16()?;

    let opaque_len = if w { 94usize } else { 50 };
    for _ in 0..opaque_len / 2 {
        // Mostly zeros; the fourth-from-last has been seen as 1804.
        let _opaque = reader.read_u16()?;
    }

    let pad_words = if w { 3 } else { 1 };
    let mut locations = Vec::with_capacity(12);
    for index in 0..12 {
        let signature = reader.read_word_i64(w)?;
        let first_page = reader.read_word_i64(w)?;
        let first_position = reader.read_i16()?;
        for _ in 0..pad_words {
            let _pad = reader.read_u16()?;
        }
        let last_page = reader.read_word_i64(w)?;
        let last_position = reader.read_i16()?;
        for _ in 0..pad_words {
            let _pad = reader.read_u16()?;
        }

        if index == 0 && signature != -4 {
            log_warn("signature location table: first entry is not -4");
        }

        locations.push(SubheaderLocation {
            signature,
            first_page,
            first_position,
            last_page,
            last_position,
        });
    }

    Ok(locations)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Endianness;
    use std::io::Cursor;

    /// Narrow-layout row-size body with a handful of fields poked in at
    /// their checklist offsets (relative to the end of the signature).
    #[test]
    fn narrow_row_size_checklist_offsets() {
        let mut body = vec![0u8; 472];
        let put_u32 =
            |body: &mut Vec<u8>, at: usize, v: u32| body[at..at + 4].copy_from_slice(&v.to_le_bytes());
        let put_i16 =
            |body: &mut Vec<u8>, at: usize, v: i16| body[at..at + 2].copy_from_slice(&v.to_le_bytes());

        put_u32(&mut body, 16, 24); // rowlength
        put_u32(&mut body, 20, 10); // rowcount
        put_u32(&mut body, 24, 2); // deleted rows
        put_u32(&mut body, 32, 3); // colf_p1
        put_i16(&mut body, 350, 0); // swlen
        put_i16(&mut body, 362, 8); // comprlen
        put_i16(&mut body, 372, 28); // textoff
        put_i16(&mut body, 374, 8); // proclen
        put_i16(&mut body, 462, 256); // dataoffset

        let mut reader = ByteReader::new(Cursor::new(&body[..]), Endianness::Little);
        let info = parse_row_size(&mut reader, false).unwrap();
        assert_eq!(reader.consumed(), 472);
        assert_eq!(info.row_length, 24);
        assert_eq!(info.row_count, 10);
        assert_eq!(info.deleted_rows, 2);
        assert_eq!(info.col_format_p1, 3);
        assert_eq!(info.compr_len, 8);
        assert_eq!(info.proc_len, 8);
        assert_eq!(info.text_off, 28);
        assert_eq!(info.data_offset_flag, 256);
        assert!(info.has_proc());
    }

    #[test]
    fn subheader_counts_consume_expected_widths() {
        // Narrow layout: 4 + 4 + 2 + 50 + 12 * 20 = 300 bytes.
        let mut body = vec![0u8; 300];
        body[60..64].copy_from_slice(&(-4i32).to_le_bytes());
        let mut reader = ByteReader::new(Cursor::new(&body[..]), Endianness::Little);
        let locations = parse_subheader_counts(&mut reader, false).unwrap();
        assert_eq!(reader.consumed(), 300);
        assert_eq!(locations.len(), 12);
        assert_eq!(locations[0].signature, -4);

        // Wide layout: 8 + 8 + 2 + 94 + 12 * 40 = 592 bytes.
        let mut body = vec![0u8; 592];
        body[112..120].copy_from_slice(&(-4i64).to_le_bytes());
        let mut reader = ByteReader::new(Cursor::new(&body[..]), Endianness::Little);
        let locations = parse_subheader_counts(&mut reader, true).unwrap();
        assert_eq!(reader.consumed(), 592);
        assert_eq!(locations[0].signature, -4);
    }
}
