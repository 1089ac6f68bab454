use std::borrow::Cow;
use std::io::{Read, Seek};

use encoding_rs::{Encoding, UTF_8};
use simdutf8::basic;
use smallvec::SmallVec;

use crate::error::{Error, Result};
use crate::frame::{Column, ColumnValues, SasFrame};
use crate::logger::log_debug;
use crate::metadata::{Compression, VariableKind};
use crate::parser::byteorder::{ByteReader, truncated_f64_bits};
use crate::parser::encoding::trim_trailing;
use crate::parser::meta::ParsedMetadata;

/// Decodes a fixed-width character cell: trailing space/NUL padding is
/// stripped, ASCII/UTF-8 content borrows, anything else goes through the
/// file's declared encoding.
#[must_use]
pub fn decode_text<'a>(bytes: &'a [u8], encoding: &'static Encoding) -> Cow<'a, str> {
    let trimmed = trim_trailing(bytes);
    if trimmed.is_empty() {
        return Cow::Borrowed("");
    }
    if let Ok(text) = basic::from_utf8(trimmed) {
        return Cow::Borrowed(text);
    }
    if encoding == UTF_8 {
        return Cow::Owned(String::from_utf8_lossy(trimmed).into_owned());
    }
    let (decoded, had_errors) = encoding.decode_without_bom_handling(trimmed);
    if had_errors && decoded.is_empty() {
        Cow::Owned(String::from_utf8_lossy(trimmed).into_owned())
    } else {
        Cow::Owned(decoded.into_owned())
    }
}

/// Resolved row window and column projection.
///
/// `columns[j]` holds the output slot for source column `j`, or `None` when
/// the column is outside the selection; unselected cells are skipped without
/// disturbing the per-row byte walk.
#[derive(Debug, Clone)]
pub(crate) struct Selection {
    /// 1-based inclusive window, already clamped to the row count.
    pub row_min: u64,
    pub row_max: u64,
    pub columns: Vec<Option<usize>>,
    pub output_count: usize,
}

impl Selection {
    pub(crate) fn all(row_count: u64, column_count: usize) -> Self {
        Self {
            row_min: 1,
            row_max: row_count,
            columns: (0..column_count).map(Some).collect(),
            output_count: column_count,
        }
    }

    const fn window_len(&self) -> u64 {
        if self.row_max >= self.row_min {
            self.row_max - self.row_min + 1
        } else {
            0
        }
    }
}

fn empty_values(kind: VariableKind, rows: usize) -> ColumnValues {
    match kind {
        VariableKind::Numeric => ColumnValues::Numeric(vec![None; rows]),
        VariableKind::Character => ColumnValues::Character(vec![String::new(); rows]),
    }
}

struct RowSink {
    values: Vec<ColumnValues>,
    deleted: Vec<bool>,
    valid: Vec<bool>,
}

impl RowSink {
    fn new(meta: &ParsedMetadata, selection: &Selection, rows: usize) -> Self {
        let mut values = vec![ColumnValues::Numeric(Vec::new()); selection.output_count];
        for (source, slot) in selection.columns.iter().enumerate() {
            if let Some(slot) = slot {
                values[*slot] = empty_values(meta.columns[source].kind, rows);
            }
        }
        Self {
            values,
            deleted: vec![false; rows],
            valid: vec![false; rows],
        }
    }

    fn set_numeric(&mut self, slot: usize, row: usize, value: Option<f64>) {
        if let ColumnValues::Numeric(cells) = &mut self.values[slot] {
            cells[row] = value;
        }
    }

    fn set_character(&mut self, slot: usize, row: usize, value: String) {
        if let ColumnValues::Character(cells) = &mut self.values[slot] {
            cells[row] = value;
        }
    }
}

/// Materialises the selected window of rows into a frame (C8).
///
/// # Errors
///
/// Fatal on I/O failures, truncation mid-row, or a schema whose column
/// extents do not fit the declared row length.
pub(crate) fn decode_rows<R: Read + Seek>(
    input: &mut R,
    meta: &ParsedMetadata,
    selection: &Selection,
) -> Result<SasFrame> {
    let row_length = meta.row_size.row_length;
    for column in &meta.columns {
        if column.offset + u64::from(column.width) > row_length {
            return Err(Error::invalid_metadata(format!(
                "column {:?} extends past the row length",
                column.name
            )));
        }
    }

    // Column visit order is ascending byte offset within the row.
    let mut visit_order: SmallVec<[usize; 16]> = (0..meta.columns.len()).collect();
    visit_order.sort_unstable_by_key(|&j| meta.columns[j].offset);

    let window = selection.window_len() as usize;
    let mut sink = RowSink::new(meta, selection, window);

    match meta.compression {
        Compression::Unknown => {
            // Warned during the metadata walk; emit metadata with no rows.
            return Ok(assemble(meta, selection, RowSink::new(meta, selection, 0)));
        }
        Compression::None => {
            decode_inline_rows(input, meta, selection, &visit_order, &mut sink)?;
        }
        Compression::Rle | Compression::Rdc => {
            decode_stream_rows(meta, selection, &visit_order, &mut sink);
        }
    }

    Ok(assemble(meta, selection, sink))
}

fn decode_inline_rows<R: Read + Seek>(
    input: &mut R,
    meta: &ParsedMetadata,
    selection: &Selection,
    visit_order: &[usize],
    sink: &mut RowSink,
) -> Result<()> {
    let header = &meta.header;
    let row_length = meta.row_size.row_length;
    if row_length == 0 {
        return Ok(());
    }

    let mut reader = ByteReader::new(&mut *input, header.endianness);
    let file_len = reader.stream_len()?;

    // The first data-bearing page needs one alignment nudge for files whose
    // dataoffset marker is out of the ordinary.
    let adjust = !matches!(meta.row_size.data_offset_flag, 1 | 256);
    let mut first_data_page = true;
    let mut row_buf = vec![0u8; row_length as usize];
    let mut global = 0u64;

    'pages: for page in &meta.pages {
        if page.rows == 0 {
            continue;
        }
        if page.data_pos == 0 {
            // Rows counted by the page header but with no recorded data
            // position are not decodable; their window slots stay invalid.
            log_debug("page claims inline rows but has no data position; skipped");
            global += page.rows;
            continue;
        }
        let base_adjust = if adjust && first_data_page {
            header.alignval()
        } else {
            0
        };
        first_data_page = false;

        for ii in 0..page.rows {
            if global >= meta.row_size.row_count || global + 1 > selection.row_max {
                break 'pages;
            }

            if global + 1 >= selection.row_min {
                let pos = page.data_pos + base_adjust + ii * row_length;
                if pos + row_length > file_len {
                    log_debug(&format!("end of file reached at row {global}"));
                    break 'pages;
                }
                reader.seek_to(pos)?;
                reader.read_into(&mut row_buf)?;

                let out_row = (global + 1 - selection.row_min) as usize;
                decode_one_row(meta, selection, visit_order, &row_buf, sink, out_row);
                sink.deleted[out_row] = page.deleted.get(ii as usize).copied().unwrap_or(false);
                sink.valid[out_row] = true;
            }
            global += 1;
        }
    }
    Ok(())
}

fn decode_stream_rows(
    meta: &ParsedMetadata,
    selection: &Selection,
    visit_order: &[usize],
    sink: &mut RowSink,
) {
    let row_length = meta.row_size.row_length as usize;
    if row_length == 0 {
        return;
    }
    let stream = &meta.scratch_rows;

    for global in 0..meta.row_size.row_count {
        if global + 1 > selection.row_max {
            break;
        }
        let start = global as usize * row_length;
        let end = start + row_length;
        if end > stream.len() {
            log_debug(&format!("decompressed stream ends at row {global}"));
            break;
        }
        if global + 1 >= selection.row_min {
            let out_row = (global + 1 - selection.row_min) as usize;
            decode_one_row(meta, selection, visit_order, &stream[start..end], sink, out_row);
            sink.valid[out_row] = true;
        }
    }
}

fn decode_one_row(
    meta: &ParsedMetadata,
    selection: &Selection,
    visit_order: &[usize],
    row: &[u8],
    sink: &mut RowSink,
    out_row: usize,
) {
    for &j in visit_order {
        let Some(slot) = selection.columns[j] else {
            continue;
        };
        let column = &meta.columns[j];
        let start = column.offset as usize;
        let cell = &row[start..start + column.width as usize];
        match column.kind {
            VariableKind::Numeric => {
                let value = if cell.is_empty() {
                    None
                } else {
                    let decoded =
                        f64::from_bits(truncated_f64_bits(meta.header.endianness, cell));
                    if decoded.is_nan() { None } else { Some(decoded) }
                };
                sink.set_numeric(slot, out_row, value);
            }
            VariableKind::Character => {
                let text = decode_text(cell, meta.encoding).into_owned();
                sink.set_character(slot, out_row, text);
            }
        }
    }
}

fn assemble(meta: &ParsedMetadata, selection: &Selection, sink: RowSink) -> SasFrame {
    let mut metas: Vec<Option<&crate::metadata::ColumnMeta>> = vec![None; selection.output_count];
    for (source, slot) in selection.columns.iter().enumerate() {
        if let Some(slot) = slot {
            metas[*slot] = Some(&meta.columns[source]);
        }
    }

    let columns = metas
        .into_iter()
        .zip(sink.values)
        .filter_map(|(meta, values)| {
            meta.map(|meta| Column {
                meta: meta.clone(),
                values,
            })
        })
        .collect::<Vec<_>>();

    let mut attributes = meta.attributes.clone();
    attributes.row_count = columns.first().map_or(0, |col| col.values.len()) as u64;

    SasFrame {
        columns,
        attributes,
        deleted: sink.deleted,
        valid: sink.valid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{ColumnMeta, Endianness, FileAttributes};
    use crate::parser::header::SasHeader;
    use crate::parser::rowsize::RowSizeInfo;
    use std::io::Cursor;

    fn column(name: &str, kind: VariableKind, width: u32, offset: u64) -> ColumnMeta {
        ColumnMeta {
            name: name.to_owned(),
            label: String::new(),
            format: String::new(),
            kind,
            width,
            offset,
            display_width: 0,
            decimals: 0,
        }
    }

    #[test]
    fn stream_rows_decode_from_the_scratch_buffer() {
        let header = SasHeader {
            endianness: Endianness::Little,
            uses_u64: true,
            align2_pad: 4,
            platform: 49,
            header_size: 1024,
            page_size: 4096,
            page_count: 0,
            page_seq: 1,
            attributes: FileAttributes::default(),
        };
        let row_size = RowSizeInfo {
            row_length: 12,
            row_count: 2,
            ..RowSizeInfo::default()
        };

        let mut scratch = Vec::new();
        scratch.extend_from_slice(&1.5f64.to_le_bytes());
        scratch.extend_from_slice(b"ab  ");
        scratch.extend_from_slice(&f64::NAN.to_le_bytes());
        scratch.extend_from_slice(b"cd\0\0");

        let meta = ParsedMetadata {
            header,
            row_size,
            columns: vec![
                column("v", VariableKind::Numeric, 8, 0),
                column("s", VariableKind::Character, 4, 8),
            ],
            compression: Compression::Rle,
            encoding: UTF_8,
            locations: Vec::new(),
            pages: Vec::new(),
            scratch_rows: scratch,
            attributes: FileAttributes::default(),
        };

        let selection = Selection::all(2, 2);
        let frame = decode_rows(&mut Cursor::new(Vec::new()), &meta, &selection).unwrap();
        assert_eq!(frame.valid, vec![true, true]);
        assert_eq!(frame.deleted, vec![false, false]);
        assert_eq!(
            frame.columns[0].values,
            ColumnValues::Numeric(vec![Some(1.5), None])
        );
        assert_eq!(
            frame.columns[1].values,
            ColumnValues::Character(vec!["ab".to_owned(), "cd".to_owned()])
        );
    }

    #[test]
    fn decode_text_trims_and_borrows_ascii() {
        let decoded = decode_text(b"hello   ", UTF_8);
        assert_eq!(decoded, "hello");
        assert!(matches!(decoded, Cow::Borrowed(_)));
    }

    #[test]
    fn decode_text_falls_back_to_declared_encoding() {
        // 0xE9 is 'é' in ISO-8859-1 and invalid UTF-8.
        let latin1 = encoding_rs::Encoding::for_label(b"iso-8859-1").unwrap();
        assert_eq!(decode_text(&[b'c', b'a', b'f', 0xE9], latin1), "café");
    }

    #[test]
    fn selection_window_len_clamps() {
        let selection = Selection {
            row_min: 5,
            row_max: 4,
            columns: Vec::new(),
            output_count: 0,
        };
        assert_eq!(selection.window_len(), 0);
        assert_eq!(Selection::all(10, 2).window_len(), 10);
    }
}
