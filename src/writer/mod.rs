mod subheaders;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::frame::{ColumnValues, SasFrame};
use crate::logger::{log_debug, log_warn, set_debug};
use crate::parser::header::MAGIC;
use subheaders::{Plan, PlannedColumn, put_f64, put_fixed, put_i16, put_i64, put_u32, put_word};

/// SAS system-missing numeric, as stored on disk (little-endian).
const MISSING_NUMERIC: [u8; 8] = [0x00, 0x00, 0x00, 0x00, 0x00, 0xFE, 0xFF, 0xFF];

/// Large unknown words every reference header carries.
const HEADER_UNKNOWN_A: u32 = 1_157_289_805;
const HEADER_UNKNOWN_B: u32 = 563_452_161;

/// Alignment-checker bytes for the two layouts.
const CHECKER_WIDE: u8 = 51;
const CHECKER_NARROW_A: u8 = 34;
const CHECKER_NARROW_B: u8 = 50;

/// Page types the writer emits.
const PAGE_TYPE_FIRST: i16 = 512;
const PAGE_TYPE_DATA: i16 = 256;

/// Release and host strings stamped into headers with no caller-provided
/// values, matching reference output.
const DEFAULT_RELEASE: &str = "9.0401M7";
const DEFAULT_SERVER: &str = "Linux";
const DEFAULT_OSVER: &str = "5.6.15-arch1-1";
const DEFAULT_OSNAME: &str = "x86_64";

/// Options for [`write_sas7bdat`].
///
/// The default profile is the 64-bit layout with 64 KiB header and pages;
/// `bit32` switches to the narrow layout with a 1 KiB header and 8 KiB
/// pages. Compression is not part of the writer's profile.
#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    compress: bool,
    debug: bool,
    bit32: bool,
    header_size: Option<u32>,
    page_size: Option<u32>,
}

impl WriteOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            compress: false,
            debug: false,
            bit32: false,
            header_size: None,
            page_size: None,
        }
    }

    #[must_use]
    pub const fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    #[must_use]
    pub const fn with_bit32(mut self, bit32: bool) -> Self {
        self.bit32 = bit32;
        self
    }

    #[must_use]
    pub const fn with_header_size(mut self, size: u32) -> Self {
        self.header_size = Some(size);
        self
    }

    #[must_use]
    pub const fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    const fn resolved_header_size(&self) -> u32 {
        match self.header_size {
            Some(size) => size,
            None => {
                if self.bit32 {
                    1024
                } else {
                    65536
                }
            }
        }
    }

    const fn resolved_page_size(&self) -> u32 {
        match self.page_size {
            Some(size) => size,
            None => {
                if self.bit32 {
                    8192
                } else {
                    65536
                }
            }
        }
    }
}

/// Writes `frame` to `path` as a minimally valid SAS7BDAT (C9).
///
/// # Errors
///
/// Fatal when the file cannot be created, on I/O failures, or when the
/// request falls outside the writer's profile (compression, a numeric
/// column not 8 bytes wide, a zero-width character column, ragged column
/// lengths, or a page too small for the metadata).
pub fn write_sas7bdat<P: AsRef<Path>>(
    path: P,
    frame: &SasFrame,
    options: &WriteOptions,
) -> Result<()> {
    let file = File::create(path.as_ref()).map_err(|err| Error::OpenFailed {
        path: path.as_ref().to_path_buf(),
        details: err.to_string().into(),
    })?;
    let mut out = BufWriter::new(file);
    write_sas7bdat_to(&mut out, frame, options)?;
    out.flush()?;
    Ok(())
}

/// Writes `frame` into any byte sink; see [`write_sas7bdat`].
///
/// # Errors
///
/// Same conditions as [`write_sas7bdat`], minus file creation.
pub fn write_sas7bdat_to<W: Write>(
    out: &mut W,
    frame: &SasFrame,
    options: &WriteOptions,
) -> Result<()> {
    set_debug(options.debug);
    if options.compress {
        return Err(Error::writer_unsupported(
            "compressed output is not supported",
        ));
    }

    let header_size = options.resolved_header_size();
    let page_size = options.resolved_page_size();
    if header_size < 1024 {
        return Err(Error::writer_unsupported("header size below 1024 bytes"));
    }

    let wide = !options.bit32;
    let columns = plan_columns(frame)?;
    let row_length: u64 = columns.iter().map(|col| u64::from(col.width)).sum();
    let row_count = frame.row_count() as u64;

    // Serialize once to learn the directory size, then again with the final
    // counts patched in.
    let mut plan = Plan {
        wide,
        columns,
        row_length,
        row_count,
        page_size,
        page_count: 1,
        rows_on_page1: 0,
        block_count1: 0,
    };
    let tail_len: u64 = tail_subheaders(&plan)
        .iter()
        .map(|(bytes, _)| bytes.len() as u64)
        .sum();
    let directory_len = tail_len.div_ceil(8) * 8;

    let subheader_count = plan.columns.len() as u64 + 7 + u64::from(plan.columns.len() > 1);
    let page_header_len: u64 = if wide { 40 } else { 24 };
    let pointer_len: u64 = if wide { 24 } else { 12 };
    let data_start = page_header_len + subheader_count * pointer_len;
    let tail_start = u64::from(page_size).checked_sub(directory_len).ok_or_else(|| {
        Error::writer_unsupported("page size too small for the metadata directory")
    })?;
    if tail_start < data_start {
        return Err(Error::writer_unsupported(
            "page size too small for the metadata directory",
        ));
    }

    let page1_capacity = if row_length == 0 {
        0
    } else {
        ((tail_start - data_start) / row_length).min(i16::MAX as u64 - subheader_count)
    };
    let rows_on_page1 = row_count.min(page1_capacity);

    let extra_capacity = if row_length == 0 {
        0
    } else {
        ((u64::from(page_size) - page_header_len) / row_length).min(i16::MAX as u64)
    };
    let rows_pending = row_count - rows_on_page1;
    if rows_pending > 0 && extra_capacity == 0 {
        return Err(Error::writer_unsupported(
            "row length exceeds the page size",
        ));
    }
    let extra_pages = if rows_pending == 0 {
        0
    } else {
        rows_pending.div_ceil(extra_capacity)
    };

    plan.page_count = 1 + extra_pages;
    plan.rows_on_page1 = rows_on_page1;
    plan.block_count1 = (rows_on_page1 + subheader_count) as i16;

    log_debug(&format!(
        "writing {} rows over {} pages ({} on page one, directory {} bytes)",
        row_count, plan.page_count, rows_on_page1, directory_len
    ));

    out.write_all(&file_header(frame, &plan, header_size))?;
    out.write_all(&first_page(frame, &plan, subheader_count, data_start, tail_start)?)?;

    let mut written = rows_on_page1;
    let mut page_seq = 2u32;
    while written < row_count {
        let rows_here = (row_count - written).min(extra_capacity);
        out.write_all(&data_page(frame, &plan, page_seq, written, rows_here))?;
        written += rows_here;
        page_seq += 1;
    }

    Ok(())
}

fn plan_columns(frame: &SasFrame) -> Result<Vec<PlannedColumn>> {
    if frame.columns.is_empty() {
        return Err(Error::writer_unsupported("a dataset needs at least one column"));
    }
    // The attribute subheader declares its length in an i16.
    if frame.columns.len() > 2047 {
        return Err(Error::writer_unsupported(
            "more columns than a single metadata page can describe",
        ));
    }
    let rows = frame.columns[0].values.len();

    let mut planned = Vec::with_capacity(frame.columns.len());
    for column in &frame.columns {
        if column.values.len() != rows {
            return Err(Error::writer_unsupported(format!(
                "column {:?} has {} values where {} were expected",
                column.meta.name,
                column.values.len(),
                rows
            )));
        }
        let kind = column.values.kind();
        let width = match (&column.values, column.meta.width) {
            (ColumnValues::Numeric(_), 8) => 8,
            (ColumnValues::Numeric(_), other) => {
                return Err(Error::writer_unsupported(format!(
                    "numeric column {:?} must be 8 bytes wide, not {other}",
                    column.meta.name
                )));
            }
            (ColumnValues::Character(_), 0) => {
                return Err(Error::writer_unsupported(format!(
                    "character column {:?} has zero width",
                    column.meta.name
                )));
            }
            (ColumnValues::Character(_), other) if other > i16::MAX as u32 => {
                return Err(Error::writer_unsupported(format!(
                    "character column {:?} is too wide",
                    column.meta.name
                )));
            }
            (ColumnValues::Character(_), other) => other,
        };

        planned.push(PlannedColumn {
            name: pool_entry(column.meta.name.as_bytes(), 32, &column.meta.name, "name"),
            name_len: column.meta.name.len().min(32) as u16,
            label: pool_entry(column.meta.label.as_bytes(), 32, &column.meta.name, "label"),
            label_len: column.meta.label.len().min(32) as u16,
            format: format_entry(column.meta.format.as_bytes()),
            format_len: column.meta.format.len().min(8) as u16,
            kind,
            width,
            display_width: column.meta.display_width.min(i16::MAX as u16) as i16,
            decimals: column.meta.decimals.min(i16::MAX as u16) as i16,
        });
    }
    Ok(planned)
}

/// Names and labels are NUL-padded to a multiple of four, capped at 32.
fn pool_entry(text: &[u8], cap: usize, column: &str, what: &str) -> Vec<u8> {
    let mut bytes = text.to_vec();
    if bytes.len() > cap {
        log_warn(&format!("column {column:?}: {what} shortened to {cap} characters"));
        bytes.truncate(cap);
    }
    let padded = bytes.len().div_ceil(4) * 4;
    bytes.resize(padded, 0);
    bytes
}

/// Formats pad to four bytes, or to exactly eight when longer.
fn format_entry(text: &[u8]) -> Vec<u8> {
    let mut bytes = text.to_vec();
    if bytes.is_empty() {
        return bytes;
    }
    if bytes.len() <= 4 {
        bytes.resize(4, 0);
    } else {
        bytes.resize(8, 0);
    }
    bytes
}

fn file_header(frame: &SasFrame, plan: &Plan, header_size: u32) -> Vec<u8> {
    let wide = plan.wide;
    let attrs = &frame.attributes;
    let mut out = Vec::with_capacity(header_size as usize);

    out.extend_from_slice(&MAGIC);

    let checker_a = if wide { CHECKER_WIDE } else { CHECKER_NARROW_A };
    let checker_b = if wide { CHECKER_WIDE } else { CHECKER_NARROW_B };

    out.extend_from_slice(&[checker_a, 34, 0, checker_b]);
    out.extend_from_slice(&[checker_b, 1, 2, 49]);
    out.extend_from_slice(&[1, 0, 0, 0]);
    out.extend_from_slice(&[0, 0, 0, 20]);
    out.extend_from_slice(&[0, 0, 3, 1]);
    out.extend_from_slice(&[24, 31, 16, 17]);
    out.extend_from_slice(&[checker_a, 34, 0, checker_b]);
    out.extend_from_slice(&[checker_b, 1, 2, 49]);
    out.extend_from_slice(&[1, checker_b, 1, 35]);
    out.extend_from_slice(&[checker_b, 0, 20, 20]);
    out.extend_from_slice(&[0, 32, 3, 1]);

    put_u32(&mut out, 0);
    put_u32(&mut out, 0);

    put_fixed(&mut out, b"SAS FILE", 8);
    put_fixed(&mut out, attrs.dataset.as_bytes(), 64);
    put_fixed(&mut out, b"DATA", 8);

    if wide {
        put_u32(&mut out, 0);
    }

    put_f64(&mut out, attrs.created);
    put_f64(&mut out, attrs.modified);
    put_f64(&mut out, attrs.created2);
    put_f64(&mut out, attrs.modified2);

    put_u32(&mut out, header_size);
    put_u32(&mut out, plan.page_size);
    put_word(&mut out, wide, plan.page_count as i64);

    put_f64(&mut out, 0.0);

    let or_default = |value: &str, fallback: &'static str| -> Vec<u8> {
        if value.is_empty() {
            fallback.as_bytes().to_vec()
        } else {
            value.as_bytes().to_vec()
        }
    };
    put_fixed(&mut out, &or_default(&attrs.sasrel, DEFAULT_RELEASE), 8);
    put_fixed(&mut out, &or_default(&attrs.sasserv, DEFAULT_SERVER), 16);
    put_fixed(&mut out, &or_default(&attrs.osver, DEFAULT_OSVER), 16);
    put_fixed(&mut out, attrs.osmaker.as_bytes(), 16);
    put_fixed(&mut out, &or_default(&attrs.osname, DEFAULT_OSNAME), 16);

    put_u32(&mut out, HEADER_UNKNOWN_A);
    put_u32(&mut out, HEADER_UNKNOWN_B);
    put_u32(&mut out, HEADER_UNKNOWN_B);
    put_u32(&mut out, HEADER_UNKNOWN_B);

    put_f64(&mut out, 0.0);
    put_f64(&mut out, 0.0);

    put_u32(&mut out, 0); // header-block page sequence
    put_u32(&mut out, 0);
    put_f64(&mut out, attrs.third_timestamp);

    out.resize(header_size as usize, 0);
    out
}

/// Subheaders in file order, each with its directory type flag.
fn tail_subheaders(plan: &Plan) -> Vec<(Vec<u8>, i8)> {
    let k = plan.columns.len();
    let mut tail = Vec::with_capacity(k + 7);
    for idx in (0..k).rev() {
        tail.push((subheaders::format_label(plan, idx), 0));
    }
    if k > 1 {
        tail.push((subheaders::column_list(plan), 1));
    }
    tail.push((subheaders::column_attrs(plan), 1));
    tail.push((subheaders::column_names(plan), 1));
    tail.push((subheaders::column_text(plan), 1));
    tail.push((subheaders::signature_locations(plan), 0));
    tail.push((subheaders::column_size(plan), 0));
    tail.push((subheaders::row_size(plan), 0));
    tail
}

fn page_header(out: &mut Vec<u8>, wide: bool, seq: u32, page_type: i16, block_count: i16, subheader_count: i16) {
    put_u32(out, seq);
    if wide {
        put_u32(out, 0);
        put_i64(out, 0);
        put_i64(out, 0);
        put_i64(out, 0);
    } else {
        put_u32(out, 0);
        put_u32(out, 0);
        put_u32(out, 0);
    }
    put_i16(out, page_type);
    put_i16(out, block_count);
    put_i16(out, subheader_count);
    put_i16(out, 0);
}

fn first_page(
    frame: &SasFrame,
    plan: &Plan,
    subheader_count: u64,
    data_start: u64,
    tail_start: u64,
) -> Result<Vec<u8>> {
    let wide = plan.wide;
    let mut page = Vec::with_capacity(plan.page_size as usize);

    page_header(
        &mut page,
        wide,
        1,
        PAGE_TYPE_FIRST,
        plan.block_count1,
        subheader_count as i16,
    );

    // The directory: entry 0 is the row-size subheader, the last entry the
    // zero-length terminator; offsets count down the tail in reverse.
    let tail = tail_subheaders(plan);
    let entries = subheader_count as usize;
    let mut offsets = vec![(0u64, 0u64, 0i8, 0i8); entries];
    offsets[entries - 1] = (tail_start, 0, 1, 0);
    let mut running = tail_start;
    for (position, (bytes, shtype)) in tail.iter().enumerate() {
        let index = entries - 2 - position;
        offsets[index] = (running, bytes.len() as u64, 0, *shtype);
        running += bytes.len() as u64;
    }
    if running > u64::from(plan.page_size) {
        return Err(Error::writer_unsupported(
            "metadata directory overruns the page",
        ));
    }

    for (offset, length, compression, shtype) in &offsets {
        put_word(&mut page, wide, *offset as i64);
        put_word(&mut page, wide, *length as i64);
        page.push(*compression as u8);
        page.push(*shtype as u8);
        page.resize(page.len() + if wide { 6 } else { 2 }, 0);
    }

    debug_assert_eq!(page.len() as u64, data_start);
    encode_rows(&mut page, frame, 0, plan.rows_on_page1);

    page.resize(tail_start as usize, 0);
    for (bytes, _) in &tail {
        page.extend_from_slice(bytes);
    }
    page.resize(plan.page_size as usize, 0);
    Ok(page)
}

fn data_page(frame: &SasFrame, plan: &Plan, seq: u32, first_row: u64, rows: u64) -> Vec<u8> {
    let mut page = Vec::with_capacity(plan.page_size as usize);
    page_header(&mut page, plan.wide, seq, PAGE_TYPE_DATA, rows as i16, 0);
    encode_rows(&mut page, frame, first_row, rows);
    page.resize(plan.page_size as usize, 0);
    page
}

fn encode_rows(out: &mut Vec<u8>, frame: &SasFrame, first_row: u64, rows: u64) {
    for row in first_row..first_row + rows {
        let row = row as usize;
        for column in &frame.columns {
            match &column.values {
                ColumnValues::Numeric(values) => {
                    let value = values[row];
                    match value {
                        Some(v) if v.is_finite() => put_f64(out, v),
                        _ => out.extend_from_slice(&MISSING_NUMERIC),
                    }
                }
                ColumnValues::Character(values) => {
                    let width = column.meta.width as usize;
                    let bytes = values[row].as_bytes();
                    let take = bytes.len().min(width);
                    out.extend_from_slice(&bytes[..take]);
                    out.resize(out.len() + (width - take), b' ');
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Column;
    use crate::metadata::{ColumnMeta, VariableKind};

    fn numeric_column(name: &str, values: Vec<Option<f64>>) -> Column {
        Column {
            meta: ColumnMeta {
                name: name.to_owned(),
                label: String::new(),
                format: String::new(),
                kind: VariableKind::Numeric,
                width: 8,
                offset: 0,
                display_width: 8,
                decimals: 0,
            },
            values: ColumnValues::Numeric(values),
        }
    }

    #[test]
    fn compressed_output_is_refused() {
        let frame = SasFrame {
            columns: vec![numeric_column("a", vec![Some(1.0)])],
            ..SasFrame::default()
        };
        let options = WriteOptions::new().with_compress(true);
        let err = write_sas7bdat_to(&mut Vec::new(), &frame, &options).unwrap_err();
        assert!(matches!(err, Error::WriterUnsupported { .. }));
    }

    #[test]
    fn narrow_numeric_columns_are_refused() {
        let mut column = numeric_column("a", vec![Some(1.0)]);
        column.meta.width = 4;
        let frame = SasFrame {
            columns: vec![column],
            ..SasFrame::default()
        };
        let err =
            write_sas7bdat_to(&mut Vec::new(), &frame, &WriteOptions::new()).unwrap_err();
        assert!(matches!(err, Error::WriterUnsupported { .. }));
    }

    #[test]
    fn missing_numeric_pattern_matches_sas() {
        let frame = SasFrame {
            columns: vec![numeric_column("a", vec![None])],
            ..SasFrame::default()
        };
        let mut out = Vec::new();
        encode_rows(&mut out, &frame, 0, 1);
        assert_eq!(out, MISSING_NUMERIC);
    }

    #[test]
    fn output_length_is_header_plus_pages() {
        let frame = SasFrame {
            columns: vec![numeric_column("a", vec![Some(1.0), None, Some(2.5)])],
            ..SasFrame::default()
        };
        let mut out = Vec::new();
        write_sas7bdat_to(&mut out, &frame, &WriteOptions::new()).unwrap();
        assert_eq!(out.len(), 65536 + 65536);

        let mut out = Vec::new();
        write_sas7bdat_to(&mut out, &frame, &WriteOptions::new().with_bit32(true)).unwrap();
        assert_eq!(out.len(), 1024 + 8192);
    }
}
