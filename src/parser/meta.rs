use std::io::{Cursor, Read, Seek};
use std::sync::atomic::{AtomicBool, Ordering};

use encoding_rs::Encoding;

use crate::error::{Error, Result};
use crate::logger::{log_debug, log_warn};
use crate::metadata::{ColumnMeta, Compression, FileAttributes, VariableKind};
use crate::parser::byteorder::ByteReader;
use crate::parser::column::{
    ColumnAttr, ColumnFormatLabel, ColumnNamePointer, TextStore, parse_column_attrs,
    parse_column_format_label, parse_column_list, parse_column_names, parse_column_size,
};
use crate::parser::compression::{CodecError, decompress_rdc, decompress_rle};
use crate::parser::encoding::resolve_encoding;
use crate::parser::header::{SasHeader, parse_header};
use crate::parser::page::{
    PAGE_COMP, PAGE_META, POINTER_COMPRESSED_PAYLOAD, deleted_bitmap_offset, parse_page_header,
    parse_pointer_table, read_deleted_bitmap,
};
use crate::parser::rowsize::{
    RowSizeInfo, SubheaderLocation, parse_row_size, parse_subheader_counts,
};
use crate::parser::subheader::{SubheaderKind, classify};

/// Where the compression / proc / software strings live inside the first
/// text-pool chunk, and the width of the pad between the first two.
const EMBEDDED_TEXT_OFFSET: usize = 12;
const EMBEDDED_PAD_LEN: usize = 16;

/// Per-page facts the row decoder needs.
#[derive(Debug, Clone, Default)]
pub struct PageInfo {
    /// Absolute offset of the first inline row (0 on pure meta pages).
    pub data_pos: u64,
    pub rows: u64,
    /// Page-local deletion bits; empty when the page carries no bitmap.
    pub deleted: Vec<bool>,
}

/// Everything learned from the header and metadata subheaders, plus the
/// scratch stream holding decompressed row payloads.
pub struct ParsedMetadata {
    pub header: SasHeader,
    pub row_size: RowSizeInfo,
    pub columns: Vec<ColumnMeta>,
    pub compression: Compression,
    pub encoding: &'static Encoding,
    pub locations: Vec<SubheaderLocation>,
    pub pages: Vec<PageInfo>,
    /// Concatenated decompressed row payloads, in file order.
    pub scratch_rows: Vec<u8>,
    pub attributes: FileAttributes,
}

#[derive(Default)]
struct MetadataBuilder {
    row_size: Option<RowSizeInfo>,
    column_count: Option<u64>,
    text: TextStore,
    names: Vec<ColumnNamePointer>,
    attrs: Vec<ColumnAttr>,
    format_labels: Vec<ColumnFormatLabel>,
    column_list: Vec<i16>,
    locations: Vec<SubheaderLocation>,
    compression: Option<Compression>,
    compression_name: String,
    proc: String,
    sw: String,
    unknown_signatures: Vec<u64>,
}

impl MetadataBuilder {
    fn row_length(&self) -> u64 {
        self.row_size.map_or(0, |info| info.row_length)
    }

    /// Carves the compression / proc / software strings out of the first
    /// text chunk once both the row-size subheader and the chunk are known.
    fn extract_embedded_text(&mut self) {
        let Some(info) = self.row_size else { return };
        if self.compression.is_some() {
            return;
        }
        let Some(chunk) = self.text.chunk(0) else { return };

        let mut at = EMBEDDED_TEXT_OFFSET;
        let take = |chunk: &[u8], at: &mut usize, len: usize| -> Vec<u8> {
            let end = (*at + len).min(chunk.len());
            let slice = chunk.get(*at..end).unwrap_or_default().to_vec();
            *at = end;
            slice
        };

        if info.compr_len > 0 {
            let raw = take(chunk, &mut at, info.compr_len as usize);
            self.compression_name = String::from_utf8_lossy(&raw).into_owned();
        }
        let pad_len = if info.has_proc() { EMBEDDED_PAD_LEN } else { 0 };
        if pad_len > 0 {
            let pad = take(chunk, &mut at, pad_len);
            if pad.iter().any(|b| *b != b' ') {
                log_warn("text pool: non-blank bytes in the fixed pad after the compression name");
            }
        }
        if info.proc_len > 0 {
            let raw = take(chunk, &mut at, info.proc_len as usize);
            self.proc = String::from_utf8_lossy(&raw).trim_end().to_owned();
        }
        if info.sw_len > 0 {
            let raw = take(chunk, &mut at, info.sw_len as usize);
            self.sw = String::from_utf8_lossy(&raw).trim_end().to_owned();
        }

        let flavour = Compression::from_name(&self.compression_name);
        if flavour == Compression::Unknown {
            log_warn(&format!(
                "unsupported compression {:?}; row data will be skipped",
                self.compression_name
            ));
        }
        self.compression = Some(flavour);
    }

    fn codec(&self) -> Compression {
        self.compression.unwrap_or(Compression::None)
    }
}

/// Parses the header and walks every page, assembling schema, page facts
/// and the decompressed row stream (C4–C7).
///
/// `interrupt` is polled once per page; raising it aborts with
/// [`Error::Interrupted`].
///
/// # Errors
///
/// Fatal on I/O failures, truncation, an unreasonable header,
/// non-monotonic page bases, or metadata that does not join into a schema.
pub fn parse_metadata<R: Read + Seek>(
    input: &mut R,
    interrupt: Option<&AtomicBool>,
) -> Result<ParsedMetadata> {
    let file_len = {
        let mut probe = ByteReader::new(&mut *input, crate::metadata::Endianness::Little);
        probe.stream_len()?
    };

    let header = parse_header(input)?;
    let mut builder = MetadataBuilder::default();
    let mut pages = Vec::with_capacity(header.page_count as usize);
    let mut page_types = Vec::with_capacity(header.page_count as usize);
    let mut page_seqnums = Vec::with_capacity(header.page_count as usize);
    let mut scratch_rows = Vec::new();
    let mut row_scratch = Vec::new();
    let mut previous_base = 0u64;

    for pg in 0..header.page_count {
        if let Some(flag) = interrupt
            && flag.load(Ordering::Relaxed)
        {
            return Err(Error::Interrupted { page: pg });
        }

        let page_base = header.page_base(pg);
        if page_base <= previous_base && pg > 0 {
            return Err(Error::NonMonotonicPage {
                page: pg,
                offset: page_base,
            });
        }
        previous_base = page_base;

        let mut reader = ByteReader::with_base(&mut *input, header.endianness, 0);
        reader.seek_to(page_base)?;
        let page = parse_page_header(&mut reader, header.uses_u64)?;
        page_types.push(page.page_type);
        page_seqnums.push(page.page_seq);

        let rows = page.rows_on_page();
        if !page.has_directory() {
            log_debug(&format!(
                "page {pg}: type {} has no subheader directory",
                page.page_type
            ));
            pages.push(PageInfo {
                data_pos: 0,
                rows,
                deleted: Vec::new(),
            });
            continue;
        }

        let pointer_count = page.subheader_count.max(0) as u64;
        let pointers = parse_pointer_table(&mut reader, header.uses_u64, pointer_count)?;
        let data_pos = if page.page_type == PAGE_META {
            0
        } else {
            reader.position()
        };

        for (index, pointer) in pointers.iter().enumerate() {
            if pointer.offset == 0 || pointer.length == 0 {
                break;
            }
            let subheader_base = page_base + pointer.offset;
            if subheader_base + pointer.length > file_len {
                return Err(Error::truncated(subheader_base + pointer.length));
            }

            reader.seek_to(subheader_base)?;
            let body = reader.read_bytes(pointer.length as usize)?;

            let page0_raw_row = pg == 0
                && index != 3
                && page.page_type == PAGE_META
                && pointer.length == builder.row_length()
                && builder.row_length() > 0;

            if pointer.compression == POINTER_COMPRESSED_PAYLOAD {
                decompress_payload(&mut builder, &body, subheader_base, &mut scratch_rows, &mut row_scratch)?;
                continue;
            }
            if page.page_type == PAGE_COMP {
                log_debug(&format!("page {pg}: skipping entry {index} on comp page"));
                continue;
            }
            if page0_raw_row {
                // An uncompressed row stored as a subheader; only seen in
                // otherwise-compressed files.
                if pointer.length > header.alignval() && pointer.length < u64::from(header.page_size)
                {
                    scratch_rows.extend_from_slice(&body);
                }
                continue;
            }

            dispatch_subheader(
                &mut builder,
                &header,
                &body,
                subheader_base,
                pointer.length,
            )?;
        }

        // The embedded strings become extractable as soon as the row-size
        // subheader and the first text chunk have both been seen.
        builder.extract_embedded_text();

        let mut deleted = Vec::new();
        if page.has_deleted_bitmap() && builder.row_length() > 0 && rows > 0 {
            let bitmap_offset = deleted_bitmap_offset(&header, &page, builder.row_length());
            let bitmap_base = page_base + bitmap_offset;
            if bitmap_base + rows.div_ceil(8) > file_len {
                return Err(Error::truncated(bitmap_base));
            }
            reader.seek_to(bitmap_base)?;
            deleted = read_deleted_bitmap(&mut reader, rows)?;
        }

        pages.push(PageInfo {
            data_pos,
            rows,
            deleted,
        });
    }

    finalize(
        header, builder, pages, page_types, page_seqnums, scratch_rows,
    )
}

fn decompress_payload(
    builder: &mut MetadataBuilder,
    body: &[u8],
    offset: u64,
    scratch_rows: &mut Vec<u8>,
    row_scratch: &mut Vec<u8>,
) -> Result<()> {
    let row_length = builder.row_length() as usize;
    let outcome = match builder.codec() {
        Compression::Rle => decompress_rle(body, row_length, row_scratch),
        Compression::Rdc => decompress_rdc(body, row_length, row_scratch),
        Compression::None | Compression::Unknown => {
            log_warn("compressed row payload before (or without) a known codec; skipped");
            return Ok(());
        }
    };
    match outcome {
        Ok(()) => {}
        Err(CodecError::Truncated) => return Err(Error::truncated(offset)),
        Err(CodecError::LengthMismatch { produced }) => {
            log_warn(&format!(
                "corrupt row at offset {offset}: decompressed {produced} bytes, expected {row_length}"
            ));
        }
        Err(CodecError::BadBackReference { offset: back, produced }) => {
            log_warn(&format!(
                "corrupt row at offset {offset}: back-reference {back} with {produced} bytes produced"
            ));
        }
    }
    scratch_rows.extend_from_slice(row_scratch);
    Ok(())
}

fn dispatch_subheader(
    builder: &mut MetadataBuilder,
    header: &SasHeader,
    body: &[u8],
    base: u64,
    length: u64,
) -> Result<()> {
    let signature_len = if header.uses_u64 { 8 } else { 4 };
    if body.len() < signature_len {
        log_warn(&format!("subheader at offset {base} shorter than its signature"));
        return Ok(());
    }

    let mut reader = ByteReader::with_base(
        Cursor::new(&body[signature_len..]),
        header.endianness,
        base + signature_len as u64,
    );
    let signature = {
        let mut sig_reader = ByteReader::new(Cursor::new(&body[..signature_len]), header.endianness);
        sig_reader.read_word(header.uses_u64)?
    };

    match classify(signature) {
        Some(SubheaderKind::RowSize) => {
            let info = parse_row_size(&mut reader, header.uses_u64)?;
            if builder.row_size.is_some() {
                log_warn("duplicate row-size subheader; keeping the first");
            } else {
                builder.row_size = Some(info);
            }
        }
        Some(SubheaderKind::ColumnSize) => {
            let count = parse_column_size(&mut reader, header.uses_u64)?;
            builder.column_count = Some(count);
        }
        Some(SubheaderKind::SubheaderCounts) => {
            builder.locations = parse_subheader_counts(&mut reader, header.uses_u64)?;
        }
        Some(SubheaderKind::ColumnText) => {
            builder.text.push_chunk(body[signature_len..].to_vec());
        }
        Some(SubheaderKind::ColumnName) => {
            let pointers = parse_column_names(&mut reader)?;
            builder.names.extend(pointers);
        }
        Some(SubheaderKind::ColumnAttrs) => {
            let attrs = parse_column_attrs(&mut reader, header.uses_u64, header.page_size)?;
            builder.attrs.extend(attrs);
        }
        Some(SubheaderKind::ColumnFormatLabel) => {
            let info = parse_column_format_label(&mut reader, header.uses_u64)?;
            builder.format_labels.push(info);
        }
        Some(SubheaderKind::ColumnList) => {
            let values =
                parse_column_list(&mut reader, header.uses_u64, length - signature_len as u64)?;
            if builder.column_list.is_empty() {
                builder.column_list = values;
            } else if builder.column_list.len() < values.len() {
                let have = builder.column_list.len();
                builder.column_list.extend(values.into_iter().skip(have));
            }
        }
        None => {
            log_warn(&format!(
                "unknown subheader signature 0x{signature:016X} at offset {base}; skipped"
            ));
            builder.unknown_signatures.push(signature);
        }
    }
    Ok(())
}

fn finalize(
    header: SasHeader,
    builder: MetadataBuilder,
    pages: Vec<PageInfo>,
    page_types: Vec<i16>,
    page_seqnums: Vec<u32>,
    scratch_rows: Vec<u8>,
) -> Result<ParsedMetadata> {
    if !builder.unknown_signatures.is_empty() {
        log_debug(&format!(
            "{} subheaders with unrecognised signatures were skipped",
            builder.unknown_signatures.len()
        ));
    }

    let row_size = builder
        .row_size
        .ok_or_else(|| Error::invalid_metadata("row-size subheader missing"))?;
    let column_count = builder
        .column_count
        .ok_or_else(|| Error::invalid_metadata("column-size subheader missing"))?;
    let k = usize::try_from(column_count)
        .map_err(|_| Error::invalid_metadata("column count exceeds the platform pointer width"))?;

    if builder.names.len() != k {
        log_warn(&format!(
            "column-name pointers ({}) do not match the declared column count ({k})",
            builder.names.len()
        ));
    }
    if builder.attrs.len() != k {
        log_warn(&format!(
            "column attributes ({}) do not match the declared column count ({k})",
            builder.attrs.len()
        ));
    }

    let encoding = resolve_encoding(if header.attributes.encoding.is_empty() {
        None
    } else {
        Some(header.attributes.encoding.as_str())
    });

    let has_format_labels = !builder.format_labels.is_empty();
    let mut columns = Vec::with_capacity(k);
    let mut fmt32 = Vec::new();
    let mut ifmt32 = Vec::new();
    let mut fmtkeys = Vec::new();
    let mut widths_total = 0u64;

    for index in 0..k {
        let name = builder
            .names
            .get(index)
            .map(|pointer| builder.text.resolve_string(pointer.text, encoding))
            .unwrap_or_default();
        let attr = builder.attrs.get(index).copied().unwrap_or(ColumnAttr {
            offset: 0,
            width: 0,
            vartype: 1,
        });
        let kind = VariableKind::from_type_code(attr.vartype).unwrap_or(VariableKind::Numeric);
        widths_total += u64::from(attr.width);

        let (format, label, display_width, decimals) = builder.format_labels.get(index).map_or(
            (String::new(), String::new(), 0u16, 0u16),
            |info| {
                let format = builder.text.resolve_string(info.format, encoding);
                let label = builder.text.resolve_string(info.label, encoding);
                let (display, decim) = match kind {
                    VariableKind::Numeric => (info.format_major, info.format_minor),
                    VariableKind::Character => (info.key_major, info.key_minor),
                };
                (format, label, display.max(0) as u16, decim.max(0) as u16)
            },
        );

        if has_format_labels {
            let info = builder.format_labels.get(index);
            fmt32.push(info.map_or(0.0, |i| {
                f64::from(i.format_major) + f64::from(i.format_minor) / 10.0
            }));
            ifmt32.push(info.map_or(0.0, |i| {
                f64::from(i.informat_major) + f64::from(i.informat_minor) / 10.0
            }));
            fmtkeys.push(info.map_or(0.0, |i| {
                f64::from(i.key_major) + f64::from(i.key_minor) / 10.0
            }));
        }

        columns.push(ColumnMeta {
            name,
            label,
            format,
            kind,
            width: attr.width,
            offset: attr.offset,
            display_width,
            decimals,
        });
    }

    if widths_total > row_size.row_length {
        log_warn(&format!(
            "column widths sum to {widths_total}, beyond the declared row length {}",
            row_size.row_length
        ));
    }

    let marked_deleted: u64 = pages
        .iter()
        .map(|page| page.deleted.iter().filter(|bit| **bit).count() as u64)
        .sum();
    if pages.iter().any(|page| !page.deleted.is_empty()) && marked_deleted != row_size.deleted_rows
    {
        log_warn(&format!(
            "deletion bitmaps mark {marked_deleted} rows but the row-size subheader declares {}",
            row_size.deleted_rows
        ));
    }

    let compression = builder.compression.unwrap_or(Compression::None);

    let mut attributes = header.attributes.clone();
    attributes.row_count = row_size.row_count;
    attributes.row_length = row_size.row_length;
    attributes.deleted_rows = row_size.deleted_rows;
    attributes.compression = builder.compression_name.clone();
    attributes.proc = builder.proc.clone();
    attributes.sw = builder.sw.clone();
    attributes.varnames = columns.iter().map(|c| c.name.clone()).collect();
    if has_format_labels {
        attributes.labels = columns.iter().map(|c| c.label.clone()).collect();
        attributes.formats = columns.iter().map(|c| c.format.clone()).collect();
    }
    attributes.colwidth = columns.iter().map(|c| c.width).collect();
    attributes.vartyps = columns.iter().map(|c| c.kind.type_code()).collect();
    attributes.fmt32 = fmt32;
    attributes.ifmt32 = ifmt32;
    attributes.fmtkeys = fmtkeys;
    attributes.column_list = builder.column_list.clone();
    attributes.page_types = page_types;
    attributes.page_seqnums = page_seqnums;

    Ok(ParsedMetadata {
        header,
        row_size,
        columns,
        compression,
        encoding,
        locations: builder.locations,
        pages,
        scratch_rows,
        attributes,
    })
}
