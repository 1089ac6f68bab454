use std::io::Read;

use smallvec::SmallVec;

use crate::error::Result;
use crate::parser::byteorder::ByteReader;
use crate::parser::header::SasHeader;

pub const PAGE_META: i16 = 0;
pub const PAGE_CMETA: i16 = 128;
pub const PAGE_DATA: i16 = 256;
pub const PAGE_DATA_2: i16 = 384;
pub const PAGE_MIX_1: i16 = 512;
pub const PAGE_MIX_2: i16 = 640;
pub const PAGE_AMD: i16 = 1024;
pub const PAGE_META_2: i16 = 16384;
pub const PAGE_COMP: i16 = -28672;

/// Offset of the pointer table relative to the end of the page header.
pub const SUBHEADER_POINTERS_OFFSET: u64 = 8;

/// Fixed-size page header fields.
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    pub page_seq: u32,
    pub deleted_pointer_length: u64,
    pub page_type: i16,
    pub block_count: i16,
    pub subheader_count: i16,
}

impl PageHeader {
    /// Rows stored inline on this page.
    #[must_use]
    pub const fn rows_on_page(&self) -> u64 {
        let rows = self.block_count as i64 - self.subheader_count as i64;
        if rows > 0 { rows as u64 } else { 0 }
    }

    /// Whether the page's directory is worth walking at all.
    #[must_use]
    pub const fn has_directory(&self) -> bool {
        matches!(
            self.page_type,
            PAGE_META
                | PAGE_CMETA
                | PAGE_DATA
                | PAGE_DATA_2
                | PAGE_MIX_1
                | PAGE_MIX_2
                | PAGE_AMD
                | PAGE_META_2
        )
    }

    /// Pages of these types carry a deleted-row bitmap after their rows.
    #[must_use]
    pub const fn has_deleted_bitmap(&self) -> bool {
        matches!(self.page_type, PAGE_DATA_2 | PAGE_MIX_2 | PAGE_AMD)
    }
}

/// One entry of the subheader pointer table.
#[derive(Debug, Clone, Copy)]
pub struct SubheaderPointer {
    pub offset: u64,
    pub length: u64,
    pub compression: i8,
    pub shtype: i8,
}

/// Compression flag marking a row payload compressed with the file codec.
pub const POINTER_COMPRESSED_PAYLOAD: i8 = 4;

/// Parses the page header at the cursor (C5).
///
/// # Errors
///
/// Fails only on I/O errors or truncation.
pub fn parse_page_header<R: Read>(
    reader: &mut ByteReader<R>,
    uses_u64: bool,
) -> Result<PageHeader> {
    let page_seq = reader.read_u32()?;
    if uses_u64 {
        let _unknown = reader.read_u32()?;
        let _unk1 = reader.read_i64()?;
        let _unk2 = reader.read_i64()?;
    } else {
        let _unk1 = reader.read_i32()?;
        let _unk2 = reader.read_i32()?;
    }
    let deleted_pointer_length = reader.read_word(uses_u64)?;

    let page_type = reader.read_i16()?;
    let block_count = reader.read_i16()?;
    let subheader_count = reader.read_i16()?;
    let _unk16 = reader.read_i16()?;

    Ok(PageHeader {
        page_seq,
        deleted_pointer_length,
        page_type,
        block_count,
        subheader_count,
    })
}

/// Parses the `SUBHEADER_COUNT` pointer-table entries after the page header.
///
/// # Errors
///
/// Fails only on I/O errors or truncation.
pub fn parse_pointer_table<R: Read>(
    reader: &mut ByteReader<R>,
    uses_u64: bool,
    count: u64,
) -> Result<SmallVec<[SubheaderPointer; 16]>> {
    let mut pointers = SmallVec::with_capacity(count as usize);
    for _ in 0..count {
        let offset = reader.read_word(uses_u64)?;
        let length = reader.read_word(uses_u64)?;
        let compression = reader.read_i8()?;
        let shtype = reader.read_i8()?;
        // Zero padding to the pointer word size.
        reader.skip(if uses_u64 { 6 } else { 2 })?;
        pointers.push(SubheaderPointer {
            offset,
            length,
            compression,
            shtype,
        });
    }
    Ok(pointers)
}

/// Page-relative offset of the deleted-row bitmap on bitmap-bearing pages.
#[must_use]
pub fn deleted_bitmap_offset(
    header: &SasHeader,
    page: &PageHeader,
    row_length: u64,
) -> u64 {
    let head = header.page_bit_offset() + 8;
    let pointer_bytes = page.subheader_count.max(0) as u64 * header.subheader_pointer_length();
    let align_correction = (head + SUBHEADER_POINTERS_OFFSET + pointer_bytes) % 8;
    head + page.deleted_pointer_length
        + align_correction
        + pointer_bytes
        + page.rows_on_page() * row_length
}

/// Reads `ceil(rows / 8)` bitmap bytes and unpacks them MSB-first: bit 7 of
/// byte 0 answers for page-local row 0; a set bit marks a deleted row.
///
/// # Errors
///
/// Fails only on I/O errors or truncation.
pub fn read_deleted_bitmap<R: Read>(
    reader: &mut ByteReader<R>,
    rows: u64,
) -> Result<Vec<bool>> {
    let byte_count = rows.div_ceil(8);
    let bytes = reader.read_bytes(byte_count as usize)?;
    let mut bits = Vec::with_capacity(rows as usize);
    for row in 0..rows {
        let byte = bytes[(row / 8) as usize];
        bits.push(byte & (0x80 >> (row % 8)) != 0);
    }
    Ok(bits)
}
