use std::io::Read;

use encoding_rs::Encoding;

use crate::error::Result;
use crate::logger::log_warn;
use crate::parser::byteorder::ByteReader;

/// Pointer into the text pool: `(chunk, offset, length)`.
///
/// Offsets are relative to the first byte after the owning chunk's
/// signature, which is exactly where each stored chunk begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRef {
    pub index: u16,
    pub offset: u16,
    pub length: u16,
}

impl TextRef {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.length == 0
    }
}

/// Append-only arena of column-text chunks, addressed by [`TextRef`].
#[derive(Debug, Default)]
pub struct TextStore {
    chunks: Vec<Vec<u8>>,
}

impl TextStore {
    #[must_use]
    pub const fn new() -> Self {
        Self { chunks: Vec::new() }
    }

    pub fn push_chunk(&mut self, chunk: Vec<u8>) {
        self.chunks.push(chunk);
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.chunks.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    #[must_use]
    pub fn chunk(&self, index: usize) -> Option<&[u8]> {
        self.chunks.get(index).map(Vec::as_slice)
    }

    /// Resolves a ref to its raw bytes; a ref outside the pool warns and
    /// yields `None` so a damaged name degrades instead of aborting.
    #[must_use]
    pub fn resolve_bytes(&self, text_ref: TextRef) -> Option<&[u8]> {
        if text_ref.is_empty() {
            return None;
        }
        let chunk = match self.chunks.get(text_ref.index as usize) {
            Some(chunk) => chunk,
            None => {
                log_warn(&format!(
                    "text ref points at missing pool chunk {}",
                    text_ref.index
                ));
                return None;
            }
        };
        let start = text_ref.offset as usize;
        let end = start + text_ref.length as usize;
        if end > chunk.len() {
            log_warn(&format!(
                "text ref {}+{} overruns pool chunk {} ({} bytes)",
                text_ref.offset,
                text_ref.length,
                text_ref.index,
                chunk.len()
            ));
            return None;
        }
        Some(&chunk[start..end])
    }

    /// Resolves a ref and decodes it with the file's declared encoding,
    /// trimming trailing space/NUL padding.
    #[must_use]
    pub fn resolve_string(&self, text_ref: TextRef, encoding: &'static Encoding) -> String {
        self.resolve_bytes(text_ref)
            .map(|bytes| super::rows::decode_text(bytes, encoding).into_owned())
            .unwrap_or_default()
    }
}

fn read_text_ref<R: Read>(reader: &mut ByteReader<R>) -> Result<TextRef> {
    Ok(TextRef {
        index: reader.read_u16()?,
        offset: reader.read_u16()?,
        length: reader.read_u16()?,
    })
}

/// Per-column name pointer from a column-name subheader.
#[derive(Debug, Clone, Copy)]
pub struct ColumnNamePointer {
    pub text: TextRef,
}

/// Parses a column-name subheader body (cursor past the signature).
///
/// # Errors
///
/// Fails on I/O errors or truncation of the subheader.
pub fn parse_column_names<R: Read>(
    reader: &mut ByteReader<R>,
) -> Result<Vec<ColumnNamePointer>> {
    let remaining = reader.read_i16()?;
    let entries = (i32::from(remaining) - 8).max(0) / 8;

    for _ in 0..3 {
        let pad = reader.read_u16()?;
        if pad != 0 {
            log_warn(&format!("column-name subheader pad is {pad}, expected 0"));
        }
    }

    let mut pointers = Vec::with_capacity(entries as usize);
    for _ in 0..entries {
        let text = read_text_ref(reader)?;
        let zeros = reader.read_u16()?;
        if zeros != 0 {
            log_warn(&format!("column-name pointer tail is {zeros}, expected 0"));
        }
        pointers.push(ColumnNamePointer { text });
    }
    Ok(pointers)
}

/// Per-column storage attributes from a column-attributes subheader.
#[derive(Debug, Clone, Copy)]
pub struct ColumnAttr {
    /// Byte offset of the column within a row.
    pub offset: u64,
    pub width: u32,
    /// 1 numeric, 2 character.
    pub vartype: u8,
}

/// Parses a column-attributes subheader body (cursor past the signature).
///
/// Entries with a type outside `{1, 2}` or a width beyond the page size are
/// dropped; real files pad attribute tables with such sentinels.
///
/// # Errors
///
/// Fails on I/O errors or truncation of the subheader.
pub fn parse_column_attrs<R: Read>(
    reader: &mut ByteReader<R>,
    uses_u64: bool,
    page_size: u32,
) -> Result<Vec<ColumnAttr>> {
    let remaining = reader.read_i16()?;
    let entry_width = if uses_u64 { 16 } else { 12 };
    let entries = (i32::from(remaining) - 8).max(0) / entry_width;

    for _ in 0..3 {
        let _pad = reader.read_u16()?;
    }

    let mut attrs = Vec::with_capacity(entries as usize);
    for _ in 0..entries {
        let offset = reader.read_word(uses_u64)?;
        let width = reader.read_u32()?;
        let _name_flag = reader.read_u16()?;
        let vartype = reader.read_u8()?;
        let _unknown = reader.read_u8()?;

        if (1..=2).contains(&vartype) && width <= page_size {
            attrs.push(ColumnAttr {
                offset,
                width,
                vartype,
            });
        }
    }
    Ok(attrs)
}

/// Format and label pointers plus display hints for one column.
#[derive(Debug, Clone, Copy)]
pub struct ColumnFormatLabel {
    pub format_major: i16,
    pub format_minor: i16,
    pub informat_major: i16,
    pub informat_minor: i16,
    pub key_major: i16,
    pub key_minor: i16,
    pub format: TextRef,
    pub label: TextRef,
}

/// Parses a format/label subheader body (cursor past the signature).
///
/// # Errors
///
/// Fails on I/O errors or truncation of the subheader.
pub fn parse_column_format_label<R: Read>(
    reader: &mut ByteReader<R>,
    uses_u64: bool,
) -> Result<ColumnFormatLabel> {
    for _ in 0..4 {
        let _head = reader.read_u16()?;
    }
    let format_major = reader.read_i16()?;
    let format_minor = reader.read_i16()?;
    let informat_major = reader.read_i16()?;
    let informat_minor = reader.read_i16()?;
    let key_major = reader.read_i16()?;
    let key_minor = reader.read_i16()?;
    for _ in 0..5 {
        let _mid = reader.read_u16()?;
    }
    if uses_u64 {
        for _ in 0..4 {
            let _wide_pad = reader.read_u16()?;
        }
    }

    let format = read_text_ref(reader)?;
    let label = read_text_ref(reader)?;
    let third = read_text_ref(reader)?;
    if third != TextRef::default() {
        log_warn(&format!(
            "format/label subheader third ref is not empty: {} {} {}",
            third.index, third.offset, third.length
        ));
    }

    Ok(ColumnFormatLabel {
        format_major,
        format_minor,
        informat_major,
        informat_minor,
        key_major,
        key_minor,
        format,
        label,
    })
}

/// Parses a column-size subheader body: the declared column count `k`.
///
/// # Errors
///
/// Fails on I/O errors or truncation of the subheader.
pub fn parse_column_size<R: Read>(reader: &mut ByteReader<R>, uses_u64: bool) -> Result<u64> {
    let count = reader.read_word(uses_u64)?;
    let _unknown = reader.read_word(uses_u64)?;
    Ok(count)
}

/// Parses a column-list subheader body into the auxiliary ordering vector.
///
/// `available` bounds the value loop so a short subheader degrades to a
/// warning instead of a truncation error.
///
/// # Errors
///
/// Fails on I/O errors or truncation of the fixed leading fields.
pub fn parse_column_list<R: Read>(
    reader: &mut ByteReader<R>,
    uses_u64: bool,
    available: u64,
) -> Result<Vec<i16>> {
    let _large = reader.read_u32()?;
    let _pad = reader.read_u16()?;
    let _pad = reader.read_u16()?;
    let _remaining = reader.read_word_i64(uses_u64)?;
    let _name_count = reader.read_u16()?;
    let entries = reader.read_i16()?;
    let _one = reader.read_u16()?;
    let _name_count2 = reader.read_u16()?;
    for _ in 0..3 {
        let _pad = reader.read_u16()?;
    }

    let mut values = Vec::with_capacity(entries.max(0) as usize);
    for _ in 0..entries.max(0) {
        if reader.consumed() + 2 > available {
            log_warn("column-list subheader shorter than its entry count");
            break;
        }
        values.push(reader.read_i16()?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Endianness;
    use encoding_rs::UTF_8;
    use std::io::Cursor;

    fn le(bytes: &[u8]) -> ByteReader<Cursor<&[u8]>> {
        ByteReader::new(Cursor::new(bytes), Endianness::Little)
    }

    #[test]
    fn text_store_resolves_in_bounds_refs() {
        let mut store = TextStore::new();
        store.push_chunk(b"\x00\x00COL1 DATE".to_vec());
        let name = store.resolve_bytes(TextRef {
            index: 0,
            offset: 2,
            length: 4,
        });
        assert_eq!(name, Some(&b"COL1"[..]));
        assert_eq!(
            store.resolve_string(
                TextRef {
                    index: 0,
                    offset: 6,
                    length: 5
                },
                UTF_8
            ),
            "DATE"
        );
        // Out of range degrades to None.
        assert_eq!(
            store.resolve_bytes(TextRef {
                index: 1,
                offset: 0,
                length: 1
            }),
            None
        );
        assert_eq!(
            store.resolve_bytes(TextRef {
                index: 0,
                offset: 10,
                length: 40
            }),
            None
        );
    }

    #[test]
    fn column_names_yield_text_refs() {
        // lenremain = 8 + 2 entries * 8.
        let mut body = Vec::new();
        body.extend_from_slice(&24i16.to_le_bytes());
        body.extend_from_slice(&[0u8; 6]);
        for (off, len) in [(4u16, 3u16), (8, 5)] {
            body.extend_from_slice(&0u16.to_le_bytes());
            body.extend_from_slice(&off.to_le_bytes());
            body.extend_from_slice(&len.to_le_bytes());
            body.extend_from_slice(&0u16.to_le_bytes());
        }
        let mut reader = le(&body);
        let pointers = parse_column_names(&mut reader).unwrap();
        assert_eq!(pointers.len(), 2);
        assert_eq!(pointers[0].text.offset, 4);
        assert_eq!(pointers[1].text.length, 5);
    }

    #[test]
    fn column_attrs_filter_nonsense_entries() {
        // lenremain = 8 + 2 entries * 12 (narrow layout).
        let mut body = Vec::new();
        body.extend_from_slice(&32i16.to_le_bytes());
        body.extend_from_slice(&[0u8; 6]);
        // Valid numeric column at offset 0, width 8.
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&8u32.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.push(1);
        body.push(0);
        // Bogus type 9 entry must be dropped.
        body.extend_from_slice(&8u32.to_le_bytes());
        body.extend_from_slice(&4u32.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.push(9);
        body.push(0);
        let mut reader = le(&body);
        let attrs = parse_column_attrs(&mut reader, false, 4096).unwrap();
        assert_eq!(attrs.len(), 1);
        assert_eq!(attrs[0].width, 8);
        assert_eq!(attrs[0].vartype, 1);
    }

    #[test]
    fn format_label_refs_narrow_layout() {
        let mut body = vec![0u8; 48];
        body[8..10].copy_from_slice(&8i16.to_le_bytes()); // format major
        body[10..12].copy_from_slice(&2i16.to_le_bytes()); // format minor
        // format ref at 30..36, label ref at 36..42.
        body[32..34].copy_from_slice(&6u16.to_le_bytes());
        body[34..36].copy_from_slice(&4u16.to_le_bytes());
        body[38..40].copy_from_slice(&10u16.to_le_bytes());
        body[40..42].copy_from_slice(&2u16.to_le_bytes());
        let mut reader = le(&body);
        let info = parse_column_format_label(&mut reader, false).unwrap();
        assert_eq!(info.format_major, 8);
        assert_eq!(info.format_minor, 2);
        assert_eq!(info.format.offset, 6);
        assert_eq!(info.format.length, 4);
        assert_eq!(info.label.offset, 10);
        assert_eq!(info.label.length, 2);
    }

    #[test]
    fn column_size_reads_count() {
        let mut body = Vec::new();
        body.extend_from_slice(&5u32.to_le_bytes());
        body.extend_from_slice(&0u32.to_le_bytes());
        let mut reader = le(&body);
        assert_eq!(parse_column_size(&mut reader, false).unwrap(), 5);
    }

    #[test]
    fn column_list_reads_entries_and_tolerates_short_bodies() {
        let mut body = Vec::new();
        body.extend_from_slice(&0u32.to_le_bytes());
        body.extend_from_slice(&[0u8; 4]);
        body.extend_from_slice(&0i32.to_le_bytes());
        body.extend_from_slice(&0u16.to_le_bytes());
        body.extend_from_slice(&3i16.to_le_bytes()); // entries
        body.extend_from_slice(&[0u8; 8]);
        body.extend_from_slice(&(-2i16).to_le_bytes());
        body.extend_from_slice(&7i16.to_le_bytes());
        // Third entry missing on purpose.
        let available = body.len() as u64;
        let mut reader = le(&body);
        let values = parse_column_list(&mut reader, false, available).unwrap();
        assert_eq!(values, vec![-2, 7]);
    }
}
