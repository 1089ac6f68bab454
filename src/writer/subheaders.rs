//! Serializers for the page-one subheader directory.
//!
//! The writer emits the little-endian byte sequences observed in reference
//! SAS output; fields with unknown meaning are kept as the named constants
//! below rather than invented.

use crate::metadata::VariableKind;

/// Marker found in the column-list subheader of reference output.
const COLUMN_LIST_MARKER: i32 = 2_143_813_666;
/// Trailer constants of the row-size subheader's first block.
const ROW_SIZE_HEAD: [i64; 4] = [240, 21, 0, 2_240_529];
/// Observed after the column-format pointer pair in wide output.
const ROW_SIZE_P4: i64 = 34;
/// Visual-representation marker inside the text subheader preamble.
const TEXT_PREAMBLE_MARKER: i16 = 5120;
/// Name-flag value emitted for every column attribute entry.
const ATTR_NAME_FLAG: u16 = 1024;
/// SAS version word echoed in the row-size tail.
const ROW_SIZE_VERSION: i32 = 8;

/// The fixed 12-entry signature location table reference SAS output carries:
/// `(signature, first, first_position, last, last_position)`.
const SIGNATURE_LOCATIONS: [(i64, i64, i16, i64, i16); 12] = [
    (-4, 1, 6, 1, 6),
    (-3, 1, 4, 1, 4),
    (-1, 1, 5, 1, 5),
    (-2, 1, 7, 1, 7),
    (-5, 0, 0, 0, 0),
    (-6, 0, 0, 0, 0),
    (-7, 0, 0, 0, 0),
    (0, 0, 0, 0, 0),
    (0, 0, 0, 0, 0),
    (0, 0, 0, 0, 0),
    (0, 0, 0, 0, 0),
    (0, 0, 0, 0, 0),
];

pub(super) fn put_i16(out: &mut Vec<u8>, value: i16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn put_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn put_i32(out: &mut Vec<u8>, value: i32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn put_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn put_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn put_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_le_bytes());
}

/// Writes `value` as a pointer word of the chosen layout.
pub(super) fn put_word(out: &mut Vec<u8>, wide: bool, value: i64) {
    if wide {
        put_i64(out, value);
    } else {
        put_i32(out, value as i32);
    }
}

/// Writes `text` into a fixed-width slot, truncating or NUL-padding.
pub(super) fn put_fixed(out: &mut Vec<u8>, text: &[u8], width: usize) {
    let take = text.len().min(width);
    out.extend_from_slice(&text[..take]);
    out.resize(out.len() + (width - take), 0);
}

fn put_zero_bytes(out: &mut Vec<u8>, count: usize) {
    out.resize(out.len() + count, 0);
}

/// One column as the writer sees it: padded pool strings plus attributes.
pub(super) struct PlannedColumn {
    /// Name padded to a multiple of four (≤ 32 bytes).
    pub name: Vec<u8>,
    /// True (unpadded) name length, capped at 32.
    pub name_len: u16,
    pub label: Vec<u8>,
    pub label_len: u16,
    /// Format padded to 4 or 8 bytes (empty stays empty).
    pub format: Vec<u8>,
    pub format_len: u16,
    pub kind: VariableKind,
    pub width: u32,
    pub display_width: i16,
    pub decimals: i16,
}

/// Shared inputs for the subheader serializers.
pub(super) struct Plan {
    pub wide: bool,
    pub columns: Vec<PlannedColumn>,
    pub row_length: u64,
    pub row_count: u64,
    pub page_size: u32,
    pub page_count: u64,
    pub rows_on_page1: u64,
    pub block_count1: i16,
}

impl Plan {
    fn k(&self) -> usize {
        self.columns.len()
    }

    fn pool_text_len(&self) -> usize {
        self.columns
            .iter()
            .map(|col| col.name.len() + col.label.len() + col.format.len())
            .sum()
    }

    /// Pool offset of the first column name: the chunk preamble (12 bytes),
    /// the compression slot (16) and the proc string (8) come first.
    const fn names_base(&self) -> u16 {
        36
    }

    /// `(name, label, format)` pool offsets for column `idx`.
    fn pool_offsets(&self, idx: usize) -> (u16, u16, u16) {
        let mut at = self.names_base() as usize;
        for col in &self.columns[..idx] {
            at += col.name.len() + col.label.len() + col.format.len();
        }
        let name = at as u16;
        let label = (at + self.columns[idx].name.len()) as u16;
        let format = (at + self.columns[idx].name.len() + self.columns[idx].label.len()) as u16;
        (name, label, format)
    }
}

fn put_signature(out: &mut Vec<u8>, wide: bool, first: u32, second: u32) {
    put_u32(out, first);
    if wide {
        put_u32(out, second);
    }
}

/// Row-size subheader (pointer index 0).
pub(super) fn row_size(plan: &Plan) -> Vec<u8> {
    let wide = plan.wide;
    let mut out = Vec::new();
    put_signature(&mut out, wide, 0xF7F7_F7F7, 0x0000_0000);

    if wide {
        for value in ROW_SIZE_HEAD {
            put_i64(&mut out, value);
        }
    } else {
        put_zero_bytes(&mut out, 16);
    }

    put_word(&mut out, wide, plan.row_length as i64);
    put_word(&mut out, wide, plan.row_count as i64);
    put_word(&mut out, wide, 0); // deleted rows
    put_word(&mut out, wide, 0);

    put_word(&mut out, wide, plan.k() as i64); // column-format pointer 1
    put_word(&mut out, wide, 0); // column-format pointer 2
    put_word(&mut out, wide, 0);
    put_word(&mut out, wide, if wide { ROW_SIZE_P4 } else { 0 });

    put_word(&mut out, wide, i64::from(plan.page_size));
    put_word(&mut out, wide, 0);
    put_word(&mut out, wide, plan.rows_on_page1 as i64);

    if wide {
        // End-of-initial-header markers.
        put_i64(&mut out, -1);
        put_i64(&mut out, -1);
    } else {
        put_zero_bytes(&mut out, 8);
    }

    for _ in 0..37 {
        put_word(&mut out, wide, 0);
    }

    put_i32(&mut out, 0); // page index

    if wide {
        put_zero_bytes(&mut out, 8 * 8 + 4);
    } else {
        put_zero_bytes(&mut out, 8 * 4 + 8);
    }

    // Ten counter words; the page and block counts of page one land here.
    let counters: [i64; 10] = {
        let k = plan.k() as i64;
        let extra = i64::from(plan.k() > 1);
        [
            1,
            2,
            1,
            7 + if plan.k() > 1 { k } else { 0 },
            1,
            9 + if plan.k() > 1 { k } else { 0 },
            plan.page_count as i64,
            i64::from(plan.block_count1),
            1,
            7 + extra,
        ]
    };
    for value in counters {
        put_word(&mut out, wide, value);
    }

    for _ in 0..10 {
        put_word(&mut out, wide, 0);
    }

    // Text-pool bookkeeping markers.
    put_i16(&mut out, 0);
    put_i16(&mut out, 8);
    put_i16(&mut out, 4);
    put_i16(&mut out, 0);
    put_i16(&mut out, 0); // todata

    put_i16(&mut out, 0); // software string length
    put_i16(&mut out, 0);
    put_i16(&mut out, 20);
    put_i16(&mut out, 8);

    put_i16(&mut out, 0);
    put_i16(&mut out, 0);
    put_i16(&mut out, 0); // compression name length
    put_i16(&mut out, 0);

    put_i16(&mut out, 12);
    put_i16(&mut out, 8);
    put_i16(&mut out, 0);
    put_i16(&mut out, 28); // text offset
    put_i16(&mut out, 8); // proc string length

    put_zero_bytes(&mut out, 8 * 4);

    put_i16(&mut out, 0);
    put_i16(&mut out, 0);

    put_i16(&mut out, 4); // distinct subheader signatures
    put_i16(&mut out, 1); // name pointer chain length
    put_i16(&mut out, 1); // label chain length

    put_i32(&mut out, ROW_SIZE_VERSION);
    put_zero_bytes(&mut out, 8);

    put_i16(&mut out, 0); // rows on page echo

    put_i16(&mut out, 0);
    put_i32(&mut out, 0);
    put_zero_bytes(&mut out, 6);
    if wide {
        put_i64(&mut out, plan.row_count as i64);
        put_zero_bytes(&mut out, 10);
    } else {
        put_u32(&mut out, 0);
        put_i16(&mut out, 0);
        put_i32(&mut out, 0);
        put_zero_bytes(&mut out, 8);
    }
    put_i16(&mut out, 256); // dataoffset
    put_zero_bytes(&mut out, 8);
    if wide {
        put_u32(&mut out, 0);
    }

    out
}

/// Column-size subheader (pointer index 1).
pub(super) fn column_size(plan: &Plan) -> Vec<u8> {
    let mut out = Vec::new();
    put_signature(&mut out, plan.wide, 0xF6F6_F6F6, 0x0000_0000);
    put_word(&mut out, plan.wide, plan.k() as i64);
    put_word(&mut out, plan.wide, 0);
    out
}

/// Signature location subheader (pointer index 2).
pub(super) fn signature_locations(plan: &Plan) -> Vec<u8> {
    let wide = plan.wide;
    let mut out = Vec::new();
    put_signature(&mut out, wide, 0xFFFF_FC00, 0xFFFF_FFFF);

    let names: usize = plan.columns.iter().map(|c| c.name.len()).sum();
    let formats: usize = plan.columns.iter().map(|c| c.format.len()).sum();
    put_word(&mut out, wide, (plan.names_base() as usize + names + formats) as i64);
    put_word(&mut out, wide, if wide { 3 + i64::from(plan.k() > 1) } else { 0 });

    put_i16(&mut out, 7); // populated entries

    let opaque = if wide { 94 } else { 50 };
    put_zero_bytes(&mut out, opaque - 8);
    put_zero_bytes(&mut out, 8);

    for (signature, first, first_pos, last, last_pos) in SIGNATURE_LOCATIONS {
        put_word(&mut out, wide, signature);
        put_word(&mut out, wide, first);
        put_i16(&mut out, first_pos);
        put_zero_bytes(&mut out, if wide { 6 } else { 2 });
        put_word(&mut out, wide, last);
        put_i16(&mut out, last_pos);
        put_zero_bytes(&mut out, if wide { 6 } else { 2 });
    }

    out
}

/// Column-text subheader (pointer index 3): the pool chunk.
pub(super) fn column_text(plan: &Plan) -> Vec<u8> {
    let mut out = Vec::new();
    put_signature(&mut out, plan.wide, 0xFFFF_FFFD, 0xFFFF_FFFF);

    let text_len = plan.pool_text_len();
    let mut declared = 6 + 16 + 8 + text_len as i16 + 2;
    if plan.k() > 1 {
        declared += 4;
    }
    put_i16(&mut out, declared);
    put_zero_bytes(&mut out, 6);

    put_i16(&mut out, 0);
    put_i16(&mut out, TEXT_PREAMBLE_MARKER);

    // Compression slot: sixteen blanks mean "uncompressed".
    out.extend_from_slice(&[b' '; 16]);
    put_fixed(&mut out, b"DATASTEP", 8);

    for col in &plan.columns {
        out.extend_from_slice(&col.name);
        out.extend_from_slice(&col.label);
        out.extend_from_slice(&col.format);
    }

    put_zero_bytes(&mut out, 12);
    out
}

/// Column-name subheader (pointer index 4).
pub(super) fn column_names(plan: &Plan) -> Vec<u8> {
    let mut out = Vec::new();
    put_signature(&mut out, plan.wide, 0xFFFF_FFFF, 0xFFFF_FFFF);

    put_i16(&mut out, (plan.k() * 8 + 8) as i16);
    put_zero_bytes(&mut out, 6);

    for idx in 0..plan.k() {
        let (name_off, _, _) = plan.pool_offsets(idx);
        put_u16(&mut out, 0); // pool chunk
        put_u16(&mut out, name_off);
        put_u16(&mut out, plan.columns[idx].name_len);
        put_u16(&mut out, 0);
    }

    put_f64(&mut out, 0.0);
    put_zero_bytes(&mut out, 4);
    out
}

/// Column-attribute subheader (pointer index 5).
pub(super) fn column_attrs(plan: &Plan) -> Vec<u8> {
    let wide = plan.wide;
    let mut out = Vec::new();
    put_signature(&mut out, wide, 0xFFFF_FFFC, 0xFFFF_FFFF);

    let entry = if wide { 16 } else { 12 };
    put_i16(&mut out, (plan.k() * entry + 8) as i16);
    put_zero_bytes(&mut out, 6);

    let mut offset = 0i64;
    for col in &plan.columns {
        put_word(&mut out, wide, offset);
        put_u32(&mut out, col.width);
        put_u16(&mut out, ATTR_NAME_FLAG);
        out.push(col.kind.type_code());
        out.push(0);
        offset += i64::from(col.width);
    }

    put_zero_bytes(&mut out, 12);
    out
}

/// Column-list subheader (pointer index 6, only written when `k > 1`).
pub(super) fn column_list(plan: &Plan) -> Vec<u8> {
    let wide = plan.wide;
    let k = plan.k() as i16;
    let mut out = Vec::new();
    put_signature(&mut out, wide, 0xFFFF_FFFE, 0xFFFF_FFFF);

    put_i32(&mut out, COLUMN_LIST_MARKER);
    put_u16(&mut out, 0);
    put_u16(&mut out, 0);

    let remaining = 14 + i64::from(k) * 2 + 8 + 12;
    put_word(&mut out, wide, remaining);

    put_i16(&mut out, k);
    put_i16(&mut out, k); // entry count
    put_i16(&mut out, 1);
    put_i16(&mut out, k);
    put_zero_bytes(&mut out, 6);

    put_i16(&mut out, -1);
    put_i16(&mut out, k);
    put_i16(&mut out, 0);
    put_i16(&mut out, 0);

    put_f64(&mut out, 0.0);
    put_u16(&mut out, 0);
    out
}

/// Format/label subheader for one column (reverse-indexed after the list).
pub(super) fn format_label(plan: &Plan, idx: usize) -> Vec<u8> {
    let wide = plan.wide;
    let col = &plan.columns[idx];
    let mut out = Vec::new();
    put_signature(&mut out, wide, 0xFFFF_FBFE, 0xFFFF_FFFF);

    put_zero_bytes(&mut out, 8);

    let (format_major, format_minor, key_major, key_minor) = match col.kind {
        VariableKind::Numeric => (col.display_width, col.decimals, 0, 0),
        VariableKind::Character => (0, 0, col.display_width, col.decimals),
    };
    put_i16(&mut out, format_major);
    put_i16(&mut out, format_minor);
    put_i16(&mut out, 0); // informat width
    put_i16(&mut out, 0); // informat decimals
    put_i16(&mut out, key_major);
    put_i16(&mut out, key_minor);

    put_zero_bytes(&mut out, 10);
    if wide {
        put_zero_bytes(&mut out, 8);
    }

    let (_, label_off, format_off) = plan.pool_offsets(idx);

    put_u16(&mut out, 0);
    put_u16(&mut out, if col.format_len == 0 { 0 } else { format_off });
    put_u16(&mut out, col.format_len);

    put_u16(&mut out, 0);
    put_u16(&mut out, if col.label_len == 0 { 0 } else { label_off });
    put_u16(&mut out, col.label_len);

    put_zero_bytes(&mut out, 6);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan(wide: bool) -> Plan {
        Plan {
            wide,
            columns: vec![
                PlannedColumn {
                    name: b"x\0\0\0".to_vec(),
                    name_len: 1,
                    label: Vec::new(),
                    label_len: 0,
                    format: Vec::new(),
                    format_len: 0,
                    kind: VariableKind::Numeric,
                    width: 8,
                    display_width: 8,
                    decimals: 0,
                },
                PlannedColumn {
                    name: b"name\0\0\0\0".to_vec(),
                    name_len: 4,
                    label: b"lab\0".to_vec(),
                    label_len: 3,
                    format: b"$CHAR\0\0\0".to_vec(),
                    format_len: 5,
                    kind: VariableKind::Character,
                    width: 4,
                    display_width: 4,
                    decimals: 0,
                },
            ],
            row_length: 12,
            row_count: 3,
            page_size: 65536,
            page_count: 1,
            rows_on_page1: 3,
            block_count1: 12,
        }
    }

    #[test]
    fn subheader_sizes_match_the_fixed_layouts() {
        let wide = plan(true);
        assert_eq!(row_size(&wide).len(), 808);
        assert_eq!(column_size(&wide).len(), 24);
        assert_eq!(signature_locations(&wide).len(), 600);
        assert_eq!(column_names(&wide).len(), 28 + 2 * 8);
        assert_eq!(column_attrs(&wide).len(), 28 + 2 * 16);
        assert_eq!(format_label(&wide, 0).len(), 64);

        let narrow = plan(false);
        assert_eq!(row_size(&narrow).len(), 476);
        assert_eq!(column_size(&narrow).len(), 12);
        assert_eq!(signature_locations(&narrow).len(), 304);
        assert_eq!(column_names(&narrow).len(), 24 + 2 * 8);
        assert_eq!(column_attrs(&narrow).len(), 24 + 2 * 12);
        assert_eq!(format_label(&narrow, 0).len(), 52);
    }

    #[test]
    fn text_subheader_places_names_at_declared_offsets() {
        let plan = plan(true);
        let text = column_text(&plan);
        // Signature is 8 bytes; pool offsets are relative to its end.
        let (name0, _, _) = plan.pool_offsets(0);
        assert_eq!(name0, 36);
        assert_eq!(&text[8 + 36..8 + 37], b"x");
        let (name1, label1, format1) = plan.pool_offsets(1);
        assert_eq!(&text[8 + name1 as usize..8 + name1 as usize + 4], b"name");
        assert_eq!(&text[8 + label1 as usize..8 + label1 as usize + 3], b"lab");
        assert_eq!(
            &text[8 + format1 as usize..8 + format1 as usize + 5],
            b"$CHAR"
        );
    }
}
