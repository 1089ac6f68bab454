use std::io::{Read, Seek};

use crate::error::{Error, Result};
use crate::logger::{log_debug, log_warn};
use crate::metadata::{Endianness, FileAttributes};
use crate::parser::byteorder::ByteReader;
use crate::parser::encoding::{lookup_encoding, trim_trailing};

/// The 32-byte magic sequence; the first word of real files is zero.
pub const MAGIC: [u8; 32] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC2, 0xEA, 0x81, 0x60,
    0xB3, 0x14, 0x11, 0xCF, 0xBD, 0x92, 0x08, 0x00, 0x09, 0xC7, 0x31, 0x8C, 0x18, 0x1F, 0x10, 0x11,
];

/// Alignment-checker byte value (`b'3'`) marking the wide layout.
const ALIGN_CHECKER_WIDE: u8 = 51;
const ENDIAN_BIG: u8 = 0;
const ENDIAN_LITTLE: u8 = 1;

/// Parsed header block plus the layout constants everything downstream uses.
#[derive(Debug, Clone)]
pub struct SasHeader {
    pub endianness: Endianness,
    /// True for the 64-bit layout (8-byte pointer words).
    pub uses_u64: bool,
    /// Extra 4-byte pad after `filetype` when the second checker matched.
    pub align2_pad: u32,
    /// 49 unix, 50 windows; other values observed but unmapped.
    pub platform: u8,
    pub header_size: u32,
    pub page_size: u32,
    pub page_count: u64,
    pub page_seq: u32,
    pub attributes: FileAttributes,
}

impl SasHeader {
    /// Pointer-word alignment: 8 under the 64-bit layout, else 4.
    #[must_use]
    pub const fn alignval(&self) -> u64 {
        if self.uses_u64 { 8 } else { 4 }
    }

    /// Length of the page header before `PAGE_TYPE`, excluding the fixed
    /// 8-byte tail.
    #[must_use]
    pub const fn page_bit_offset(&self) -> u64 {
        if self.uses_u64 { 32 } else { 16 }
    }

    #[must_use]
    pub const fn subheader_pointer_length(&self) -> u64 {
        if self.uses_u64 { 24 } else { 12 }
    }

    /// File offset of page `pg`.
    #[must_use]
    pub const fn page_base(&self, pg: u64) -> u64 {
        self.header_size as u64 + pg * self.page_size as u64
    }
}

fn padded_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(trim_trailing(bytes)).into_owned()
}

/// Parses the leading header block (C4) and leaves the cursor at the first
/// page.
///
/// # Errors
///
/// Fatal on I/O failures, truncation, and a zero header or page size;
/// magic-number deviations and non-zero trailing bytes only warn.
pub fn parse_header<R: Read + Seek>(input: &mut R) -> Result<SasHeader> {
    let mut prefix = [0u8; 40];
    input
        .read_exact(&mut prefix)
        .map_err(|err| Error::from_io_at(err, 0))?;

    if prefix[..4] != [0, 0, 0, 0] {
        log_warn("magic number: first word is not zero");
    }
    if prefix[4..32] != MAGIC[4..32] {
        log_warn("magic number mismatch; attempting to continue");
    }

    let uses_u64 = prefix[32] == ALIGN_CHECKER_WIDE;
    let align2_pad = if prefix[35] == ALIGN_CHECKER_WIDE { 4 } else { 0 };
    let endianness = match prefix[37] {
        ENDIAN_BIG => Endianness::Big,
        ENDIAN_LITTLE => Endianness::Little,
        other => {
            log_warn(&format!("unexpected endianness byte {other}; assuming little"));
            Endianness::Little
        }
    };
    let platform = prefix[39];

    let mut reader = ByteReader::with_base(input, endianness, 40);

    // Unknown blocks up to the encoding byte at offset 70.
    reader.skip(30)?;
    let encoding_code = reader.read_u8()?;
    let encoding = lookup_encoding(encoding_code).map_or_else(
        || {
            log_warn(&format!("unknown character-set code {encoding_code}"));
            String::new()
        },
        str::to_owned,
    );
    reader.skip(13)?;

    let sasfile = padded_string(&reader.read_string(8)?);
    let dataset = padded_string(&reader.read_string(64)?);
    let filetype = padded_string(&reader.read_string(8)?);

    if align2_pad == 4 {
        reader.skip(4)?;
    }

    let created = reader.read_f64()?;
    let modified = reader.read_f64()?;
    let created2 = reader.read_f64()?;
    let modified2 = reader.read_f64()?;

    let header_size_pos = reader.position();
    let header_size = reader.read_u32()?;
    let page_size = reader.read_u32()?;
    if header_size == 0 {
        return Err(Error::HeaderUnreasonable {
            details: "header size is zero".into(),
            offset: header_size_pos,
        });
    }
    if page_size == 0 {
        return Err(Error::HeaderUnreasonable {
            details: "page size is zero".into(),
            offset: header_size_pos + 4,
        });
    }

    let page_count = reader.read_word(uses_u64)?;

    reader.read_f64()?; // pad

    let sasrel = padded_string(&reader.read_string(8)?);
    let sasserv = padded_string(&reader.read_string(16)?);
    let osver = padded_string(&reader.read_string(16)?);
    let osmaker = padded_string(&reader.read_string(16)?);
    let osname = padded_string(&reader.read_string(16)?);

    for _ in 0..4 {
        let _unknown = reader.read_u32()?;
    }
    reader.read_f64()?; // pad
    reader.read_f64()?; // pad

    let page_seq = reader.read_u32()?;
    let _pad = reader.read_u32()?;
    let third_timestamp = reader.read_f64()?;

    // The remainder of the header block is zero-filled; deviations are worth
    // a trace line but nothing more.
    let pos = reader.position();
    if pos > u64::from(header_size) {
        return Err(Error::HeaderUnreasonable {
            details: "declared header size smaller than the fixed header fields".into(),
            offset: pos,
        });
    }
    let mut trailing = u64::from(header_size) - pos;
    let mut nonzero = 0u64;
    let mut scratch = [0u8; 512];
    while trailing > 0 {
        let step = trailing.min(scratch.len() as u64) as usize;
        reader.read_into(&mut scratch[..step])?;
        nonzero += scratch[..step].iter().filter(|b| **b != 0).count() as u64;
        trailing -= step as u64;
    }
    if nonzero > 0 {
        log_debug(&format!("{nonzero} non-zero bytes in header padding"));
    }

    let attributes = FileAttributes {
        sasfile,
        dataset,
        filetype,
        created,
        modified,
        created2,
        modified2,
        third_timestamp,
        sasrel,
        sasserv,
        osver,
        osmaker,
        osname,
        encoding,
        header_size,
        page_size,
        page_count,
        ..FileAttributes::default()
    };

    Ok(SasHeader {
        endianness,
        uses_u64,
        align2_pad,
        platform,
        header_size,
        page_size,
        page_count,
        page_seq,
        attributes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Builds the smallest plausible 1024-byte little-endian 32-bit header.
    fn synthetic_header(endianness: Endianness) -> Vec<u8> {
        let big = endianness == Endianness::Big;
        let mut buf = vec![0u8; 1024];
        buf[..32].copy_from_slice(&MAGIC);
        buf[32] = 34; // narrow layout
        buf[35] = 34;
        buf[37] = u8::from(!big);
        buf[39] = 49;
        buf[70] = 20; // UTF-8
        buf[84..92].copy_from_slice(b"SAS FILE");
        buf[92..96].copy_from_slice(b"TEST");
        buf[156..160].copy_from_slice(b"DATA");

        let put_u32 = |buf: &mut Vec<u8>, at: usize, value: u32| {
            let bytes = if big {
                value.to_be_bytes()
            } else {
                value.to_le_bytes()
            };
            buf[at..at + 4].copy_from_slice(&bytes);
        };
        let put_f64 = |buf: &mut Vec<u8>, at: usize, value: f64| {
            let bytes = if big {
                value.to_bits().to_be_bytes()
            } else {
                value.to_bits().to_le_bytes()
            };
            buf[at..at + 8].copy_from_slice(&bytes);
        };

        // No align2 pad: timestamps start right after filetype at 164.
        put_f64(&mut buf, 164, 86_400.0); // created
        put_f64(&mut buf, 172, 86_401.0); // modified
        put_u32(&mut buf, 196, 1024); // headersize
        put_u32(&mut buf, 200, 4096); // pagesize
        put_u32(&mut buf, 204, 0); // pagecount
        buf[216..220].copy_from_slice(b"9.04");
        buf
    }

    #[test]
    fn parses_little_endian_narrow_header() {
        let buf = synthetic_header(Endianness::Little);
        let header = parse_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(header.endianness, Endianness::Little);
        assert!(!header.uses_u64);
        assert_eq!(header.alignval(), 4);
        assert_eq!(header.page_bit_offset(), 16);
        assert_eq!(header.subheader_pointer_length(), 12);
        assert_eq!(header.header_size, 1024);
        assert_eq!(header.page_size, 4096);
        assert_eq!(header.attributes.sasfile, "SAS FILE");
        assert_eq!(header.attributes.dataset, "TEST");
        assert_eq!(header.attributes.filetype, "DATA");
        assert_eq!(header.attributes.encoding, "UTF-8");
        assert!((header.attributes.created - 86_400.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_big_endian_header_identically() {
        let buf = synthetic_header(Endianness::Big);
        let header = parse_header(&mut Cursor::new(buf)).unwrap();
        assert_eq!(header.endianness, Endianness::Big);
        assert_eq!(header.page_size, 4096);
        assert!((header.attributes.modified - 86_401.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_page_size_is_fatal() {
        let mut buf = synthetic_header(Endianness::Little);
        buf[200..204].copy_from_slice(&0u32.to_le_bytes());
        let err = parse_header(&mut Cursor::new(buf)).unwrap_err();
        assert!(matches!(err, Error::HeaderUnreasonable { .. }));
    }
}
