use std::convert::TryInto;
use std::io::{Read, Seek, SeekFrom};

use crate::error::{Error, Result};
use crate::metadata::Endianness;

#[inline]
#[must_use]
pub fn read_u16(endian: Endianness, bytes: &[u8]) -> u16 {
    match endian {
        Endianness::Little => u16::from_le_bytes([bytes[0], bytes[1]]),
        Endianness::Big => u16::from_be_bytes([bytes[0], bytes[1]]),
    }
}

#[inline]
#[must_use]
pub fn read_i16(endian: Endianness, bytes: &[u8]) -> i16 {
    match endian {
        Endianness::Little => i16::from_le_bytes([bytes[0], bytes[1]]),
        Endianness::Big => i16::from_be_bytes([bytes[0], bytes[1]]),
    }
}

/// Reads a `u32` from `bytes` using the provided `endian` ordering.
///
/// # Panics
///
/// Panics if `bytes` has fewer than four elements.
#[inline]
#[must_use]
pub fn read_u32(endian: Endianness, bytes: &[u8]) -> u32 {
    match endian {
        Endianness::Little => u32::from_le_bytes(bytes[0..4].try_into().unwrap()),
        Endianness::Big => u32::from_be_bytes(bytes[0..4].try_into().unwrap()),
    }
}

/// Reads a `u64` from `bytes` using the provided `endian` ordering.
///
/// # Panics
///
/// Panics if `bytes` has fewer than eight elements.
#[inline]
#[must_use]
pub fn read_u64(endian: Endianness, bytes: &[u8]) -> u64 {
    match endian {
        Endianness::Little => u64::from_le_bytes(bytes[0..8].try_into().unwrap()),
        Endianness::Big => u64::from_be_bytes(bytes[0..8].try_into().unwrap()),
    }
}

/// Interprets up to eight stored bytes as an IEEE-754 double.
///
/// SAS stores short numerics by dropping the least significant bytes, so the
/// stored bytes always occupy the high-order end of the logical 8-byte
/// record; the missing low-order bytes read as zero. For a little-endian
/// file the stored prefix is therefore the *tail* of the little-endian
/// record, for a big-endian file it is the *head* of the big-endian record.
#[inline]
#[must_use]
pub fn truncated_f64_bits(endian: Endianness, stored: &[u8]) -> u64 {
    debug_assert!(stored.len() <= 8);
    let mut record = [0u8; 8];
    match endian {
        Endianness::Little => {
            record[8 - stored.len()..].copy_from_slice(stored);
            u64::from_le_bytes(record)
        }
        Endianness::Big => {
            record[..stored.len()].copy_from_slice(stored);
            u64::from_be_bytes(record)
        }
    }
}

/// Position-tracking cursor over the raw file (or a scratch buffer) with
/// endianness-aware typed reads.
///
/// End-of-input maps to [`Error::Truncated`] carrying the absolute byte
/// offset; `base` shifts reported offsets when the cursor runs over an
/// in-memory slice carved out of a larger file.
pub struct ByteReader<R> {
    inner: R,
    endian: Endianness,
    pos: u64,
    base: u64,
}

impl<R: Read> ByteReader<R> {
    pub const fn new(inner: R, endian: Endianness) -> Self {
        Self {
            inner,
            endian,
            pos: 0,
            base: 0,
        }
    }

    /// Cursor over a buffer whose first byte sits at `base` in the file.
    pub const fn with_base(inner: R, endian: Endianness, base: u64) -> Self {
        Self {
            inner,
            endian,
            pos: 0,
            base,
        }
    }

    #[must_use]
    pub const fn endian(&self) -> Endianness {
        self.endian
    }

    /// Absolute offset of the cursor within the file.
    #[must_use]
    pub const fn position(&self) -> u64 {
        self.base + self.pos
    }

    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        self.inner
            .read_exact(buf)
            .map_err(|err| Error::from_io_at(err, self.position()))?;
        self.pos += buf.len() as u64;
        Ok(())
    }

    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.read_into(&mut buf)?;
        Ok(buf)
    }

    /// Reads `n` raw bytes with no transcoding; callers that semantically
    /// expect a trimmed name strip trailing `0x20`/`0x00` themselves.
    pub fn read_string(&mut self, n: usize) -> Result<Vec<u8>> {
        self.read_bytes(n)
    }

    pub fn skip(&mut self, n: u64) -> Result<()> {
        let mut remaining = n;
        let mut scratch = [0u8; 512];
        while remaining > 0 {
            let step = remaining.min(scratch.len() as u64) as usize;
            self.read_into(&mut scratch[..step])?;
            remaining -= step as u64;
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.read_into(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.read_into(&mut buf)?;
        Ok(read_u16(self.endian, &buf))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.read_into(&mut buf)?;
        Ok(read_i16(self.endian, &buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.read_into(&mut buf)?;
        Ok(read_u32(self.endian, &buf))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.read_into(&mut buf)?;
        Ok(read_u64(self.endian, &buf))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(self.read_u64()? as i64)
    }

    /// Reads one pointer word: 8 bytes under the 64-bit layout, otherwise a
    /// zero-extended 4-byte word.
    pub fn read_word(&mut self, uses_u64: bool) -> Result<u64> {
        if uses_u64 {
            self.read_u64()
        } else {
            self.read_u32().map(u64::from)
        }
    }

    /// Signed pointer word, sign-extended under the 32-bit layout.
    pub fn read_word_i64(&mut self, uses_u64: bool) -> Result<i64> {
        if uses_u64 {
            self.read_i64()
        } else {
            self.read_i32().map(i64::from)
        }
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Reads a numeric stored truncated to `width ∈ 1..=8` bytes: the
    /// stored bytes land in the high-order positions of an 8-byte record
    /// whose low-order bytes are zero.
    pub fn read_truncated_f64(&mut self, width: usize) -> Result<f64> {
        debug_assert!((1..=8).contains(&width));
        let mut stored = [0u8; 8];
        self.read_into(&mut stored[..width])?;
        Ok(f64::from_bits(truncated_f64_bits(
            self.endian,
            &stored[..width],
        )))
    }

    /// Bytes left before the end of the underlying buffer. Only meaningful
    /// for in-memory cursors created over a known-length slice.
    #[must_use]
    pub const fn consumed(&self) -> u64 {
        self.pos
    }
}

impl<R: Read + Seek> ByteReader<R> {
    /// Moves the cursor to an absolute file offset.
    pub fn seek_to(&mut self, offset: u64) -> Result<u64> {
        let pos = self
            .inner
            .seek(SeekFrom::Start(offset))
            .map_err(Error::Io)?;
        self.pos = pos - self.base;
        Ok(pos)
    }

    /// Total length of the underlying stream, cursor position preserved.
    pub fn stream_len(&mut self) -> Result<u64> {
        let here = self.base + self.pos;
        let end = self.inner.seek(SeekFrom::End(0)).map_err(Error::Io)?;
        self.inner
            .seek(SeekFrom::Start(here))
            .map_err(Error::Io)?;
        Ok(end)
    }
}
