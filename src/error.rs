use std::borrow::Cow;
use std::io;

/// Result type used across the SAS reader and writer.
pub type Result<T> = std::result::Result<T, Error>;

/// Fatal conditions surfaced by the reader and writer.
///
/// Recoverable conditions (magic-number mismatches, unknown subheader
/// signatures, short decompressed rows, unsupported compression flavours)
/// are reported through [`crate::logger`] instead and parsing continues.
/// Every variant raised while walking the file carries the byte offset at
/// which the condition was detected.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O failure while reading from or writing to the underlying stream.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The input file could not be opened or is empty.
    #[error("cannot open SAS file {path:?}: {details}")]
    OpenFailed {
        path: std::path::PathBuf,
        details: Cow<'static, str>,
    },

    /// Header declared a zero header or page size.
    #[error("unreasonable SAS header at offset {offset}: {details}")]
    HeaderUnreasonable {
        details: Cow<'static, str>,
        offset: u64,
    },

    /// The computed page base failed to advance between pages.
    #[error("page base did not advance at page {page} (offset {offset})")]
    NonMonotonicPage { page: u64, offset: u64 },

    /// A read reached past the end of the file.
    #[error("truncated SAS file: read past end of input at offset {offset}")]
    Truncated { offset: u64 },

    /// Metadata subheaders did not join into a usable schema.
    #[error("invalid SAS metadata: {details}")]
    InvalidMetadata { details: Cow<'static, str> },

    /// The caller's interrupt flag was raised at a page boundary.
    #[error("read interrupted at page {page}")]
    Interrupted { page: u64 },

    /// The writer was asked for something outside its profile.
    #[error("unsupported write request: {details}")]
    WriterUnsupported { details: Cow<'static, str> },
}

impl Error {
    pub(crate) const fn truncated(offset: u64) -> Self {
        Self::Truncated { offset }
    }

    pub(crate) fn invalid_metadata(details: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidMetadata {
            details: details.into(),
        }
    }

    pub(crate) fn writer_unsupported(details: impl Into<Cow<'static, str>>) -> Self {
        Self::WriterUnsupported {
            details: details.into(),
        }
    }

    /// Maps an I/O error raised at a known cursor position, turning
    /// end-of-file conditions into the `Truncated` taxonomy entry.
    pub(crate) fn from_io_at(err: io::Error, offset: u64) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated { offset }
        } else {
            Self::Io(err)
        }
    }
}
