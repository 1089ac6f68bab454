//! Reader and writer for the SAS7BDAT on-disk tabular format.
//!
//! [`read_sas7bdat`] yields the rectangular dataset, per-column metadata,
//! file-level attributes and the per-row deletion mask; [`write_sas7bdat`]
//! emits a minimally valid file from a frame (uncompressed, numeric and
//! character columns only). Both native row-compression codecs (`SASYZCRL`
//! and `SASYZCR2`) are decoded transparently.

pub mod api;
pub mod error;
pub mod frame;
pub mod logger;
pub mod metadata;
pub mod parser;
pub mod writer;

pub use api::{ReadOptions, SasReader, read_sas7bdat};
pub use error::{Error, Result};
pub use frame::{Column, ColumnValues, SasFrame};
pub use metadata::{ColumnMeta, Compression, Endianness, FileAttributes, VariableKind};
pub use writer::{WriteOptions, write_sas7bdat, write_sas7bdat_to};
