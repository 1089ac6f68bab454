pub(crate) mod byteorder;
pub(crate) mod column;
pub(crate) mod compression;
pub(crate) mod encoding;
pub(crate) mod header;
pub(crate) mod meta;
pub(crate) mod page;
pub(crate) mod rows;
pub(crate) mod rowsize;
pub(crate) mod subheader;

pub use byteorder::{ByteReader, read_i16, read_u16, read_u32, read_u64, truncated_f64_bits};
pub use column::{TextRef, TextStore};
pub use compression::{CodecError, decompress_rdc, decompress_rle};
pub use encoding::{lookup_encoding, resolve_encoding};
pub use header::{SasHeader, parse_header};
pub use meta::{PageInfo, ParsedMetadata, parse_metadata};
pub use rows::decode_text;
pub use rowsize::{RowSizeInfo, SubheaderLocation};
pub use subheader::{SubheaderKind, classify};
