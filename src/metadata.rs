use serde::Serialize;
use time::{Duration, OffsetDateTime};

/// Seconds between the SAS epoch (1960-01-01) and the Unix epoch.
const SAS_EPOCH_OFFSET_SECONDS: i64 = -3653 * 86_400;

/// Byte order declared in the file header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endianness {
    Little,
    Big,
}

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VariableKind {
    /// IEEE-754 double, possibly stored truncated to 3..=7 bytes.
    Numeric,
    /// Fixed-width byte string, right-padded with spaces.
    Character,
}

impl VariableKind {
    /// Maps the on-disk column type code (1 numeric, 2 character).
    #[must_use]
    pub const fn from_type_code(code: u8) -> Option<Self> {
        match code {
            1 => Some(Self::Numeric),
            2 => Some(Self::Character),
            _ => None,
        }
    }

    #[must_use]
    pub const fn type_code(self) -> u8 {
        match self {
            Self::Numeric => 1,
            Self::Character => 2,
        }
    }
}

/// Row-compression flavour declared in the row-size subheader's text ref.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Compression {
    None,
    /// `SASYZCRL` run-length codec.
    Rle,
    /// `SASYZCR2` control-word/back-reference codec.
    Rdc,
    /// A flavour this reader does not decode; rows are skipped.
    Unknown,
}

impl Compression {
    #[must_use]
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "" => Self::None,
            "SASYZCRL" => Self::Rle,
            "SASYZCR2" => Self::Rdc,
            _ => Self::Unknown,
        }
    }
}

/// Per-column schema entry assembled from the metadata subheaders.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnMeta {
    pub name: String,
    pub label: String,
    pub format: String,
    pub kind: VariableKind,
    /// Storage width in bytes within a row.
    pub width: u32,
    /// Byte offset of the column within a row.
    pub offset: u64,
    /// Format display width (the `fmt32`/`fmtkey` major part).
    pub display_width: u16,
    /// Format decimal count (the minor part).
    pub decimals: u16,
}

/// File-level attributes carried alongside the decoded rectangle.
///
/// Timestamp fields hold raw seconds since the SAS epoch exactly as stored;
/// use [`FileAttributes::created_at`] and friends for calendar values. The
/// third timestamp's meaning is unconfirmed and is carried verbatim.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FileAttributes {
    pub sasfile: String,
    pub dataset: String,
    pub filetype: String,

    pub created: f64,
    pub modified: f64,
    pub created2: f64,
    pub modified2: f64,
    pub third_timestamp: f64,

    pub sasrel: String,
    pub sasserv: String,
    pub osver: String,
    pub osmaker: String,
    pub osname: String,

    /// IANA name mapped from the header's encoding byte.
    pub encoding: String,
    /// Compression name exactly as stored in the text pool (may be empty).
    pub compression: String,
    /// The proc that produced the dataset, when recorded.
    pub proc: String,
    /// Auxiliary software string, when recorded.
    pub sw: String,

    pub row_count: u64,
    pub row_length: u64,
    pub deleted_rows: u64,
    pub header_size: u32,
    pub page_size: u32,
    pub page_count: u64,

    /// Full column-name list, also present when a column selection narrowed
    /// the emitted frame.
    pub varnames: Vec<String>,
    pub labels: Vec<String>,
    pub formats: Vec<String>,
    pub colwidth: Vec<u32>,
    pub vartyps: Vec<u8>,
    pub fmt32: Vec<f64>,
    pub ifmt32: Vec<f64>,
    pub fmtkeys: Vec<f64>,
    /// Auxiliary ordering vector from the column-list subheader, when present.
    pub column_list: Vec<i16>,

    /// `PAGE_TYPE` of every page, in file order.
    pub page_types: Vec<i16>,
    /// Page sequence numbers, in file order.
    pub page_seqnums: Vec<u32>,
}

impl FileAttributes {
    #[must_use]
    pub fn created_at(&self) -> Option<OffsetDateTime> {
        sas_seconds_to_datetime(self.created)
    }

    #[must_use]
    pub fn modified_at(&self) -> Option<OffsetDateTime> {
        sas_seconds_to_datetime(self.modified)
    }
}

/// Converts seconds since the SAS epoch into a calendar timestamp.
///
/// Returns `None` for NaN, infinities and out-of-range magnitudes.
#[must_use]
pub fn sas_seconds_to_datetime(seconds: f64) -> Option<OffsetDateTime> {
    let delta = Duration::checked_seconds_f64(seconds)?;
    let offset = Duration::seconds(SAS_EPOCH_OFFSET_SECONDS);
    let total = offset.checked_add(delta)?;
    OffsetDateTime::UNIX_EPOCH.checked_add(total)
}

/// Converts a calendar timestamp back into seconds since the SAS epoch.
#[must_use]
pub fn datetime_to_sas_seconds(moment: OffsetDateTime) -> f64 {
    let since_unix = moment - OffsetDateTime::UNIX_EPOCH;
    since_unix.as_seconds_f64() - SAS_EPOCH_OFFSET_SECONDS as f64
}
