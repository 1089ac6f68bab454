use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use crate::error::{Error, Result};
use crate::frame::SasFrame;
use crate::logger::{log_warn, set_debug};
use crate::parser::meta::{ParsedMetadata, parse_metadata};
use crate::parser::rows::{Selection, decode_rows};

/// Configures a read: debug tracing, a 1-based inclusive row window, a
/// column-name selection, and an optional interrupt flag polled once per
/// page.
#[derive(Debug, Clone, Default)]
pub struct ReadOptions {
    debug: bool,
    row_range: Option<(u64, u64)>,
    columns: Option<Vec<String>>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl ReadOptions {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            debug: false,
            row_range: None,
            columns: None,
            interrupt: None,
        }
    }

    #[must_use]
    pub const fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Selects rows `min..=max`, 1-based; the window is clamped to the
    /// dataset's row count.
    #[must_use]
    pub const fn with_row_range(mut self, min: u64, max: u64) -> Self {
        self.row_range = Some((min, max));
        self
    }

    #[must_use]
    pub fn with_columns<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let collected: Vec<String> = names.into_iter().map(Into::into).collect();
        self.columns = if collected.is_empty() {
            None
        } else {
            Some(collected)
        };
        self
    }

    /// Installs a flag the reader polls at every page boundary; raising it
    /// aborts the read with [`Error::Interrupted`].
    #[must_use]
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    fn selection(&self, meta: &ParsedMetadata) -> Selection {
        let row_count = meta.row_size.row_count;
        let (mut row_min, mut row_max) = self.row_range.unwrap_or((1, row_count));
        if row_min == 0 {
            row_min = 1;
        }
        row_max = row_max.min(row_count);

        let columns = self.columns.as_ref().map_or_else(
            || (0..meta.columns.len()).map(Some).collect::<Vec<_>>(),
            |wanted| {
                for name in wanted {
                    if !meta
                        .columns
                        .iter()
                        .any(|col| col.name.trim_end() == name.trim_end())
                    {
                        log_warn(&format!("selected column {name:?} is not in the dataset"));
                    }
                }
                let mut next_slot = 0usize;
                meta.columns
                    .iter()
                    .map(|col| {
                        let selected = wanted
                            .iter()
                            .any(|name| col.name.trim_end() == name.trim_end());
                        selected.then(|| {
                            let slot = next_slot;
                            next_slot += 1;
                            slot
                        })
                    })
                    .collect()
            },
        );
        let output_count = columns.iter().flatten().count();

        Selection {
            row_min,
            row_max,
            columns,
            output_count,
        }
    }
}

/// Streaming handle over a SAS7BDAT source.
pub struct SasReader<R> {
    input: R,
}

impl SasReader<File> {
    /// Opens a dataset from disk.
    ///
    /// # Errors
    ///
    /// `OpenFailed` when the file cannot be opened or is empty.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| Error::OpenFailed {
            path: path.to_path_buf(),
            details: err.to_string().into(),
        })?;
        let len = file
            .metadata()
            .map_err(|err| Error::OpenFailed {
                path: path.to_path_buf(),
                details: err.to_string().into(),
            })?
            .len();
        if len == 0 {
            return Err(Error::OpenFailed {
                path: path.to_path_buf(),
                details: "file is empty".into(),
            });
        }
        Ok(Self { input: file })
    }
}

impl<R: Read + Seek> SasReader<R> {
    /// Wraps any seekable byte source.
    pub const fn from_reader(input: R) -> Self {
        Self { input }
    }

    /// Parses header and metadata pages without touching row data.
    ///
    /// # Errors
    ///
    /// See [`parse_metadata`].
    pub fn metadata(&mut self, options: &ReadOptions) -> Result<ParsedMetadata> {
        set_debug(options.debug);
        self.input.rewind()?;
        parse_metadata(&mut self.input, options.interrupt.as_deref())
    }

    /// Reads the selected window of the dataset into a frame.
    ///
    /// # Errors
    ///
    /// Fatal conditions per the error taxonomy; recoverable conditions are
    /// logged and the read continues.
    pub fn read(&mut self, options: &ReadOptions) -> Result<SasFrame> {
        let meta = self.metadata(options)?;
        let selection = options.selection(&meta);
        decode_rows(&mut self.input, &meta, &selection)
    }

    /// Releases the underlying source.
    pub fn into_inner(self) -> R {
        self.input
    }
}

/// One-shot convenience: open, read, close.
///
/// # Errors
///
/// See [`SasReader::read`].
pub fn read_sas7bdat<P: AsRef<Path>>(path: P, options: &ReadOptions) -> Result<SasFrame> {
    SasReader::open(path)?.read(options)
}
