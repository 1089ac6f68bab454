use serde::Serialize;

use crate::metadata::{ColumnMeta, FileAttributes, VariableKind};

/// Column storage for the decoded rectangle.
///
/// Numeric cells are `None` where the file stored a missing value (any NaN
/// pattern); character cells are right-trimmed of trailing spaces and NULs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ColumnValues {
    Numeric(Vec<Option<f64>>),
    Character(Vec<String>),
}

impl ColumnValues {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(values) => values.len(),
            Self::Character(values) => values.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub const fn kind(&self) -> VariableKind {
        match self {
            Self::Numeric(_) => VariableKind::Numeric,
            Self::Character(_) => VariableKind::Character,
        }
    }
}

/// One emitted column: its schema entry plus the materialised values.
#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub meta: ColumnMeta,
    pub values: ColumnValues,
}

/// The rectangular dataset a read produces and a write consumes.
///
/// `columns` holds the selected columns only; `attributes` always describes
/// the full schema. `deleted` and `valid` run over the emitted rows:
/// `deleted[i]` reflects the page deletion bitmaps, `valid[i]` is false only
/// when the file ended before row `i` could be decoded.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SasFrame {
    pub columns: Vec<Column>,
    pub attributes: FileAttributes,
    pub deleted: Vec<bool>,
    pub valid: Vec<bool>,
}

impl SasFrame {
    /// Number of emitted rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, |col| col.values.len())
    }

    /// Number of emitted columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Looks up an emitted column by (trimmed) name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|col| col.meta.name.trim_end() == name.trim_end())
    }

    /// Row labels 1..=n, mirroring the source convention.
    #[must_use]
    pub fn row_names(&self) -> Vec<u64> {
        (1..=self.row_count() as u64).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ColumnMeta;

    fn column(name: &str, values: ColumnValues) -> Column {
        Column {
            meta: ColumnMeta {
                name: name.to_owned(),
                label: String::new(),
                format: String::new(),
                kind: values.kind(),
                width: 8,
                offset: 0,
                display_width: 0,
                decimals: 0,
            },
            values,
        }
    }

    #[test]
    fn lookup_ignores_trailing_padding() {
        let frame = SasFrame {
            columns: vec![column("x ", ColumnValues::Numeric(vec![Some(1.0)]))],
            ..SasFrame::default()
        };
        assert!(frame.column("x").is_some());
        assert_eq!(frame.row_count(), 1);
        assert_eq!(frame.row_names(), vec![1]);
    }
}
