//! Tabular snapshot model.
//!
//! A [`Snapshot`] is a full point-in-time read of the watched export: an
//! ordered sequence of rows sharing one column set, every value a string.
//! [`SnapshotSource`] abstracts where snapshots come from; the production
//! implementation is [`GzipXmlSource`], tests use in-memory sources.

mod gzip_xml;

pub use gzip_xml::GzipXmlSource;

use std::collections::HashMap;
use thiserror::Error;

/// Errors surfaced while obtaining a snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot storage does not exist (yet).
    #[error("snapshot file not found: {0}")]
    Missing(String),

    /// The storage exists but the compressed stream is unreadable.
    #[error("snapshot compression is corrupt: {0}")]
    Corrupt(String),

    /// The decompressed payload is not well-formed markup.
    #[error("snapshot markup is malformed: {0}")]
    Malformed(String),
}

/// A single row: column name to string value.
///
/// Columns absent from a row read as the empty string, matching the
/// behavior of the exporting process which omits empty cells.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Row {
    values: HashMap<String, String>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value of `column`, or `""` when the row has no such cell.
    pub fn value(&self, column: &str) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }

    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        self.values.insert(column.into(), value.into());
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.values.contains_key(column)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.set(k, v);
        }
        row
    }
}

/// An immutable point-in-time read of the watched table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    /// Column names in first-seen order.
    pub columns: Vec<String>,
    /// Rows in document order.
    pub rows: Vec<Row>,
}

impl Snapshot {
    /// The snapshot of an absent or empty table.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Produces an immutable tabular snapshot on demand.
pub trait SnapshotSource: Send + Sync {
    fn load(&self) -> Result<Snapshot, SnapshotError>;
}
