//! Stateful change witness over a snapshot source.
//!
//! [`ChangeWitness`] holds the last-seen snapshot and, on every call to
//! [`differences`](ChangeWitness::differences), loads a fresh one, diffs it
//! against the cache and replaces the cache. The baseline is established at
//! construction, so the first call never reports pre-existing rows as new.

use crate::diff::{self, DiffError};
use crate::snapshot::{Row, Snapshot, SnapshotError, SnapshotSource};
use thiserror::Error;

/// Errors surfaced by [`ChangeWitness::differences`].
#[derive(Debug, Error)]
pub enum WitnessError {
    /// The snapshot could not be loaded; the cache is left untouched.
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),

    /// The snapshot lacks the configured key column.
    #[error(transparent)]
    Diff(#[from] DiffError),
}

/// Watches a [`SnapshotSource`] for row-level changes keyed by one column.
pub struct ChangeWitness<S: SnapshotSource> {
    source: S,
    key_column: String,
    cache: Snapshot,
}

impl<S: SnapshotSource> ChangeWitness<S> {
    /// Load the baseline snapshot and construct the witness.
    ///
    /// A source failure here propagates to the caller; deciding whether a
    /// cold-start failure is fatal belongs to process wiring. An absent or
    /// empty table is already mapped to [`Snapshot::empty`] by the source.
    pub fn new(source: S, key_column: impl Into<String>) -> Result<Self, SnapshotError> {
        let cache = source.load()?;
        Ok(Self {
            source,
            key_column: key_column.into(),
            cache,
        })
    }

    /// Rows that changed since the previous call.
    ///
    /// The cache is replaced unconditionally after a successful load, even
    /// when the diff is empty. No historical snapshots are retained.
    pub fn differences(&mut self) -> Result<Vec<Row>, WitnessError> {
        let current = self.source.load()?;
        let changed = diff::diff(&self.cache, &current, &self.key_column)?;
        self.cache = current;
        Ok(changed)
    }

    pub fn key_column(&self) -> &str {
        &self.key_column
    }
}
