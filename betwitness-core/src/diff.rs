//! Row-level snapshot differencing.
//!
//! Compares two snapshots by a configured key column and returns the rows
//! of the newer snapshot that are new or changed. Output depends only on
//! key matching and column equality, so a key-indexed lookup over the old
//! snapshot replaces the quadratic scan without changing the result.

use crate::snapshot::{Row, Snapshot};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by [`diff`]. These are programming errors, not runtime
/// conditions: a snapshot that carries rows must carry the key column.
#[derive(Debug, Error)]
pub enum DiffError {
    #[error("key column {0:?} missing from snapshot")]
    KeyColumnMissing(String),
}

/// Rows of `new` that are absent from `old` (by key) or differ from the
/// first key-matching row of `old` in at least one column.
///
/// Output order equals the row order of `new`. Duplicate keys within
/// `old` resolve to the first occurrence; the export is assumed to keep
/// keys unique and no diagnostic is emitted for violations.
pub fn diff(old: &Snapshot, new: &Snapshot, key_column: &str) -> Result<Vec<Row>, DiffError> {
    ensure_key_column(old, key_column)?;
    ensure_key_column(new, key_column)?;

    let mut by_key: HashMap<&str, &Row> = HashMap::with_capacity(old.rows.len());
    for row in &old.rows {
        by_key.entry(row.value(key_column)).or_insert(row);
    }

    let mut changed = Vec::new();
    for row in &new.rows {
        match by_key.get(row.value(key_column)) {
            Some(old_row) if rows_equal(old_row, row, &new.columns) => {}
            _ => changed.push(row.clone()),
        }
    }
    Ok(changed)
}

/// Column-wise string comparison, early exit on the first mismatch.
fn rows_equal(a: &Row, b: &Row, columns: &[String]) -> bool {
    columns.iter().all(|col| a.value(col) == b.value(col))
}

// An empty snapshot is vacuously comparable; a brand-new export file has
// no table and therefore no columns at all.
fn ensure_key_column(snapshot: &Snapshot, key_column: &str) -> Result<(), DiffError> {
    if snapshot.is_empty() || snapshot.has_column(key_column) {
        Ok(())
    } else {
        Err(DiffError::KeyColumnMissing(key_column.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(columns: &[&str], rows: &[&[(&str, &str)]]) -> Snapshot {
        Snapshot::new(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|cells| cells.iter().copied().collect::<Row>())
                .collect(),
        )
    }

    #[test]
    fn identical_snapshots_have_no_differences() {
        let a = snapshot(&["id", "col"], &[&[("id", "TheID"), ("col", "A")]]);
        let b = a.clone();
        assert!(diff(&a, &b, "id").unwrap().is_empty());
    }

    #[test]
    fn changed_column_yields_exactly_that_row() {
        let a = snapshot(&["id", "col"], &[&[("id", "TheID"), ("col", "A")]]);
        let b = snapshot(&["id", "col"], &[&[("id", "TheID"), ("col", "B")]]);
        let changed = diff(&a, &b, "id").unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].value("col"), "B");
    }

    #[test]
    fn unknown_key_yields_the_new_row() {
        let a = snapshot(&["id", "col"], &[&[("id", "one"), ("col", "A")]]);
        let b = snapshot(
            &["id", "col"],
            &[&[("id", "one"), ("col", "A")], &[("id", "two"), ("col", "A")]],
        );
        let changed = diff(&a, &b, "id").unwrap();
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].value("id"), "two");
    }

    #[test]
    fn output_preserves_new_snapshot_row_order() {
        let a = snapshot(&["id"], &[]);
        let b = snapshot(&["id"], &[&[("id", "3")], &[("id", "1")], &[("id", "2")]]);
        let changed = diff(&a, &b, "id").unwrap();
        let ids: Vec<&str> = changed.iter().map(|r| r.value("id")).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
    }

    #[test]
    fn duplicate_keys_in_old_resolve_to_first_occurrence() {
        let a = snapshot(
            &["id", "col"],
            &[&[("id", "dup"), ("col", "first")], &[("id", "dup"), ("col", "second")]],
        );
        let b = snapshot(&["id", "col"], &[&[("id", "dup"), ("col", "first")]]);
        assert!(diff(&a, &b, "id").unwrap().is_empty());

        let c = snapshot(&["id", "col"], &[&[("id", "dup"), ("col", "second")]]);
        assert_eq!(diff(&a, &c, "id").unwrap().len(), 1);
    }

    #[test]
    fn missing_key_column_is_an_error() {
        let a = snapshot(&["id"], &[&[("id", "1")]]);
        let b = snapshot(&["other"], &[&[("other", "1")]]);
        assert!(matches!(
            diff(&a, &b, "id"),
            Err(DiffError::KeyColumnMissing(_))
        ));
    }

    #[test]
    fn empty_snapshots_are_vacuously_comparable() {
        let empty = Snapshot::empty();
        let b = snapshot(&["id"], &[&[("id", "1")]]);
        assert_eq!(diff(&empty, &b, "id").unwrap().len(), 1);
        assert!(diff(&b, &empty, "id").unwrap().is_empty());
    }
}
