//! Snapshot source for gzip-compressed, XML-serialized datasets.
//!
//! The watched export is written by another process as a gzipped XML
//! document of the shape
//!
//! ```xml
//! <Dataset>
//!   <BetHistory>
//!     <BetId>1.23</BetId>
//!     <Status>Matched</Status>
//!   </BetHistory>
//! </Dataset>
//! ```
//!
//! where each depth-2 element is one row of the table named by its tag.
//! The first table encountered is authoritative; rows belonging to any
//! other table are ignored. A document with no rows at all decodes to
//! [`Snapshot::empty()`], which is how a brand-new export looks.

use super::{Row, Snapshot, SnapshotError, SnapshotSource};
use flate2::read::GzDecoder;
use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Loads snapshots from a gzipped XML file on disk.
///
/// The exporting process may be rewriting the file concurrently; every
/// `load` opens, decompresses and parses it from scratch.
pub struct GzipXmlSource {
    path: PathBuf,
}

impl GzipXmlSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_decompressed(&self) -> Result<String, SnapshotError> {
        let file = File::open(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SnapshotError::Missing(self.path.display().to_string())
            } else {
                SnapshotError::Corrupt(e.to_string())
            }
        })?;

        let mut decoder = GzDecoder::new(file);
        let mut xml = String::new();
        decoder
            .read_to_string(&mut xml)
            .map_err(|e| SnapshotError::Corrupt(e.to_string()))?;
        Ok(xml)
    }
}

impl SnapshotSource for GzipXmlSource {
    fn load(&self) -> Result<Snapshot, SnapshotError> {
        let xml = self.read_decompressed()?;
        parse_dataset(&xml)
    }
}

/// Parse an XML-serialized dataset, keeping only the first table.
pub(crate) fn parse_dataset(xml: &str) -> Result<Snapshot, SnapshotError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut columns: Vec<String> = Vec::new();
    let mut rows: Vec<Row> = Vec::new();
    let mut table_name: Option<String> = None;

    let mut depth = 0usize;
    let mut row_tag = String::new();
    let mut cells: Vec<(String, String)> = Vec::new();
    let mut cell_name = String::new();
    let mut cell_text = String::new();

    loop {
        let event = reader
            .read_event()
            .map_err(|e| SnapshotError::Malformed(e.to_string()))?;
        match event {
            Event::Start(start) => {
                depth += 1;
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                match depth {
                    2 => {
                        row_tag = name;
                        cells.clear();
                    }
                    3 => {
                        cell_name = name;
                        cell_text.clear();
                    }
                    _ => {}
                }
            }
            Event::Empty(start) => {
                // Self-closed cell, e.g. <Status />: present but empty.
                if depth == 2 {
                    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                    cells.push((name, String::new()));
                }
            }
            Event::Text(text) => {
                if depth == 3 {
                    let value = text
                        .unescape()
                        .map_err(|e| SnapshotError::Malformed(e.to_string()))?;
                    cell_text.push_str(&value);
                }
            }
            Event::End(_) => {
                match depth {
                    3 => {
                        cells.push((std::mem::take(&mut cell_name), std::mem::take(&mut cell_text)));
                    }
                    2 => {
                        let table = table_name.get_or_insert_with(|| row_tag.clone());
                        if *table == row_tag {
                            let mut row = Row::new();
                            for (name, value) in cells.drain(..) {
                                record_column(&mut columns, &name);
                                row.set(name, value);
                            }
                            rows.push(row);
                        }
                    }
                    _ => {}
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(Snapshot::new(columns, rows))
}

fn record_column(columns: &mut Vec<String>, name: &str) {
    if !columns.iter().any(|c| c == name) {
        columns.push(name.to_owned());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    fn write_gz(path: &Path, content: &[u8]) {
        let file = File::create(path).unwrap();
        let mut encoder = GzEncoder::new(file, Compression::default());
        encoder.write_all(content).unwrap();
        encoder.finish().unwrap();
    }

    #[test]
    fn missing_file_is_reported_as_missing() {
        let source = GzipXmlSource::new("/nonexistent/bets.gz");
        assert!(matches!(source.load(), Err(SnapshotError::Missing(_))));
    }

    #[test]
    fn uncompressed_file_is_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bets.gz");
        std::fs::write(&path, "<Dataset></Dataset>").unwrap();

        let source = GzipXmlSource::new(&path);
        assert!(matches!(source.load(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn compressed_garbage_is_reported_as_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bets.gz");
        write_gz(&path, b"<Dataset><Unclosed></Dataset>");

        let source = GzipXmlSource::new(&path);
        assert!(matches!(source.load(), Err(SnapshotError::Malformed(_))));
    }

    #[test]
    fn empty_document_decodes_to_empty_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bets.gz");
        write_gz(&path, b"<Dataset></Dataset>");

        let snapshot = GzipXmlSource::new(&path).load().unwrap();
        assert!(snapshot.is_empty());
    }

    #[test]
    fn rows_of_the_first_table_are_parsed() {
        let xml = b"<Dataset>\
            <BetHistory><BetId>1</BetId><Status>Matched</Status></BetHistory>\
            <BetHistory><BetId>2</BetId><Status/></BetHistory>\
            <Audit><Who>ignored</Who></Audit>\
        </Dataset>";
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bets.gz");
        write_gz(&path, xml);

        let snapshot = GzipXmlSource::new(&path).load().unwrap();
        assert_eq!(snapshot.rows.len(), 2);
        assert_eq!(snapshot.columns, vec!["BetId".to_owned(), "Status".to_owned()]);
        assert_eq!(snapshot.rows[0].value("Status"), "Matched");
        assert_eq!(snapshot.rows[1].value("Status"), "");
        assert!(!snapshot.has_column("Who"));
    }
}
