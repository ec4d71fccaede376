//! Event types for the producer/consumer fabric.
//!
//! Every event carries a string identifier derived from the emitting
//! producer's id (`<producer>.modified`, `<producer>.nochange`) and a
//! tagged payload. Consumers declare interest by identifier and dispatch
//! on the payload variant exhaustively.

use crate::snapshot::Row;
use thiserror::Error;

/// A row of the bet-history export mapped onto its fixed attribute set.
#[derive(Debug, Clone, PartialEq)]
pub struct BetRecord {
    pub bet_id: String,
    pub bet_type: String,
    /// Strategy label; may be empty, normalized at delivery time.
    pub strategy: String,
    pub name: String,
    pub price_requested: f64,
    pub average_price: f64,
    /// Free-text status from the export, normalized at delivery time.
    pub status: String,
    pub matched: f64,
    pub placed_at: String,
    /// Selection label, e.g. "Race 3. Horse Name".
    pub selection: String,
    pub start_time: String,
    /// Event category, e.g. "Horse Racing"; drives the accept predicate.
    pub event_type: String,
}

/// Errors converting a diff row into a [`BetRecord`].
#[derive(Debug, Error)]
pub enum RecordError {
    #[error("column {column:?} holds a non-numeric value {value:?}")]
    BadNumber { column: &'static str, value: String },
}

impl BetRecord {
    /// Map a diff row onto the fixed attribute set.
    ///
    /// Column names follow the export schema. Missing columns read as
    /// empty strings; the three numeric columns must parse.
    pub fn from_row(row: &Row) -> Result<Self, RecordError> {
        Ok(Self {
            bet_id: row.value("BetId").to_owned(),
            bet_type: row.value("BetType").to_owned(),
            strategy: row.value("StrategyName").to_owned(),
            name: row.value("Name").to_owned(),
            price_requested: parse_number(row, "PriceRequested")?,
            average_price: parse_number(row, "AvgPrice")?,
            status: row.value("Status").to_owned(),
            matched: parse_number(row, "Matched")?,
            placed_at: row.value("PlacedDate").to_owned(),
            selection: row.value("SelectionName").to_owned(),
            start_time: row.value("startTime").to_owned(),
            event_type: row.value("EventTypeName").to_owned(),
        })
    }
}

// The export writes "0" rather than omitting numeric cells, but a brand
// new column set may lack them entirely; treat absence as zero.
fn parse_number(row: &Row, column: &'static str) -> Result<f64, RecordError> {
    let raw = row.value(column);
    if raw.is_empty() {
        return Ok(0.0);
    }
    raw.parse().map_err(|_| RecordError::BadNumber {
        column,
        value: raw.to_owned(),
    })
}

/// Rotating session credentials extracted from the login handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionToken {
    pub session_id: String,
    pub csrf_token: String,
}

/// Static login credentials.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

/// Tagged event payload; consumers match on this exhaustively.
#[derive(Debug, Clone)]
pub enum EventPayload {
    Bet(BetRecord),
    Session(SessionToken),
    None,
}

/// A routed event: identifier plus payload.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: String,
    pub payload: EventPayload,
}

impl Event {
    /// A changed bet-history row, identified as `<producer>.modified`.
    pub fn bet_modified(producer_id: &str, record: BetRecord) -> Self {
        Self {
            id: format!("{producer_id}.modified"),
            payload: EventPayload::Bet(record),
        }
    }

    /// A refreshed session, identified as `<producer>.modified`.
    pub fn session_modified(producer_id: &str, token: SessionToken) -> Self {
        Self {
            id: format!("{producer_id}.modified"),
            payload: EventPayload::Session(token),
        }
    }

    /// A poll that found no differences, identified as `<producer>.nochange`.
    pub fn no_change(producer_id: &str) -> Self {
        Self {
            id: format!("{producer_id}.nochange"),
            payload: EventPayload::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_row() -> Row {
        [
            ("BetId", "272340593"),
            ("BetType", "Back"),
            ("StrategyName", "TheTipster"),
            ("Name", "Race 3"),
            ("PriceRequested", "3.5"),
            ("AvgPrice", "3.45"),
            ("Status", "Matched"),
            ("Matched", "25"),
            ("PlacedDate", "2020-05-17T10:00:00"),
            ("SelectionName", "Race 3. Horse Name"),
            ("startTime", "2020-05-17T12:00:00"),
            ("EventTypeName", "Horse Racing"),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn record_maps_every_export_column() {
        let record = BetRecord::from_row(&full_row()).unwrap();
        assert_eq!(record.bet_id, "272340593");
        assert_eq!(record.strategy, "TheTipster");
        assert_eq!(record.average_price, 3.45);
        assert_eq!(record.matched, 25.0);
        assert_eq!(record.event_type, "Horse Racing");
    }

    #[test]
    fn missing_numeric_cell_reads_as_zero() {
        let row: Row = [("BetId", "1")].into_iter().collect();
        let record = BetRecord::from_row(&row).unwrap();
        assert_eq!(record.matched, 0.0);
    }

    #[test]
    fn unparseable_number_is_rejected() {
        let row: Row = [("BetId", "1"), ("Matched", "lots")].into_iter().collect();
        assert!(matches!(
            BetRecord::from_row(&row),
            Err(RecordError::BadNumber { column: "Matched", .. })
        ));
    }

    #[test]
    fn event_ids_derive_from_the_producer_id() {
        let token = SessionToken::default();
        assert_eq!(Event::session_modified("sessiondata", token).id, "sessiondata.modified");
        assert_eq!(Event::no_change("bethistory").id, "bethistory.nochange");
    }
}
