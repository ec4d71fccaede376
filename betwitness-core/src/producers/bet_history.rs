//! Bet-history producer.
//!
//! On every scheduled fire it asks its [`ChangeWitness`] for the rows that
//! changed since the previous poll, maps each onto a [`BetRecord`] and
//! publishes a `<id>.modified` event per record. A poll that finds nothing
//! publishes a single `<id>.nochange` event instead.
//!
//! A snapshot that is momentarily unreadable (mid-rewrite by the exporting
//! process, or not yet created) skips the cycle and leaves the cache
//! untouched; the next fire picks up from the same baseline.

use crate::engine::{BoxError, EventSink, Producer};
use crate::events::{BetRecord, Event};
use crate::snapshot::SnapshotSource;
use crate::witness::{ChangeWitness, WitnessError};
use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct BetHistoryProducer<S: SnapshotSource> {
    id: String,
    // Overlapping fires of a slow poll serialize on the witness rather
    // than racing on its cache.
    witness: Mutex<ChangeWitness<S>>,
}

impl<S: SnapshotSource> BetHistoryProducer<S> {
    pub fn new(id: impl Into<String>, witness: ChangeWitness<S>) -> Self {
        Self {
            id: id.into(),
            witness: Mutex::new(witness),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl<S: SnapshotSource + 'static> Producer for BetHistoryProducer<S> {
    async fn fire(&self, sink: &EventSink) -> Result<(), BoxError> {
        let changed = self.witness.lock().await.differences();
        let rows = match changed {
            Ok(rows) => rows,
            Err(WitnessError::Snapshot(e)) => {
                warn!(producer = %self.id, error = %e, "snapshot unavailable, skipping this cycle");
                return Ok(());
            }
            // A missing key column is a wiring bug, not a transient
            // condition; surface it instead of retrying forever.
            Err(e @ WitnessError::Diff(_)) => return Err(e.into()),
        };

        info!(producer = %self.id, changes = rows.len(), "found changes since last poll");

        if rows.is_empty() {
            sink.publish(Event::no_change(&self.id)).await;
            return Ok(());
        }

        for row in rows {
            match BetRecord::from_row(&row) {
                Ok(record) => sink.publish(Event::bet_modified(&self.id, record)).await,
                Err(e) => {
                    warn!(producer = %self.id, error = %e, "skipping row that does not map onto a bet record");
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Consumer, Engine};
    use crate::events::EventPayload;
    use crate::snapshot::{Row, Snapshot, SnapshotError};
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::Duration;

    struct ScriptedSource {
        loads: StdMutex<Vec<Result<Snapshot, SnapshotError>>>,
    }

    impl SnapshotSource for ScriptedSource {
        fn load(&self) -> Result<Snapshot, SnapshotError> {
            let mut loads = self.loads.lock().unwrap();
            if loads.is_empty() {
                Ok(Snapshot::empty())
            } else {
                loads.remove(0)
            }
        }
    }

    struct CollectingConsumer {
        events: Arc<StdMutex<Vec<Event>>>,
    }

    #[async_trait]
    impl Consumer for CollectingConsumer {
        async fn on_event(&mut self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn bet_row(id: &str, status: &str) -> Row {
        [("BetId", id), ("Status", status), ("Matched", "25")]
            .into_iter()
            .collect()
    }

    fn snapshot_of(rows: Vec<Row>) -> Snapshot {
        Snapshot::new(
            vec!["BetId".into(), "Status".into(), "Matched".into()],
            rows,
        )
    }

    fn harness(
        loads: Vec<Result<Snapshot, SnapshotError>>,
    ) -> (BetHistoryProducer<ScriptedSource>, EventSink, Arc<StdMutex<Vec<Event>>>) {
        // The first scripted load becomes the witness baseline.
        let source = ScriptedSource {
            loads: StdMutex::new(loads),
        };
        let witness = ChangeWitness::new(source, "BetId").unwrap();
        let producer = BetHistoryProducer::new("bethistory", witness);

        let mut engine = Engine::new(Duration::from_millis(10));
        let events = Arc::new(StdMutex::new(Vec::new()));
        engine
            .attach_consumer(
                "collector",
                CollectingConsumer {
                    events: Arc::clone(&events),
                },
                vec!["bethistory.modified".into(), "bethistory.nochange".into()],
            )
            .unwrap();
        (producer, engine.sink(), events)
    }

    #[tokio::test]
    async fn changed_rows_become_modified_events() {
        let (producer, sink, events) = harness(vec![
            Ok(snapshot_of(vec![bet_row("T1", "")])),
            Ok(snapshot_of(vec![bet_row("T1", "matched"), bet_row("T2", "")])),
        ]);

        producer.fire(&sink).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.id == "bethistory.modified"));
        match &events[0].payload {
            EventPayload::Bet(record) => assert_eq!(record.status, "matched"),
            other => panic!("expected a bet payload, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn quiet_poll_emits_a_single_nochange_event() {
        let snapshot = snapshot_of(vec![bet_row("T1", "")]);
        let (producer, sink, events) = harness(vec![Ok(snapshot.clone()), Ok(snapshot)]);

        producer.fire(&sink).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id, "bethistory.nochange");
    }

    #[tokio::test]
    async fn unreadable_snapshot_skips_the_cycle_and_keeps_the_baseline() {
        let (producer, sink, events) = harness(vec![
            Ok(snapshot_of(vec![bet_row("T1", "")])),
            Err(SnapshotError::Corrupt("mid-rewrite".into())),
            Ok(snapshot_of(vec![bet_row("T1", "matched")])),
        ]);

        producer.fire(&sink).await.unwrap();
        assert!(events.lock().unwrap().is_empty());

        // The baseline survived the failed cycle, so the change is still seen.
        producer.fire(&sink).await.unwrap();
        assert_eq!(events.lock().unwrap().len(), 1);
        assert_eq!(events.lock().unwrap()[0].id, "bethistory.modified");
    }

    #[tokio::test]
    async fn unconvertible_rows_are_skipped_without_aborting_the_batch() {
        let bad_row: Row = [("BetId", "T2"), ("Matched", "lots")].into_iter().collect();
        let (producer, sink, events) = harness(vec![
            Ok(snapshot_of(vec![])),
            Ok(snapshot_of(vec![bet_row("T1", ""), bad_row])),
        ]);

        producer.fire(&sink).await.unwrap();

        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            EventPayload::Bet(record) => assert_eq!(record.bet_id, "T1"),
            other => panic!("expected a bet payload, got {other:?}"),
        }
    }
}
