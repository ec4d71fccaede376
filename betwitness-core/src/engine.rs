//! Scheduler and event router.
//!
//! The [`Engine`] owns a registry of named producers, each fired on its own
//! period, and named consumers, each declaring an interest set of event
//! identifiers. A single tick loop launches due producers as independent
//! tasks (fire-and-forget; the loop never awaits them) and every event a
//! producer publishes is delivered synchronously, in consumer-registration
//! order, to the consumers whose interest set contains its identifier.
//!
//! Two runs of a slow producer may overlap when its work exceeds its
//! period; consumers are serialized behind a per-consumer mutex so that
//! overlapping firings cannot corrupt consumer state.

use crate::events::Event;
use async_trait::async_trait;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A scheduled unit of work that may publish events when fired.
#[async_trait]
pub trait Producer: Send + Sync {
    async fn fire(&self, sink: &EventSink) -> Result<(), BoxError>;
}

/// A unit of work reacting to events matching its declared interest set.
///
/// `on_event` takes `&mut self`; the engine serializes invocations behind
/// a per-consumer mutex, so implementations are free to keep plain state.
#[async_trait]
pub trait Consumer: Send + Sync {
    async fn on_event(&mut self, event: &Event);
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("producer id {0:?} already registered")]
    DuplicateProducer(String),

    #[error("consumer id {0:?} already registered")]
    DuplicateConsumer(String),
}

struct ConsumerEntry {
    id: String,
    interests: Vec<String>,
    worker: Arc<Mutex<dyn Consumer>>,
}

/// Subscription list shared between the engine, sinks and subscriptions.
///
/// The lock is never held across an await: dispatch snapshots the matching
/// workers under the read lock and delivers after releasing it, which
/// keeps registration order and lets consumers unsubscribe freely.
#[derive(Clone, Default)]
struct EventRouter {
    consumers: Arc<RwLock<Vec<ConsumerEntry>>>,
}

impl EventRouter {
    fn register(
        &self,
        id: String,
        interests: Vec<String>,
        worker: Arc<Mutex<dyn Consumer>>,
    ) -> Result<(), EngineError> {
        let mut consumers = self.write();
        if consumers.iter().any(|c| c.id == id) {
            return Err(EngineError::DuplicateConsumer(id));
        }
        consumers.push(ConsumerEntry {
            id,
            interests,
            worker,
        });
        Ok(())
    }

    fn remove(&self, id: &str) {
        self.write().retain(|c| c.id != id);
    }

    async fn dispatch(&self, event: &Event) {
        let matched: Vec<Arc<Mutex<dyn Consumer>>> = {
            let consumers = self.read();
            consumers
                .iter()
                .filter(|c| c.interests.iter().any(|i| i == &event.id))
                .map(|c| Arc::clone(&c.worker))
                .collect()
        };

        for worker in matched {
            worker.lock().await.on_event(event).await;
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<ConsumerEntry>> {
        match self.consumers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Vec<ConsumerEntry>> {
        match self.consumers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Publish handle given to producers (and available to wiring code).
#[derive(Clone)]
pub struct EventSink {
    router: EventRouter,
}

impl EventSink {
    /// Deliver an event synchronously to every interested consumer, in
    /// consumer-registration order. Returns once all of them have run.
    pub async fn publish(&self, event: Event) {
        debug!(event = %event.id, "publishing event");
        self.router.dispatch(&event).await;
    }
}

/// Handle returned by [`Engine::attach_consumer`]; dropping it keeps the
/// registration alive, calling [`unsubscribe`](Subscription::unsubscribe)
/// removes it.
pub struct Subscription {
    id: String,
    router: EventRouter,
}

impl Subscription {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn unsubscribe(self) {
        self.router.remove(&self.id);
    }
}

struct ProducerEntry {
    id: String,
    worker: Arc<dyn Producer>,
    period: Duration,
    last_fired: Instant,
}

/// Central router: registry of producers and consumers plus the tick loop.
pub struct Engine {
    tick: Duration,
    producers: Vec<ProducerEntry>,
    router: EventRouter,
}

impl Engine {
    /// `tick` is the resolution of the scheduler loop; producer periods
    /// shorter than it are effectively rounded up to it.
    pub fn new(tick: Duration) -> Self {
        Self {
            tick,
            producers: Vec::new(),
            router: EventRouter::default(),
        }
    }

    /// Register a producer under a unique id with its firing period.
    ///
    /// The elapsed-time counter starts at zero, so the first fire happens
    /// one full period after attachment. A duplicate id is rejected
    /// without mutating the registry.
    pub fn attach_producer(
        &mut self,
        id: impl Into<String>,
        worker: impl Producer + 'static,
        period: Duration,
    ) -> Result<(), EngineError> {
        let id = id.into();
        if self.producers.iter().any(|p| p.id == id) {
            return Err(EngineError::DuplicateProducer(id));
        }
        self.producers.push(ProducerEntry {
            id,
            worker: Arc::new(worker),
            period,
            last_fired: Instant::now(),
        });
        Ok(())
    }

    /// Register a consumer under a unique id with its interest set.
    ///
    /// Returns an unsubscribe handle. A duplicate id is rejected without
    /// mutating the registry.
    pub fn attach_consumer(
        &mut self,
        id: impl Into<String>,
        worker: impl Consumer + 'static,
        interests: Vec<String>,
    ) -> Result<Subscription, EngineError> {
        let id = id.into();
        self.router
            .register(id.clone(), interests, Arc::new(Mutex::new(worker)))?;
        Ok(Subscription {
            id,
            router: self.router.clone(),
        })
    }

    /// A publish handle usable outside producer firings, e.g. for wiring
    /// code or consumers that emit events of their own.
    pub fn sink(&self) -> EventSink {
        EventSink {
            router: self.router.clone(),
        }
    }

    /// Run the tick loop until `shutdown_rx` flips to `true`.
    ///
    /// Every due producer is launched as an independent task and its
    /// elapsed counter reset immediately, whether or not the previous run
    /// has finished. On shutdown the launched task handles are awaited;
    /// in-flight work is never forcibly aborted.
    pub async fn run(mut self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(producers = self.producers.len(), tick_ms = self.tick.as_millis() as u64, "engine started");

        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                biased;

                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        info!("engine received shutdown signal");
                        break;
                    }
                }

                _ = interval.tick() => {
                    in_flight.retain(|handle| !handle.is_finished());

                    let now = Instant::now();
                    for entry in &mut self.producers {
                        if now.duration_since(entry.last_fired) >= entry.period {
                            entry.last_fired = now;
                            in_flight.push(spawn_producer(entry, &self.router, shutdown_rx.clone()));
                        }
                    }
                }
            }
        }

        for handle in in_flight {
            let _ = handle.await;
        }
        info!("engine stopped");
    }
}

fn spawn_producer(
    entry: &ProducerEntry,
    router: &EventRouter,
    cancel: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let id = entry.id.clone();
    let worker = Arc::clone(&entry.worker);
    let sink = EventSink {
        router: router.clone(),
    };

    tokio::spawn(async move {
        // Cancellation is cooperative and checked once, before the
        // producer begins any blocking work.
        if *cancel.borrow() {
            debug!(producer = %id, "shutdown raised, skipping fire");
            return;
        }
        if let Err(e) = worker.fire(&sink).await {
            error!(producer = %id, error = %e, "producer run failed");
        }
    })
}
