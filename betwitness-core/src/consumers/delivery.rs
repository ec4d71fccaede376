//! HTTP delivery worker.
//!
//! Upserts each accepted bet record into the remote placed-bets resource:
//! a GET probes for existence, then a PUT updates or a POST creates, with
//! the normalized fields as a form-encoded payload. Transient transport
//! failures are retried immediately up to a fixed budget; an exhausted
//! budget parks the record in a pending queue that rides along on every
//! later invocation. This gives at-least-once delivery with no ordering
//! guarantee; a crash between a successful remote write and queue removal
//! can deliver a record twice.

use crate::engine::Consumer;
use crate::events::{BetRecord, Event, EventPayload, SessionToken};
use crate::http::{HttpRequest, HttpTransport, TransportError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Immediate tries per record before it is parked in the pending queue.
const MAX_TRIES: usize = 3;

const BOOKIE_NAME: &str = "BetFair";
const BET_TYPE: &str = "BET_TYPE_EXCHANGE_WIN_BACK";
/// Placeholder for records whose export row carried no strategy label.
const STANDIN_STRATEGY: &str = "STANDIN_STRATEGY";

/// Normalized bet status as the remote API expects it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BetStatus {
    OpenUnmatched,
    OpenMatched,
    Settled,
    Unknown,
}

impl BetStatus {
    /// The export leaves the status cell blank for unmatched bets.
    pub fn from_raw(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            Self::OpenUnmatched
        } else if raw.eq_ignore_ascii_case("matched") {
            Self::OpenMatched
        } else if raw.eq_ignore_ascii_case("settled") {
            Self::Settled
        } else {
            Self::Unknown
        }
    }

    pub fn as_wire(self) -> &'static str {
        match self {
            Self::OpenUnmatched => "BET_STATUS_OPEN_UNMATCHED",
            Self::OpenMatched => "BET_STATUS_OPEN_MATCHED",
            Self::Settled => "BET_STATUS_SETTLED",
            Self::Unknown => "BET_STATUS_UNKNOWN",
        }
    }
}

/// The export labels selections as "<race>. <runner>"; the remote API
/// wants the runner alone. A label without the separator passes through
/// whole, trimmed.
fn selection_name(label: &str) -> &str {
    match label.split_once('.') {
        Some((_, runner)) => runner.trim(),
        None => label.trim(),
    }
}

/// Decides which bet records are eligible for delivery.
pub trait AcceptBet: Send + Sync {
    fn accept(&self, record: &BetRecord) -> bool;
}

pub struct AcceptAll;

impl AcceptBet for AcceptAll {
    fn accept(&self, _record: &BetRecord) -> bool {
        true
    }
}

/// Accepts records whose event category appears in a configured list.
pub struct EventTypeFilter {
    accepted: Vec<String>,
}

impl EventTypeFilter {
    pub fn new(accepted: Vec<String>) -> Self {
        Self { accepted }
    }
}

impl AcceptBet for EventTypeFilter {
    fn accept(&self, record: &BetRecord) -> bool {
        self.accepted.iter().any(|t| t == &record.event_type)
    }
}

/// Collection and per-resource URLs derived from one base.
#[derive(Debug, Clone)]
pub struct DeliveryEndpoints {
    base: String,
}

impl DeliveryEndpoints {
    pub fn new(base: impl Into<String>) -> Self {
        let mut base = base.into();
        while base.ends_with('/') {
            base.pop();
        }
        Self { base }
    }

    fn collection(&self) -> String {
        format!("{}/", self.base)
    }

    fn resource(&self, id: &str) -> String {
        format!("{}/{}/", self.base, id)
    }
}

#[derive(Debug, Error)]
enum DeliveryError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("remote refused the upsert with status {status}")]
    Refused { status: u16 },
}

pub struct DeliveryWorker {
    transport: Arc<dyn HttpTransport>,
    endpoints: DeliveryEndpoints,
    accept: Box<dyn AcceptBet>,
    token: SessionToken,
    pending: Vec<BetRecord>,
}

impl DeliveryWorker {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoints: DeliveryEndpoints,
        accept: impl AcceptBet + 'static,
        token: SessionToken,
    ) -> Self {
        Self {
            transport,
            endpoints,
            accept: Box::new(accept),
            token,
            pending: Vec::new(),
        }
    }

    /// Records parked after an exhausted retry budget.
    pub fn pending(&self) -> &[BetRecord] {
        &self.pending
    }

    fn cookie_header(&self) -> String {
        format!(
            "csrftoken={}; sessionid={}",
            self.token.csrf_token, self.token.session_id
        )
    }

    fn form_payload(record: &BetRecord) -> Vec<(String, String)> {
        let strategy = if record.strategy.trim().is_empty() {
            STANDIN_STRATEGY
        } else {
            record.strategy.as_str()
        };
        vec![
            ("bookieID".to_owned(), record.bet_id.clone()),
            ("bookieName".to_owned(), BOOKIE_NAME.to_owned()),
            ("stakeAmount".to_owned(), record.matched.to_string()),
            ("strategy".to_owned(), strategy.to_owned()),
            ("odds".to_owned(), record.average_price.to_string()),
            (
                "status".to_owned(),
                BetStatus::from_raw(&record.status).as_wire().to_owned(),
            ),
            ("timestamp".to_owned(), record.placed_at.clone()),
            ("eventStartTime".to_owned(), record.start_time.clone()),
            (
                "selectionName".to_owned(),
                selection_name(&record.selection).to_owned(),
            ),
            ("betType".to_owned(), BET_TYPE.to_owned()),
        ]
    }

    /// One exists/create-or-update round trip for a single record.
    async fn upsert(&self, record: &BetRecord) -> Result<(), DeliveryError> {
        let cookie = self.cookie_header();
        let probe = self
            .transport
            .execute(
                HttpRequest::get(self.endpoints.resource(&record.bet_id))
                    .header("Cookie", cookie.clone()),
            )
            .await?;

        let request = if probe.is_success() {
            HttpRequest::put(self.endpoints.resource(&record.bet_id))
        } else {
            HttpRequest::post(self.endpoints.collection())
        };
        let response = self
            .transport
            .execute(
                request
                    .header("Cookie", cookie)
                    .form(Self::form_payload(record)),
            )
            .await?;

        if response.is_success() {
            debug!(bet_id = %record.bet_id, updated = probe.is_success(), "bet record delivered");
            Ok(())
        } else {
            Err(DeliveryError::Refused {
                status: response.status,
            })
        }
    }

    async fn deliver_with_retry(&mut self, record: BetRecord) {
        for attempt in 1..=MAX_TRIES {
            match self.upsert(&record).await {
                Ok(()) => {
                    self.pending.retain(|queued| queued.bet_id != record.bet_id);
                    info!(bet_id = %record.bet_id, "delivered bet record");
                    return;
                }
                // A refusal is a protocol answer, not a transient fault;
                // retrying the same payload would only repeat it.
                Err(DeliveryError::Refused { status }) => {
                    error!(bet_id = %record.bet_id, status, "remote refused the bet record");
                    return;
                }
                Err(DeliveryError::Transport(e)) if attempt < MAX_TRIES => {
                    warn!(bet_id = %record.bet_id, attempt, error = %e, "delivery failed, retrying");
                }
                Err(DeliveryError::Transport(e)) => {
                    error!(
                        bet_id = %record.bet_id,
                        error = %e,
                        "retry budget exhausted, parking the record for redelivery"
                    );
                    self.pending.push(record);
                    return;
                }
            }
        }
    }

    /// Re-attempt everything parked by earlier invocations. Records this
    /// flush itself parks again wait for the next one.
    async fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        debug!(queued = self.pending.len(), "re-attempting parked deliveries");
        for record in std::mem::take(&mut self.pending) {
            self.deliver_with_retry(record).await;
        }
    }

    async fn on_bet(&mut self, record: &BetRecord) {
        // Earlier failures ride along on every bet event, independent
        // of the current record's outcome.
        self.flush_pending().await;
        if !self.accept.accept(record) {
            info!(bet_id = %record.bet_id, event_type = %record.event_type, "bet record not eligible for delivery");
            return;
        }
        self.deliver_with_retry(record.clone()).await;
    }

    fn rotate_session(&mut self, token: &SessionToken) {
        self.token = token.clone();
        info!("rotated delivery session credentials");
    }
}

#[async_trait]
impl Consumer for DeliveryWorker {
    async fn on_event(&mut self, event: &Event) {
        match &event.payload {
            EventPayload::Bet(record) => self.on_bet(record).await,
            EventPayload::Session(token) => self.rotate_session(token),
            EventPayload::None => {}
        }
    }
}
