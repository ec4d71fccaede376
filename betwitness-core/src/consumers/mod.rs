//! Event consumers.
//!
//! [`DeliveryWorker`] is the production consumer: it upserts changed bet
//! records into the remote placed-bets resource and rotates its session
//! credentials on session-refresh events.

pub mod delivery;

pub use delivery::{AcceptAll, AcceptBet, BetStatus, DeliveryEndpoints, DeliveryWorker, EventTypeFilter};
