//! Scheduled producers.
//!
//! - [`BetHistoryProducer`]: polls the change witness and emits one
//!   `<id>.modified` event per changed row (or `<id>.nochange`).
//! - [`SessionProducer`]: performs the login handshake and emits
//!   `<id>.modified` session-refresh events.

pub mod bet_history;
pub mod session;

pub use bet_history::BetHistoryProducer;
pub use session::{SessionError, SessionProducer};
