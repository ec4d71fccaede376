#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod consumers;
pub mod diff;
pub mod engine;
pub mod events;
pub mod http;
pub mod producers;
pub mod snapshot;
pub mod witness;
