//! HTTP clients the bot uses to talk to the web service.
//!
//! The web service is the single SD-facing party; the bot only ever calls
//! the web. Both clients are built so the bot survives any web outage:
//! bounded timeouts everywhere, failures encoded in results, never panics.

pub mod sd;
pub mod web;

pub use sd::{SdOpenResult, SdWebClient};
pub use web::{RollbackStatsPayload, WebCheckResult, WebClient, WebClientError};
