//! opsbridge: ServiceDesk open-queue notification bridge.
//!
//! Watches the SD open queue, notifies chat destinations on composition
//! changes, escalates tickets that dwell too long unattended, and serves a
//! Postgres-backed versioned runtime configuration over HTTP.
//!
//! ## Architecture
//!
//! - **Bridge bot** (`opsbridge`): open-queue poller, escalation engine,
//!   config sync, notification fan-out, observability probes
//! - **Web service** (`ops-web`): versioned config API with history and
//!   rollback, SD proxy, health/readiness

pub mod chat;
pub mod client;
pub mod env;
pub mod escalation;
pub mod eventlog;
pub mod notify;
pub mod observability;
pub mod poller;
pub mod routing;
pub mod runtime;
pub mod sd;
pub mod state;
pub mod web;

// Re-export the routing primitives used across module boundaries.
pub use routing::{Destination, FieldBindings, RouteRule};

// Re-export the runtime snapshot types.
pub use runtime::{ConfigHandle, ConfigSource, RuntimeConfig};

// Re-export the ticket facade.
pub use sd::Ticket;
