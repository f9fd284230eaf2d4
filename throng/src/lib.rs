//! Throng: drive many virtual-user sessions against an HTTP backend at once.
//!
//! Each virtual user walks the same business workflow: log in, discover the work
//! assigned to it, then submit and confirm every work item in order. Throng launches
//! one such session per user, all concurrently, over a single resource-bounded HTTP
//! transport, and reduces the per-session verdicts into a success rate and a
//! throughput figure.
//!
//! # Architecture
//!
//! The main building blocks are:
//!
//! - [`Transport`]: the capability to perform one labeled request/response exchange.
//!   [`HttpTransport`] is the shared, connection-capped `reqwest` implementation.
//! - [`Workflow`]: the per-user state machine. Every step depends only on a
//!   `Transport`, and the [`SessionContext`] it builds is owned by exactly one
//!   session.
//! - [`SessionPool`]: fans a batch of sessions out as Tokio tasks and collects one
//!   [`SessionOutcome`] per session, even when sessions fail or panic.
//! - [`Report`]: derives counts, success rate and throughput from the outcomes.
//! - [`Reporter`]: sends a `Report` somewhere (the log, stdout as JSON).
//! - [`Sink`]: receives diagnostic [`Event`]s from every component. Nothing logs
//!   through a global registry.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use throng::{
//!     config::SimulationConfig, diagnostics::TracingSink, LogReporter, Report, Reporter,
//!     SessionPool,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SimulationConfig::builder()
//!         .base_url("http://localhost:8999/")
//!         .sessions(100)
//!         .build();
//!
//!     let pool = SessionPool::connect(&config, Arc::new(TracingSink))?;
//!     let run = pool.run(config.sessions).await?;
//!
//!     LogReporter.report(&Report::from(&run)).await?;
//!     Ok(())
//! }
//! ```
//!
//! # Failure model
//!
//! Sessions fail fast: the first unsuccessful step ends the session, nothing is
//! retried, and items already submitted stay submitted. A failed or panicking
//! session never affects its neighbours, and a batch of `K` sessions always yields
//! exactly `K` outcomes.

/// Builders for pool limits, endpoints, identities and the whole simulation
pub mod config;
/// Diagnostic events and sinks
pub mod diagnostics;
/// Concurrent fan-out of sessions over one transport
pub mod pool;
/// Aggregation of outcomes and reporters
pub mod report;
/// The per-user workflow
pub mod session;
/// The exchange capability and its HTTP implementation
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ConfigError, SimulationConfig};
pub use diagnostics::{Event, Sink};
pub use pool::{FailureKind, RunResult, SessionOutcome, SessionPool};
pub use report::{JsonReporter, LogReporter, Report, Reporter, Tally};
pub use session::{SessionContext, SessionError, SessionIdentity, Workflow};
pub use transport::{HttpTransport, Transport, TransportError};

/// Error raised while assembling a pool, before any session runs.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
