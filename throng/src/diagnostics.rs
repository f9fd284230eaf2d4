//! Diagnostic events and the sinks that receive them.
//!
//! Components never log through a global registry of named loggers. Each one is
//! handed a [`Sink`] and records [`Event`]s into it; what happens to the events
//! (forwarding them to `tracing`, keeping them for inspection, dropping them) is
//! decided by whoever builds the pool.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use serde_json::Value;

use crate::session::Step;

/// Something observable that happened during a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// One request/response exchange. Only emitted by transports in verbose mode.
    Exchange {
        label: String,
        url: String,
        status: u16,
        body: Value,
    },
    SessionStarted {
        username: String,
    },
    StepSucceeded {
        username: String,
        step: Step,
        detail: String,
    },
    StepFailed {
        username: String,
        step: Step,
        reason: String,
    },
    SessionFinished {
        username: String,
        success: bool,
        elapsed: Duration,
    },
    /// The session task died without producing a verdict.
    SessionFaulted {
        username: String,
        error: String,
    },
}

/// Receiver for diagnostic [`Event`]s.
///
/// Implementations must be cheap and must not fail: recording an event can never
/// change the control flow of the component that emitted it.
pub trait Sink: Send + Sync {
    fn record(&self, event: Event);
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl Sink for TracingSink {
    fn record(&self, event: Event) {
        match event {
            Event::Exchange {
                label,
                url,
                status,
                body,
            } => {
                tracing::debug!(%label, %url, status, body = %body, "exchange");
            }
            Event::SessionStarted { username } => {
                tracing::info!("Session {username} started");
            }
            Event::StepSucceeded {
                username,
                step,
                detail,
            } => {
                tracing::debug!("Session {username}: {step} ok ({detail})");
            }
            Event::StepFailed {
                username,
                step,
                reason,
            } => {
                tracing::warn!("Session {username}: {step} failed: {reason}");
            }
            Event::SessionFinished {
                username,
                success: true,
                elapsed,
            } => {
                tracing::info!(
                    "Session {username} completed in {:.2}s",
                    elapsed.as_secs_f64()
                );
            }
            Event::SessionFinished {
                username,
                success: false,
                elapsed,
            } => {
                tracing::error!(
                    "Session {username} failed after {:.2}s",
                    elapsed.as_secs_f64()
                );
            }
            Event::SessionFaulted { username, error } => {
                tracing::error!("Session {username} aborted unexpectedly: {error}");
            }
        }
    }
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {
    fn record(&self, _: Event) {}
}

/// Keeps every event in memory, in the order it was recorded.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<Event>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Events that concern `username`. Exchanges carry no username and are skipped.
    pub fn events_for(&self, username: &str) -> Vec<Event> {
        self.events()
            .into_iter()
            .filter(|e| match e {
                Event::Exchange { .. } => false,
                Event::SessionStarted { username: u }
                | Event::StepSucceeded { username: u, .. }
                | Event::StepFailed { username: u, .. }
                | Event::SessionFinished { username: u, .. }
                | Event::SessionFaulted { username: u, .. } => u == username,
            })
            .collect()
    }
}

impl Sink for RecordingSink {
    fn record(&self, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
