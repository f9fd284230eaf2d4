//! Connection caps shared by every session.
//!
//! Two independent caps are enforced with [`tokio::sync::Semaphore`]s: one for the
//! total number of in-flight requests and one per target host. A request holds a
//! [`ConnectionPermit`] (one permit from each semaphore) for the whole exchange,
//! including reading the body. When a cap is saturated, `acquire` waits in the
//! semaphore's FIFO queue; nothing is ever rejected.
//!
//! Permits are always taken host-first, then total. With a single fixed order no
//! two requests can each hold the permit the other is waiting for.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::TransportError;

/// The semaphore implementation reserves 3 bits of usize for flags.
/// Larger caps are clamped instead of panicking.
const MAX_PERMITS: usize = Semaphore::MAX_PERMITS;

/// Proof that a request may use one connection slot. Released on drop.
#[derive(Debug)]
pub struct ConnectionPermit {
    _host: OwnedSemaphorePermit,
    _total: OwnedSemaphorePermit,
}

#[derive(Debug)]
pub struct ConnectionLimiter {
    total: Arc<Semaphore>,
    total_cap: usize,
    per_host_cap: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ConnectionLimiter {
    pub fn new(max_connections: usize, max_connections_per_host: usize) -> Self {
        let total_cap = max_connections.min(MAX_PERMITS);
        Self {
            total: Arc::new(Semaphore::new(total_cap)),
            total_cap,
            per_host_cap: max_connections_per_host.min(MAX_PERMITS),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Wait until both the host cap and the total cap have room.
    pub async fn acquire(&self, host: &str) -> Result<ConnectionPermit, TransportError> {
        let host_sem = self.host_semaphore(host);
        let host_permit = host_sem
            .acquire_owned()
            .await
            .map_err(|_| TransportError::LimiterClosed)?;
        let total_permit = self
            .total
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| TransportError::LimiterClosed)?;

        Ok(ConnectionPermit {
            _host: host_permit,
            _total: total_permit,
        })
    }

    /// Number of requests currently holding a total-cap permit.
    pub fn in_flight(&self) -> usize {
        self.total_cap - self.total.available_permits()
    }

    fn host_semaphore(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self.hosts.lock().unwrap_or_else(PoisonError::into_inner);
        hosts
            .entry(host.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_cap)))
            .clone()
    }
}
