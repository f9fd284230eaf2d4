//! Time-bounded name-resolution cache plugged into `reqwest`.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use reqwest::dns::{Addrs, Name, Resolve, Resolving};
use tokio::time::Instant;

#[derive(Debug)]
struct Entry {
    addrs: Vec<SocketAddr>,
    expires_at: Instant,
}

/// Resolved addresses keyed by host name, each valid for `ttl`.
#[derive(Debug)]
pub struct DnsCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl DnsCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Cached addresses for `host`, unless missing or expired at `now`.
    pub fn get(&self, host: &str, now: Instant) -> Option<Vec<SocketAddr>> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(host)?;
        if entry.expires_at > now {
            return Some(entry.addrs.clone());
        }
        entries.remove(host);
        None
    }

    pub fn insert(&self, host: &str, addrs: Vec<SocketAddr>, now: Instant) {
        if self.ttl.is_zero() || addrs.is_empty() {
            return;
        }
        let entry = Entry {
            addrs,
            expires_at: now + self.ttl,
        };
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(host.to_string(), entry);
    }
}

/// A [`Resolve`] implementation that consults a [`DnsCache`] before asking the
/// system resolver.
#[derive(Debug, Clone)]
pub struct CachingResolver {
    cache: Arc<DnsCache>,
}

impl CachingResolver {
    pub fn new(ttl: Duration) -> Self {
        Self {
            cache: Arc::new(DnsCache::new(ttl)),
        }
    }

    pub fn cache(&self) -> &DnsCache {
        &self.cache
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

impl Resolve for CachingResolver {
    fn resolve(&self, name: Name) -> Resolving {
        let cache = self.cache.clone();
        Box::pin(async move {
            let addrs = lookup(&cache, name.as_str()).await?;
            let addrs: Addrs = Box::new(addrs.into_iter());
            Ok::<_, BoxError>(addrs)
        })
    }
}

async fn lookup(cache: &DnsCache, host: &str) -> std::io::Result<Vec<SocketAddr>> {
    if let Some(addrs) = cache.get(host, Instant::now()) {
        tracing::trace!("dns cache hit for {host}");
        return Ok(addrs);
    }

    // port is filled in by the connector
    let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, 0)).await?.collect();
    tracing::trace!("resolved {host} to {} address(es)", addrs.len());
    cache.insert(host, addrs.clone(), Instant::now());
    Ok(addrs)
}
