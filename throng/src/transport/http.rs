use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde_json::Value;

use super::{CachingResolver, ConnectionLimiter, Exchange, Reply, Transport, TransportError};
use crate::{
    config::{normalize_base_url, PoolLimits},
    diagnostics::{Event, Sink},
    Error,
};

/// [`Transport`] over one shared `reqwest` connection pool.
///
/// Built once per run and shared by every session:
///
/// - `reqwest` keeps up to `max_connections_per_host` idle connections alive,
/// - a [`ConnectionLimiter`] caps in-flight requests in total and per host,
/// - a [`CachingResolver`] reuses resolved addresses for `dns_ttl`,
/// - `request_timeout` bounds each exchange.
///
/// In verbose mode every exchange is recorded as an [`Event::Exchange`].
pub struct HttpTransport {
    client: Client,
    base_url: String,
    host: String,
    limiter: ConnectionLimiter,
    sink: Arc<dyn Sink>,
    verbose: bool,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        limits: &PoolLimits,
        verbose: bool,
        sink: Arc<dyn Sink>,
    ) -> Result<Self, Error> {
        limits.validate()?;
        let base_url = normalize_base_url(base_url)?;
        let host = Url::parse(&base_url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_owned))
            .unwrap_or_default();

        tracing::debug!(
            "Building HTTP transport for {base_url} (total cap {}, per-host cap {}, dns ttl {:?})",
            limits.max_connections,
            limits.max_connections_per_host,
            limits.dns_ttl
        );
        let client = Client::builder()
            .pool_max_idle_per_host(limits.max_connections_per_host)
            .timeout(limits.request_timeout)
            .dns_resolver(Arc::new(CachingResolver::new(limits.dns_ttl)))
            .build()?;

        Ok(Self {
            client,
            base_url,
            host,
            limiter: ConnectionLimiter::new(
                limits.max_connections,
                limits.max_connections_per_host,
            ),
            sink,
            verbose,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn limiter(&self) -> &ConnectionLimiter {
        &self.limiter
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, exchange: Exchange) -> Result<Reply, TransportError> {
        let url = format!("{}{}", self.base_url, exchange.path);
        let _permit = self.limiter.acquire(&self.host).await?;

        let mut builder = self
            .client
            .request(exchange.method, &url)
            .headers(exchange.headers);
        if let Some(body) = &exchange.body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let reply = if status == StatusCode::OK {
            let bytes = response.bytes().await?;
            let body: Value = serde_json::from_slice(&bytes).map_err(|source| {
                TransportError::Decode {
                    url: url.clone(),
                    source,
                }
            })?;
            Reply::new(status.as_u16(), body)
        } else {
            Reply::empty(status.as_u16())
        };

        if self.verbose {
            self.sink.record(Event::Exchange {
                label: exchange.label.to_string(),
                url,
                status: reply.status,
                body: reply.body.clone(),
            });
        }
        Ok(reply)
    }
}
