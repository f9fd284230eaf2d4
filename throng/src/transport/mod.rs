//! Transport: the single capability every workflow step depends on.
//!
//! A [`Transport`] performs one labeled request/response exchange. Steps build an
//! [`Exchange`], hand it to the transport and inspect the [`Reply`]; they never see
//! the connection pool, the resolver or the limiter behind it.
//!
//! The contract:
//!
//! - a reply with status `200` carries the decoded JSON body,
//! - any other status yields an empty JSON object paired with the real status and is
//!   **not** an error,
//! - only network-level trouble (refused connections, timeouts, a `200` whose body is
//!   not JSON) surfaces as a [`TransportError`].
//!
//! [`HttpTransport`] is the production implementation built on `reqwest`.
pub mod dns;
pub mod http;
pub mod limits;

pub use dns::CachingResolver;
pub use http::HttpTransport;
pub use limits::{ConnectionLimiter, ConnectionPermit};

use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION},
    Method,
};
use serde_json::{Map, Value};

/// Error for failures below the application level.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("network error: {0}")]
    Network(#[source] reqwest::Error),

    #[error("malformed response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid header value for {name}")]
    InvalidHeader { name: String },

    #[error("connection limiter closed")]
    LimiterClosed,
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TransportError::Timeout {
                url: err.url().map(|u| u.to_string()).unwrap_or_default(),
            }
        } else {
            TransportError::Network(err)
        }
    }
}

/// One request to perform, relative to the transport's base url.
#[derive(Debug, Clone)]
pub struct Exchange {
    /// Human-readable name used in diagnostics.
    pub label: &'static str,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub body: Option<Value>,
}

impl Exchange {
    pub fn new(label: &'static str, method: Method, path: impl Into<String>) -> Self {
        Self {
            label,
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(label: &'static str, path: impl Into<String>) -> Self {
        Self::new(label, Method::GET, path)
    }

    pub fn post(label: &'static str, path: impl Into<String>, body: Value) -> Self {
        Self::new(label, Method::POST, path).json(body)
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn header(mut self, name: HeaderName, value: &str) -> Result<Self, TransportError> {
        let value = HeaderValue::from_str(value).map_err(|_| TransportError::InvalidHeader {
            name: name.to_string(),
        })?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Attach `Authorization: Bearer <token>`.
    pub fn bearer(self, token: &str) -> Result<Self, TransportError> {
        self.header(AUTHORIZATION, &format!("Bearer {token}"))
    }

    /// The bearer token carried by this exchange, if any.
    pub fn bearer_token(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }
}

/// Status and decoded body of one exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub const SUCCESS: u16 = 200;

    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// A non-success reply: the status with an empty JSON object.
    pub fn empty(status: u16) -> Self {
        Self::new(status, Value::Object(Map::new()))
    }

    /// Only exactly `200` counts as success.
    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS
    }

    /// The `success` flag most backend envelopes carry; absent means `false`.
    pub fn success_flag(&self) -> bool {
        self.body
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

/// Something that can perform a labeled HTTP exchange.
///
/// Implementations are shared by every session of a run, so they take `&self` and
/// must be safe to call from many tasks at once.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, exchange: Exchange) -> Result<Reply, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn request(&self, exchange: Exchange) -> Result<Reply, TransportError> {
        (**self).request(exchange).await
    }
}
