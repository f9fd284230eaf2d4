use std::time::Duration;

use reqwest::Url;
use typed_builder::TypedBuilder;

/// Error raised when a [`SimulationConfig`] cannot be turned into a runnable pool.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid base url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("{0} must be greater than zero")]
    ZeroLimit(&'static str),

    #[error("{sessions} sessions starting at index {first_index} exceed the usable index range")]
    IndexOverflow { first_index: usize, sessions: usize },
}

/// Caps applied to the single connection pool shared by every session.
///
/// Requests that arrive while either cap is saturated wait for a free slot;
/// they are never rejected.
#[derive(Debug, Clone, TypedBuilder)]
pub struct PoolLimits {
    /// Maximum number of requests in flight across all hosts.
    #[builder(default = 2000)]
    pub max_connections: usize,
    /// Maximum number of requests in flight to one host.
    #[builder(default = 1500)]
    pub max_connections_per_host: usize,
    /// How long a resolved host name is reused. `Duration::ZERO` disables the cache.
    #[builder(default = Duration::from_secs(300))]
    pub dns_ttl: Duration,
    /// Per-request timeout enforced by the HTTP client.
    #[builder(default = Duration::from_secs(30))]
    pub request_timeout: Duration,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl PoolLimits {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_connections == 0 {
            return Err(ConfigError::ZeroLimit("max_connections"));
        }
        if self.max_connections_per_host == 0 {
            return Err(ConfigError::ZeroLimit("max_connections_per_host"));
        }
        Ok(())
    }
}

/// Paths of the backend operations a session walks through, relative to the base url.
#[derive(Debug, Clone, TypedBuilder)]
pub struct Endpoints {
    #[builder(default = "/jeecg-boot/api/clientLogin".into(), setter(into))]
    pub login: String,
    /// The user identifier is appended as a final path segment.
    #[builder(default = "/jeecg-boot/api/isUserHasTask".into(), setter(into))]
    pub discover: String,
    #[builder(default = "/jeecg-boot/api/getResult".into(), setter(into))]
    pub submit: String,
    #[builder(default = "/jeecg-boot/api/getReportUserInfo".into(), setter(into))]
    pub confirm: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// How synthetic credentials are derived from a session index.
#[derive(Debug, Clone, TypedBuilder)]
pub struct IdentityPlan {
    #[builder(default = "test".into(), setter(into))]
    pub prefix: String,
    #[builder(default = "123456".into(), setter(into))]
    pub password: String,
    /// Index of the first session; later sessions count up from here.
    #[builder(default = 1)]
    pub first_index: usize,
}

impl Default for IdentityPlan {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl IdentityPlan {
    /// Ensure every index of a `sessions`-sized batch is representable.
    pub fn check(&self, sessions: usize) -> Result<(), ConfigError> {
        self.first_index
            .checked_add(sessions.saturating_sub(1))
            .map(|_| ())
            .ok_or(ConfigError::IndexOverflow {
                first_index: self.first_index,
                sessions,
            })
    }
}

/// Everything needed to launch one simulation batch.
///
/// ```rust
/// use throng::config::{PoolLimits, SimulationConfig};
///
/// let config = SimulationConfig::builder()
///     .base_url("http://localhost:8999/")
///     .sessions(50)
///     .limits(PoolLimits::builder().max_connections(100).build())
///     .build();
///
/// assert_eq!(config.normalized_base_url().unwrap(), "http://localhost:8999");
/// ```
#[derive(Debug, Clone, TypedBuilder)]
pub struct SimulationConfig {
    #[builder(setter(into))]
    pub base_url: String,
    #[builder(default = 1000)]
    pub sessions: usize,
    #[builder(default)]
    pub limits: PoolLimits,
    #[builder(default)]
    pub endpoints: Endpoints,
    #[builder(default)]
    pub identities: IdentityPlan,
    /// Record every request/response exchange through the diagnostic sink.
    #[builder(default = false)]
    pub verbose: bool,
}

impl SimulationConfig {
    /// The base url with trailing slashes removed, validated to carry a host.
    pub fn normalized_base_url(&self) -> Result<String, ConfigError> {
        normalize_base_url(&self.base_url)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.normalized_base_url()?;
        self.limits.validate()?;
        self.identities.check(self.sessions)
    }
}

pub(crate) fn normalize_base_url(raw: &str) -> Result<String, ConfigError> {
    let trimmed = raw.trim().trim_end_matches('/');
    let invalid = |reason: String| ConfigError::InvalidBaseUrl {
        url: raw.to_string(),
        reason,
    };

    let url = Url::parse(trimmed).map_err(|e| invalid(e.to_string()))?;
    if url.host_str().is_none() {
        return Err(invalid("missing host".into()));
    }
    Ok(trimmed.to_string())
}
