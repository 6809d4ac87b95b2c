//! # Service Model
//!
//! Immutable descriptions of the REST services and endpoints the adapter
//! polls. They arrive already parsed (see the `configs` feature) and are never
//! mutated afterwards: replacing a service means building a new
//! `ServiceDescriptor` and a new session for it.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The "produces" value asking the session to infer the type from the first response.
pub const AUTO_PRODUCES: &str = "auto";

const DEFAULT_PORT: u16 = 443;
const DEFAULT_POLL_PERIOD_MS: u64 = 60_000;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_secure() -> bool {
    true
}

fn default_poll_period_ms() -> u64 {
    DEFAULT_POLL_PERIOD_MS
}

fn default_produces() -> String {
    AUTO_PRODUCES.to_string()
}

/// Basic authentication credentials for a service.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    /// User name.
    pub username: String,
    /// Password. Never printed by `Debug`.
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"******")
            .finish()
    }
}

/// # Endpoint Descriptor
///
/// One REST path of a service and the topic its responses are published to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EndpointDescriptor {
    /// Name, unique within the owning service.
    pub name: String,
    /// Request path (and query) relative to the service origin.
    pub url: String,
    /// Topic path relative to the service's topic root.
    pub topic_path: String,
    /// Declared producing type: `auto`, a type name or a media type.
    #[serde(default = "default_produces")]
    pub produces: String,
    /// Per-endpoint override of the service poll period, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_period_ms: Option<u64>,
}

impl EndpointDescriptor {
    /// Creates a descriptor using the service's poll period.
    pub fn new(
        name: impl Into<String>,
        url: impl Into<String>,
        topic_path: impl Into<String>,
        produces: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            topic_path: topic_path.into(),
            produces: produces.into(),
            poll_period_ms: None,
        }
    }

    /// Overrides the service poll period for this endpoint.
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period_ms = Some(period.as_millis() as u64);
        self
    }

    /// True when the producing type is inferred from the first response.
    pub fn is_auto(&self) -> bool {
        self.produces.trim().eq_ignore_ascii_case(AUTO_PRODUCES)
    }
}

/// # Service Descriptor
///
/// A REST origin with the endpoints to poll on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDescriptor {
    /// Unique service name.
    pub name: String,
    /// Host of the REST origin.
    pub host: String,
    /// Port of the REST origin.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Use HTTPS when true.
    #[serde(default = "default_secure")]
    pub secure: bool,
    /// Root under which every endpoint topic is created.
    pub topic_path_root: String,
    /// Default poll period in milliseconds. Zero disables scheduled polling.
    #[serde(default = "default_poll_period_ms")]
    pub poll_period_ms: u64,
    /// Endpoints of the service.
    #[serde(default)]
    pub endpoints: Vec<EndpointDescriptor>,
    /// Optional basic authentication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,
}

impl ServiceDescriptor {
    /// Creates a secure service on port 443 with the default poll period and no endpoints.
    pub fn new(name: impl Into<String>, host: impl Into<String>, topic_path_root: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: DEFAULT_PORT,
            secure: true,
            topic_path_root: topic_path_root.into(),
            poll_period_ms: DEFAULT_POLL_PERIOD_MS,
            endpoints: Vec::new(),
            credentials: None,
        }
    }

    /// Sets the origin port and scheme.
    pub fn with_origin(mut self, port: u16, secure: bool) -> Self {
        self.port = port;
        self.secure = secure;
        self
    }

    /// Sets the default poll period.
    pub fn with_poll_period(mut self, period: Duration) -> Self {
        self.poll_period_ms = period.as_millis() as u64;
        self
    }

    /// Appends an endpoint.
    pub fn with_endpoint(mut self, endpoint: EndpointDescriptor) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Sets the basic authentication credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// The service's default poll period.
    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }

    /// The endpoint's own period if it has one, else the service default.
    pub fn effective_period(&self, endpoint: &EndpointDescriptor) -> Duration {
        Duration::from_millis(endpoint.poll_period_ms.unwrap_or(self.poll_period_ms))
    }

    /// Full topic path of an endpoint.
    pub fn topic_path(&self, endpoint: &EndpointDescriptor) -> String {
        format!(
            "{}/{}",
            self.topic_path_root.trim_end_matches('/'),
            endpoint.topic_path.trim_start_matches('/')
        )
    }

    /// Scheme, host and port of the origin, e.g. `https://example.com:443`.
    pub fn origin(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }
}

impl fmt::Display for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.origin())
    }
}
