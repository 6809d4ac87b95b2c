//! # Data Retrieval Module
//!
//! The contract the polling engine uses to perform one GET against an
//! endpoint, plus the response container handed to the decoding stage.
//!
//! ## Contained Modules:
//!
//! - **`reqwest_client`** (feature `retrieve`): the production
//!   `EndpointClient` built on `reqwest` and `reqwest-middleware`.
//!
//! Anything implementing `EndpointClient` can drive a `ServiceSession`; the
//! tests in this crate use hand-written doubles.

use async_trait::async_trait;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};

use crate::error::RequestError;
use crate::model::{EndpointDescriptor, ServiceDescriptor};

/// Production HTTP client with retry middleware.
#[cfg(feature = "retrieve")]
pub mod reqwest_client;

#[cfg(feature = "retrieve")]
pub use reqwest_client::{ReqwestEndpointClient, ReqwestEndpointClientOptions};

/// # Endpoint Response
///
/// The status, headers and raw body of one endpoint response.
#[derive(Debug, Clone)]
pub struct EndpointResponse {
    /// The numeric HTTP status code.
    pub status: u16,
    /// The headers returned by the server.
    pub headers: HeaderMap,
    /// The undecoded body.
    pub body: Bytes,
}

impl EndpointResponse {
    /// Creates a response from its parts.
    pub fn new(status: u16, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// A `200 OK` response with an optional content type.
    pub fn ok(content_type: Option<&str>, body: impl Into<Bytes>) -> Self {
        let mut headers = HeaderMap::new();
        if let Some(value) = content_type.and_then(|ct| HeaderValue::from_str(ct).ok()) {
            headers.insert(CONTENT_TYPE, value);
        }
        Self::new(200, headers, body)
    }

    /// The `Content-Type` header, if present and readable.
    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|value| value.to_str().ok())
    }

    /// True for 2xx status codes.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// # Endpoint Client
///
/// Performs a single GET request for an endpoint of a service. Implementations
/// must not retry on behalf of the poller beyond their own transport policy;
/// the next scheduled tick is the retry.
#[async_trait]
pub trait EndpointClient: Send + Sync {
    /// Requests the endpoint once.
    async fn request(
        &self,
        service: &ServiceDescriptor,
        endpoint: &EndpointDescriptor,
    ) -> Result<EndpointResponse, RequestError>;
}
