//! # Adapter Errors
//!
//! The error taxonomy shared by every stage of the polling pipeline.
//!
//! Nearly all of these errors are *local-recovery* errors: the session logs
//! them, reports them to the metrics listeners and simply waits for the next
//! scheduled poll of the affected endpoint. The exceptions are the
//! configuration-time contract violations (`UnknownType`,
//! `DuplicateIdentifier`, `EndpointConflict`) which are returned to the caller
//! that is building the session, so a bad configuration fails fast instead of
//! being silently defaulted.

use serde::Serialize;
use thiserror::Error;

use crate::endpoints::EndpointType;

/// Convenience alias used across the crate.
pub type AdapterResult<T> = Result<T, AdapterError>;

/// # Request Error
///
/// Failure reported by an endpoint client for a single GET request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// The connection could not be established or broke mid-request.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request did not complete within the configured timeout.
    #[error("request timed out")]
    Timeout,

    /// The server answered with a non-2xx status code.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The request was abandoned because the endpoint was stopped.
    #[error("request cancelled")]
    Cancelled,
}

/// # Topic Failure Reason
///
/// The closed set of reasons a topic could not be created. Broker specific
/// causes are folded into these by the `TopicLifecycleManager`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TopicFailureReason {
    /// The topic path is not acceptable to the broker.
    #[error("invalid topic path")]
    InvalidPath,

    /// A topic already exists at the path with a different specification.
    #[error("incompatible existing topic")]
    IncompatibleExisting,

    /// The broker refused to create more topics.
    #[error("license limit exceeded")]
    LicenseLimitExceeded,

    /// The topic specification was rejected.
    #[error("invalid topic specification")]
    InvalidSpecification,

    /// Anything else, including transient broker conditions.
    #[error("unexpected failure")]
    Unexpected,
}

impl TopicFailureReason {
    /// Only unexpected failures are worth retrying; the others keep failing
    /// until an operator changes the configuration or the broker.
    pub fn is_transient(self) -> bool {
        matches!(self, TopicFailureReason::Unexpected)
    }
}

/// # Adapter Error
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    /// A "produces" identifier that no endpoint type is registered for.
    #[error("Unknown endpoint type {0}")]
    UnknownType(String),

    /// Two endpoint types claim the same identifier.
    #[error("The identifier {identifier} is registered for more than one endpoint type")]
    DuplicateIdentifier {
        /// The identifier registered twice.
        identifier: String,
    },

    /// An endpoint with the same name but a different definition already belongs to the service.
    #[error("Endpoint {endpoint} conflicts with an existing endpoint of service {service}")]
    EndpointConflict {
        /// Owning service.
        service: String,
        /// Conflicting endpoint name.
        endpoint: String,
    },

    /// The HTTP request for an endpoint failed.
    #[error("Request failed: {0}")]
    RequestFailed(#[from] RequestError),

    /// The declared endpoint type cannot handle the observed content type.
    #[error("The content type {observed} is not suitable for an endpoint producing {declared}")]
    ContentTypeMismatch {
        /// The endpoint's effective type.
        declared: EndpointType,
        /// The content type reported by the server.
        observed: String,
    },

    /// The body could not be parsed as the resolved endpoint type.
    #[error("Failed to decode the response as {endpoint_type}: {detail}")]
    DecodeFailed {
        /// The type the body was decoded as.
        endpoint_type: EndpointType,
        /// Parser message.
        detail: String,
    },

    /// The broker refused to create the endpoint's topic.
    #[error("Topic creation failed for {path}: {reason}")]
    TopicCreationFailed {
        /// Full topic path.
        path: String,
        /// Folded failure reason.
        reason: TopicFailureReason,
    },

    /// The broker failed to remove a topic. Logged only.
    #[error("Topic removal failed for {path}: {detail}")]
    TopicRemovalFailed {
        /// Topic path or selector.
        path: String,
        /// Broker message.
        detail: String,
    },

    /// The gateway could not publish a value.
    #[error("Publication failed for {path}: {detail}")]
    PublicationFailed {
        /// Full topic path.
        path: String,
        /// Gateway message.
        detail: String,
    },
}

impl AdapterError {
    /// Whether the next scheduled poll can reasonably be expected to succeed
    /// without an operator changing anything.
    pub fn is_transient(&self) -> bool {
        match self {
            AdapterError::RequestFailed(_)
            | AdapterError::ContentTypeMismatch { .. }
            | AdapterError::DecodeFailed { .. }
            | AdapterError::PublicationFailed { .. }
            | AdapterError::TopicRemovalFailed { .. } => true,
            AdapterError::TopicCreationFailed { reason, .. } => reason.is_transient(),
            AdapterError::UnknownType(_)
            | AdapterError::DuplicateIdentifier { .. }
            | AdapterError::EndpointConflict { .. } => false,
        }
    }
}
