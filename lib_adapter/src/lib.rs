//! # REST Topic Adapter Library
//!
//! Polls REST endpoints on a schedule and republishes their responses as
//! typed topics on a publish/subscribe broker.
//!
//! ## Pipeline
//!
//! A `ServiceSessionFactory` registers every configured service with the
//! broker's `PublicationGateway` and starts its `ServiceSession` only while
//! this node is active for it. The session runs one `EndpointPoller` per
//! endpoint; each poll result is typed by the `EndpointTypeResolver`, its
//! topic is ensured by the `TopicLifecycleManager`, and the decoded value is
//! published through the gateway. The `ServiceManager` reconciles the running
//! sessions with a new configuration.
//!
//! ## Features
//!
//! The pipeline itself is always compiled. Optional modules:
//!
//! - **`retrieve`**: `ReqwestEndpointClient`, the HTTP client with retry middleware.
//! - **`configs`**: the JSON5 adapter model and its validation.
//! - **`loggers`**: `fern` based stdout and file logging.
//! - **`full`**: all of the above.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, unused_qualifications)]

/// The in-process broker.
pub mod broker;
/// Endpoint types, inference and decoding.
pub mod endpoints;
/// The error taxonomy.
pub mod error;
/// Metrics listeners and the counting collector.
pub mod metrics;
/// Service and endpoint descriptors.
pub mod model;
/// The scheduled polling unit.
pub mod polling;
/// The broker's publishing surface.
pub mod publication;
/// Endpoint requests and responses.
pub mod retrieve;
/// Sessions, their factory and the service manager.
pub mod services;
/// Topic types, retention and lifecycle.
pub mod topics;

/// The JSON5 adapter model.
#[cfg(feature = "configs")]
pub mod configs;

/// Stdout and file logging.
#[cfg(feature = "loggers")]
pub mod loggers;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{AdapterError, AdapterResult};
