//! # In-Process Broker
//!
//! `LocalBroker` implements both broker-facing contracts of the engine,
//! `TopicDirectory` and `PublicationGateway`, entirely in memory. The server
//! binary runs on it and the tests use it as a realistic collaborator.
//!
//! ## Features:
//! - **Typed Topics**: every topic has a `TopicSpecification`; publishing a
//!   value of another type is refused, and re-adding a path with a different
//!   specification reports a mismatch.
//! - **Limits**: an optional maximum topic count, reported as a license limit.
//! - **Retention**: `sweep_unused` reclaims idle `RemoveWhenUnused` topics and
//!   `close` releases every topic pinned to the broker session.
//! - **Active/Standby**: `activate` and `standby` drive the service hooks, as
//!   a cluster would when handing a service over.
//! - **Subscriptions**: every accepted value is fanned out on a Tokio
//!   broadcast channel.

/// The broker itself.
pub mod local;

pub use local::{LocalBroker, LocalBrokerOptions, Topic, TopicUpdate};
