//! # Topics Module
//!
//! Broker topics as seen by the polling engine: their type and retention,
//! the `TopicDirectory` contract a broker implements to create and remove
//! them, and the `TopicLifecycleManager` which folds broker outcomes into the
//! adapter's closed failure taxonomy.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::TopicFailureReason;

/// Idempotent topic creation and fire-and-forget removal.
pub mod lifecycle;

pub use lifecycle::TopicLifecycleManager;

/// # Topic Type
///
/// The value type a broker topic holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TopicType {
    /// JSON values.
    Json,
    /// UTF-8 strings.
    String,
    /// Opaque bytes.
    Binary,
}

impl fmt::Display for TopicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TopicType::Json => "JSON",
            TopicType::String => "STRING",
            TopicType::Binary => "BINARY",
        })
    }
}

/// # Retention Policy
///
/// When the broker may reclaim an endpoint topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetentionPolicy {
    /// Remove the topic once it has had no update for `after`.
    RemoveWhenUnused {
        /// Idle time before removal.
        after: Duration,
    },
    /// Keep the topic until the session that created it closes.
    PinnedToSession,
}

impl RetentionPolicy {
    /// Reclaim after twice the poll period, or pin when the endpoint is never
    /// polled on a schedule.
    pub fn for_poll_period(period: Duration) -> Self {
        if period.is_zero() {
            RetentionPolicy::PinnedToSession
        } else {
            RetentionPolicy::RemoveWhenUnused { after: period * 2 }
        }
    }
}

/// The retention strategy chosen in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TopicRetention {
    /// `RetentionPolicy::for_poll_period`.
    #[default]
    RemoveWhenUnused,
    /// Always pin topics to the adapter's broker session.
    PinnedToSession,
}

impl TopicRetention {
    /// The policy for an endpoint polled every `period`.
    pub fn policy(self, period: Duration) -> RetentionPolicy {
        match self {
            TopicRetention::RemoveWhenUnused => RetentionPolicy::for_poll_period(period),
            TopicRetention::PinnedToSession => RetentionPolicy::PinnedToSession,
        }
    }
}

/// # Topic Specification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TopicSpecification {
    /// The value type.
    pub topic_type: TopicType,
    /// When the topic may be reclaimed.
    pub retention: RetentionPolicy,
}

impl TopicSpecification {
    /// Creates a specification.
    pub fn new(topic_type: TopicType, retention: RetentionPolicy) -> Self {
        Self { topic_type, retention }
    }
}

/// Successful outcome of a topic creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddTopicOutcome {
    /// The topic did not exist and was created.
    Created,
    /// A topic with a compatible specification was already present.
    Exists,
}

/// # Broker Failure Reason
///
/// The reasons a broker gives for refusing a topic. Richer than
/// `TopicFailureReason`, into which it is folded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BrokerFailReason {
    /// A topic with a different specification exists at the path.
    #[error("a topic with a different specification exists")]
    ExistsMismatch,
    /// The path is malformed.
    #[error("invalid path")]
    InvalidPath,
    /// The specification is malformed or unsupported.
    #[error("invalid topic details")]
    InvalidDetails,
    /// The adapter's session may not create topics there.
    #[error("permission denied")]
    PermissionsFailure,
    /// The broker's topic limit was reached.
    #[error("topic license limit exceeded")]
    ExceededLicenseLimit,
    /// Ownership of the path moved to another cluster member mid-request.
    #[error("cluster repartition")]
    ClusterRepartition,
    /// Anything else.
    #[error("{0}")]
    Unexpected(String),
}

impl From<&BrokerFailReason> for TopicFailureReason {
    fn from(cause: &BrokerFailReason) -> Self {
        match cause {
            BrokerFailReason::ExistsMismatch => TopicFailureReason::IncompatibleExisting,
            BrokerFailReason::InvalidPath => TopicFailureReason::InvalidPath,
            BrokerFailReason::InvalidDetails => TopicFailureReason::InvalidSpecification,
            BrokerFailReason::ExceededLicenseLimit => TopicFailureReason::LicenseLimitExceeded,
            BrokerFailReason::PermissionsFailure
            | BrokerFailReason::ClusterRepartition
            | BrokerFailReason::Unexpected(_) => TopicFailureReason::Unexpected,
        }
    }
}

/// # Topic Directory
///
/// The topic control surface of a broker.
#[async_trait]
pub trait TopicDirectory: Send + Sync {
    /// Creates a topic, or reports `Exists` when an identical one is present.
    async fn add_topic(
        &self,
        path: &str,
        specification: &TopicSpecification,
    ) -> Result<AddTopicOutcome, BrokerFailReason>;

    /// Removes the topic at `path` and every topic below it, returning how
    /// many were removed.
    async fn remove_topics(&self, path: &str) -> Result<usize, String>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retention_defaults_to_twice_the_period() {
        assert_eq!(
            RetentionPolicy::for_poll_period(Duration::from_secs(30)),
            RetentionPolicy::RemoveWhenUnused {
                after: Duration::from_secs(60)
            }
        );
        assert_eq!(
            RetentionPolicy::for_poll_period(Duration::ZERO),
            RetentionPolicy::PinnedToSession
        );
        assert_eq!(
            TopicRetention::PinnedToSession.policy(Duration::from_secs(30)),
            RetentionPolicy::PinnedToSession
        );
    }

    #[test]
    fn broker_reasons_fold_into_the_closed_taxonomy() {
        let fold = |cause: BrokerFailReason| TopicFailureReason::from(&cause);
        assert_eq!(fold(BrokerFailReason::ExistsMismatch), TopicFailureReason::IncompatibleExisting);
        assert_eq!(fold(BrokerFailReason::InvalidDetails), TopicFailureReason::InvalidSpecification);
        assert_eq!(fold(BrokerFailReason::ExceededLicenseLimit), TopicFailureReason::LicenseLimitExceeded);
        assert_eq!(fold(BrokerFailReason::ClusterRepartition), TopicFailureReason::Unexpected);
        assert_eq!(fold(BrokerFailReason::Unexpected("boom".into())), TopicFailureReason::Unexpected);
    }
}
