//! # Metrics Listeners
//!
//! Passive observers of the polling pipeline. The engine calls a
//! `MetricsListener` at every interesting step and never looks at what the
//! listener does: every method has an empty default body, returns nothing and
//! must not block.
//!
//! ## Events
//!
//! - **Poll**: request issued, response received, request failed, response
//!   rejected (content type mismatch or undecodable body).
//! - **Topic creation**: requested, created (or already present), failed.
//! - **Publication**: requested (with the encoded size), published, failed.
//! - **Service**: became active, went to standby, was removed.
//!
//! ## Contained Modules:
//! - **`collector`**: `CountingMetricsCollector`, lock-free counters with a
//!   serialisable snapshot.

use std::sync::Arc;

use crate::error::{AdapterError, TopicFailureReason};
use crate::topics::TopicType;

/// Lock-free counting listener.
pub mod collector;

pub use collector::{CountingMetricsCollector, MetricsSummary};

/// # Metrics Listener
#[allow(unused_variables)]
pub trait MetricsListener: Send + Sync {
    /// A request for the endpoint is about to be sent.
    fn on_poll_request(&self, service: &str, endpoint: &str) {}

    /// The endpoint answered with a 2xx status.
    fn on_poll_success(&self, service: &str, endpoint: &str, status: u16) {}

    /// The request failed or returned a non-2xx status.
    fn on_poll_failure(&self, service: &str, endpoint: &str, error: &AdapterError) {}

    /// A response was received but could not be validated or decoded.
    fn on_response_rejected(&self, service: &str, endpoint: &str, error: &AdapterError) {}

    /// The broker is about to be asked for a topic.
    fn on_topic_creation_request(&self, path: &str, topic_type: TopicType) {}

    /// The topic was created or already existed.
    fn on_topic_created(&self, path: &str) {}

    /// The broker refused the topic.
    fn on_topic_creation_failed(&self, path: &str, reason: TopicFailureReason) {}

    /// A value of `size` bytes is about to be published.
    fn on_publication_request(&self, path: &str, size: usize) {}

    /// The value was accepted by the gateway.
    fn on_published(&self, path: &str) {}

    /// The gateway rejected the value.
    fn on_publication_failed(&self, path: &str, error: &AdapterError) {}

    /// This node became responsible for polling the service.
    fn on_service_active(&self, service: &str) {}

    /// Another node took over the service.
    fn on_service_standby(&self, service: &str) {}

    /// The service was closed.
    fn on_service_removed(&self, service: &str) {}
}

/// A listener that ignores everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsListener for NoopMetrics {}

/// # Metrics Dispatcher
///
/// Fans every event out to a list of listeners, in registration order.
#[derive(Default, Clone)]
pub struct MetricsDispatcher {
    listeners: Vec<Arc<dyn MetricsListener>>,
}

impl MetricsDispatcher {
    /// A dispatcher without listeners.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a listener.
    pub fn with(mut self, listener: Arc<dyn MetricsListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// True when no listener is registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    fn each(&self, f: impl Fn(&dyn MetricsListener)) {
        for listener in &self.listeners {
            f(listener.as_ref());
        }
    }
}

impl MetricsListener for MetricsDispatcher {
    fn on_poll_request(&self, service: &str, endpoint: &str) {
        self.each(|l| l.on_poll_request(service, endpoint));
    }

    fn on_poll_success(&self, service: &str, endpoint: &str, status: u16) {
        self.each(|l| l.on_poll_success(service, endpoint, status));
    }

    fn on_poll_failure(&self, service: &str, endpoint: &str, error: &AdapterError) {
        self.each(|l| l.on_poll_failure(service, endpoint, error));
    }

    fn on_response_rejected(&self, service: &str, endpoint: &str, error: &AdapterError) {
        self.each(|l| l.on_response_rejected(service, endpoint, error));
    }

    fn on_topic_creation_request(&self, path: &str, topic_type: TopicType) {
        self.each(|l| l.on_topic_creation_request(path, topic_type));
    }

    fn on_topic_created(&self, path: &str) {
        self.each(|l| l.on_topic_created(path));
    }

    fn on_topic_creation_failed(&self, path: &str, reason: TopicFailureReason) {
        self.each(|l| l.on_topic_creation_failed(path, reason));
    }

    fn on_publication_request(&self, path: &str, size: usize) {
        self.each(|l| l.on_publication_request(path, size));
    }

    fn on_published(&self, path: &str) {
        self.each(|l| l.on_published(path));
    }

    fn on_publication_failed(&self, path: &str, error: &AdapterError) {
        self.each(|l| l.on_publication_failed(path, error));
    }

    fn on_service_active(&self, service: &str) {
        self.each(|l| l.on_service_active(service));
    }

    fn on_service_standby(&self, service: &str) {
        self.each(|l| l.on_service_standby(service));
    }

    fn on_service_removed(&self, service: &str) {
        self.each(|l| l.on_service_removed(service));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatcher_forwards_to_every_listener() {
        let first = Arc::new(CountingMetricsCollector::new());
        let second = Arc::new(CountingMetricsCollector::new());
        let dispatcher = MetricsDispatcher::new()
            .with(first.clone())
            .with(Arc::new(NoopMetrics))
            .with(second.clone());
        assert_eq!(dispatcher.len(), 3);

        dispatcher.on_poll_request("svc", "a");
        dispatcher.on_topic_creation_failed("rest/a", TopicFailureReason::InvalidPath);

        for collector in [first, second] {
            let summary = collector.summary();
            assert_eq!(summary.poll_requests, 1);
            assert_eq!(summary.topic_creation_failures, 1);
        }
    }
}
