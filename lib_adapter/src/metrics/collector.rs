//! # Counting Metrics Collector
//!
//! A `MetricsListener` keeping one `AtomicU64` per event kind. Many poller
//! tasks report concurrently, so counters are updated without locks and read
//! back as a point-in-time `MetricsSummary` (individual counters are exact,
//! the snapshot as a whole is not atomic).

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

use super::MetricsListener;
use crate::error::{AdapterError, TopicFailureReason};
use crate::topics::TopicType;

/// # Metrics Summary
///
/// Snapshot of the counters, serialisable for periodic log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSummary {
    /// Requests issued.
    pub poll_requests: u64,
    /// 2xx responses received.
    pub poll_successes: u64,
    /// Transport failures and non-2xx responses.
    pub poll_failures: u64,
    /// Responses rejected by validation or decoding.
    pub responses_rejected: u64,
    /// Topic creation requests.
    pub topic_creation_requests: u64,
    /// Topics created or found already present.
    pub topics_created: u64,
    /// Topic creation failures.
    pub topic_creation_failures: u64,
    /// Values handed to the gateway.
    pub publication_requests: u64,
    /// Bytes handed to the gateway.
    pub published_bytes: u64,
    /// Values accepted by the gateway.
    pub publications: u64,
    /// Values rejected by the gateway.
    pub publication_failures: u64,
    /// Services activated on this node.
    pub services_activated: u64,
    /// Services sent to standby.
    pub services_on_standby: u64,
    /// Services closed.
    pub services_removed: u64,
}

/// # Counting Metrics Collector
#[derive(Debug, Default)]
pub struct CountingMetricsCollector {
    poll_requests: AtomicU64,
    poll_successes: AtomicU64,
    poll_failures: AtomicU64,
    responses_rejected: AtomicU64,
    topic_creation_requests: AtomicU64,
    topics_created: AtomicU64,
    topic_creation_failures: AtomicU64,
    publication_requests: AtomicU64,
    published_bytes: AtomicU64,
    publications: AtomicU64,
    publication_failures: AtomicU64,
    services_activated: AtomicU64,
    services_on_standby: AtomicU64,
    services_removed: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl CountingMetricsCollector {
    /// All counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of every counter.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            poll_requests: read(&self.poll_requests),
            poll_successes: read(&self.poll_successes),
            poll_failures: read(&self.poll_failures),
            responses_rejected: read(&self.responses_rejected),
            topic_creation_requests: read(&self.topic_creation_requests),
            topics_created: read(&self.topics_created),
            topic_creation_failures: read(&self.topic_creation_failures),
            publication_requests: read(&self.publication_requests),
            published_bytes: read(&self.published_bytes),
            publications: read(&self.publications),
            publication_failures: read(&self.publication_failures),
            services_activated: read(&self.services_activated),
            services_on_standby: read(&self.services_on_standby),
            services_removed: read(&self.services_removed),
        }
    }
}

impl MetricsListener for CountingMetricsCollector {
    fn on_poll_request(&self, _service: &str, _endpoint: &str) {
        bump(&self.poll_requests);
    }

    fn on_poll_success(&self, _service: &str, _endpoint: &str, _status: u16) {
        bump(&self.poll_successes);
    }

    fn on_poll_failure(&self, _service: &str, _endpoint: &str, _error: &AdapterError) {
        bump(&self.poll_failures);
    }

    fn on_response_rejected(&self, _service: &str, _endpoint: &str, _error: &AdapterError) {
        bump(&self.responses_rejected);
    }

    fn on_topic_creation_request(&self, _path: &str, _topic_type: TopicType) {
        bump(&self.topic_creation_requests);
    }

    fn on_topic_created(&self, _path: &str) {
        bump(&self.topics_created);
    }

    fn on_topic_creation_failed(&self, _path: &str, _reason: TopicFailureReason) {
        bump(&self.topic_creation_failures);
    }

    fn on_publication_request(&self, _path: &str, size: usize) {
        bump(&self.publication_requests);
        self.published_bytes.fetch_add(size as u64, Ordering::Relaxed);
    }

    fn on_published(&self, _path: &str) {
        bump(&self.publications);
    }

    fn on_publication_failed(&self, _path: &str, _error: &AdapterError) {
        bump(&self.publication_failures);
    }

    fn on_service_active(&self, _service: &str) {
        bump(&self.services_activated);
    }

    fn on_service_standby(&self, _service: &str) {
        bump(&self.services_on_standby);
    }

    fn on_service_removed(&self, _service: &str) {
        bump(&self.services_removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn counts_concurrent_reports() {
        let collector = Arc::new(CountingMetricsCollector::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let collector = collector.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        collector.on_poll_request("svc", "a");
                        collector.on_publication_request("rest/a", 2);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let summary = collector.summary();
        assert_eq!(summary.poll_requests, 1000);
        assert_eq!(summary.publication_requests, 1000);
        assert_eq!(summary.published_bytes, 2000);
        assert_eq!(summary.publications, 0);
    }

    #[test]
    fn summary_serialises_with_field_names() {
        let collector = CountingMetricsCollector::new();
        collector.on_service_active("svc");
        let json = serde_json::to_value(collector.summary()).unwrap();
        assert_eq!(json["services_activated"], 1);
        assert_eq!(json["poll_failures"], 0);
    }
}
