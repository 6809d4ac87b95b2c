use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;
use tokio::sync::watch;

use super::{AddTopicOutcome, RetentionPolicy, TopicDirectory, TopicSpecification, TopicType};
use crate::error::{AdapterError, AdapterResult, TopicFailureReason};
use crate::metrics::MetricsListener;

/// # Topic Lifecycle Manager
///
/// Creates endpoint topics idempotently and removes them without making the
/// caller wait. Shared by every session of the adapter.
///
/// A creation waits for any removal still pending at the same path, so a
/// session restarted right after a stop never has its fresh topic deleted by
/// the old removal.
#[derive(Clone)]
pub struct TopicLifecycleManager {
    directory: Arc<dyn TopicDirectory>,
    metrics: Arc<dyn MetricsListener>,
    removals: Arc<Mutex<PendingRemovals>>,
}

/// Removals requested but not yet finished, by topic path.
#[derive(Default)]
struct PendingRemovals {
    next_id: u64,
    by_path: HashMap<String, PendingRemoval>,
}

struct PendingRemoval {
    id: u64,
    done: watch::Receiver<bool>,
}

impl TopicLifecycleManager {
    /// Creates a manager over a broker's topic directory.
    pub fn new(directory: Arc<dyn TopicDirectory>, metrics: Arc<dyn MetricsListener>) -> Self {
        Self {
            directory,
            metrics,
            removals: Arc::new(Mutex::new(PendingRemovals::default())),
        }
    }

    /// Waits until the latest removal requested for `path` has finished.
    async fn await_pending_removal(&self, path: &str) {
        let pending = self.removals.lock().by_path.get(path).map(|p| p.done.clone());
        if let Some(mut done) = pending {
            // A dropped sender means the removal task is gone; nothing left to wait for.
            let _ = done.wait_for(|finished| *finished).await;
        }
    }

    /// Makes sure a topic of `topic_type` exists at `path`.
    ///
    /// An existing compatible topic counts as success, so this is safe to call
    /// before every publication.
    ///
    /// # Errors
    /// `AdapterError::TopicCreationFailed` with the folded broker reason.
    pub async fn ensure_topic(
        &self,
        path: &str,
        topic_type: TopicType,
        retention: RetentionPolicy,
    ) -> AdapterResult<()> {
        self.metrics.on_topic_creation_request(path, topic_type);
        self.await_pending_removal(path).await;

        let specification = TopicSpecification::new(topic_type, retention);
        match self.directory.add_topic(path, &specification).await {
            Ok(outcome) => {
                if outcome == AddTopicOutcome::Created {
                    debug!("Created {} topic {}", topic_type, path);
                }
                self.metrics.on_topic_created(path);
                Ok(())
            }
            Err(cause) => {
                let reason = TopicFailureReason::from(&cause);
                warn!("Failed to create topic {}: {} ({})", path, reason, cause);
                self.metrics.on_topic_creation_failed(path, reason);
                Err(AdapterError::TopicCreationFailed {
                    path: path.to_string(),
                    reason,
                })
            }
        }
    }

    /// Requests removal of the topic at `path` and returns immediately.
    /// Failures are only logged.
    ///
    /// The removal is registered before this returns; removals of the same
    /// path run in request order.
    pub fn remove_topic(&self, path: &str) {
        let path = path.to_string();
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No runtime available to remove topic {}", path);
                return;
            }
        };

        let (finished, done) = watch::channel(false);
        let (id, previous) = {
            let mut removals = self.removals.lock();
            let id = removals.next_id;
            removals.next_id += 1;
            let previous = removals
                .by_path
                .insert(path.clone(), PendingRemoval { id, done })
                .map(|p| p.done);
            (id, previous)
        };

        let directory = self.directory.clone();
        let removals = self.removals.clone();
        runtime.spawn(async move {
            if let Some(mut previous) = previous {
                let _ = previous.wait_for(|finished| *finished).await;
            }
            match directory.remove_topics(&path).await {
                Ok(removed) => debug!("Removed {} topic(s) at {}", removed, path),
                Err(detail) => warn!(
                    "{}",
                    AdapterError::TopicRemovalFailed {
                        path: path.clone(),
                        detail
                    }
                ),
            }
            {
                let mut removals = removals.lock();
                if removals.by_path.get(&path).is_some_and(|p| p.id == id) {
                    removals.by_path.remove(&path);
                }
            }
            let _ = finished.send(true);
        });
    }

    #[cfg(test)]
    fn pending_removals(&self) -> usize {
        self.removals.lock().by_path.len()
    }
}
