use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, info};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::endpoints::{EndpointType, TopicValue};
use crate::error::{AdapterError, AdapterResult};
use crate::model::{EndpointDescriptor, ServiceDescriptor};
use crate::publication::{PublicationGateway, ServiceRegistration, UpdateContext};
use crate::topics::{AddTopicOutcome, BrokerFailReason, RetentionPolicy, TopicDirectory, TopicSpecification, TopicType};

/// # Broker Options
#[derive(Debug, Clone)]
pub struct LocalBrokerOptions {
    /// Activate services as soon as they are added, as a single-node
    /// deployment would.
    pub auto_activate: bool,
    /// Maximum number of topics, unlimited when `None`.
    pub max_topics: Option<usize>,
    /// Capacity of the update channel per subscriber.
    pub update_capacity: usize,
}

impl Default for LocalBrokerOptions {
    fn default() -> Self {
        Self {
            auto_activate: true,
            max_topics: None,
            update_capacity: 1024,
        }
    }
}

/// A topic and its current value.
#[derive(Debug, Clone, PartialEq)]
pub struct Topic {
    /// Value type.
    pub topic_type: TopicType,
    /// When the topic may be reclaimed.
    pub retention: RetentionPolicy,
    /// Last published value.
    pub value: Option<TopicValue>,
    /// Creation or last publication time.
    pub last_update: Instant,
}

/// A value accepted by a topic.
#[derive(Debug, Clone)]
pub struct TopicUpdate {
    /// Topic path.
    pub path: String,
    /// The new value, shared by every subscriber.
    pub value: Arc<TopicValue>,
}

struct ServiceEntry {
    active: bool,
    registration: Arc<ServiceRegistration>,
}

/// Topics and their subscribers, shared with the update contexts.
struct TopicStore {
    topics: RwLock<BTreeMap<String, Topic>>,
    updates: broadcast::Sender<TopicUpdate>,
}

/// # Local Broker
pub struct LocalBroker {
    options: LocalBrokerOptions,
    services: RwLock<HashMap<String, ServiceEntry>>,
    store: Arc<TopicStore>,
}

impl Default for LocalBroker {
    fn default() -> Self {
        Self::new()
    }
}

/// Non-empty `/`-separated segments without control characters.
fn is_valid_path(path: &str) -> bool {
    !path.is_empty()
        && path.split('/').all(|segment| !segment.is_empty())
        && !path.chars().any(char::is_control)
}

impl LocalBroker {
    /// A broker with default options.
    pub fn new() -> Self {
        Self::with_options(LocalBrokerOptions::default())
    }

    /// A broker with the given options.
    pub fn with_options(options: LocalBrokerOptions) -> Self {
        let (updates, _) = broadcast::channel(options.update_capacity.max(1));
        Self {
            options,
            services: RwLock::new(HashMap::new()),
            store: Arc::new(TopicStore {
                topics: RwLock::new(BTreeMap::new()),
                updates,
            }),
        }
    }

    /// Makes this node responsible for a service and runs its active hook.
    /// Returns false if the service is unknown or already active.
    pub fn activate(&self, name: &str) -> bool {
        let registration = {
            let mut services = self.services.write();
            match services.get_mut(name) {
                Some(entry) if !entry.active => {
                    entry.active = true;
                    entry.registration.clone()
                }
                _ => return false,
            }
        };
        info!("Service {} is active", name);
        registration.activate();
        true
    }

    /// Hands a service over to another node and runs its standby hook.
    /// Returns false if the service is unknown or not active.
    pub fn standby(&self, name: &str) -> bool {
        let registration = {
            let mut services = self.services.write();
            match services.get_mut(name) {
                Some(entry) if entry.active => {
                    entry.active = false;
                    entry.registration.clone()
                }
                _ => return false,
            }
        };
        info!("Service {} is on standby", name);
        registration.standby();
        true
    }

    /// True if the service is registered and active here.
    pub fn is_active(&self, name: &str) -> bool {
        self.services.read().get(name).is_some_and(|entry| entry.active)
    }

    /// Names of the registered services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Receives every value accepted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TopicUpdate> {
        self.store.updates.subscribe()
    }

    /// A copy of the topic at `path`.
    pub fn topic(&self, path: &str) -> Option<Topic> {
        self.store.topics.read().get(path).cloned()
    }

    /// The current value of the topic at `path`.
    pub fn value(&self, path: &str) -> Option<TopicValue> {
        self.store.topics.read().get(path).and_then(|topic| topic.value.clone())
    }

    /// Every topic path, sorted.
    pub fn topic_paths(&self) -> Vec<String> {
        self.store.topics.read().keys().cloned().collect()
    }

    /// Removes every `RemoveWhenUnused` topic idle for at least its retention
    /// time at `now`, returning the removed paths.
    pub fn sweep_unused(&self, now: Instant) -> Vec<String> {
        let mut topics = self.store.topics.write();
        let expired: Vec<String> = topics
            .iter()
            .filter(|(_, topic)| match topic.retention {
                RetentionPolicy::RemoveWhenUnused { after } => now.saturating_duration_since(topic.last_update) >= after,
                RetentionPolicy::PinnedToSession => false,
            })
            .map(|(path, _)| path.clone())
            .collect();
        for path in &expired {
            topics.remove(path);
            debug!("Removed unused topic {}", path);
        }
        expired
    }

    /// Closes the broker session: every service registration ends, running
    /// its close hook, and every pinned topic is released.
    pub fn close(&self) {
        let closed: Vec<(String, ServiceEntry)> = self.services.write().drain().collect();
        for (name, entry) in closed {
            debug!("Closing service {}", name);
            entry.registration.close();
        }

        let mut topics = self.store.topics.write();
        let before = topics.len();
        topics.retain(|_, topic| topic.retention != RetentionPolicy::PinnedToSession);
        info!("Broker closed; released {} pinned topic(s)", before - topics.len());
    }
}

#[async_trait]
impl TopicDirectory for LocalBroker {
    async fn add_topic(
        &self,
        path: &str,
        specification: &TopicSpecification,
    ) -> Result<AddTopicOutcome, BrokerFailReason> {
        if !is_valid_path(path) {
            return Err(BrokerFailReason::InvalidPath);
        }

        let mut topics = self.store.topics.write();
        if let Some(existing) = topics.get(path) {
            return if existing.topic_type == specification.topic_type && existing.retention == specification.retention {
                Ok(AddTopicOutcome::Exists)
            } else {
                Err(BrokerFailReason::ExistsMismatch)
            };
        }
        if self.options.max_topics.is_some_and(|max| topics.len() >= max) {
            return Err(BrokerFailReason::ExceededLicenseLimit);
        }

        topics.insert(
            path.to_string(),
            Topic {
                topic_type: specification.topic_type,
                retention: specification.retention,
                value: None,
                last_update: Instant::now(),
            },
        );
        Ok(AddTopicOutcome::Created)
    }

    async fn remove_topics(&self, path: &str) -> Result<usize, String> {
        let prefix = format!("{}/", path);
        let mut topics = self.store.topics.write();
        let before = topics.len();
        topics.retain(|candidate, _| candidate != path && !candidate.starts_with(&prefix));
        Ok(before - topics.len())
    }
}

impl PublicationGateway for LocalBroker {
    fn add_service(&self, service: &ServiceDescriptor, registration: ServiceRegistration) {
        let replaced = self.services.write().insert(
            service.name.clone(),
            ServiceEntry {
                active: false,
                registration: Arc::new(registration),
            },
        );
        if let Some(previous) = replaced {
            previous.registration.close();
        }
        if self.options.auto_activate {
            self.activate(&service.name);
        }
    }

    fn remove_service(&self, name: &str) {
        let removed = self.services.write().remove(name);
        if let Some(entry) = removed {
            debug!("Removed service {}", name);
            entry.registration.close();
        }
    }

    fn for_service(&self, service: &ServiceDescriptor, action: &mut dyn FnMut()) -> bool {
        let services = self.services.read();
        match services.get(&service.name) {
            Some(entry) if entry.active => {
                action();
                true
            }
            _ => false,
        }
    }

    fn create_update_context(
        &self,
        service: &ServiceDescriptor,
        endpoint: &EndpointDescriptor,
        endpoint_type: EndpointType,
    ) -> AdapterResult<Box<dyn UpdateContext>> {
        Ok(Box::new(LocalUpdateContext {
            store: self.store.clone(),
            path: service.topic_path(endpoint),
            topic_type: endpoint_type.topic_type(),
        }))
    }
}

/// Publishes to one topic of a `LocalBroker`.
struct LocalUpdateContext {
    store: Arc<TopicStore>,
    path: String,
    topic_type: TopicType,
}

impl UpdateContext for LocalUpdateContext {
    fn path(&self) -> &str {
        &self.path
    }

    fn publish(&self, value: TopicValue) -> AdapterResult<()> {
        let failed = |detail: String| AdapterError::PublicationFailed {
            path: self.path.clone(),
            detail,
        };
        if value.topic_type() != self.topic_type {
            return Err(failed(format!(
                "a {} value cannot be published by a {} context",
                value.topic_type(),
                self.topic_type
            )));
        }

        let mut topics = self.store.topics.write();
        let topic = topics
            .get_mut(&self.path)
            .ok_or_else(|| failed("no such topic".to_string()))?;
        if topic.topic_type != self.topic_type {
            return Err(failed(format!("the topic holds {} values", topic.topic_type)));
        }

        let value = Arc::new(value);
        topic.value = Some(value.as_ref().clone());
        topic.last_update = Instant::now();
        drop(topics);

        // No subscribers is not an error.
        let _ = self.store.updates.send(TopicUpdate {
            path: self.path.clone(),
            value,
        });
        Ok(())
    }
}
