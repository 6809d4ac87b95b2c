//! # Service Session
//!
//! The orchestrator for one service. It owns the endpoint set, starts one
//! `EndpointPoller` per endpoint while running, and turns each poll result
//! into a publication:
//!
//! 1. drop the result if the session stopped or the endpoint was restarted;
//! 2. reject non-2xx responses as `RequestFailed`;
//! 3. resolve the endpoint type (an `auto` endpoint infers it from the first
//!    2xx response and keeps it), validate the content type, decode the body;
//! 4. ensure the topic exists;
//! 5. publish through the gateway, under the session lock and only while the
//!    session is still running.
//!
//! Every failure is logged, reported to the metrics listeners, and left for
//! the endpoint's next tick to retry.
//!
//! ## Concurrency
//!
//! The running flag and the endpoint table share one `parking_lot::Mutex`,
//! never held across an `.await`. Each started poller gets an epoch; results
//! carrying a stale epoch are discarded, which covers both `stop()` and a
//! stop/start cycle racing with a slow request.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use super::SessionContext;
use crate::endpoints::{EndpointType, Produces, TopicValue};
use crate::error::{AdapterError, AdapterResult, RequestError};
use crate::model::{EndpointDescriptor, ServiceDescriptor};
use crate::polling::{EndpointPoller, PollKind, PollResultHandler};
use crate::retrieve::EndpointResponse;
use crate::topics::RetentionPolicy;

/// # Service Session
pub struct ServiceSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    service: Arc<ServiceDescriptor>,
    context: SessionContext,
    state: Mutex<SessionState>,
}

#[derive(Default)]
struct SessionState {
    running: bool,
    /// Arena of endpoints; indices are stable for the session's lifetime.
    endpoints: Vec<EndpointEntry>,
    next_epoch: u64,
}

struct EndpointEntry {
    descriptor: Arc<EndpointDescriptor>,
    topic_path: String,
    period: Duration,
    /// Declared type, or the type inferred for an `auto` endpoint. Never
    /// changes once set.
    resolved: Option<EndpointType>,
    poller: Option<PollHandle>,
}

struct PollHandle {
    epoch: u64,
    poller: EndpointPoller,
}

/// A decoded value waiting for its topic.
struct Decoded {
    topic_path: String,
    endpoint_type: EndpointType,
    retention: RetentionPolicy,
    value: TopicValue,
}

impl SessionState {
    fn is_current(&self, index: usize, epoch: u64) -> bool {
        self.running
            && self
                .endpoints
                .get(index)
                .and_then(|entry| entry.poller.as_ref())
                .is_some_and(|handle| handle.epoch == epoch)
    }
}

impl ServiceSession {
    /// Creates a stopped session holding every endpoint of `service`.
    ///
    /// # Errors
    /// `AdapterError::UnknownType` for an endpoint whose "produces" value is
    /// not registered, `AdapterError::EndpointConflict` for two different
    /// endpoints sharing a name.
    pub fn new(service: ServiceDescriptor, context: SessionContext) -> AdapterResult<Self> {
        let endpoints = service.endpoints.clone();
        let session = Self {
            inner: Arc::new(SessionInner {
                service: Arc::new(service),
                context,
                state: Mutex::new(SessionState::default()),
            }),
        };
        for endpoint in endpoints {
            session.add_endpoint(endpoint)?;
        }
        Ok(session)
    }

    /// The service this session polls.
    pub fn service(&self) -> &ServiceDescriptor {
        &self.inner.service
    }

    /// True between `start()` and `stop()`.
    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Number of registered endpoints.
    pub fn endpoint_count(&self) -> usize {
        self.inner.state.lock().endpoints.len()
    }

    /// Number of endpoints with a live poller.
    pub fn active_pollers(&self) -> usize {
        self.inner
            .state
            .lock()
            .endpoints
            .iter()
            .filter(|entry| entry.poller.is_some())
            .count()
    }

    /// The effective type of an endpoint, `None` while an `auto` endpoint has
    /// not seen a successful response.
    pub fn resolved_type(&self, endpoint: &str) -> Option<EndpointType> {
        self.inner
            .state
            .lock()
            .endpoints
            .iter()
            .find(|entry| entry.descriptor.name == endpoint)
            .and_then(|entry| entry.resolved)
    }

    /// Starts polling every endpoint that has no poller yet. Must be called
    /// from within a Tokio runtime. Starting a running session does nothing.
    pub fn start(&self) {
        let mut state = self.inner.state.lock();
        if state.running {
            return;
        }
        state.running = true;
        info!(
            "Starting service {} with {} endpoint(s)",
            self.inner.service,
            state.endpoints.len()
        );
        for index in 0..state.endpoints.len() {
            if state.endpoints[index].poller.is_none() {
                self.inner.start_endpoint(&mut state, index);
            }
        }
    }

    /// Stops every poller and requests removal of every endpoint topic. Once
    /// this returns, nothing more is published for the service.
    pub fn stop(&self) {
        let mut state = self.inner.state.lock();
        if !state.running {
            return;
        }
        state.running = false;
        info!("Stopping service {}", self.inner.service);
        for entry in state.endpoints.iter_mut() {
            if let Some(handle) = entry.poller.take() {
                handle.poller.cancel();
            }
            self.inner.context.topics.remove_topic(&entry.topic_path);
        }
    }

    /// Adds an endpoint, starting it at once when the session is running.
    ///
    /// Returns `Ok(false)` if an equal endpoint is already registered.
    ///
    /// # Errors
    /// `AdapterError::UnknownType` for an unregistered "produces" value,
    /// `AdapterError::EndpointConflict` when a different endpoint already has
    /// the same name.
    pub fn add_endpoint(&self, descriptor: EndpointDescriptor) -> AdapterResult<bool> {
        let resolved = match self.inner.context.resolver.produces(&descriptor.produces)? {
            Produces::Auto => None,
            Produces::Declared(endpoint_type) => Some(endpoint_type),
        };

        let mut state = self.inner.state.lock();
        if let Some(existing) = state
            .endpoints
            .iter()
            .find(|entry| entry.descriptor.name == descriptor.name)
        {
            return if *existing.descriptor == descriptor {
                debug!("Endpoint {} of {} is already registered", descriptor.name, self.inner.service.name);
                Ok(false)
            } else {
                Err(AdapterError::EndpointConflict {
                    service: self.inner.service.name.clone(),
                    endpoint: descriptor.name,
                })
            };
        }

        state.endpoints.push(EndpointEntry {
            topic_path: self.inner.service.topic_path(&descriptor),
            period: self.inner.service.effective_period(&descriptor),
            descriptor: Arc::new(descriptor),
            resolved,
            poller: None,
        });
        if state.running {
            let index = state.endpoints.len() - 1;
            self.inner.start_endpoint(&mut state, index);
        }
        Ok(true)
    }
}

impl Drop for ServiceSession {
    fn drop(&mut self) {
        self.stop();
    }
}

impl SessionInner {
    fn start_endpoint(self: &Arc<Self>, state: &mut SessionState, index: usize) {
        let epoch = state.next_epoch;
        state.next_epoch += 1;

        let entry = &mut state.endpoints[index];
        let handler = Arc::new(EndpointResultHandler {
            session: Arc::downgrade(self),
            index,
            epoch,
        });
        debug!(
            "Polling {} of {} every {:?}",
            entry.descriptor.name, self.service.name, entry.period
        );
        let poller = EndpointPoller::start(
            self.service.clone(),
            entry.descriptor.clone(),
            entry.period,
            self.context.client.clone(),
            handler,
            self.context.metrics.clone(),
        );
        entry.poller = Some(PollHandle { epoch, poller });
    }

    async fn handle_result(&self, index: usize, epoch: u64, kind: PollKind, result: Result<EndpointResponse, RequestError>) {
        let decoded = match self.decode(index, epoch, kind, result) {
            Some(decoded) => decoded,
            None => return,
        };

        if let Err(e) = self
            .context
            .topics
            .ensure_topic(&decoded.topic_path, decoded.endpoint_type.topic_type(), decoded.retention)
            .await
        {
            self.log_failure(index, kind, &e);
            return;
        }

        self.publish(index, epoch, decoded);
    }

    /// Steps 1 to 3, under the lock.
    fn decode(
        &self,
        index: usize,
        epoch: u64,
        kind: PollKind,
        result: Result<EndpointResponse, RequestError>,
    ) -> Option<Decoded> {
        let mut state = self.state.lock();
        if !state.is_current(index, epoch) {
            debug!("Discarding a late poll result for {}", self.service.name);
            return None;
        }
        let entry = &mut state.endpoints[index];
        let endpoint = entry.descriptor.name.as_str();
        let metrics = &self.context.metrics;

        let response = match result.and_then(|response| {
            if response.is_success() {
                Ok(response)
            } else {
                Err(RequestError::Status(response.status))
            }
        }) {
            Ok(response) => response,
            Err(e) => {
                let e = AdapterError::RequestFailed(e);
                metrics.on_poll_failure(&self.service.name, endpoint, &e);
                self.log_failure_of(endpoint, kind, &e);
                return None;
            }
        };
        metrics.on_poll_success(&self.service.name, endpoint, response.status);

        let content_type = response.content_type();
        let endpoint_type = match entry.resolved {
            Some(endpoint_type) => endpoint_type,
            None => {
                let inferred = self.context.resolver.infer(content_type);
                info!(
                    "Endpoint {} of {} resolved to {} from content type {:?}",
                    endpoint, self.service.name, inferred, content_type
                );
                entry.resolved = Some(inferred);
                inferred
            }
        };

        let value = self
            .context
            .resolver
            .validate(endpoint_type, content_type)
            .and_then(|()| endpoint_type.decode(&response));
        match value {
            Ok(value) => Some(Decoded {
                topic_path: entry.topic_path.clone(),
                endpoint_type,
                retention: self.context.retention.policy(entry.period),
                value,
            }),
            Err(e) => {
                metrics.on_response_rejected(&self.service.name, endpoint, &e);
                self.log_failure_of(endpoint, kind, &e);
                None
            }
        }
    }

    /// Step 5, under the lock.
    fn publish(&self, index: usize, epoch: u64, decoded: Decoded) {
        let state = self.state.lock();
        if !state.is_current(index, epoch) {
            debug!("Service {} stopped before {} was published", self.service.name, decoded.topic_path);
            return;
        }
        let descriptor = &state.endpoints[index].descriptor;
        let metrics = &self.context.metrics;
        let gateway = &self.context.gateway;
        let path = decoded.topic_path.as_str();

        let mut value = Some(decoded.value);
        let mut outcome = None;
        let ran = gateway.for_service(&self.service, &mut || {
            if let Some(value) = value.take() {
                metrics.on_publication_request(path, value.encoded_len());
                outcome = Some(
                    gateway
                        .create_update_context(&self.service, descriptor, decoded.endpoint_type)
                        .and_then(|context| context.publish(value)),
                );
            }
        });

        match outcome {
            Some(Ok(())) => metrics.on_published(path),
            Some(Err(e)) => {
                metrics.on_publication_failed(path, &e);
                warn!("{}", e);
            }
            None if !ran => debug!("Service {} is not active here; dropped update for {}", self.service.name, path),
            None => {}
        }
    }

    fn log_failure(&self, index: usize, kind: PollKind, e: &AdapterError) {
        let state = self.state.lock();
        if let Some(entry) = state.endpoints.get(index) {
            self.log_failure_of(&entry.descriptor.name, kind, e);
        }
    }

    fn log_failure_of(&self, endpoint: &str, kind: PollKind, e: &AdapterError) {
        let poll = match kind {
            PollKind::Bootstrap => "Bootstrap poll",
            PollKind::Scheduled => "Poll",
        };
        if e.is_transient() {
            warn!("{} of {}/{} failed: {}", poll, self.service.name, endpoint, e);
        } else {
            error!("{} of {}/{} failed: {}", poll, self.service.name, endpoint, e);
        }
    }
}

/// Routes the results of one poller back into its session.
struct EndpointResultHandler {
    session: Weak<SessionInner>,
    index: usize,
    epoch: u64,
}

#[async_trait]
impl PollResultHandler for EndpointResultHandler {
    async fn handle(&self, kind: PollKind, result: Result<EndpointResponse, RequestError>) {
        if let Some(session) = self.session.upgrade() {
            session.handle_result(self.index, self.epoch, kind, result).await;
        }
    }
}
