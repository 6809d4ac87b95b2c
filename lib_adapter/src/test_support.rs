//! Doubles shared by the unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use crate::broker::LocalBroker;
use crate::endpoints::EndpointTypeResolver;
use crate::error::RequestError;
use crate::metrics::CountingMetricsCollector;
use crate::model::{EndpointDescriptor, ServiceDescriptor};
use crate::retrieve::{EndpointClient, EndpointResponse};
use crate::services::SessionContext;
use crate::topics::{TopicDirectory, TopicLifecycleManager, TopicRetention};

/// Answers each endpoint URL with the last response scripted for it.
#[derive(Default)]
pub(crate) struct ScriptedClient {
    responses: Mutex<HashMap<String, Result<EndpointResponse, RequestError>>>,
    delays: Mutex<HashMap<String, Duration>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedClient {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn respond(&self, url: &str, content_type: Option<&str>, body: impl Into<Bytes>) {
        self.responses
            .lock()
            .insert(url.to_string(), Ok(EndpointResponse::ok(content_type, body)));
    }

    pub(crate) fn respond_status(&self, url: &str, status: u16) {
        self.responses.lock().insert(
            url.to_string(),
            Ok(EndpointResponse::new(status, Default::default(), Bytes::new())),
        );
    }

    pub(crate) fn delay(&self, url: &str, delay: Duration) {
        self.delays.lock().insert(url.to_string(), delay);
    }

    pub(crate) fn calls(&self, url: &str) -> usize {
        self.calls.lock().get(url).copied().unwrap_or(0)
    }
}

#[async_trait]
impl EndpointClient for ScriptedClient {
    async fn request(
        &self,
        _service: &ServiceDescriptor,
        endpoint: &EndpointDescriptor,
    ) -> Result<EndpointResponse, RequestError> {
        *self.calls.lock().entry(endpoint.url.clone()).or_insert(0) += 1;
        let delay = self.delays.lock().get(&endpoint.url).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let response = self.responses.lock().get(&endpoint.url).cloned();
        response.unwrap_or_else(|| Err(RequestError::Transport(format!("no response scripted for {}", endpoint.url))))
    }
}

/// A session context over `broker`, with a counting metrics collector.
pub(crate) fn context(
    client: Arc<ScriptedClient>,
    broker: Arc<LocalBroker>,
) -> (SessionContext, Arc<CountingMetricsCollector>) {
    context_with_directory(client, broker.clone(), broker)
}

/// Like `context`, but topics are created and removed through `directory`.
pub(crate) fn context_with_directory(
    client: Arc<ScriptedClient>,
    broker: Arc<LocalBroker>,
    directory: Arc<dyn TopicDirectory>,
) -> (SessionContext, Arc<CountingMetricsCollector>) {
    let metrics = Arc::new(CountingMetricsCollector::new());
    let context = SessionContext {
        resolver: Arc::new(EndpointTypeResolver::new().expect("standard endpoint types")),
        client,
        topics: TopicLifecycleManager::new(directory, metrics.clone()),
        gateway: broker,
        metrics: metrics.clone(),
        retention: TopicRetention::RemoveWhenUnused,
    };
    (context, metrics)
}
