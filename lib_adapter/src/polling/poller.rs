use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::Mutex;
use tokio::task::{AbortHandle, JoinHandle};

use super::{PollKind, PollResultHandler};
use crate::error::RequestError;
use crate::metrics::MetricsListener;
use crate::model::{EndpointDescriptor, ServiceDescriptor};
use crate::retrieve::EndpointClient;

/// # Endpoint Poller
///
/// Handle to the polling task of one endpoint. Dropping the handle cancels the
/// task.
pub struct EndpointPoller {
    /// The self-scheduling loop.
    schedule: JoinHandle<()>,
    in_flight: Arc<Mutex<InFlight>>,
}

/// The request currently outstanding, if any. Once `cancelled` is set, any
/// request registered afterwards is aborted on the spot.
#[derive(Default)]
struct InFlight {
    cancelled: bool,
    request: Option<AbortHandle>,
}

/// State moved into the polling task.
struct PollTask {
    service: Arc<ServiceDescriptor>,
    endpoint: Arc<EndpointDescriptor>,
    client: Arc<dyn EndpointClient>,
    handler: Arc<dyn PollResultHandler>,
    metrics: Arc<dyn MetricsListener>,
    in_flight: Arc<Mutex<InFlight>>,
}

impl EndpointPoller {
    /// Spawns the polling task on the current Tokio runtime.
    ///
    /// The task issues a bootstrap poll immediately, then, if `period` is not
    /// zero, polls again `period` after each previous poll was handled.
    pub fn start(
        service: Arc<ServiceDescriptor>,
        endpoint: Arc<EndpointDescriptor>,
        period: Duration,
        client: Arc<dyn EndpointClient>,
        handler: Arc<dyn PollResultHandler>,
        metrics: Arc<dyn MetricsListener>,
    ) -> Self {
        let in_flight = Arc::new(Mutex::new(InFlight::default()));
        let task = PollTask {
            service,
            endpoint,
            client,
            handler,
            metrics,
            in_flight: in_flight.clone(),
        };

        Self {
            schedule: tokio::spawn(task.run(period)),
            in_flight,
        }
    }

    /// Stops the schedule and aborts the outstanding request, if any.
    pub fn cancel(&self) {
        self.schedule.abort();
        let mut in_flight = self.in_flight.lock();
        in_flight.cancelled = true;
        if let Some(request) = in_flight.request.take() {
            request.abort();
        }
    }

    /// True once the task has ended, either cancelled or after the bootstrap
    /// poll of an unscheduled endpoint.
    pub fn is_finished(&self) -> bool {
        self.schedule.is_finished()
    }

    /// True while a request is outstanding.
    pub fn is_requesting(&self) -> bool {
        self.in_flight.lock().request.is_some()
    }
}

impl Drop for EndpointPoller {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl PollTask {
    async fn run(self, period: Duration) {
        self.poll(PollKind::Bootstrap).await;

        if period.is_zero() {
            debug!(
                "Endpoint {} of service {} has no poll period; bootstrap only",
                self.endpoint.name, self.service.name
            );
            return;
        }

        loop {
            tokio::time::sleep(period).await;
            self.poll(PollKind::Scheduled).await;
        }
    }

    async fn poll(&self, kind: PollKind) {
        self.metrics.on_poll_request(&self.service.name, &self.endpoint.name);

        let client = self.client.clone();
        let service = self.service.clone();
        let endpoint = self.endpoint.clone();
        let request = tokio::spawn(async move { client.request(&service, &endpoint).await });
        {
            let mut in_flight = self.in_flight.lock();
            if in_flight.cancelled {
                request.abort();
                return;
            }
            in_flight.request = Some(request.abort_handle());
        }

        let result = match request.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(RequestError::Cancelled),
            Err(e) => Err(RequestError::Transport(format!("request task failed: {}", e))),
        };
        self.in_flight.lock().request.take();

        self.handler.handle(kind, result).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;
    use crate::retrieve::EndpointResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::Instant;

    /// Answers after `latency`, tracking how many requests overlap.
    struct SlowClient {
        latency: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
        calls: AtomicUsize,
    }

    impl SlowClient {
        fn new(latency: Duration) -> Arc<Self> {
            Arc::new(Self {
                latency,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl EndpointClient for SlowClient {
        async fn request(
            &self,
            _service: &ServiceDescriptor,
            _endpoint: &EndpointDescriptor,
        ) -> Result<EndpointResponse, RequestError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.latency).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(EndpointResponse::ok(Some("text/plain"), "tick"))
        }
    }

    /// Records the kind and completion time of every result.
    #[derive(Default)]
    struct Recorder {
        results: Mutex<Vec<(PollKind, Instant, bool)>>,
    }

    #[async_trait]
    impl PollResultHandler for Recorder {
        async fn handle(&self, kind: PollKind, result: Result<EndpointResponse, RequestError>) {
            self.results.lock().push((kind, Instant::now(), result.is_ok()));
        }
    }

    fn start(client: Arc<SlowClient>, recorder: Arc<Recorder>, period: Duration) -> EndpointPoller {
        let service = Arc::new(ServiceDescriptor::new("svc", "localhost", "rest"));
        let endpoint = Arc::new(EndpointDescriptor::new("a", "/a", "a", "auto"));
        EndpointPoller::start(service, endpoint, period, client, recorder, Arc::new(NoopMetrics))
    }

    #[tokio::test(start_paused = true)]
    async fn polls_never_overlap_and_use_fixed_delay() {
        let client = SlowClient::new(Duration::from_millis(300));
        let recorder = Arc::new(Recorder::default());
        let started = Instant::now();
        let poller = start(client.clone(), recorder.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(1_650)).await;
        poller.cancel();

        let results = recorder.results.lock().clone();
        assert_eq!(client.max_active.load(Ordering::SeqCst), 1);
        // Completions at 300, 700, 1100 and 1500 ms: 300 ms of latency plus 100 ms of delay.
        assert_eq!(results.len(), 4);
        assert_eq!(results[0].0, PollKind::Bootstrap);
        assert!(results[1..].iter().all(|(kind, _, ok)| *kind == PollKind::Scheduled && *ok));
        for (index, (_, at, _)) in results.iter().enumerate() {
            let expected = Duration::from_millis(300 + 400 * index as u64);
            let elapsed = *at - started;
            assert!(
                elapsed >= expected && elapsed < expected + Duration::from_millis(10),
                "poll {} completed after {:?}",
                index,
                elapsed
            );
        }
    }

    #[tokio::test(start_paused = true)]
    async fn zero_period_only_bootstraps() {
        let client = SlowClient::new(Duration::from_millis(10));
        let recorder = Arc::new(Recorder::default());
        let poller = start(client.clone(), recorder.clone(), Duration::ZERO);

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert_eq!(recorder.results.lock().len(), 1);
        assert!(poller.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_aborts_the_request_in_flight() {
        let client = SlowClient::new(Duration::from_secs(5));
        let recorder = Arc::new(Recorder::default());
        let poller = start(client.clone(), recorder.clone(), Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(poller.is_requesting());
        poller.cancel();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(!poller.is_requesting());
        assert!(poller.is_finished());
        assert!(recorder.results.lock().is_empty());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn a_request_spawned_after_cancel_is_aborted() {
        let client = SlowClient::new(Duration::from_millis(10));
        let recorder = Arc::new(Recorder::default());
        let task = PollTask {
            service: Arc::new(ServiceDescriptor::new("svc", "localhost", "rest")),
            endpoint: Arc::new(EndpointDescriptor::new("a", "/a", "a", "auto")),
            client: client.clone(),
            handler: recorder.clone(),
            metrics: Arc::new(NoopMetrics),
            in_flight: Arc::new(Mutex::new(InFlight {
                cancelled: true,
                request: None,
            })),
        };

        task.poll(PollKind::Scheduled).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
        assert!(recorder.results.lock().is_empty());
        assert!(task.in_flight.lock().request.is_none());
    }
}
