//! # Endpoint Polling
//!
//! The scheduled, cancellable polling unit for a single endpoint.
//!
//! ## Key Design Principles:
//! - **Self-Scheduling**: each endpoint owns one Tokio task which performs a
//!   poll, hands the result over, and only then sleeps for the period. The
//!   delay is measured from the *completion* of the previous poll, so polls of
//!   one endpoint never overlap however slow the server is.
//! - **Bootstrap First**: the task always starts with a bootstrap poll and
//!   waits one full period before the first scheduled one. A zero period means
//!   the bootstrap poll is the only poll.
//! - **Failures Are Results**: transport errors are delivered to the handler
//!   exactly like responses and are never retried here; the next tick is the
//!   retry.
//! - **Cancellation**: cancelling aborts the schedule and the request in
//!   flight. A result that was already being handled is filtered out by the
//!   owning session.

use async_trait::async_trait;

use crate::error::RequestError;
use crate::retrieve::EndpointResponse;

/// The polling task.
pub mod poller;

pub use poller::EndpointPoller;

/// Which poll produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollKind {
    /// The first poll after the endpoint started.
    Bootstrap,
    /// A poll triggered by the schedule.
    Scheduled,
}

/// # Poll Result Handler
///
/// Receives the outcome of every poll, exactly once per request. The poller
/// waits for the returned future before scheduling the next tick.
#[async_trait]
pub trait PollResultHandler: Send + Sync {
    /// Processes one poll outcome.
    async fn handle(&self, kind: PollKind, result: Result<EndpointResponse, RequestError>);
}
