//! # Services Module
//!
//! Per-service orchestration of the polling pipeline.
//!
//! ## Contained Modules:
//! - **`session`**: `ServiceSession`, the per-service state machine owning the
//!   endpoint set and their pollers, turning poll results into publications.
//! - **`factory`**: `ServiceSessionFactory`, which registers each session with
//!   the publication gateway so it only polls while this node is active for
//!   the service.
//! - **`manager`**: `ServiceManager`, which reconciles the running sessions
//!   against a new list of service descriptors.

use std::sync::Arc;

use crate::endpoints::EndpointTypeResolver;
use crate::metrics::MetricsListener;
use crate::publication::PublicationGateway;
use crate::retrieve::EndpointClient;
use crate::topics::{TopicLifecycleManager, TopicRetention};

/// Gateway-bound session creation.
pub mod factory;
/// Reconciliation of the configured service set.
pub mod manager;
/// The per-service orchestrator.
pub mod session;

pub use factory::ServiceSessionFactory;
pub use manager::{ReconfigureReport, ServiceManager};
pub use session::ServiceSession;

/// # Session Context
///
/// The collaborators shared by every session of the adapter.
#[derive(Clone)]
pub struct SessionContext {
    /// Identifier table for "produces" values.
    pub resolver: Arc<EndpointTypeResolver>,
    /// Performs the endpoint requests.
    pub client: Arc<dyn EndpointClient>,
    /// Creates and removes endpoint topics.
    pub topics: TopicLifecycleManager,
    /// Publishes values and signals active/standby.
    pub gateway: Arc<dyn PublicationGateway>,
    /// Event observer.
    pub metrics: Arc<dyn MetricsListener>,
    /// Retention strategy of endpoint topics.
    pub retention: TopicRetention,
}
