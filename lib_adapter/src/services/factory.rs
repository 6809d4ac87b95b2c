use std::sync::Arc;

use log::info;

use super::{ServiceSession, SessionContext};
use crate::error::AdapterResult;
use crate::model::ServiceDescriptor;
use crate::publication::ServiceRegistration;

/// # Service Session Factory
///
/// Creates sessions bound to the gateway's active/standby signal. A session
/// created here only polls while the gateway says this node is responsible
/// for its service:
///
/// - `on_active` starts the session;
/// - `on_standby` stops it if it is running;
/// - `on_close` stops it for good.
///
/// The hooks hold weak references, so a session the caller drops is not kept
/// alive by its registration.
#[derive(Clone)]
pub struct ServiceSessionFactory {
    context: SessionContext,
}

impl ServiceSessionFactory {
    /// Creates a factory over shared collaborators.
    pub fn new(context: SessionContext) -> Self {
        Self { context }
    }

    /// The collaborators handed to every session.
    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    /// Builds a session for `service` and registers it with the gateway.
    ///
    /// # Errors
    /// Configuration errors from `ServiceSession::new`; nothing is registered
    /// in that case.
    pub fn create(&self, service: ServiceDescriptor) -> AdapterResult<Arc<ServiceSession>> {
        let session = Arc::new(ServiceSession::new(service, self.context.clone())?);
        let name = session.service().name.clone();
        let metrics = &self.context.metrics;

        let registration = ServiceRegistration::new()
            .on_standby({
                let session = Arc::downgrade(&session);
                let metrics = metrics.clone();
                let name = name.clone();
                move || {
                    if let Some(session) = session.upgrade() {
                        if session.is_running() {
                            session.stop();
                        }
                    }
                    metrics.on_service_standby(&name);
                }
            })
            .on_active({
                let session = Arc::downgrade(&session);
                let metrics = metrics.clone();
                let name = name.clone();
                move || {
                    if let Some(session) = session.upgrade() {
                        session.start();
                        metrics.on_service_active(&name);
                    }
                }
            })
            .on_close({
                let session = Arc::downgrade(&session);
                let metrics = metrics.clone();
                let name = name.clone();
                move || {
                    if let Some(session) = session.upgrade() {
                        session.stop();
                    }
                    metrics.on_service_removed(&name);
                }
            });

        info!("Registering service {}", session.service());
        self.context.gateway.add_service(session.service(), registration);
        Ok(session)
    }

    /// Ends a session's registration; the gateway runs its close hook.
    pub fn close(&self, session: &ServiceSession) {
        self.context.gateway.remove_service(&session.service().name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::{LocalBroker, LocalBrokerOptions};
    use crate::model::EndpointDescriptor;
    use crate::test_support::{context, ScriptedClient};
    use std::time::Duration;

    fn service() -> ServiceDescriptor {
        ServiceDescriptor::new("svc", "localhost", "rest")
            .with_poll_period(Duration::from_secs(1))
            .with_endpoint(EndpointDescriptor::new("a", "/a", "a", "auto"))
    }

    fn standby_broker() -> Arc<LocalBroker> {
        Arc::new(LocalBroker::with_options(LocalBrokerOptions {
            auto_activate: false,
            ..LocalBrokerOptions::default()
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn polls_only_while_active() {
        let client = ScriptedClient::new();
        client.respond("/a", Some("text/plain"), "v");
        let broker = standby_broker();
        let (ctx, metrics) = context(client.clone(), broker.clone());
        let factory = ServiceSessionFactory::new(ctx);

        let session = factory.create(service()).unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(!session.is_running());
        assert_eq!(client.calls("/a"), 0);

        broker.activate("svc");
        assert!(session.is_running());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.calls("/a"), 1);

        broker.standby("svc");
        assert!(!session.is_running());
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(client.calls("/a"), 1);

        let summary = metrics.summary();
        assert_eq!(summary.services_activated, 1);
        assert_eq!(summary.services_on_standby, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_the_session_and_unregisters_it() {
        let client = ScriptedClient::new();
        client.respond("/a", Some("text/plain"), "v");
        let broker = Arc::new(LocalBroker::new());
        let (ctx, metrics) = context(client.clone(), broker.clone());
        let factory = ServiceSessionFactory::new(ctx);

        let session = factory.create(service()).unwrap();
        assert!(session.is_running());

        factory.close(&session);

        assert!(!session.is_running());
        assert!(broker.service_names().is_empty());
        assert_eq!(metrics.summary().services_removed, 1);
    }

    #[tokio::test]
    async fn an_invalid_service_is_not_registered() {
        let broker = Arc::new(LocalBroker::new());
        let (ctx, _) = context(ScriptedClient::new(), broker.clone());
        let factory = ServiceSessionFactory::new(ctx);

        let service = ServiceDescriptor::new("bad", "localhost", "rest")
            .with_endpoint(EndpointDescriptor::new("a", "/a", "a", "csv"));
        assert!(factory.create(service).is_err());
        assert!(broker.service_names().is_empty());
    }
}
