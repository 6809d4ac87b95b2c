//! # Service Manager
//!
//! Keeps the set of running sessions in line with the configured services.
//! Descriptors are immutable, so reconciliation works on whole services:
//!
//! - a service whose descriptor is unchanged keeps its session untouched;
//! - a service that changed or disappeared is closed;
//! - a new or changed service gets a fresh session from the factory.
//!
//! Closing happens before creating, so a changed service never has two
//! registrations at once.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;

use super::{ServiceSession, ServiceSessionFactory};
use crate::model::ServiceDescriptor;

/// # Reconfigure Report
///
/// What a call to `ServiceManager::reconfigure` did, by service name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconfigureReport {
    /// Services created.
    pub started: Vec<String>,
    /// Services left running unchanged.
    pub kept: Vec<String>,
    /// Services closed, whether removed or about to be replaced.
    pub closed: Vec<String>,
    /// Services rejected, with the reason.
    pub failed: Vec<(String, String)>,
}

impl ReconfigureReport {
    /// True when nothing was created or closed.
    pub fn is_unchanged(&self) -> bool {
        self.started.is_empty() && self.closed.is_empty() && self.failed.is_empty()
    }
}

/// # Service Manager
pub struct ServiceManager {
    factory: ServiceSessionFactory,
    sessions: Mutex<HashMap<String, Arc<ServiceSession>>>,
}

impl ServiceManager {
    /// A manager with no services.
    pub fn new(factory: ServiceSessionFactory) -> Self {
        Self {
            factory,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Replaces the configured service set with `services`.
    ///
    /// Services that fail to build are logged and reported; they do not stop
    /// the others. When two descriptors share a name the first one wins.
    pub fn reconfigure(&self, services: Vec<ServiceDescriptor>) -> ReconfigureReport {
        let mut report = ReconfigureReport::default();
        let mut sessions = self.sessions.lock();

        let mut wanted: Vec<ServiceDescriptor> = Vec::with_capacity(services.len());
        let mut names = HashSet::new();
        for service in services {
            if names.insert(service.name.clone()) {
                wanted.push(service);
            } else {
                warn!("Ignoring duplicate definition of service {}", service.name);
            }
        }

        let stale: Vec<String> = sessions
            .iter()
            .filter(|(name, session)| !wanted.iter().any(|s| &s.name == *name && s == session.service()))
            .map(|(name, _)| name.clone())
            .collect();
        for name in stale {
            if let Some(session) = sessions.remove(&name) {
                info!("Closing service {}", name);
                self.factory.close(&session);
                report.closed.push(name);
            }
        }

        for service in wanted {
            let name = service.name.clone();
            if sessions.contains_key(&name) {
                report.kept.push(name);
                continue;
            }
            match self.factory.create(service) {
                Ok(session) => {
                    sessions.insert(name.clone(), session);
                    report.started.push(name);
                }
                Err(e) => {
                    error!("Failed to create service {}: {}", name, e);
                    report.failed.push((name, e.to_string()));
                }
            }
        }

        report.closed.sort();
        report
    }

    /// Closes every service.
    pub fn close(&self) {
        let sessions: Vec<Arc<ServiceSession>> = self.sessions.lock().drain().map(|(_, session)| session).collect();
        for session in sessions {
            self.factory.close(&session);
        }
        info!("All services closed");
    }

    /// The session of a service, if it is configured.
    pub fn session(&self, name: &str) -> Option<Arc<ServiceSession>> {
        self.sessions.lock().get(name).cloned()
    }

    /// Names of the configured services, sorted.
    pub fn service_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.sessions.lock().keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::LocalBroker;
    use crate::model::EndpointDescriptor;
    use crate::test_support::{context, ScriptedClient};
    use std::time::Duration;

    fn service(name: &str, url: &str) -> ServiceDescriptor {
        ServiceDescriptor::new(name, "localhost", name)
            .with_poll_period(Duration::from_secs(1))
            .with_endpoint(EndpointDescriptor::new("e", url, "e", "auto"))
    }

    fn manager() -> (ServiceManager, Arc<LocalBroker>) {
        let broker = Arc::new(LocalBroker::new());
        let (ctx, _) = context(ScriptedClient::new(), broker.clone());
        (ServiceManager::new(ServiceSessionFactory::new(ctx)), broker)
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_unchanged_services_and_replaces_changed_ones() {
        let (manager, broker) = manager();
        let report = manager.reconfigure(vec![service("a", "/a"), service("b", "/b")]);
        assert_eq!(report.started, vec!["a".to_string(), "b".to_string()]);

        let a_before = manager.session("a").unwrap();
        let report = manager.reconfigure(vec![service("a", "/a"), service("b", "/b2"), service("c", "/c")]);

        assert_eq!(report.kept, vec!["a".to_string()]);
        assert_eq!(report.closed, vec!["b".to_string()]);
        assert_eq!(report.started, vec!["b".to_string(), "c".to_string()]);
        assert!(Arc::ptr_eq(&a_before, &manager.session("a").unwrap()));
        assert_eq!(manager.session("b").unwrap().service().endpoints[0].url, "/b2");
        assert_eq!(broker.service_names(), vec!["a", "b", "c"]);
    }

    #[tokio::test(start_paused = true)]
    async fn removed_services_are_closed() {
        let (manager, broker) = manager();
        manager.reconfigure(vec![service("a", "/a"), service("b", "/b")]);
        let b = manager.session("b").unwrap();

        let report = manager.reconfigure(vec![service("a", "/a")]);

        assert_eq!(report.closed, vec!["b".to_string()]);
        assert!(!b.is_running());
        assert_eq!(manager.service_names(), vec!["a"]);
        assert_eq!(broker.service_names(), vec!["a"]);
        assert!(manager.reconfigure(vec![service("a", "/a")]).is_unchanged());
    }

    #[tokio::test(start_paused = true)]
    async fn a_bad_service_does_not_block_the_others() {
        let (manager, _) = manager();
        let bad = ServiceDescriptor::new("bad", "localhost", "bad")
            .with_endpoint(EndpointDescriptor::new("e", "/e", "e", "xml"));

        let report = manager.reconfigure(vec![bad, service("a", "/a"), service("a", "/other")]);

        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "bad");
        assert_eq!(report.started, vec!["a".to_string()]);
        assert_eq!(manager.session("a").unwrap().service().endpoints[0].url, "/a");
    }

    #[tokio::test(start_paused = true)]
    async fn close_stops_everything() {
        let (manager, broker) = manager();
        manager.reconfigure(vec![service("a", "/a")]);
        let a = manager.session("a").unwrap();

        manager.close();

        assert!(!a.is_running());
        assert!(manager.service_names().is_empty());
        assert!(broker.service_names().is_empty());
    }
}
