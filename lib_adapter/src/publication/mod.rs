//! # Publication Gateway
//!
//! The broker's publishing surface, as used by the sessions.
//!
//! A service is registered with a set of lifecycle hooks. The broker decides
//! which cluster member is responsible for it and calls `on_active` on that
//! member only, `on_standby` when responsibility moves elsewhere and
//! `on_close` when the registration ends. Values are published through an
//! `UpdateContext` bound to one endpoint topic.
//!
//! Every method here is synchronous: sessions publish while holding their own
//! lock, so a publication can never overtake a `stop()`.

use crate::endpoints::{EndpointType, TopicValue};
use crate::error::AdapterResult;
use crate::model::{EndpointDescriptor, ServiceDescriptor};

/// A lifecycle callback.
pub type ServiceHook = Box<dyn Fn() + Send + Sync>;

/// # Service Registration
///
/// The hooks attached to a service when it is added to the gateway. They are
/// supplied up front so that no activation can be missed between registering
/// the service and wiring its session.
#[derive(Default)]
pub struct ServiceRegistration {
    on_standby: Option<ServiceHook>,
    on_active: Option<ServiceHook>,
    on_close: Option<ServiceHook>,
}

impl ServiceRegistration {
    /// A registration without hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called when another member takes over the service.
    pub fn on_standby(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_standby = Some(Box::new(hook));
        self
    }

    /// Called when this member becomes responsible for the service.
    pub fn on_active(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_active = Some(Box::new(hook));
        self
    }

    /// Called once when the registration ends.
    pub fn on_close(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_close = Some(Box::new(hook));
        self
    }

    /// Runs the standby hook.
    pub fn standby(&self) {
        if let Some(hook) = &self.on_standby {
            hook();
        }
    }

    /// Runs the active hook.
    pub fn activate(&self) {
        if let Some(hook) = &self.on_active {
            hook();
        }
    }

    /// Runs the close hook.
    pub fn close(&self) {
        if let Some(hook) = &self.on_close {
            hook();
        }
    }
}

impl std::fmt::Debug for ServiceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistration")
            .field("on_standby", &self.on_standby.is_some())
            .field("on_active", &self.on_active.is_some())
            .field("on_close", &self.on_close.is_some())
            .finish()
    }
}

/// Publishes values to one endpoint topic.
pub trait UpdateContext: Send + Sync {
    /// The topic this context publishes to.
    fn path(&self) -> &str;

    /// Replaces the topic value.
    ///
    /// # Errors
    /// `AdapterError::PublicationFailed` if the topic is gone or the value
    /// does not fit its type.
    fn publish(&self, value: TopicValue) -> AdapterResult<()>;
}

/// # Publication Gateway
pub trait PublicationGateway: Send + Sync {
    /// Registers a service. The gateway takes ownership of the hooks.
    fn add_service(&self, service: &ServiceDescriptor, registration: ServiceRegistration);

    /// Ends a registration, running its close hook.
    fn remove_service(&self, name: &str);

    /// Runs `action` only if the service is still registered and active here,
    /// holding the gateway's registration state steady while it runs.
    /// Returns whether `action` ran.
    fn for_service(&self, service: &ServiceDescriptor, action: &mut dyn FnMut()) -> bool;

    /// Binds an update context to an endpoint's topic.
    fn create_update_context(
        &self,
        service: &ServiceDescriptor,
        endpoint: &EndpointDescriptor,
        endpoint_type: EndpointType,
    ) -> AdapterResult<Box<dyn UpdateContext>>;
}
