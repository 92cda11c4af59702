//! Packages bundle what an app contributes to an instance.
//!
//! ## Usage
//!
//! Implement [`RnohPackage`] and register component delegates, component
//! descriptors, turbo module delegates and ArkTS message handlers. Delegates
//! are consulted in registration order, so packages registered first win.

use std::{fmt, sync::Arc};

use crate::{
    arkts_bridge::ArkTsMessageHandler,
    component_descriptor::{ComponentDescriptor, ComponentDescriptorRegistry},
    component_instance::factory::ComponentInstanceFactoryDelegate,
    turbo_module::TurboModuleFactoryDelegate,
};

/// Registers components and services for an instance.
pub trait RnohPackage {
    /// Registers this package into the provided registry.
    fn register(self, registry: &mut PackageRegistry);
}

/// Collects package contributions before an instance is built.
#[derive(Default)]
pub struct PackageRegistry {
    component_delegates: Vec<Arc<dyn ComponentInstanceFactoryDelegate>>,
    component_descriptors: ComponentDescriptorRegistry,
    turbo_module_delegates: Vec<Arc<dyn TurboModuleFactoryDelegate>>,
    message_handlers: Vec<Arc<dyn ArkTsMessageHandler>>,
}

impl PackageRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a component instance factory delegate.
    pub fn register_component_delegate(
        &mut self,
        delegate: impl ComponentInstanceFactoryDelegate + 'static,
    ) {
        self.component_delegates.push(Arc::new(delegate));
    }

    /// Adds a component descriptor used by `update_view`.
    pub fn register_component_descriptor(
        &mut self,
        descriptor: impl ComponentDescriptor + 'static,
    ) {
        self.component_descriptors.add(Arc::new(descriptor));
    }

    /// Adds a turbo module factory delegate.
    pub fn register_turbo_module_delegate(
        &mut self,
        delegate: impl TurboModuleFactoryDelegate + 'static,
    ) {
        self.turbo_module_delegates.push(Arc::new(delegate));
    }

    /// Adds a handler for messages coming from ArkTS.
    pub fn register_message_handler(&mut self, handler: impl ArkTsMessageHandler + 'static) {
        self.message_handlers.push(Arc::new(handler));
    }

    /// Registers a package into this registry.
    pub fn register_package<P: RnohPackage>(&mut self, package: P) {
        package.register(self);
    }

    /// Finalizes the registry.
    pub fn finish(self) -> PackageContributions {
        PackageContributions {
            component_delegates: self.component_delegates,
            component_descriptors: Arc::new(self.component_descriptors),
            turbo_module_delegates: self.turbo_module_delegates,
            message_handlers: self.message_handlers,
        }
    }
}

impl fmt::Debug for PackageRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageRegistry")
            .field("component_delegates", &self.component_delegates.len())
            .field("component_descriptors", &self.component_descriptors.len())
            .field("turbo_module_delegates", &self.turbo_module_delegates.len())
            .field("message_handlers", &self.message_handlers.len())
            .finish()
    }
}

/// Everything the registered packages contributed.
#[derive(Clone)]
pub struct PackageContributions {
    /// Component delegates in registration order.
    pub component_delegates: Vec<Arc<dyn ComponentInstanceFactoryDelegate>>,
    /// Descriptors keyed by component handle and name.
    pub component_descriptors: Arc<ComponentDescriptorRegistry>,
    /// Turbo module delegates in registration order.
    pub turbo_module_delegates: Vec<Arc<dyn TurboModuleFactoryDelegate>>,
    /// ArkTS message handlers in registration order.
    pub message_handlers: Vec<Arc<dyn ArkTsMessageHandler>>,
}

impl fmt::Debug for PackageContributions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackageContributions")
            .field("component_delegates", &self.component_delegates.len())
            .field("component_descriptors", &self.component_descriptors.len())
            .field("turbo_module_delegates", &self.turbo_module_delegates.len())
            .field("message_handlers", &self.message_handlers.len())
            .finish()
    }
}
