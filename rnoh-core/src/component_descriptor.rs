//! Component descriptors turn raw prop updates into props snapshots.

use std::sync::Arc;

use rustc_hash::FxHashMap as HashMap;
use serde_json::Value;

use crate::{ComponentHandle, SurfaceId, props::SharedProps};

/// Context handed to prop parsing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PropsParserContext {
    /// Surface the props belong to.
    pub surface_id: SurfaceId,
}

/// Knows how to build props for one component class.
pub trait ComponentDescriptor: Send + Sync {
    /// Numeric component class.
    fn component_handle(&self) -> ComponentHandle;

    /// Component class name.
    fn component_name(&self) -> &str;

    /// Produces the next props snapshot from `previous` and a raw update.
    fn clone_props(
        &self,
        context: &PropsParserContext,
        previous: &SharedProps,
        raw: &Value,
    ) -> SharedProps;
}

/// Descriptor that merges raw top-level keys over the previous props.
#[derive(Clone, Debug)]
pub struct GenericComponentDescriptor {
    component_handle: ComponentHandle,
    component_name: String,
}

impl GenericComponentDescriptor {
    /// Creates a descriptor for a component class.
    pub fn new(component_handle: ComponentHandle, component_name: impl Into<String>) -> Self {
        Self {
            component_handle,
            component_name: component_name.into(),
        }
    }
}

impl ComponentDescriptor for GenericComponentDescriptor {
    fn component_handle(&self) -> ComponentHandle {
        self.component_handle
    }

    fn component_name(&self) -> &str {
        &self.component_name
    }

    fn clone_props(
        &self,
        _context: &PropsParserContext,
        previous: &SharedProps,
        raw: &Value,
    ) -> SharedProps {
        Arc::new(previous.merged_with(raw))
    }
}

/// Descriptors indexed by component handle and name.
#[derive(Default)]
pub struct ComponentDescriptorRegistry {
    by_handle: HashMap<ComponentHandle, Arc<dyn ComponentDescriptor>>,
    by_name: HashMap<String, Arc<dyn ComponentDescriptor>>,
}

impl ComponentDescriptorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor, replacing one with the same handle or name.
    pub fn add(&mut self, descriptor: Arc<dyn ComponentDescriptor>) {
        self.by_handle
            .insert(descriptor.component_handle(), Arc::clone(&descriptor));
        self.by_name
            .insert(descriptor.component_name().to_string(), descriptor);
    }

    /// Looks up by handle, then by name.
    pub fn find(
        &self,
        component_handle: ComponentHandle,
        component_name: &str,
    ) -> Option<Arc<dyn ComponentDescriptor>> {
        self.by_handle
            .get(&component_handle)
            .or_else(|| self.by_name.get(component_name))
            .cloned()
    }

    /// Number of distinct component names.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    /// Returns `true` when no descriptor is registered.
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
