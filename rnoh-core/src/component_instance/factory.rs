//! Construction of component instances from pluggable delegates.
//!
//! ## Usage
//!
//! Packages register [`ComponentInstanceFactoryDelegate`]s. The factory asks
//! them in registration order and the first one that recognizes the
//! component wins. Components nobody recognizes are wrapped by
//! [`ComponentInstanceFactory::create_arkts_component`].

use std::sync::Arc;

use tracing::warn;

use super::{
    ComponentInstanceContext, ComponentInstanceRef,
    fallback::{ARKTS_ROOT_COMPONENT_NAME, FallbackComponentInstance},
};
use crate::{
    ComponentHandle, Tag, arkts_bridge::ArkTsNodeFactory, native_node::StackNode,
    thread_utils::ThreadGuard,
};

/// Builds component instances for the component classes it knows.
pub trait ComponentInstanceFactoryDelegate: Send + Sync {
    /// Returns an instance, or `None` if the component is not handled here.
    fn create(&self, ctx: &ComponentInstanceContext) -> Option<ComponentInstanceRef>;
}

/// Chooses the delegate that builds each component instance.
pub struct ComponentInstanceFactory {
    guard: ThreadGuard,
    delegates: Vec<Arc<dyn ComponentInstanceFactoryDelegate>>,
    node_factory: Option<Arc<dyn ArkTsNodeFactory>>,
}

impl ComponentInstanceFactory {
    /// Creates a factory bound to the calling thread.
    pub fn new(
        delegates: Vec<Arc<dyn ComponentInstanceFactoryDelegate>>,
        node_factory: Option<Arc<dyn ArkTsNodeFactory>>,
    ) -> Self {
        Self {
            guard: ThreadGuard::new(),
            delegates,
            node_factory,
        }
    }

    /// Asks the delegates in order and returns the first instance produced.
    #[track_caller]
    pub fn create(
        &self,
        tag: Tag,
        component_handle: ComponentHandle,
        component_name: &str,
    ) -> Option<ComponentInstanceRef> {
        self.guard.assert_thread();
        let ctx = ComponentInstanceContext::new(tag, component_handle, component_name);
        self.delegates
            .iter()
            .find_map(|delegate| delegate.create(&ctx))
    }

    /// Builds the native slot for a component rendered by the ArkTS host.
    ///
    /// The result is a passthrough root named
    /// [`ARKTS_ROOT_COMPONENT_NAME`] holding one child whose node comes from
    /// the host's node factory. When the host cannot provide a node, a plain
    /// container stands in so the slot still exists.
    #[track_caller]
    pub fn create_arkts_component(
        &self,
        tag: Tag,
        component_handle: ComponentHandle,
        component_name: &str,
    ) -> ComponentInstanceRef {
        self.guard.assert_thread();
        let root: ComponentInstanceRef = FallbackComponentInstance::new_arc(
            &ComponentInstanceContext::new(tag, component_handle, ARKTS_ROOT_COMPONENT_NAME),
            StackNode::new_ref(),
        );

        let node = match &self.node_factory {
            Some(factory) => match factory.create_node(tag, component_name) {
                Ok(node) => node,
                Err(err) => {
                    warn!(tag, component_name, %err, "ArkTS node unavailable, using a container");
                    StackNode::new_ref()
                }
            },
            None => StackNode::new_ref(),
        };
        let child: ComponentInstanceRef = FallbackComponentInstance::new_arc(
            &ComponentInstanceContext::new(tag, component_handle, component_name),
            node,
        );
        root.insert_child(&child, 0);
        root
    }
}
