//! Generic container instance used for components without a native factory.

use std::sync::Arc;

use super::{ComponentInstance, ComponentInstanceBase, ComponentInstanceContext};
use crate::native_node::NativeNodeRef;

/// Component name of the passthrough root wrapping an ArkTS-rendered node.
pub const ARKTS_ROOT_COMPONENT_NAME: &str = "RootView";

/// A component instance that only owns a container node.
///
/// Serves both as the passthrough root of an ArkTS-rendered component and as
/// its single child holding the node the host renders into.
#[derive(Debug)]
pub struct FallbackComponentInstance {
    base: ComponentInstanceBase,
    node: NativeNodeRef,
}

impl FallbackComponentInstance {
    /// Creates an instance around `node`.
    pub fn new(ctx: &ComponentInstanceContext, node: NativeNodeRef) -> Self {
        Self {
            base: ComponentInstanceBase::new(ctx),
            node,
        }
    }

    /// Creates an instance around `node` behind a shared handle.
    pub fn new_arc(ctx: &ComponentInstanceContext, node: NativeNodeRef) -> Arc<Self> {
        Arc::new(Self::new(ctx, node))
    }
}

impl ComponentInstance for FallbackComponentInstance {
    fn base(&self) -> &ComponentInstanceBase {
        &self.base
    }

    fn local_root_node(&self) -> NativeNodeRef {
        Arc::clone(&self.node)
    }
}
