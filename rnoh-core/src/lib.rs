//! rnoh-core is the mounting pipeline that turns a JavaScript-driven shadow
//! tree into live native widgets.
//!
//! # Overview
//!
//! The renderer's scheduler finishes a transaction off the main thread and
//! hands its mutations to a [`SchedulerDelegate`]. The delegate fragments the
//! heavy apply phase into bounded chunks and hops every piece onto the MAIN
//! lane of the [`TaskExecutor`], where a [`MountingManager`] applies it.
//!
//! Two mounting managers exist:
//!
//! - [`MountingManagerArkTs`] keeps a snapshot of every shadow view and
//!   forwards serialized mutations to an ArkTS host that does the rendering.
//! - [`MountingManagerCapi`] materializes [`ComponentInstance`] trees
//!   directly and forwards only the components it cannot build natively.
//!
//! # Components
//!
//! Native components are [`ComponentInstance`] implementations produced by a
//! [`ComponentInstanceFactoryDelegate`]. Packages bundle delegates together
//! with descriptors, turbo modules and bridge message handlers.
//!
//! ```
//! use std::sync::Arc;
//!
//! use rnoh_core::{
//!     ComponentInstance, ComponentInstanceBase, ComponentInstanceFactoryDelegate,
//!     ComponentInstanceRef, ComponentInstanceContext, NativeNodeRef, PackageRegistry,
//!     RnohPackage, StackNode,
//! };
//!
//! struct Card {
//!     base: ComponentInstanceBase,
//!     node: NativeNodeRef,
//! }
//!
//! impl ComponentInstance for Card {
//!     fn base(&self) -> &ComponentInstanceBase {
//!         &self.base
//!     }
//!
//!     fn local_root_node(&self) -> NativeNodeRef {
//!         self.node.clone()
//!     }
//! }
//!
//! struct CardDelegate;
//!
//! impl ComponentInstanceFactoryDelegate for CardDelegate {
//!     fn create(&self, ctx: &ComponentInstanceContext) -> Option<ComponentInstanceRef> {
//!         (ctx.component_name == "Card").then(|| {
//!             Arc::new(Card {
//!                 base: ComponentInstanceBase::new(ctx),
//!                 node: StackNode::new_ref(),
//!             }) as ComponentInstanceRef
//!         })
//!     }
//! }
//!
//! struct CardPackage;
//!
//! impl RnohPackage for CardPackage {
//!     fn register(self, registry: &mut PackageRegistry) {
//!         registry.register_component_delegate(CardDelegate);
//!     }
//! }
//! ```
//!
//! # Threads
//!
//! Everything that touches component instances is bound to the thread that
//! constructed it and checked with a [`ThreadGuard`]. The preallocation queue
//! and the shadow-view store are the only structures shared across lanes.
#![deny(missing_docs, clippy::unwrap_used)]

pub mod arkts_bridge;
pub mod component_descriptor;
pub mod component_instance;
pub mod config;
pub mod error;
pub mod instance;
pub mod layout;
pub mod mounting;
pub mod mutation;
pub mod native_node;
pub mod package;
#[cfg(feature = "profiling")]
pub mod profiler;
pub mod props;
pub mod scheduler_delegate;
pub mod shadow_view;
pub mod task_executor;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod thread_utils;
pub mod turbo_module;
pub mod vsync;

pub use serde_json;

pub use crate::{
    arkts_bridge::{ArkTsChannel, ArkTsHost, ArkTsMessageHandler, ArkTsNodeFactory},
    component_descriptor::{
        ComponentDescriptor, ComponentDescriptorRegistry, GenericComponentDescriptor,
        PropsParserContext,
    },
    component_instance::{
        ComponentInstance, ComponentInstanceBase, ComponentInstanceContext,
        ComponentInstanceRef, ComponentInstanceWeak,
        factory::{ComponentInstanceFactory, ComponentInstanceFactoryDelegate},
        fallback::FallbackComponentInstance,
        preallocation::{
            ComponentInstancePreallocationRequestQueue, PreallocationRequest,
            PreallocationRequestQueueDelegate,
        },
        provider::ComponentInstanceProvider,
        registry::ComponentInstanceRegistry,
    },
    config::{Architecture, RnohConfig},
    error::{RnohError, RnohResult},
    instance::{InstanceBuilder, RnInstance, RnInstanceArkTs, RnInstanceCapi},
    layout::{LayoutMetrics, Point, Rect, Size},
    mounting::{MountingManager, arkts::MountingManagerArkTs, capi::MountingManagerCapi},
    mutation::{MutationType, ShadowViewMutation, ShadowViewMutationList},
    native_node::{NativeNode, NativeNodeRef, StackNode},
    package::{PackageRegistry, RnohPackage},
    props::{Props, SharedProps, SharedState, State},
    scheduler_delegate::{
        MountingCoordinator, MountingTransaction, PreliminaryViewAllocator, SchedulerDelegate,
        TransactionTelemetry,
    },
    shadow_view::{EventEmitter, ShadowView, ShadowViewRegistry},
    task_executor::{
        EventLoopTaskRunner, RayonTaskRunner, TaskExecutor, TaskRunner, TaskThread,
        ThreadTaskRunner,
    },
    thread_utils::ThreadGuard,
    turbo_module::{TurboModule, TurboModuleFactoryDelegate, TurboModuleProvider},
    vsync::{FrameTick, VsyncSource},
};

/// Stable identity of a shadow-tree node, assigned by the producer.
pub type Tag = i32;

/// Identity of a rendering surface.
pub type SurfaceId = i32;

/// Numeric identifier of a component class.
pub type ComponentHandle = i64;

/// Returns `true` when `tag` follows the surface-root numbering convention.
///
/// Surface roots are the tags congruent to 1 modulo 10.
pub fn is_surface_root_tag(tag: Tag) -> bool {
    tag % 10 == 1
}

#[cfg(test)]
mod tests {
    use super::is_surface_root_tag;

    #[test]
    fn surface_roots_end_in_one() {
        assert!(is_surface_root_tag(1));
        assert!(is_surface_root_tag(11));
        assert!(is_surface_root_tag(2021));
        assert!(!is_surface_root_tag(10));
        assert!(!is_surface_root_tag(12));
    }
}
