//! Built-in components and platform services for rnoh-core.
//!
//! ## Usage
//!
//! Register [`PlatformPackage`] before app packages so the built-in
//! components are available to every surface.
#![deny(missing_docs, clippy::unwrap_used)]

pub mod paragraph;
pub mod view;
pub mod vsync;

use rnoh_core::{
    ComponentHandle, ComponentInstanceContext, ComponentInstanceFactoryDelegate,
    ComponentInstanceRef, GenericComponentDescriptor, PackageRegistry, RnohPackage,
};

pub use paragraph::ParagraphComponentInstance;
pub use view::ViewComponentInstance;
pub use vsync::TimerVsync;

/// Component name of the generic container.
pub const VIEW_COMPONENT_NAME: &str = "View";
/// Component name of text paragraphs.
pub const PARAGRAPH_COMPONENT_NAME: &str = "Paragraph";

/// Default handle of [`VIEW_COMPONENT_NAME`].
pub const VIEW_COMPONENT_HANDLE: ComponentHandle = 1;
/// Default handle of [`PARAGRAPH_COMPONENT_NAME`].
pub const PARAGRAPH_COMPONENT_HANDLE: ComponentHandle = 2;

/// Builds the built-in component instances.
#[derive(Clone, Copy, Debug, Default)]
pub struct PlatformComponentDelegate;

impl ComponentInstanceFactoryDelegate for PlatformComponentDelegate {
    fn create(&self, ctx: &ComponentInstanceContext) -> Option<ComponentInstanceRef> {
        match ctx.component_name.as_str() {
            VIEW_COMPONENT_NAME => Some(ViewComponentInstance::new_arc(ctx)),
            PARAGRAPH_COMPONENT_NAME => Some(ParagraphComponentInstance::new_arc(ctx)),
            _ => None,
        }
    }
}

/// Package that registers the built-in components.
#[derive(Clone, Debug, Default)]
pub struct PlatformPackage;

impl PlatformPackage {
    /// Creates a platform package.
    pub fn new() -> Self {
        Self
    }
}

impl RnohPackage for PlatformPackage {
    fn register(self, registry: &mut PackageRegistry) {
        registry.register_component_delegate(PlatformComponentDelegate);
        registry.register_component_descriptor(GenericComponentDescriptor::new(
            VIEW_COMPONENT_HANDLE,
            VIEW_COMPONENT_NAME,
        ));
        registry.register_component_descriptor(GenericComponentDescriptor::new(
            PARAGRAPH_COMPONENT_HANDLE,
            PARAGRAPH_COMPONENT_NAME,
        ));
    }
}
