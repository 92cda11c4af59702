//! Error type shared by the mounting pipeline.
//!
//! Only expected runtime conditions are represented here. Invariant
//! violations (wrong thread, out-of-range child index) panic instead.

use thiserror::Error;

use crate::{Tag, config::Architecture};

/// Convenience alias for results produced by this crate.
pub type RnohResult<T> = Result<T, RnohError>;

/// Recoverable failures of the mounting pipeline and its collaborators.
#[derive(Debug, Error)]
pub enum RnohError {
    /// No component instance is registered under the tag.
    #[error("component instance with tag {tag} not found")]
    ComponentNotFound {
        /// Tag that was looked up.
        tag: Tag,
    },
    /// The parent referenced by an Insert or Remove mutation is missing.
    #[error("parent {parent_tag} of child {child_tag} not found")]
    ParentNotFound {
        /// Tag of the missing parent.
        parent_tag: Tag,
        /// Tag of the child being attached or detached.
        child_tag: Tag,
    },
    /// No descriptor knows how to clone props for the component.
    #[error("component descriptor for {component_name} not found")]
    MissingComponentDescriptor {
        /// Component name that was looked up.
        component_name: String,
    },
    /// Walking up from the tag did not end at a surface root.
    #[error("couldn't resolve surface for tag {tag}")]
    MalformedSurface {
        /// Tag whose root is not a surface root.
        tag: Tag,
    },
    /// The operation is not available for the active architecture.
    #[error("{operation} is not supported by the {architecture:?} architecture")]
    Unsupported {
        /// Name of the rejected operation.
        operation: &'static str,
        /// Architecture that rejected it.
        architecture: Architecture,
    },
    /// The host failed to provide a native node.
    #[error("native node error: {0}")]
    NativeNode(String),
    /// A turbo module could not be created or failed a call.
    #[error("turbo module {name} failed: {reason}")]
    TurboModule {
        /// Module name.
        name: String,
        /// Failure description.
        reason: String,
    },
    /// The ArkTS host rejected a message.
    #[error("bridge error: {0}")]
    Bridge(String),
    /// A task lane is gone or a synchronous task never reported back.
    #[error("task executor error: {0}")]
    TaskExecutor(String),
}
