//! The generic container component.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use rnoh_core::{
    ComponentInstance, ComponentInstanceBase, ComponentInstanceContext, NativeNodeRef, StackNode,
    serde_json::Value,
};
use tracing::debug;

/// Container that lays its children out in a [`StackNode`].
///
/// Understands the `focus` and `blur` commands and mirrors whether native
/// gesture handling is blocked.
#[derive(Debug)]
pub struct ViewComponentInstance {
    base: ComponentInstanceBase,
    node: NativeNodeRef,
    focused: AtomicBool,
    responder_blocked: AtomicBool,
}

impl ViewComponentInstance {
    /// Creates a view for `ctx`.
    pub fn new(ctx: &ComponentInstanceContext) -> Self {
        Self {
            base: ComponentInstanceBase::new(ctx),
            node: StackNode::new_ref(),
            focused: AtomicBool::new(false),
            responder_blocked: AtomicBool::new(false),
        }
    }

    /// Creates a view behind a shared handle.
    pub fn new_arc(ctx: &ComponentInstanceContext) -> Arc<Self> {
        Arc::new(Self::new(ctx))
    }

    /// Whether the last focus command was `focus`.
    pub fn is_focused(&self) -> bool {
        self.focused.load(Ordering::Relaxed)
    }

    /// Whether native gesture handling is currently blocked.
    pub fn is_responder_blocked(&self) -> bool {
        self.responder_blocked.load(Ordering::Relaxed)
    }
}

impl ComponentInstance for ViewComponentInstance {
    fn base(&self) -> &ComponentInstanceBase {
        &self.base
    }

    fn local_root_node(&self) -> NativeNodeRef {
        self.node.clone()
    }

    fn on_native_responder_block_change(&self, blocked: bool) {
        self.responder_blocked.store(blocked, Ordering::Relaxed);
    }

    fn on_command_received(&self, command_name: &str, _args: &Value) {
        match command_name {
            "focus" => self.focused.store(true, Ordering::Relaxed),
            "blur" => self.focused.store(false, Ordering::Relaxed),
            _ => debug!(tag = self.base.tag(), command_name, "unknown view command"),
        }
    }
}
