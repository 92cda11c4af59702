//! Component instances, the live native counterpart of shadow-tree nodes.
//!
//! ## Usage
//!
//! Implement [`ComponentInstance`] for a widget type, embed a
//! [`ComponentInstanceBase`] for the shared bookkeeping, and override the
//! hooks the widget cares about. The mounting manager drives the tree through
//! the inherent methods on `dyn ComponentInstance` ([`insert_child`],
//! [`remove_child`], [`set_native_responder_blocked`], [`handle_command`],
//! [`finalize_updates`]), which call the hooks in a fixed order.
//!
//! Parents own their children through [`ComponentInstanceRef`]; children
//! point back through a [`ComponentInstanceWeak`].
//!
//! [`insert_child`]: trait.ComponentInstance.html#method.insert_child
//! [`remove_child`]: trait.ComponentInstance.html#method.remove_child
//! [`set_native_responder_blocked`]: trait.ComponentInstance.html#method.set_native_responder_blocked
//! [`handle_command`]: trait.ComponentInstance.html#method.handle_command
//! [`finalize_updates`]: trait.ComponentInstance.html#method.finalize_updates

pub mod factory;
pub mod fallback;
pub mod preallocation;
pub mod provider;
pub mod registry;

use std::{
    fmt,
    sync::{Arc, Weak},
};

use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::Mutex;
use rustc_hash::FxHashSet as HashSet;
use serde_json::Value;

use crate::{
    ComponentHandle, Tag,
    layout::LayoutMetrics,
    native_node::NativeNodeRef,
    props::{Props, SharedProps, SharedState},
    shadow_view::EventEmitter,
};

/// Shared handle to a component instance.
pub type ComponentInstanceRef = Arc<dyn ComponentInstance>;

/// Non-owning handle to a component instance.
pub type ComponentInstanceWeak = Weak<dyn ComponentInstance>;

/// Identity of the component instance to build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentInstanceContext {
    /// Node identity.
    pub tag: Tag,
    /// Numeric component class.
    pub component_handle: ComponentHandle,
    /// Component class name.
    pub component_name: String,
}

impl ComponentInstanceContext {
    /// Creates a context.
    pub fn new(tag: Tag, component_handle: ComponentHandle, component_name: impl Into<String>) -> Self {
        Self {
            tag,
            component_handle,
            component_name: component_name.into(),
        }
    }
}

/// A live native widget bound to one shadow-tree node.
///
/// Every hook has a default. The structural defaults attach and detach the
/// children's [`local_root_node`](ComponentInstance::local_root_node) on this
/// instance's node, and the layout default positions the node.
pub trait ComponentInstance: DowncastSync {
    /// Shared bookkeeping of the instance.
    fn base(&self) -> &ComponentInstanceBase;

    /// Native node representing this instance inside its parent.
    fn local_root_node(&self) -> NativeNodeRef;

    /// Called by `insert_child` before the child is spliced into
    /// [`ComponentInstanceBase::children`].
    fn on_child_inserted(&self, child: &ComponentInstanceRef, index: usize) {
        self.local_root_node()
            .insert_child(&child.local_root_node(), index);
    }

    /// Called by `remove_child` after the child left
    /// [`ComponentInstanceBase::children`].
    fn on_child_removed(&self, child: &ComponentInstanceRef) {
        self.local_root_node().remove_child(&child.local_root_node());
    }

    /// Called after new props were assigned.
    fn on_props_changed(&self, _props: &SharedProps) {}

    /// Called after new state was assigned.
    fn on_state_changed(&self, _state: Option<&SharedState>) {}

    /// Called after new layout metrics were assigned.
    fn on_layout_changed(&self, layout_metrics: &LayoutMetrics) {
        self.local_root_node().set_layout(layout_metrics.frame);
    }

    /// Called after a new event emitter was assigned.
    fn on_event_emitter_changed(&self, _event_emitter: Option<&Arc<dyn EventEmitter>>) {}

    /// Called when the instance becomes blocked or unblocked for native
    /// gesture handling.
    fn on_native_responder_block_change(&self, _blocked: bool) {}

    /// Called for commands dispatched from JS.
    fn on_command_received(&self, _command_name: &str, _args: &Value) {}

    /// Called once per transaction after all mutations touching the instance
    /// were applied.
    fn on_finalize_updates(&self) {}

    /// Called for accessibility events raised by the scheduler.
    fn on_accessibility_event(&self, _event_type: &str) {}

    /// Returns `true` when the native node must be rebuilt before the next
    /// child can be attached.
    fn check_update_base_node(&self) -> bool {
        false
    }

    /// Rebuilds the native node. Called while the instance is detached from
    /// its parent.
    fn update_base_node(&self) {}
}

impl_downcast!(sync ComponentInstance);

/// Returns `true` when both handles refer to the same instance.
pub fn same_instance(a: &ComponentInstanceRef, b: &ComponentInstanceRef) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

pub(crate) fn instance_address(instance: &ComponentInstanceRef) -> usize {
    Arc::as_ptr(instance).cast::<()>() as usize
}

/// Bookkeeping shared by every component instance.
///
/// The mutable part sits behind one lock that is never held while a hook
/// runs, so hooks may freely call back into the instance.
pub struct ComponentInstanceBase {
    tag: Tag,
    component_handle: ComponentHandle,
    component_name: String,
    inner: Mutex<BaseState>,
}

struct BaseState {
    parent: Option<ComponentInstanceWeak>,
    children: Vec<ComponentInstanceRef>,
    index: usize,
    layout_metrics: LayoutMetrics,
    props: SharedProps,
    state: Option<SharedState>,
    event_emitter: Option<Arc<dyn EventEmitter>>,
    id: String,
    ignored_prop_keys: HashSet<String>,
    responder_blockers: HashSet<String>,
}

impl ComponentInstanceBase {
    /// Creates the bookkeeping for the instance described by `ctx`.
    pub fn new(ctx: &ComponentInstanceContext) -> Self {
        Self {
            tag: ctx.tag,
            component_handle: ctx.component_handle,
            component_name: ctx.component_name.clone(),
            inner: Mutex::new(BaseState {
                parent: None,
                children: Vec::new(),
                index: 0,
                layout_metrics: LayoutMetrics::default(),
                props: Arc::new(Props::default()),
                state: None,
                event_emitter: None,
                id: String::new(),
                ignored_prop_keys: HashSet::default(),
                responder_blockers: HashSet::default(),
            }),
        }
    }

    /// Node identity.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Numeric component class.
    pub fn component_handle(&self) -> ComponentHandle {
        self.component_handle
    }

    /// Component class name.
    pub fn component_name(&self) -> &str {
        &self.component_name
    }

    /// The parent, while it is alive and this instance is attached.
    pub fn parent(&self) -> Option<ComponentInstanceRef> {
        self.inner.lock().parent.as_ref().and_then(Weak::upgrade)
    }

    /// Snapshot of the children in visual order.
    pub fn children(&self) -> Vec<ComponentInstanceRef> {
        self.inner.lock().children.clone()
    }

    /// Position within the parent's children.
    pub fn index(&self) -> usize {
        self.inner.lock().index
    }

    /// Current layout metrics.
    pub fn layout_metrics(&self) -> LayoutMetrics {
        self.inner.lock().layout_metrics
    }

    /// Current props.
    pub fn props(&self) -> SharedProps {
        Arc::clone(&self.inner.lock().props)
    }

    /// Current state.
    pub fn state(&self) -> Option<SharedState> {
        self.inner.lock().state.clone()
    }

    /// Current event emitter.
    pub fn event_emitter(&self) -> Option<Arc<dyn EventEmitter>> {
        self.inner.lock().event_emitter.clone()
    }

    /// Native id derived from the props, empty when unset.
    pub fn id(&self) -> String {
        self.inner.lock().id.clone()
    }

    /// Keys owned by a lower layer that prop hooks should not re-apply.
    pub fn ignored_prop_keys(&self) -> HashSet<String> {
        self.inner.lock().ignored_prop_keys.clone()
    }

    /// Returns `true` when `key` is currently ignored.
    pub fn is_prop_ignored(&self, key: &str) -> bool {
        self.inner.lock().ignored_prop_keys.contains(key)
    }

    /// Replaces the ignored prop keys.
    pub fn set_ignored_prop_keys(&self, keys: HashSet<String>) {
        self.inner.lock().ignored_prop_keys = keys;
    }

    /// Returns `true` while at least one origin blocks native responders.
    pub fn is_native_responder_blocked(&self) -> bool {
        !self.inner.lock().responder_blockers.is_empty()
    }

    fn set_parent(&self, parent: Option<ComponentInstanceWeak>) {
        self.inner.lock().parent = parent;
    }

    fn set_index(&self, index: usize) {
        self.inner.lock().index = index;
    }

    /// Splices `child` in and returns the siblings whose index moved.
    #[track_caller]
    fn splice_child(&self, child: &ComponentInstanceRef, index: usize) -> Vec<ComponentInstanceRef> {
        let mut inner = self.inner.lock();
        inner.children.insert(index, Arc::clone(child));
        inner.children[index + 1..].to_vec()
    }

    /// Removes `child` and returns it with the siblings whose index moved.
    fn take_child(
        &self,
        child: &ComponentInstanceRef,
    ) -> Option<(ComponentInstanceRef, usize, Vec<ComponentInstanceRef>)> {
        let mut inner = self.inner.lock();
        let position = inner
            .children
            .iter()
            .position(|candidate| same_instance(candidate, child))?;
        let removed = inner.children.remove(position);
        let shifted = inner.children[position..].to_vec();
        Some((removed, position, shifted))
    }

    /// Updates the blocker set and returns `(was_blocked, is_blocked)`.
    fn update_responder_blockers(&self, blocked: bool, origin: &str) -> (bool, bool) {
        let mut inner = self.inner.lock();
        let was_blocked = !inner.responder_blockers.is_empty();
        if blocked {
            inner.responder_blockers.insert(origin.to_string());
        } else {
            inner.responder_blockers.remove(origin);
        }
        (was_blocked, !inner.responder_blockers.is_empty())
    }
}

impl fmt::Debug for ComponentInstanceBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstanceBase")
            .field("tag", &self.tag)
            .field("component_name", &self.component_name)
            .finish_non_exhaustive()
    }
}

fn renumber(from: usize, siblings: &[ComponentInstanceRef]) {
    for (offset, sibling) in siblings.iter().enumerate() {
        sibling.base().set_index(from + offset);
    }
}

impl dyn ComponentInstance {
    /// Node identity.
    pub fn tag(&self) -> Tag {
        self.base().tag()
    }

    /// Component class name.
    pub fn component_name(&self) -> &str {
        self.base().component_name()
    }

    /// The parent, while attached.
    pub fn parent(&self) -> Option<ComponentInstanceRef> {
        self.base().parent()
    }

    /// Snapshot of the children in visual order.
    pub fn children(&self) -> Vec<ComponentInstanceRef> {
        self.base().children()
    }

    /// Position within the parent's children.
    pub fn index(&self) -> usize {
        self.base().index()
    }

    /// Native id derived from the props.
    pub fn id(&self) -> String {
        self.base().id()
    }

    /// Current props.
    pub fn props(&self) -> SharedProps {
        self.base().props()
    }

    /// Attaches `child` at `index`.
    ///
    /// The child's parent is set first, then
    /// [`on_child_inserted`](ComponentInstance::on_child_inserted) runs while
    /// the children sequence still lacks the child, then the child is spliced
    /// in.
    ///
    /// # Panics
    ///
    /// Panics if `index` is greater than the number of children.
    #[track_caller]
    pub fn insert_child(self: &Arc<Self>, child: &ComponentInstanceRef, index: usize) {
        child.base().set_parent(Some(Arc::downgrade(self)));
        self.on_child_inserted(child, index);
        child.base().set_index(index);
        let shifted = self.base().splice_child(child, index);
        renumber(index + 1, &shifted);
    }

    /// Detaches `child` if it is a child of this instance.
    ///
    /// [`on_child_removed`](ComponentInstance::on_child_removed) runs after
    /// the child left the children sequence.
    pub fn remove_child(&self, child: &ComponentInstanceRef) {
        let Some((removed, position, shifted)) = self.base().take_child(child) else {
            return;
        };
        renumber(position, &shifted);
        removed.base().set_parent(None);
        self.on_child_removed(&removed);
    }

    /// Adds or removes `origin` from the set of responder blockers.
    ///
    /// [`on_native_responder_block_change`](ComponentInstance::on_native_responder_block_change)
    /// fires when the set becomes non-empty or empty, and not when it only
    /// changes size.
    pub fn set_native_responder_blocked(&self, blocked: bool, origin: &str) {
        let (was_blocked, is_blocked) = self.base().update_responder_blockers(blocked, origin);
        if was_blocked != is_blocked {
            self.on_native_responder_block_change(is_blocked);
        }
    }

    /// Returns `true` while at least one origin blocks native responders.
    pub fn is_native_responder_blocked(&self) -> bool {
        self.base().is_native_responder_blocked()
    }

    /// Forwards a JS command to the instance.
    pub fn handle_command(&self, command_name: &str, args: &Value) {
        self.on_command_received(command_name, args);
    }

    /// Forwards an accessibility event to the instance.
    pub fn send_accessibility_event(&self, event_type: &str) {
        self.on_accessibility_event(event_type);
    }

    /// Runs the end-of-transaction hook.
    pub fn finalize_updates(&self) {
        self.on_finalize_updates();
    }

    /// Replaces the props wholesale.
    ///
    /// The ignored keys are cleared while the new props are assigned and
    /// announced, then restored. The native id follows the new props.
    pub fn set_props(&self, props: SharedProps) {
        let saved_ignored = {
            let mut inner = self.base().inner.lock();
            let saved = std::mem::take(&mut inner.ignored_prop_keys);
            inner.id = props.native_id().to_string();
            inner.props = Arc::clone(&props);
            saved
        };
        self.on_props_changed(&props);
        self.base().set_ignored_prop_keys(saved_ignored);
    }

    /// Replaces the state wholesale.
    pub fn set_state(&self, state: Option<SharedState>) {
        self.base().inner.lock().state = state.clone();
        self.on_state_changed(state.as_ref());
    }

    /// Replaces the layout metrics.
    pub fn set_layout(&self, layout_metrics: LayoutMetrics) {
        self.base().inner.lock().layout_metrics = layout_metrics;
        self.on_layout_changed(&layout_metrics);
    }

    /// Replaces the event emitter.
    pub fn set_event_emitter(&self, event_emitter: Option<Arc<dyn EventEmitter>>) {
        self.base().inner.lock().event_emitter = event_emitter.clone();
        self.on_event_emitter_changed(event_emitter.as_ref());
    }
}

impl fmt::Debug for dyn ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("tag", &self.tag())
            .field("component_name", &self.component_name())
            .finish_non_exhaustive()
    }
}
