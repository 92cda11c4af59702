//! In-memory doubles for the host collaborators.
//!
//! ## Usage
//!
//! Drive the MAIN lane with an [`EventLoopTaskRunner`] owned by the test
//! thread, wrap it with [`event_loop_executor`], and plug in the recording
//! host, node factories, vsync source and component instances below.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Instant,
};

use parking_lot::Mutex;
use rustc_hash::FxHashSet as HashSet;
use serde_json::Value;

use crate::{
    Tag,
    arkts_bridge::{ArkTsHost, ArkTsNodeFactory},
    component_instance::{
        ComponentInstance, ComponentInstanceBase, ComponentInstanceContext, ComponentInstanceRef,
        factory::ComponentInstanceFactoryDelegate,
    },
    config::DEFAULT_FRAME_DURATION,
    error::{RnohError, RnohResult},
    layout::LayoutMetrics,
    native_node::{NativeNodeRef, StackNode},
    props::{SharedProps, SharedState},
    shadow_view::EventEmitter,
    task_executor::{EventLoopTaskRunner, TaskExecutor, TaskRunner},
    vsync::{FrameCallback, FrameTick, VsyncSource},
};

/// An executor whose every lane is `main`.
///
/// All work runs on the test thread when it calls
/// [`EventLoopTaskRunner::run_pending`].
pub fn event_loop_executor(main: Arc<EventLoopTaskRunner>) -> TaskExecutor {
    let runner: Arc<dyn TaskRunner> = main;
    TaskExecutor::new(runner.clone(), runner.clone(), runner, None)
}

/// A call received by [`RecordingArkTsHost`].
#[derive(Clone, Debug, PartialEq)]
pub enum HostCall {
    /// `will_mount` with the serialized batch.
    WillMount(Value),
    /// `do_mount` with the serialized batch.
    DoMount(Value),
    /// `did_mount` with the serialized batch.
    DidMount(Value),
    /// `preallocate` with the serialized descriptor.
    Preallocate(Value),
    /// `dispatch_command`.
    Command(Tag, String, Value),
    /// `set_is_js_responder`.
    JsResponder(Tag, bool, bool),
    /// `send_accessibility_event`.
    AccessibilityEvent(Tag, String),
    /// `post_message`.
    Message(String, Value),
}

/// Host that records every call.
#[derive(Debug, Default)]
pub struct RecordingArkTsHost {
    calls: Mutex<Vec<HostCall>>,
}

impl RecordingArkTsHost {
    /// Every call in arrival order.
    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().clone()
    }

    /// The payloads of the `did_mount` calls.
    pub fn did_mount_batches(&self) -> Vec<Value> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HostCall::DidMount(batch) => Some(batch.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().push(call);
    }
}

impl ArkTsHost for RecordingArkTsHost {
    fn will_mount(&self, mutations: Value) {
        self.record(HostCall::WillMount(mutations));
    }

    fn do_mount(&self, mutations: Value) {
        self.record(HostCall::DoMount(mutations));
    }

    fn did_mount(&self, mutations: Value) {
        self.record(HostCall::DidMount(mutations));
    }

    fn preallocate(&self, descriptor: Value) {
        self.record(HostCall::Preallocate(descriptor));
    }

    fn dispatch_command(&self, tag: Tag, command_name: &str, args: Value) {
        self.record(HostCall::Command(tag, command_name.to_string(), args));
    }

    fn set_is_js_responder(&self, tag: Tag, is_js_responder: bool, block_native_responder: bool) {
        self.record(HostCall::JsResponder(tag, is_js_responder, block_native_responder));
    }

    fn send_accessibility_event(&self, tag: Tag, event_type: &str) {
        self.record(HostCall::AccessibilityEvent(tag, event_type.to_string()));
    }

    fn post_message(&self, name: &str, payload: Value) {
        self.record(HostCall::Message(name.to_string(), payload));
    }
}

/// Node factory that records requests and returns containers.
#[derive(Debug, Default)]
pub struct RecordingNodeFactory {
    requests: Mutex<Vec<(Tag, String)>>,
}

impl RecordingNodeFactory {
    /// Every request in arrival order.
    pub fn requests(&self) -> Vec<(Tag, String)> {
        self.requests.lock().clone()
    }
}

impl ArkTsNodeFactory for RecordingNodeFactory {
    fn create_node(&self, tag: Tag, component_name: &str) -> RnohResult<NativeNodeRef> {
        self.requests.lock().push((tag, component_name.to_string()));
        Ok(StackNode::new_ref())
    }
}

/// Node factory that always fails.
#[derive(Debug, Default)]
pub struct FailingNodeFactory;

impl ArkTsNodeFactory for FailingNodeFactory {
    fn create_node(&self, tag: Tag, component_name: &str) -> RnohResult<NativeNodeRef> {
        Err(RnohError::NativeNode(format!(
            "no node for {component_name} (tag {tag})"
        )))
    }
}

/// Vsync source fired by hand.
#[derive(Default)]
pub struct ManualVsync {
    callbacks: Mutex<Vec<FrameCallback>>,
    frame_index: AtomicU64,
}

impl ManualVsync {
    /// Creates a source with no pending request.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of callbacks waiting for the next frame.
    pub fn pending(&self) -> usize {
        self.callbacks.lock().len()
    }

    /// Delivers a frame starting now to every pending callback.
    pub fn fire(&self) {
        self.fire_at(Instant::now());
    }

    /// Delivers a frame that started at `timestamp` to every pending
    /// callback.
    pub fn fire_at(&self, timestamp: Instant) {
        let callbacks = std::mem::take(&mut *self.callbacks.lock());
        let tick = FrameTick {
            timestamp,
            period: DEFAULT_FRAME_DURATION,
            frame_index: self.frame_index.fetch_add(1, Ordering::Relaxed),
        };
        for callback in callbacks {
            callback(tick);
        }
    }
}

impl VsyncSource for ManualVsync {
    fn request_frame(&self, callback: FrameCallback) {
        self.callbacks.lock().push(callback);
    }
}

/// A hook call received by [`TestComponentInstance`].
#[derive(Clone, Debug, PartialEq)]
pub enum HookCall {
    /// `on_child_inserted` with the child tag and index.
    ChildInserted(Tag, usize),
    /// `on_child_removed` with the child tag.
    ChildRemoved(Tag),
    /// `on_props_changed`.
    PropsChanged(Value),
    /// `on_state_changed`.
    StateChanged(Option<Value>),
    /// `on_layout_changed`.
    LayoutChanged(LayoutMetrics),
    /// `on_event_emitter_changed`.
    EventEmitterChanged(bool),
    /// `on_native_responder_block_change`.
    ResponderBlockChange(bool),
    /// `on_command_received`.
    Command(String),
    /// `on_finalize_updates`.
    FinalizeUpdates,
    /// `on_accessibility_event`.
    AccessibilityEvent(String),
    /// `update_base_node`.
    UpdateBaseNode,
}

/// Component instance that records its hook calls.
pub struct TestComponentInstance {
    base: ComponentInstanceBase,
    node: Mutex<NativeNodeRef>,
    calls: Mutex<Vec<HookCall>>,
    children_seen_on_insert: Mutex<Vec<Vec<Tag>>>,
    children_seen_on_remove: Mutex<Vec<Vec<Tag>>>,
    ignored_keys_seen_on_props: Mutex<Vec<usize>>,
    needs_base_node_update: AtomicBool,
}

impl TestComponentInstance {
    /// Creates an instance for `ctx`.
    pub fn new(ctx: &ComponentInstanceContext) -> Self {
        Self {
            base: ComponentInstanceBase::new(ctx),
            node: Mutex::new(StackNode::new_ref()),
            calls: Mutex::new(Vec::new()),
            children_seen_on_insert: Mutex::new(Vec::new()),
            children_seen_on_remove: Mutex::new(Vec::new()),
            ignored_keys_seen_on_props: Mutex::new(Vec::new()),
            needs_base_node_update: AtomicBool::new(false),
        }
    }

    /// Creates an instance with handle 1 behind a shared handle.
    pub fn new_arc(tag: Tag, component_name: &str) -> Arc<Self> {
        Arc::new(Self::new(&ComponentInstanceContext::new(tag, 1, component_name)))
    }

    /// Every recorded hook call.
    pub fn calls(&self) -> Vec<HookCall> {
        self.calls.lock().clone()
    }

    /// Number of `on_finalize_updates` calls.
    pub fn finalize_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|call| **call == HookCall::FinalizeUpdates)
            .count()
    }

    /// Children tags observed at each `on_child_inserted`.
    pub fn children_seen_on_insert(&self) -> Vec<Vec<Tag>> {
        self.children_seen_on_insert.lock().clone()
    }

    /// Children tags observed at each `on_child_removed`.
    pub fn children_seen_on_remove(&self) -> Vec<Vec<Tag>> {
        self.children_seen_on_remove.lock().clone()
    }

    /// Values passed to `on_native_responder_block_change`.
    pub fn responder_changes(&self) -> Vec<bool> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                HookCall::ResponderBlockChange(blocked) => Some(*blocked),
                _ => None,
            })
            .collect()
    }

    /// Size of the ignored key set observed at each `on_props_changed`.
    pub fn ignored_keys_seen_on_props(&self) -> Vec<usize> {
        self.ignored_keys_seen_on_props.lock().clone()
    }

    /// Makes the next `check_update_base_node` report `true`.
    pub fn request_base_node_update(&self) {
        self.needs_base_node_update.store(true, Ordering::SeqCst);
    }

    fn record(&self, call: HookCall) {
        self.calls.lock().push(call);
    }

    fn child_tags(&self) -> Vec<Tag> {
        self.base.children().iter().map(|child| child.tag()).collect()
    }
}

impl ComponentInstance for TestComponentInstance {
    fn base(&self) -> &ComponentInstanceBase {
        &self.base
    }

    fn local_root_node(&self) -> NativeNodeRef {
        self.node.lock().clone()
    }

    fn on_child_inserted(&self, child: &ComponentInstanceRef, index: usize) {
        self.children_seen_on_insert.lock().push(self.child_tags());
        self.local_root_node()
            .insert_child(&child.local_root_node(), index);
        self.record(HookCall::ChildInserted(child.tag(), index));
    }

    fn on_child_removed(&self, child: &ComponentInstanceRef) {
        self.children_seen_on_remove.lock().push(self.child_tags());
        self.local_root_node().remove_child(&child.local_root_node());
        self.record(HookCall::ChildRemoved(child.tag()));
    }

    fn on_props_changed(&self, props: &SharedProps) {
        self.ignored_keys_seen_on_props
            .lock()
            .push(self.base.ignored_prop_keys().len());
        self.record(HookCall::PropsChanged(props.to_value()));
    }

    fn on_state_changed(&self, state: Option<&SharedState>) {
        self.record(HookCall::StateChanged(state.map(|state| state.data.clone())));
    }

    fn on_layout_changed(&self, layout_metrics: &LayoutMetrics) {
        self.local_root_node().set_layout(layout_metrics.frame);
        self.record(HookCall::LayoutChanged(*layout_metrics));
    }

    fn on_event_emitter_changed(&self, event_emitter: Option<&Arc<dyn EventEmitter>>) {
        self.record(HookCall::EventEmitterChanged(event_emitter.is_some()));
    }

    fn on_native_responder_block_change(&self, blocked: bool) {
        self.record(HookCall::ResponderBlockChange(blocked));
    }

    fn on_command_received(&self, command_name: &str, _args: &Value) {
        self.record(HookCall::Command(command_name.to_string()));
    }

    fn on_finalize_updates(&self) {
        self.record(HookCall::FinalizeUpdates);
    }

    fn on_accessibility_event(&self, event_type: &str) {
        self.record(HookCall::AccessibilityEvent(event_type.to_string()));
    }

    fn check_update_base_node(&self) -> bool {
        self.needs_base_node_update.load(Ordering::SeqCst)
    }

    fn update_base_node(&self) {
        self.needs_base_node_update.store(false, Ordering::SeqCst);
        let node = StackNode::new_ref();
        for (index, child) in self.base.children().iter().enumerate() {
            node.insert_child(&child.local_root_node(), index);
        }
        *self.node.lock() = node;
        self.record(HookCall::UpdateBaseNode);
    }
}

/// Delegate building [`TestComponentInstance`]s for a fixed set of names.
pub struct TestComponentDelegate {
    names: HashSet<String>,
    created: AtomicUsize,
    instances: Mutex<Vec<Arc<TestComponentInstance>>>,
}

impl TestComponentDelegate {
    /// Creates a delegate recognizing `names`.
    pub fn new<'a>(names: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            names: names.into_iter().map(str::to_string).collect(),
            created: AtomicUsize::new(0),
            instances: Mutex::new(Vec::new()),
        }
    }

    /// Number of instances built so far, classification probes included.
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// The most recently built instance for `tag`.
    pub fn last_instance(&self, tag: Tag) -> Option<Arc<TestComponentInstance>> {
        self.instances
            .lock()
            .iter()
            .rev()
            .find(|instance| instance.base.tag() == tag)
            .cloned()
    }
}

impl ComponentInstanceFactoryDelegate for TestComponentDelegate {
    fn create(&self, ctx: &ComponentInstanceContext) -> Option<ComponentInstanceRef> {
        if !self.names.contains(&ctx.component_name) {
            return None;
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        let instance = Arc::new(TestComponentInstance::new(ctx));
        self.instances.lock().push(Arc::clone(&instance));
        Some(instance)
    }
}

/// Event emitter that records dispatched events.
#[derive(Debug, Default)]
pub struct RecordingEventEmitter {
    events: Mutex<Vec<(String, Value)>>,
}

impl RecordingEventEmitter {
    /// Every dispatched event.
    pub fn events(&self) -> Vec<(String, Value)> {
        self.events.lock().clone()
    }
}

impl EventEmitter for RecordingEventEmitter {
    fn dispatch_event(&self, name: &str, payload: Value) {
        self.events.lock().push((name.to_string(), payload));
    }
}
