//! Native mounting.
//!
//! ## Usage
//!
//! [`MountingManagerCapi`] applies every mutation to the component instance
//! tree and forwards the mutations of components it cannot build natively to
//! a wrapped [`MountingManagerArkTs`]. Whether a component is native is
//! decided once per component name and remembered.
//!
//! A `did_mount` batch runs in a fixed order: forward host-owned mutations
//! with their origin reset, drop pending preallocation requests, apply each
//! mutation (a failing one is logged and skipped), finalize every touched
//! instance once, then clear the host's preallocation bookkeeping. The
//! finalize dedup is scoped to the batch, not to the whole transaction.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use parking_lot::Mutex;
use rustc_hash::FxHashSet as HashSet;
use serde_json::Value;
use smallvec::{SmallVec, smallvec};
use tracing::{debug, error, warn};

use super::{MountingManager, arkts::MountingManagerArkTs};
use crate::{
    Tag,
    component_descriptor::{ComponentDescriptorRegistry, PropsParserContext},
    component_instance::{
        ComponentInstanceRef, factory::ComponentInstanceFactory, instance_address,
        provider::ComponentInstanceProvider, registry::ComponentInstanceRegistry,
    },
    error::{RnohError, RnohResult},
    is_surface_root_tag,
    mutation::{MutationType, ShadowViewMutation},
    shadow_view::ShadowView,
    thread_utils::ThreadGuard,
};

/// Origin used when JS takes over the gesture.
pub const REACT_NATIVE_RESPONDER_ORIGIN: &str = "REACT_NATIVE";

type Touched = SmallVec<[ComponentInstanceRef; 2]>;

/// Mounting manager that builds native component instances.
pub struct MountingManagerCapi {
    guard: ThreadGuard,
    arkts: Arc<MountingManagerArkTs>,
    registry: Arc<ComponentInstanceRegistry>,
    factory: Arc<ComponentInstanceFactory>,
    provider: Arc<ComponentInstanceProvider>,
    descriptors: Arc<ComponentDescriptorRegistry>,
    capi_component_names: Mutex<HashSet<String>>,
    arkts_component_names: Mutex<HashSet<String>>,
}

impl MountingManagerCapi {
    /// Creates a manager bound to the calling thread.
    pub fn new(
        arkts: Arc<MountingManagerArkTs>,
        registry: Arc<ComponentInstanceRegistry>,
        factory: Arc<ComponentInstanceFactory>,
        provider: Arc<ComponentInstanceProvider>,
        descriptors: Arc<ComponentDescriptorRegistry>,
    ) -> Self {
        Self {
            guard: ThreadGuard::new(),
            arkts,
            registry,
            factory,
            provider,
            descriptors,
            capi_component_names: Mutex::new(HashSet::default()),
            arkts_component_names: Mutex::new(HashSet::default()),
        }
    }

    /// The wrapped host-forwarding manager.
    pub fn arkts(&self) -> &Arc<MountingManagerArkTs> {
        &self.arkts
    }

    /// The instance registry.
    pub fn registry(&self) -> &Arc<ComponentInstanceRegistry> {
        &self.registry
    }

    /// Returns `true` when the component behind `view` is built natively.
    ///
    /// The first call for a component name probes the factory; the answer is
    /// remembered for the lifetime of the manager.
    #[track_caller]
    pub fn is_capi_component(&self, view: &ShadowView) -> bool {
        self.guard.assert_thread();
        let name = view.component_name.as_str();
        if self.capi_component_names.lock().contains(name) {
            return true;
        }
        if self.arkts_component_names.lock().contains(name) {
            return false;
        }
        let is_capi = self
            .factory
            .create(view.tag, view.component_handle, name)
            .is_some();
        let names = if is_capi {
            &self.capi_component_names
        } else {
            &self.arkts_component_names
        };
        names.lock().insert(name.to_string());
        debug!(component_name = name, is_capi, "component classified");
        is_capi
    }

    fn is_capi_mutation(&self, mutation: &ShadowViewMutation) -> bool {
        match mutation.mutation_type {
            MutationType::Create | MutationType::Update | MutationType::Delete => {
                self.is_capi_component(mutation.subject_view())
            }
            MutationType::Insert | MutationType::Remove => {
                self.is_capi_component(&mutation.parent_shadow_view)
                    && self.is_capi_component(mutation.subject_view())
            }
            MutationType::RemoveDeleteTree => false,
        }
    }

    fn find(&self, tag: Tag) -> RnohResult<ComponentInstanceRef> {
        self.registry
            .find_by_tag(tag)
            .ok_or(RnohError::ComponentNotFound { tag })
    }

    fn find_parent(&self, mutation: &ShadowViewMutation) -> RnohResult<ComponentInstanceRef> {
        let parent_tag = mutation.parent_shadow_view.tag;
        self.registry
            .find_by_tag(parent_tag)
            .ok_or(RnohError::ParentNotFound {
                parent_tag,
                child_tag: mutation.subject_view().tag,
            })
    }

    fn handle_mutation(&self, mutation: &ShadowViewMutation) -> RnohResult<Touched> {
        match mutation.mutation_type {
            MutationType::Create => {
                let view = &mutation.new_child_shadow_view;
                let instance = match self.provider.get_component_instance(
                    view.tag,
                    view.component_handle,
                    &view.component_name,
                ) {
                    Some(instance) => instance,
                    None => self.factory.create_arkts_component(
                        view.tag,
                        view.component_handle,
                        &view.component_name,
                    ),
                };
                self.registry.insert(Arc::clone(&instance));
                self.apply_shadow_view(&instance, view);
                Ok(smallvec![instance])
            }
            MutationType::Delete => {
                self.registry.delete_by_tag(mutation.old_child_shadow_view.tag);
                Ok(Touched::new())
            }
            MutationType::Insert => {
                let parent = self.find_parent(mutation)?;
                let child = self.find(mutation.new_child_shadow_view.tag)?;
                if parent.check_update_base_node() {
                    self.rebuild_base_node(&parent);
                }
                parent.insert_child(&child, mutation.index);
                Ok(smallvec![parent, child])
            }
            MutationType::Remove => {
                let parent = self.find_parent(mutation)?;
                let child = self.find(mutation.old_child_shadow_view.tag)?;
                parent.remove_child(&child);
                Ok(smallvec![parent])
            }
            MutationType::Update => {
                let view = &mutation.new_child_shadow_view;
                let instance = self.find(view.tag)?;
                self.apply_shadow_view(&instance, view);
                Ok(smallvec![instance])
            }
            MutationType::RemoveDeleteTree => Ok(Touched::new()),
        }
    }

    /// Detaches `instance`, lets it swap its native node, and puts it back
    /// at the same index.
    fn rebuild_base_node(&self, instance: &ComponentInstanceRef) {
        match instance.parent() {
            Some(grandparent) => {
                let index = instance.index();
                grandparent.remove_child(instance);
                instance.update_base_node();
                grandparent.insert_child(instance, index);
            }
            None => instance.update_base_node(),
        }
    }

    fn apply_shadow_view(&self, instance: &ComponentInstanceRef, view: &ShadowView) {
        // The id index must move before the props carrying the new id land.
        self.registry
            .update_tag_by_id(view.tag, view.props.native_id(), &instance.id());
        instance.set_props(Arc::clone(&view.props));
        instance.set_state(view.state.clone());
        instance.set_layout(view.layout_metrics);
        instance.set_event_emitter(view.event_emitter.clone());
    }

    fn try_update_view(&self, tag: Tag, props: &Value) -> RnohResult<()> {
        let instance = self.find(tag)?;
        let mut root = Arc::clone(&instance);
        while let Some(parent) = root.parent() {
            root = parent;
        }
        if !is_surface_root_tag(root.tag()) {
            return Err(RnohError::MalformedSurface { tag });
        }
        let component_handle = instance.base().component_handle();
        let descriptor = self
            .descriptors
            .find(component_handle, instance.component_name())
            .ok_or_else(|| RnohError::MissingComponentDescriptor {
                component_name: instance.component_name().to_string(),
            })?;
        let context = PropsParserContext {
            surface_id: root.tag(),
        };
        let new_props = descriptor.clone_props(&context, &instance.props(), props);
        self.registry
            .update_tag_by_id(tag, new_props.native_id(), &instance.id());
        instance.set_props(new_props);
        instance.finalize_updates();
        Ok(())
    }
}

impl MountingManager for MountingManagerCapi {
    fn will_mount(&self, _mutations: &[ShadowViewMutation]) {}

    fn do_mount(&self, mutations: &[ShadowViewMutation]) {
        // Snapshots cover native nodes too; the host gets the bridge-owned
        // subset in did_mount only.
        self.arkts.record_snapshots(mutations);
    }

    #[track_caller]
    fn did_mount(&self, mutations: &[ShadowViewMutation]) {
        self.guard.assert_thread();

        let arkts_mutations: Vec<ShadowViewMutation> = mutations
            .iter()
            .filter(|mutation| !self.is_capi_mutation(mutation))
            .map(ShadowViewMutation::with_origin_reset)
            .collect();
        self.arkts.did_mount(&arkts_mutations);

        self.provider.clear_preallocation_request_queue();

        let mut touched: Vec<ComponentInstanceRef> = Vec::new();
        let mut seen: HashSet<usize> = HashSet::default();
        for mutation in mutations {
            let result = panic::catch_unwind(AssertUnwindSafe(|| self.handle_mutation(mutation)));
            let view = mutation.subject_view();
            match result {
                Ok(Ok(instances)) => {
                    for instance in instances {
                        if seen.insert(instance_address(&instance)) {
                            touched.push(instance);
                        }
                    }
                }
                Ok(Err(err)) => error!(
                    mutation_type = ?mutation.mutation_type,
                    component_name = %view.component_name,
                    tag = view.tag,
                    %err,
                    "failed to apply mutation"
                ),
                Err(_) => error!(
                    mutation_type = ?mutation.mutation_type,
                    component_name = %view.component_name,
                    tag = view.tag,
                    "component panicked while applying mutation"
                ),
            }
        }

        for instance in touched {
            instance.finalize_updates();
        }
        self.arkts.clear_preallocated_views();
    }

    fn dispatch_command(&self, view: &ShadowView, command_name: &str, args: Value) {
        if !self.is_capi_component(view) {
            self.arkts.dispatch_command(view, command_name, args);
            return;
        }
        match self.find(view.tag) {
            Ok(instance) => instance.handle_command(command_name, &args),
            Err(err) => warn!(command_name, %err, "dropping command"),
        }
    }

    fn set_is_js_responder(
        &self,
        view: &ShadowView,
        is_js_responder: bool,
        block_native_responder: bool,
    ) {
        if !self.is_capi_component(view) {
            self.arkts
                .set_is_js_responder(view, is_js_responder, block_native_responder);
            return;
        }
        let mut current = match self.find(view.tag) {
            Ok(instance) => Some(instance),
            Err(err) => {
                warn!(%err, "dropping responder change");
                None
            }
        };
        let blocked = is_js_responder && block_native_responder;
        while let Some(instance) = current {
            instance.set_native_responder_blocked(blocked, REACT_NATIVE_RESPONDER_ORIGIN);
            current = instance.parent();
        }
    }

    fn scheduler_did_send_accessibility_event(&self, view: &ShadowView, event_type: &str) {
        if !self.is_capi_component(view) {
            self.arkts
                .scheduler_did_send_accessibility_event(view, event_type);
            return;
        }
        match self.find(view.tag) {
            Ok(instance) => instance.send_accessibility_event(event_type),
            Err(err) => warn!(event_type, %err, "dropping accessibility event"),
        }
    }

    #[track_caller]
    fn update_view(&self, tag: Tag, props: Value) -> RnohResult<()> {
        self.guard.assert_thread();
        if let Err(err) = self.try_update_view(tag, &props) {
            warn!(tag, %err, "skipping update_view");
        }
        Ok(())
    }

    fn clear_preallocated_views(&self) {
        self.provider.clear_preallocated_views();
        self.arkts.clear_preallocated_views();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::MountingManagerCapi;
    use crate::{
        Tag,
        arkts_bridge::{ArkTsChannel, ArkTsHost, ArkTsNodeFactory},
        component_descriptor::{ComponentDescriptorRegistry, GenericComponentDescriptor},
        component_instance::{
            ComponentInstanceRef, factory::ComponentInstanceFactory,
            factory::ComponentInstanceFactoryDelegate,
            preallocation::ComponentInstancePreallocationRequestQueue,
            provider::ComponentInstanceProvider, registry::ComponentInstanceRegistry,
        },
        config::RnohConfig,
        mounting::{MountingManager, arkts::MountingManagerArkTs},
        mutation::ShadowViewMutation,
        props::Props,
        shadow_view::{ShadowView, ShadowViewRegistry},
        task_executor::EventLoopTaskRunner,
        testing::{
            HookCall, HostCall, ManualVsync, RecordingArkTsHost, RecordingNodeFactory,
            TestComponentDelegate, TestComponentInstance, event_loop_executor,
        },
    };

    struct Fixture {
        host: Arc<RecordingArkTsHost>,
        delegate: Arc<TestComponentDelegate>,
        manager: MountingManagerCapi,
    }

    impl Fixture {
        fn new() -> Self {
            let main = Arc::new(EventLoopTaskRunner::new());
            let executor = event_loop_executor(main);
            let host = Arc::new(RecordingArkTsHost::default());
            let dyn_host: Arc<dyn ArkTsHost> = host.clone();
            let arkts = Arc::new(MountingManagerArkTs::new(
                Arc::new(ShadowViewRegistry::new()),
                ArkTsChannel::new(dyn_host, executor.clone()),
            ));
            let delegate = Arc::new(TestComponentDelegate::new(["View", "Text"]));
            let dyn_delegate: Arc<dyn ComponentInstanceFactoryDelegate> = delegate.clone();
            let node_factory: Arc<dyn ArkTsNodeFactory> = Arc::new(RecordingNodeFactory::default());
            let factory = Arc::new(ComponentInstanceFactory::new(
                vec![dyn_delegate],
                Some(node_factory),
            ));
            let registry = Arc::new(ComponentInstanceRegistry::new());
            let config = RnohConfig::default();
            let provider = ComponentInstanceProvider::new(
                Arc::new(ComponentInstancePreallocationRequestQueue::new()),
                Arc::clone(&factory),
                Arc::clone(&registry),
                Arc::new(ManualVsync::new()),
                executor,
                config.frame_duration,
                config.preallocation_budget(),
            );
            let mut descriptors = ComponentDescriptorRegistry::new();
            descriptors.add(Arc::new(GenericComponentDescriptor::new(1, "View")));
            let manager =
                MountingManagerCapi::new(arkts, registry, factory, provider, Arc::new(descriptors));
            Self {
                host,
                delegate,
                manager,
            }
        }

        fn instance(&self, tag: Tag) -> ComponentInstanceRef {
            self.manager
                .registry()
                .find_by_tag(tag)
                .expect("instance registered")
        }

        fn recorded(&self, tag: Tag) -> Arc<TestComponentInstance> {
            self.instance(tag)
                .downcast_arc::<TestComponentInstance>()
                .ok()
                .expect("test instance")
        }
    }

    fn view(tag: Tag, name: &str) -> ShadowView {
        let handle = if name == "Text" { 2 } else { 1 };
        ShadowView::new(tag, handle, name)
    }

    #[test]
    fn classification_builds_each_name_once() {
        let fixture = Fixture::new();
        assert!(fixture.manager.is_capi_component(&view(2, "View")));
        assert!(fixture.manager.is_capi_component(&view(3, "View")));
        assert!(!fixture.manager.is_capi_component(&view(4, "Image")));
        assert!(!fixture.manager.is_capi_component(&view(5, "Image")));
        assert_eq!(fixture.delegate.created_count(), 1);
    }

    #[test]
    fn host_components_are_forwarded_and_slotted() {
        let fixture = Fixture::new();
        let root = view(1, "View");
        let image = view(2, "Image");
        fixture.manager.did_mount(&[
            ShadowViewMutation::create(root.clone()),
            ShadowViewMutation::create(image.clone()),
            ShadowViewMutation::insert(root, image, 0),
        ]);

        let batches = fixture.host.did_mount_batches();
        assert_eq!(batches.len(), 1);
        let types: Vec<_> = batches[0]
            .as_array()
            .expect("batch array")
            .iter()
            .map(|mutation| mutation["type"].clone())
            .collect();
        assert_eq!(types, vec![json!("CREATE"), json!("INSERT")]);

        let slot = fixture.instance(2);
        assert_eq!(slot.component_name(), "RootView");
        assert_eq!(slot.children()[0].component_name(), "Image");
        assert_eq!(fixture.instance(1).children()[0].tag(), 2);
    }

    #[test]
    fn failing_mutation_does_not_stop_the_batch() {
        let fixture = Fixture::new();
        let root = view(1, "View");
        let child = view(2, "View").with_props(Props::from_value(json!({ "nativeID": "card" })));
        fixture.manager.did_mount(&[
            ShadowViewMutation::create(root.clone()),
            ShadowViewMutation::insert(view(99, "View"), child.clone(), 0),
            ShadowViewMutation::create(child.clone()),
            ShadowViewMutation::update(child.clone(), child.clone()),
            ShadowViewMutation::insert(root, child, 0),
        ]);

        assert_eq!(fixture.instance(1).children().len(), 1);
        assert_eq!(fixture.manager.registry().find_tag_by_id("card"), Some(2));
        assert_eq!(fixture.recorded(2).finalize_count(), 1);
        assert_eq!(fixture.recorded(1).finalize_count(), 1);
    }

    #[test]
    fn base_node_is_rebuilt_in_place() {
        let fixture = Fixture::new();
        let root = view(1, "View");
        let text = view(2, "Text");
        let sibling = view(3, "View");
        let span = view(4, "View");
        fixture.manager.did_mount(&[
            ShadowViewMutation::create(root.clone()),
            ShadowViewMutation::create(text.clone()),
            ShadowViewMutation::create(sibling.clone()),
            ShadowViewMutation::create(span.clone()),
            ShadowViewMutation::insert(root.clone(), text.clone(), 0),
            ShadowViewMutation::insert(root.clone(), sibling, 1),
        ]);
        let text_instance = fixture.recorded(2);
        text_instance.request_base_node_update();

        fixture
            .manager
            .did_mount(&[ShadowViewMutation::insert(text, span, 0)]);

        let calls = text_instance.calls();
        let rebuilt = calls
            .iter()
            .position(|call| *call == HookCall::UpdateBaseNode)
            .expect("base node updated");
        let inserted = calls
            .iter()
            .position(|call| *call == HookCall::ChildInserted(4, 0))
            .expect("span inserted");
        assert!(rebuilt < inserted);

        let root_calls = fixture.recorded(1).calls();
        assert!(root_calls.contains(&HookCall::ChildRemoved(2)));
        assert_eq!(
            root_calls
                .iter()
                .filter(|call| **call == HookCall::ChildInserted(2, 0))
                .count(),
            2
        );
        let children: Vec<Tag> = fixture.instance(1).children().iter().map(|c| c.tag()).collect();
        assert_eq!(children, vec![2, 3]);
        assert_eq!(fixture.instance(2).index(), 0);
    }

    #[test]
    fn responder_block_covers_ancestors() {
        let fixture = Fixture::new();
        let root = view(1, "View");
        let middle = view(2, "View");
        let leaf = view(3, "View");
        fixture.manager.did_mount(&[
            ShadowViewMutation::create(root.clone()),
            ShadowViewMutation::create(middle.clone()),
            ShadowViewMutation::create(leaf.clone()),
            ShadowViewMutation::insert(root, middle.clone(), 0),
            ShadowViewMutation::insert(middle, leaf.clone(), 0),
        ]);

        fixture.manager.set_is_js_responder(&leaf, true, true);
        fixture.manager.set_is_js_responder(&leaf, true, false);

        for tag in [1, 2, 3] {
            assert_eq!(fixture.recorded(tag).responder_changes(), vec![true, false]);
        }
        assert!(fixture.host.calls().is_empty());
    }

    #[test]
    fn update_view_requires_surface_and_descriptor() {
        let fixture = Fixture::new();
        let root = view(1, "View");
        let child = view(2, "View");
        let label = view(3, "Text");
        let orphan = view(12, "View");
        fixture.manager.did_mount(&[
            ShadowViewMutation::create(root.clone()),
            ShadowViewMutation::create(child.clone()),
            ShadowViewMutation::create(label.clone()),
            ShadowViewMutation::create(orphan),
            ShadowViewMutation::insert(root.clone(), child, 0),
            ShadowViewMutation::insert(root, label, 1),
        ]);

        fixture
            .manager
            .update_view(2, json!({ "opacity": 0.5, "nativeID": "hero" }))
            .expect("update_view never fails");
        assert_eq!(
            fixture.instance(2).props().get("opacity"),
            Some(&json!(0.5))
        );
        assert_eq!(fixture.manager.registry().find_tag_by_id("hero"), Some(2));
        assert_eq!(fixture.recorded(2).finalize_count(), 2);

        assert!(fixture.manager.update_view(12, json!({ "opacity": 0.5 })).is_ok());
        assert!(fixture.instance(12).props().get("opacity").is_none());

        assert!(fixture.manager.update_view(3, json!({ "opacity": 0.5 })).is_ok());
        assert!(fixture.instance(3).props().get("opacity").is_none());

        assert!(fixture.manager.update_view(404, json!({})).is_ok());
    }

    #[test]
    fn commands_reach_native_or_host() {
        let fixture = Fixture::new();
        fixture
            .manager
            .did_mount(&[ShadowViewMutation::create(view(1, "View"))]);
        fixture
            .manager
            .dispatch_command(&view(1, "View"), "focus", json!([]));
        fixture
            .manager
            .dispatch_command(&view(7, "Image"), "reload", json!([]));
        assert!(fixture.recorded(1).calls().contains(&HookCall::Command("focus".to_string())));
        assert_eq!(fixture.host.calls().len(), 1);
    }

    #[test]
    fn remove_delete_tree_goes_to_host_only() {
        let fixture = Fixture::new();
        let root = view(1, "View");
        let child = view(2, "View");
        fixture.manager.did_mount(&[
            ShadowViewMutation::create(root.clone()),
            ShadowViewMutation::create(child.clone()),
            ShadowViewMutation::insert(root.clone(), child.clone(), 0),
        ]);
        assert!(fixture.host.did_mount_batches().is_empty());
        let finalized = fixture.recorded(1).finalize_count();

        fixture
            .manager
            .did_mount(&[ShadowViewMutation::remove_delete_tree(root, child, 0)]);

        let batches = fixture.host.did_mount_batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0][0]["type"], json!("REMOVE_DELETE_TREE"));
        assert_eq!(batches[0][0]["childTag"], json!(2));
        assert_eq!(fixture.instance(1).children()[0].tag(), 2);
        assert!(fixture.manager.registry().find_by_tag(2).is_some());
        assert_eq!(fixture.recorded(1).finalize_count(), finalized);
    }

    #[test]
    fn accessibility_events_reach_native_or_host() {
        let fixture = Fixture::new();
        fixture
            .manager
            .did_mount(&[ShadowViewMutation::create(view(1, "View"))]);
        fixture
            .manager
            .scheduler_did_send_accessibility_event(&view(1, "View"), "focus");
        fixture
            .manager
            .scheduler_did_send_accessibility_event(&view(7, "Image"), "announce");

        assert!(
            fixture
                .recorded(1)
                .calls()
                .contains(&HookCall::AccessibilityEvent("focus".to_string()))
        );
        assert_eq!(
            fixture.host.calls(),
            vec![HostCall::AccessibilityEvent(7, "announce".to_string())]
        );
    }
}
