use std::{
    io,
    sync::Arc,
};

use parking_lot::Mutex;
use rnoh_core::{
    ComponentInstance, ComponentInstanceBase, ComponentInstanceContext,
    ComponentInstanceFactoryDelegate, ComponentInstanceRef, ComponentInstanceRegistry,
    EventLoopTaskRunner, GenericComponentDescriptor, InstanceBuilder, LayoutMetrics,
    MountingCoordinator, MountingManager, MountingTransaction, NativeNodeRef, PackageRegistry,
    Props, Rect, RnInstance, RnInstanceCapi, RnohConfig, RnohPackage, ShadowView,
    ShadowViewMutation, SharedProps, StackNode, Tag,
    serde_json::{Value, json},
    testing::{
        ManualVsync, RecordingArkTsHost, TestComponentDelegate, TestComponentInstance,
        event_loop_executor,
    },
};
use tracing_subscriber::fmt::MakeWriter;

struct SharedDelegate(Arc<TestComponentDelegate>);

impl ComponentInstanceFactoryDelegate for SharedDelegate {
    fn create(&self, ctx: &ComponentInstanceContext) -> Option<ComponentInstanceRef> {
        self.0.create(ctx)
    }
}

/// Panics when its props carry `"explode": true`.
struct Fragile {
    base: ComponentInstanceBase,
    node: NativeNodeRef,
}

impl ComponentInstance for Fragile {
    fn base(&self) -> &ComponentInstanceBase {
        &self.base
    }

    fn local_root_node(&self) -> NativeNodeRef {
        self.node.clone()
    }

    fn on_props_changed(&self, props: &SharedProps) {
        if props.get("explode") == Some(&json!(true)) {
            panic!("fragile component exploded");
        }
    }
}

struct FragileDelegate;

impl ComponentInstanceFactoryDelegate for FragileDelegate {
    fn create(&self, ctx: &ComponentInstanceContext) -> Option<ComponentInstanceRef> {
        (ctx.component_name == "Fragile").then(|| {
            Arc::new(Fragile {
                base: ComponentInstanceBase::new(ctx),
                node: StackNode::new_ref(),
            }) as ComponentInstanceRef
        })
    }
}

struct TestPackage {
    delegate: Arc<TestComponentDelegate>,
}

impl RnohPackage for TestPackage {
    fn register(self, registry: &mut PackageRegistry) {
        registry.register_component_delegate(SharedDelegate(self.delegate));
        registry.register_component_delegate(FragileDelegate);
        registry.register_component_descriptor(GenericComponentDescriptor::new(1, "View"));
    }
}

struct Harness {
    main: Arc<EventLoopTaskRunner>,
    host: Arc<RecordingArkTsHost>,
    vsync: Arc<ManualVsync>,
    delegate: Arc<TestComponentDelegate>,
    instance: RnInstanceCapi,
}

impl Harness {
    fn new(config: RnohConfig) -> Self {
        let main = Arc::new(EventLoopTaskRunner::new());
        let host = Arc::new(RecordingArkTsHost::default());
        let vsync = Arc::new(ManualVsync::new());
        let delegate = Arc::new(TestComponentDelegate::new(["View"]));
        let instance = InstanceBuilder::new(
            host.clone(),
            vsync.clone(),
            event_loop_executor(main.clone()),
        )
        .package(TestPackage {
            delegate: delegate.clone(),
        })
        .config(config)
        .build_capi()
        .expect("instance builds");
        Self {
            main,
            host,
            vsync,
            delegate,
            instance,
        }
    }

    fn apply(&self, mutations: Vec<ShadowViewMutation>) {
        let manager = self.instance.mounting_manager();
        manager.will_mount(&mutations);
        manager.do_mount(&mutations);
        manager.did_mount(&mutations);
    }

    fn commit(&self, mutations: Vec<ShadowViewMutation>) {
        let coordinator = OneShot(Mutex::new(Some(MountingTransaction {
            surface_id: 1,
            number: 1,
            mutations,
            ..Default::default()
        })));
        self.instance
            .scheduler_delegate()
            .scheduler_did_finish_transaction(&coordinator);
        self.main.run_pending();
    }

    fn registry(&self) -> &ComponentInstanceRegistry {
        self.instance.registry()
    }

    fn find(&self, tag: Tag) -> ComponentInstanceRef {
        self.registry().find_by_tag(tag).expect("instance registered")
    }
}

struct OneShot(Mutex<Option<MountingTransaction>>);

impl MountingCoordinator for OneShot {
    fn surface_id(&self) -> i32 {
        1
    }

    fn pull_transaction(&self) -> Option<MountingTransaction> {
        self.0.lock().take()
    }
}

fn view(tag: Tag, name: &str) -> ShadowView {
    ShadowView::new(tag, 1, name)
}

fn view_with(tag: Tag, name: &str, props: Value) -> ShadowView {
    view(tag, name).with_props(Props::from_value(props))
}

fn tree_snapshot(harness: &Harness, tag: Tag) -> Value {
    let instance = harness.find(tag);
    let children: Vec<Value> = instance
        .children()
        .iter()
        .map(|child| tree_snapshot(harness, child.tag()))
        .collect();
    json!({
        "tag": tag,
        "index": instance.index(),
        "props": instance.props().to_value(),
        "state": instance.base().state().map(|state| state.data.clone()),
        "children": children,
    })
}

#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.0.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[test]
fn classification_is_cached_per_component_name() {
    let harness = Harness::new(RnohConfig::default());
    let manager = harness.instance.mounting_manager();
    assert!(manager.is_capi_component(&view(2, "View")));
    assert!(!manager.is_capi_component(&view(3, "Image")));
    let probes = harness.delegate.created_count();

    harness.apply(vec![
        ShadowViewMutation::create(view(1, "View")),
        ShadowViewMutation::create(view(3, "Image")),
    ]);
    harness.apply(vec![ShadowViewMutation::delete(view(1, "View"))]);

    assert!(manager.is_capi_component(&view(2, "View")));
    assert!(!manager.is_capi_component(&view(3, "Image")));
    assert_eq!(harness.delegate.created_count(), probes + 1);
}

#[test]
fn registry_holds_the_latest_create_per_tag() {
    let harness = Harness::new(RnohConfig::default());
    let delegate = harness.instance.scheduler_delegate();
    delegate.scheduler_did_request_preliminary_view_allocation(1, &view(5, "View"));
    harness.vsync.fire();
    harness.main.run_pending();
    assert_eq!(harness.instance.provider().preallocated_count(), 1);

    harness.apply(vec![ShadowViewMutation::create(view_with(5, "View", json!({ "v": 1 })))]);
    assert_eq!(harness.instance.provider().preallocated_count(), 0);
    assert_eq!(harness.find(5).props().get("v"), Some(&json!(1)));

    harness.apply(vec![ShadowViewMutation::delete(view(5, "View"))]);
    assert!(harness.registry().find_by_tag(5).is_none());

    harness.apply(vec![ShadowViewMutation::create(view_with(5, "View", json!({ "v": 2 })))]);
    assert_eq!(harness.registry().len(), 1);
    assert_eq!(harness.find(5).props().get("v"), Some(&json!(2)));
}

fn large_transaction() -> Vec<ShadowViewMutation> {
    let mut mutations = vec![ShadowViewMutation::create(view(1, "View"))];
    let mut child_counts = std::collections::HashMap::<Tag, usize>::new();
    for tag in 2..=160 {
        let parent = if tag <= 11 { 1 } else { tag - 10 };
        mutations.push(ShadowViewMutation::create(view_with(
            tag,
            "View",
            json!({ "i": tag }),
        )));
        let index = child_counts.entry(parent).or_default();
        mutations.push(ShadowViewMutation::insert(
            view(parent, "View"),
            view(tag, "View"),
            *index,
        ));
        *index += 1;
    }
    for tag in (20..=60).step_by(7) {
        mutations.push(ShadowViewMutation::update(
            view(tag, "View"),
            view_with(tag, "View", json!({ "i": tag, "touched": true })),
        ));
    }
    mutations.push(ShadowViewMutation::remove(
        view(20, "View"),
        view(30, "View"),
        0,
    ));
    mutations.push(ShadowViewMutation::insert(
        view(1, "View"),
        view(30, "View"),
        3,
    ));
    mutations
}

#[test]
fn fragmented_apply_matches_single_pass() {
    let chunked = Harness::new(RnohConfig {
        create_mutation_chunk_size: 7,
        ..RnohConfig::default()
    });
    chunked.commit(large_transaction());

    let single = Harness::new(RnohConfig::default());
    single.apply(large_transaction());

    assert_eq!(chunked.registry().len(), 160);
    assert_eq!(tree_snapshot(&chunked, 1), tree_snapshot(&single, 1));
    assert_eq!(chunked.find(1).children()[3].tag(), 30);
}

fn recreate_transactions() -> [Vec<ShadowViewMutation>; 2] {
    [
        vec![
            ShadowViewMutation::create(view(1, "View")),
            ShadowViewMutation::create(view_with(2, "View", json!({ "gen": 1 }))),
            ShadowViewMutation::insert(view(1, "View"), view(2, "View"), 0),
        ],
        vec![
            ShadowViewMutation::remove(view(1, "View"), view(2, "View"), 0),
            ShadowViewMutation::delete(view(2, "View")),
            ShadowViewMutation::create(view_with(2, "View", json!({ "gen": 2 }))),
            ShadowViewMutation::insert(view(1, "View"), view(2, "View"), 0),
        ],
    ]
}

#[test]
fn recreated_tag_survives_fragmentation() {
    let chunked = Harness::new(RnohConfig {
        create_mutation_chunk_size: 1,
        ..RnohConfig::default()
    });
    let single = Harness::new(RnohConfig::default());
    for transaction in recreate_transactions() {
        chunked.commit(transaction.clone());
        single.apply(transaction);
    }

    for harness in [&chunked, &single] {
        assert_eq!(harness.find(2).props().get("gen"), Some(&json!(2)));
        let children = harness.find(1).children();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].props().get("gen"), Some(&json!(2)));
    }
    assert_eq!(tree_snapshot(&chunked, 1), tree_snapshot(&single, 1));
}

#[test]
fn finalize_runs_once_per_batch() {
    let mutations = vec![
        ShadowViewMutation::create(view(1, "View")),
        ShadowViewMutation::create(view(2, "View")),
        ShadowViewMutation::update(view(1, "View"), view_with(1, "View", json!({ "v": 1 }))),
        ShadowViewMutation::insert(view(1, "View"), view(2, "View"), 0),
    ];
    let chunked = Harness::new(RnohConfig {
        create_mutation_chunk_size: 1,
        ..RnohConfig::default()
    });
    chunked.commit(mutations.clone());
    let single = Harness::new(RnohConfig::default());
    single.apply(mutations);

    let finalized = |harness: &Harness, tag: Tag| {
        harness
            .delegate
            .last_instance(tag)
            .expect("instance built")
            .finalize_count()
    };
    assert_eq!(finalized(&single, 1), 1);
    assert_eq!(finalized(&single, 2), 1);
    // Tag 1 is created in the first batch and touched again in the second.
    assert_eq!(finalized(&chunked, 1), 2);
    assert_eq!(finalized(&chunked, 2), 1);
}

#[test]
fn stale_preallocation_is_dropped() {
    let harness = Harness::new(RnohConfig::default());
    harness.apply(vec![ShadowViewMutation::create(view(5, "View"))]);
    let created = harness.delegate.created_count();
    let existing = harness.find(5);

    harness
        .instance
        .scheduler_delegate()
        .scheduler_did_request_preliminary_view_allocation(1, &view(5, "View"));
    assert_eq!(harness.vsync.pending(), 1);
    harness.vsync.fire();
    harness.main.run_pending();

    assert_eq!(harness.delegate.created_count(), created);
    assert_eq!(harness.instance.provider().preallocated_count(), 0);
    assert!(Arc::ptr_eq(&existing, &harness.find(5)));
    assert_eq!(harness.registry().len(), 1);
}

#[test]
fn insert_hook_sees_children_before_the_new_child() {
    let harness = Harness::new(RnohConfig::default());
    harness.apply(vec![
        ShadowViewMutation::create(view(1, "View")),
        ShadowViewMutation::create(view(2, "View")),
        ShadowViewMutation::create(view(3, "View")),
        ShadowViewMutation::insert(view(1, "View"), view(2, "View"), 0),
        ShadowViewMutation::insert(view(1, "View"), view(3, "View"), 0),
    ]);
    let root = harness
        .find(1)
        .downcast_arc::<TestComponentInstance>()
        .ok()
        .expect("test instance");
    assert_eq!(root.children_seen_on_insert(), vec![vec![], vec![2]]);
    let children: Vec<Tag> = harness.find(1).children().iter().map(|c| c.tag()).collect();
    assert_eq!(children, vec![3, 2]);
    assert_eq!(harness.find(2).index(), 1);
}

#[test]
fn responder_blockers_compose() {
    let harness = Harness::new(RnohConfig::default());
    harness.apply(vec![ShadowViewMutation::create(view(1, "View"))]);
    let instance = harness.find(1);
    let recorded = instance
        .clone()
        .downcast_arc::<TestComponentInstance>()
        .ok()
        .expect("test instance");

    instance.set_native_responder_blocked(true, "A");
    instance.set_native_responder_blocked(true, "B");
    instance.set_native_responder_blocked(false, "A");
    assert!(instance.is_native_responder_blocked());
    instance.set_native_responder_blocked(false, "B");
    assert!(!instance.is_native_responder_blocked());
    assert_eq!(recorded.responder_changes(), vec![true, false]);
}

#[test]
fn failing_mutation_is_isolated_and_logged_once() {
    let harness = Harness::new(RnohConfig::default());
    let mutations = vec![
        ShadowViewMutation::create(view(1, "View")),
        ShadowViewMutation::create(view(2, "View")),
        ShadowViewMutation::create(view(3, "Fragile")),
        ShadowViewMutation::update(
            view(3, "Fragile"),
            view_with(3, "Fragile", json!({ "explode": true })),
        ),
        ShadowViewMutation::create(view(4, "View")),
        ShadowViewMutation::insert(view(1, "View"), view(2, "View"), 0),
        ShadowViewMutation::insert(view(1, "View"), view(3, "Fragile"), 1),
        ShadowViewMutation::insert(view(1, "View"), view(4, "View"), 2),
        ShadowViewMutation::update(view(2, "View"), view_with(2, "View", json!({ "opacity": 0.5 }))),
        ShadowViewMutation::update(view(4, "View"), view_with(4, "View", json!({ "opacity": 0.25 }))),
    ];

    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .finish();
    tracing::subscriber::with_default(subscriber, || harness.apply(mutations));

    let children: Vec<Tag> = harness.find(1).children().iter().map(|c| c.tag()).collect();
    assert_eq!(children, vec![2, 3, 4]);
    assert_eq!(harness.find(2).props().get("opacity"), Some(&json!(0.5)));
    assert_eq!(harness.find(4).props().get("opacity"), Some(&json!(0.25)));

    let errors: Vec<String> = logs
        .lines()
        .into_iter()
        .filter(|line| line.contains("ERROR"))
        .collect();
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].contains("mutation_type=Update"));
    assert!(errors[0].contains("component_name=Fragile"));
}

#[test]
fn only_bridge_owned_mutations_are_forwarded() {
    let harness = Harness::new(RnohConfig::default());
    let names = [(1, "View"), (2, "View"), (3, "Image"), (4, "Image"), (5, "Image")];
    harness.commit(
        names
            .iter()
            .map(|(tag, name)| ShadowViewMutation::create(view(*tag, name)))
            .collect(),
    );
    let forwarded_before = harness.host.did_mount_batches().len();

    let moved = |tag: Tag, name: &str| {
        view(tag, name).with_layout_metrics(LayoutMetrics::from_frame(Rect::new(
            10.0 * tag as f32,
            20.0,
            100.0,
            50.0,
        )))
    };
    harness.commit(
        names
            .iter()
            .map(|(tag, name)| ShadowViewMutation::update(view(*tag, name), moved(*tag, name)))
            .collect(),
    );

    let batches = harness.host.did_mount_batches();
    assert_eq!(batches.len(), forwarded_before + 1);
    let forwarded = batches[forwarded_before].as_array().expect("batch array");
    let tags: Vec<Value> = forwarded
        .iter()
        .map(|mutation| mutation["descriptor"]["tag"].clone())
        .collect();
    assert_eq!(tags, vec![json!(3), json!(4), json!(5)]);
    for mutation in forwarded {
        assert_eq!(mutation["type"], "UPDATE");
        let origin = &mutation["descriptor"]["layoutMetrics"]["frame"]["origin"];
        assert_eq!(origin, &json!({ "x": 0.0, "y": 0.0 }));
    }

    for (tag, _) in names {
        let stored = harness.instance.find_shadow_view(tag).expect("snapshot");
        assert_eq!(stored.layout_metrics.frame.origin.x, 10.0 * tag as f32);
    }
}
