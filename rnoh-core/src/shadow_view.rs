//! Shadow view snapshots and the concurrent snapshot store.
//!
//! A [`ShadowView`] is the immutable description of one shadow-tree node at
//! the time a mutation was produced. The [`ShadowViewRegistry`] keeps the
//! latest snapshot per tag and may be read from any lane.

use std::{fmt, sync::Arc};

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;
use serde_json::Value;

use crate::{
    ComponentHandle, SurfaceId, Tag,
    layout::LayoutMetrics,
    props::{Props, SharedProps, SharedState},
};

/// Delivers events from a native component back to the JS side.
pub trait EventEmitter: Send + Sync + fmt::Debug {
    /// Dispatches an event with its payload.
    fn dispatch_event(&self, name: &str, payload: Value);
}

/// Snapshot of one shadow-tree node.
#[derive(Clone)]
pub struct ShadowView {
    /// Node identity.
    pub tag: Tag,
    /// Surface the node belongs to.
    pub surface_id: SurfaceId,
    /// Numeric component class.
    pub component_handle: ComponentHandle,
    /// Component class name.
    pub component_name: String,
    /// Props snapshot.
    pub props: SharedProps,
    /// State snapshot, if the component has state.
    pub state: Option<SharedState>,
    /// Computed layout.
    pub layout_metrics: LayoutMetrics,
    /// Event sink for this node.
    pub event_emitter: Option<Arc<dyn EventEmitter>>,
}

impl ShadowView {
    /// Creates a snapshot with empty props and default layout.
    pub fn new(tag: Tag, component_handle: ComponentHandle, component_name: impl Into<String>) -> Self {
        Self {
            tag,
            surface_id: 0,
            component_handle,
            component_name: component_name.into(),
            props: Arc::new(Props::default()),
            state: None,
            layout_metrics: LayoutMetrics::default(),
            event_emitter: None,
        }
    }

    /// Replaces the props.
    pub fn with_props(mut self, props: Props) -> Self {
        self.props = Arc::new(props);
        self
    }

    /// Replaces the layout metrics.
    pub fn with_layout_metrics(mut self, layout_metrics: LayoutMetrics) -> Self {
        self.layout_metrics = layout_metrics;
        self
    }

    /// Replaces the surface id.
    pub fn with_surface_id(mut self, surface_id: SurfaceId) -> Self {
        self.surface_id = surface_id;
        self
    }

    /// Replaces the state.
    pub fn with_state(mut self, state: SharedState) -> Self {
        self.state = Some(state);
        self
    }

    /// Replaces the event emitter.
    pub fn with_event_emitter(mut self, event_emitter: Arc<dyn EventEmitter>) -> Self {
        self.event_emitter = Some(event_emitter);
        self
    }
}

impl Default for ShadowView {
    fn default() -> Self {
        Self::new(0, 0, String::new())
    }
}

impl PartialEq for ShadowView {
    fn eq(&self, other: &Self) -> bool {
        let same_emitter = match (&self.event_emitter, &other.event_emitter) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        self.tag == other.tag
            && self.surface_id == other.surface_id
            && self.component_handle == other.component_handle
            && self.component_name == other.component_name
            && self.props == other.props
            && self.state == other.state
            && self.layout_metrics == other.layout_metrics
            && same_emitter
    }
}

impl fmt::Debug for ShadowView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShadowView")
            .field("tag", &self.tag)
            .field("surface_id", &self.surface_id)
            .field("component_name", &self.component_name)
            .field("props", &self.props)
            .field("layout_metrics", &self.layout_metrics)
            .finish_non_exhaustive()
    }
}

/// Latest known snapshot per tag.
///
/// State updates can arrive off the MAIN lane, so the store is a concurrent
/// map rather than a guarded one.
#[derive(Debug, Default)]
pub struct ShadowViewRegistry {
    views: DashMap<Tag, ShadowView, FxBuildHasher>,
}

impl ShadowViewRegistry {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores or replaces the snapshot for `view.tag`.
    pub fn set_shadow_view(&self, view: ShadowView) {
        self.views.insert(view.tag, view);
    }

    /// Returns a copy of the snapshot for `tag`.
    pub fn find_shadow_view(&self, tag: Tag) -> Option<ShadowView> {
        self.views.get(&tag).map(|entry| entry.value().clone())
    }

    /// Forgets the snapshot for `tag`.
    pub fn clear_shadow_view(&self, tag: Tag) {
        self.views.remove(&tag);
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.views.len()
    }

    /// Returns `true` when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.views.is_empty()
    }

    /// Forgets every snapshot.
    pub fn clear(&self) {
        self.views.clear();
    }
}
