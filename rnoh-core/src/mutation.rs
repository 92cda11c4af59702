//! Shadow view mutations and their bridge serialization.
//!
//! ## Usage
//!
//! Build mutations with the typed constructors and serialize a batch with
//! [`serialize_mutations`] before handing it to the ArkTS host.

use serde::Serialize;
use serde_json::Value;

use crate::{
    Tag,
    error::{RnohError, RnohResult},
    layout::LayoutMetrics,
    props::{Props, State},
    shadow_view::ShadowView,
};

/// Kind of tree edit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationType {
    /// Materialize a node.
    Create,
    /// Forget a node that is already detached.
    Delete,
    /// Attach a child to a parent at an index.
    Insert,
    /// Detach a child from a parent.
    Remove,
    /// Replace props, state, layout and event emitter of a node.
    Update,
    /// Detach a child and drop its whole subtree.
    RemoveDeleteTree,
}

/// One tree edit in a transaction.
#[derive(Clone, Debug, PartialEq)]
pub struct ShadowViewMutation {
    /// Kind of edit.
    pub mutation_type: MutationType,
    /// Parent for Insert, Remove and RemoveDeleteTree.
    pub parent_shadow_view: ShadowView,
    /// Previous snapshot for Delete, Remove, Update and RemoveDeleteTree.
    pub old_child_shadow_view: ShadowView,
    /// Next snapshot for Create, Insert and Update.
    pub new_child_shadow_view: ShadowView,
    /// Position within the parent for Insert and Remove.
    pub index: usize,
}

/// Ordered mutations of one transaction.
pub type ShadowViewMutationList = Vec<ShadowViewMutation>;

impl ShadowViewMutation {
    fn new(mutation_type: MutationType) -> Self {
        Self {
            mutation_type,
            parent_shadow_view: ShadowView::default(),
            old_child_shadow_view: ShadowView::default(),
            new_child_shadow_view: ShadowView::default(),
            index: 0,
        }
    }

    /// A Create mutation.
    pub fn create(view: ShadowView) -> Self {
        Self {
            new_child_shadow_view: view,
            ..Self::new(MutationType::Create)
        }
    }

    /// A Delete mutation.
    pub fn delete(view: ShadowView) -> Self {
        Self {
            old_child_shadow_view: view,
            ..Self::new(MutationType::Delete)
        }
    }

    /// An Insert mutation.
    pub fn insert(parent: ShadowView, child: ShadowView, index: usize) -> Self {
        Self {
            parent_shadow_view: parent,
            new_child_shadow_view: child,
            index,
            ..Self::new(MutationType::Insert)
        }
    }

    /// A Remove mutation.
    pub fn remove(parent: ShadowView, child: ShadowView, index: usize) -> Self {
        Self {
            parent_shadow_view: parent,
            old_child_shadow_view: child,
            index,
            ..Self::new(MutationType::Remove)
        }
    }

    /// An Update mutation.
    pub fn update(old: ShadowView, new: ShadowView) -> Self {
        Self {
            old_child_shadow_view: old,
            new_child_shadow_view: new,
            ..Self::new(MutationType::Update)
        }
    }

    /// A RemoveDeleteTree mutation.
    pub fn remove_delete_tree(parent: ShadowView, child: ShadowView, index: usize) -> Self {
        Self {
            parent_shadow_view: parent,
            old_child_shadow_view: child,
            index,
            ..Self::new(MutationType::RemoveDeleteTree)
        }
    }

    /// The child snapshot this mutation is about.
    pub fn subject_view(&self) -> &ShadowView {
        match self.mutation_type {
            MutationType::Create | MutationType::Insert | MutationType::Update => {
                &self.new_child_shadow_view
            }
            MutationType::Delete | MutationType::Remove | MutationType::RemoveDeleteTree => {
                &self.old_child_shadow_view
            }
        }
    }

    /// Returns a copy whose child snapshots have their frame origin at
    /// `(0, 0)`.
    pub fn with_origin_reset(&self) -> Self {
        let mut mutation = self.clone();
        mutation.old_child_shadow_view.layout_metrics =
            mutation.old_child_shadow_view.layout_metrics.with_origin_reset();
        mutation.new_child_shadow_view.layout_metrics =
            mutation.new_child_shadow_view.layout_metrics.with_origin_reset();
        mutation
    }

    /// Serializes the mutation into the tagged value the host consumes.
    pub fn to_bridge_value(&self) -> RnohResult<Value> {
        serde_json::to_value(BridgeMutation::from(self))
            .map_err(|err| RnohError::Bridge(err.to_string()))
    }
}

/// Serializes a batch of mutations, preserving order.
pub fn serialize_mutations(mutations: &[ShadowViewMutation]) -> RnohResult<Value> {
    mutations
        .iter()
        .map(ShadowViewMutation::to_bridge_value)
        .collect::<RnohResult<Vec<_>>>()
        .map(Value::Array)
}

/// Serializes the node description the host renders from.
pub fn serialize_descriptor(view: &ShadowView) -> RnohResult<Value> {
    serde_json::to_value(Descriptor::from(view)).map_err(|err| RnohError::Bridge(err.to_string()))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Descriptor<'a> {
    tag: Tag,
    #[serde(rename = "type")]
    component_name: &'a str,
    props: &'a Props,
    state: Option<&'a State>,
    layout_metrics: LayoutMetrics,
}

impl<'a> From<&'a ShadowView> for Descriptor<'a> {
    fn from(view: &'a ShadowView) -> Self {
        Self {
            tag: view.tag,
            component_name: &view.component_name,
            props: &view.props,
            state: view.state.as_deref(),
            layout_metrics: view.layout_metrics,
        }
    }
}

#[derive(Serialize)]
#[serde(
    tag = "type",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
enum BridgeMutation<'a> {
    Create {
        descriptor: Descriptor<'a>,
    },
    Update {
        descriptor: Descriptor<'a>,
    },
    Insert {
        child_tag: Tag,
        parent_tag: Tag,
        index: usize,
    },
    Remove {
        child_tag: Tag,
        parent_tag: Tag,
    },
    Delete {
        tag: Tag,
    },
    RemoveDeleteTree {
        child_tag: Tag,
        parent_tag: Tag,
    },
}

impl<'a> From<&'a ShadowViewMutation> for BridgeMutation<'a> {
    fn from(mutation: &'a ShadowViewMutation) -> Self {
        let parent_tag = mutation.parent_shadow_view.tag;
        match mutation.mutation_type {
            MutationType::Create => Self::Create {
                descriptor: Descriptor::from(&mutation.new_child_shadow_view),
            },
            MutationType::Update => Self::Update {
                descriptor: Descriptor::from(&mutation.new_child_shadow_view),
            },
            MutationType::Insert => Self::Insert {
                child_tag: mutation.new_child_shadow_view.tag,
                parent_tag,
                index: mutation.index,
            },
            MutationType::Remove => Self::Remove {
                child_tag: mutation.old_child_shadow_view.tag,
                parent_tag,
            },
            MutationType::Delete => Self::Delete {
                tag: mutation.old_child_shadow_view.tag,
            },
            MutationType::RemoveDeleteTree => Self::RemoveDeleteTree {
                child_tag: mutation.old_child_shadow_view.tag,
                parent_tag,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{ShadowViewMutation, serialize_mutations};
    use crate::{
        layout::{LayoutMetrics, Rect},
        props::Props,
        shadow_view::ShadowView,
    };

    fn view(tag: i32, name: &str) -> ShadowView {
        ShadowView::new(tag, 1, name)
    }

    #[test]
    fn create_carries_descriptor() {
        let child = view(5, "View")
            .with_props(Props::from_value(json!({ "opacity": 1.0 })))
            .with_layout_metrics(LayoutMetrics::from_frame(Rect::new(1.0, 2.0, 3.0, 4.0)));
        let value = ShadowViewMutation::create(child)
            .to_bridge_value()
            .expect("create serializes");
        assert_eq!(value["type"], "CREATE");
        assert_eq!(value["descriptor"]["tag"], 5);
        assert_eq!(value["descriptor"]["type"], "View");
        assert_eq!(value["descriptor"]["props"]["opacity"], 1.0);
        assert_eq!(value["descriptor"]["layoutMetrics"]["frame"]["origin"]["y"], 2.0);
    }

    #[test]
    fn structural_mutations_carry_tags() {
        let batch = vec![
            ShadowViewMutation::insert(view(1, "RootView"), view(5, "View"), 2),
            ShadowViewMutation::remove(view(1, "RootView"), view(5, "View"), 2),
            ShadowViewMutation::delete(view(5, "View")),
            ShadowViewMutation::remove_delete_tree(view(1, "RootView"), view(6, "View"), 0),
        ];
        let value = serialize_mutations(&batch).expect("batch serializes");
        assert_eq!(
            value,
            json!([
                { "type": "INSERT", "childTag": 5, "parentTag": 1, "index": 2 },
                { "type": "REMOVE", "childTag": 5, "parentTag": 1 },
                { "type": "DELETE", "tag": 5 },
                { "type": "REMOVE_DELETE_TREE", "childTag": 6, "parentTag": 1 }
            ])
        );
    }

    #[test]
    fn origin_reset_touches_only_children() {
        let metrics = LayoutMetrics::from_frame(Rect::new(10.0, 20.0, 30.0, 40.0));
        let mutation = ShadowViewMutation::update(
            view(5, "View").with_layout_metrics(metrics),
            view(5, "View").with_layout_metrics(metrics),
        );
        let reset = mutation.with_origin_reset();
        assert_eq!(reset.old_child_shadow_view.layout_metrics.frame, Rect::new(0.0, 0.0, 30.0, 40.0));
        assert_eq!(reset.new_child_shadow_view.layout_metrics.frame, Rect::new(0.0, 0.0, 30.0, 40.0));
        assert_eq!(mutation.new_child_shadow_view.layout_metrics, metrics);
    }
}
