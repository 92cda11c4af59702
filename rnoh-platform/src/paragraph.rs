//! Text paragraphs.
//!
//! A paragraph starts as a [`TextLeafNode`], which cannot host children.
//! When the first inline child arrives the mounting manager detaches the
//! paragraph, [`update_base_node`](ComponentInstance::update_base_node)
//! swaps the leaf for a container and the paragraph is re-attached at the
//! same index.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::Mutex;
use rnoh_core::{
    ComponentInstance, ComponentInstanceBase, ComponentInstanceContext, ComponentInstanceRef,
    NativeNode, NativeNodeRef, Rect, SharedProps, StackNode,
};
use tracing::{debug, warn};

/// Prop carrying the paragraph's plain text.
pub const TEXT_PROP_KEY: &str = "text";

/// Leaf node that renders a single run of text.
#[derive(Debug, Default)]
pub struct TextLeafNode {
    inner: Mutex<TextLeafInner>,
}

#[derive(Debug, Default)]
struct TextLeafInner {
    text: String,
    frame: Rect,
}

impl TextLeafNode {
    /// Current text.
    pub fn text(&self) -> String {
        self.inner.lock().text.clone()
    }

    /// Last frame set on the node.
    pub fn frame(&self) -> Rect {
        self.inner.lock().frame
    }

    fn set_text(&self, text: &str) {
        self.inner.lock().text = text.to_string();
    }
}

impl NativeNode for TextLeafNode {
    fn insert_child(&self, _child: &NativeNodeRef, _index: usize) {
        warn!("text leaf node cannot hold children");
    }

    fn remove_child(&self, _child: &NativeNodeRef) {}

    fn set_layout(&self, frame: Rect) {
        self.inner.lock().frame = frame;
    }
}

/// Paragraph of text, possibly with inline children.
#[derive(Debug)]
pub struct ParagraphComponentInstance {
    base: ComponentInstanceBase,
    leaf: Arc<TextLeafNode>,
    node: Mutex<NativeNodeRef>,
    is_container: AtomicBool,
}

impl ParagraphComponentInstance {
    /// Creates a paragraph for `ctx`.
    pub fn new(ctx: &ComponentInstanceContext) -> Self {
        let leaf = Arc::new(TextLeafNode::default());
        let node: NativeNodeRef = leaf.clone();
        Self {
            base: ComponentInstanceBase::new(ctx),
            leaf,
            node: Mutex::new(node),
            is_container: AtomicBool::new(false),
        }
    }

    /// Creates a paragraph behind a shared handle.
    pub fn new_arc(ctx: &ComponentInstanceContext) -> Arc<Self> {
        Arc::new(Self::new(ctx))
    }

    /// Whether the leaf node was replaced by a container.
    pub fn is_container(&self) -> bool {
        self.is_container.load(Ordering::Acquire)
    }

    /// Text from the latest props.
    pub fn text(&self) -> String {
        self.leaf.text()
    }
}

impl ComponentInstance for ParagraphComponentInstance {
    fn base(&self) -> &ComponentInstanceBase {
        &self.base
    }

    fn local_root_node(&self) -> NativeNodeRef {
        self.node.lock().clone()
    }

    fn on_props_changed(&self, props: &SharedProps) {
        let text = props
            .get(TEXT_PROP_KEY)
            .and_then(|value| value.as_str())
            .unwrap_or_default();
        self.leaf.set_text(text);
    }

    fn check_update_base_node(&self) -> bool {
        !self.is_container()
    }

    fn update_base_node(&self) {
        let container = StackNode::new_ref();
        container.set_layout(self.base.layout_metrics().frame);
        container.insert_child(&(self.leaf.clone() as NativeNodeRef), 0);
        for (index, child) in self.base.children().iter().enumerate() {
            container.insert_child(&child.local_root_node(), index + 1);
        }
        *self.node.lock() = container;
        self.is_container.store(true, Ordering::Release);
        debug!(tag = self.base.tag(), "paragraph switched to container node");
    }

    fn on_child_inserted(&self, child: &ComponentInstanceRef, index: usize) {
        // Slot 0 of the container holds the text itself.
        self.local_root_node()
            .insert_child(&child.local_root_node(), index + 1);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rnoh_core::{
        ComponentInstance, ComponentInstanceContext, ComponentInstanceRef, LayoutMetrics, Props,
        Rect, StackNode, serde_json::json,
    };

    use super::{ParagraphComponentInstance, TextLeafNode};
    use crate::view::ViewComponentInstance;

    #[test]
    fn text_prop_reaches_leaf() {
        let paragraph: ComponentInstanceRef =
            ParagraphComponentInstance::new_arc(&ComponentInstanceContext::new(5, 2, "Paragraph"));
        paragraph.set_props(Arc::new(Props::from_value(json!({ "text": "hello" }))));
        let paragraph = paragraph
            .downcast_arc::<ParagraphComponentInstance>()
            .ok()
            .expect("paragraph");
        assert_eq!(paragraph.text(), "hello");
        assert!(paragraph.check_update_base_node());
    }

    #[test]
    fn base_node_swap_keeps_text_first() {
        let paragraph =
            ParagraphComponentInstance::new_arc(&ComponentInstanceContext::new(5, 2, "Paragraph"));
        let dyn_paragraph: ComponentInstanceRef = paragraph.clone();
        dyn_paragraph.set_layout(LayoutMetrics::from_frame(Rect::new(0.0, 0.0, 80.0, 20.0)));
        assert!(paragraph.local_root_node().downcast_ref::<TextLeafNode>().is_some());

        paragraph.update_base_node();
        assert!(paragraph.is_container());
        assert!(!paragraph.check_update_base_node());

        let span: ComponentInstanceRef =
            ViewComponentInstance::new_arc(&ComponentInstanceContext::new(6, 1, "View"));
        dyn_paragraph.insert_child(&span, 0);

        let root = paragraph.local_root_node();
        let container = root.downcast_ref::<StackNode>().expect("container");
        assert_eq!(container.frame(), Rect::new(0.0, 0.0, 80.0, 20.0));
        let children = container.children();
        assert_eq!(children.len(), 2);
        assert!(children[0].downcast_ref::<TextLeafNode>().is_some());
        assert!(children[1].downcast_ref::<StackNode>().is_some());
    }
}
