//! Handles to native widget nodes.
//!
//! The widget toolkit is owned by the host. Component instances only hold
//! [`NativeNodeRef`] handles and attach them to each other.

use std::{fmt, sync::Arc};

use downcast_rs::{DowncastSync, impl_downcast};
use parking_lot::Mutex;

use crate::layout::Rect;

/// A native widget node owned by the host toolkit.
pub trait NativeNode: DowncastSync + fmt::Debug {
    /// Attaches `child` at `index`.
    fn insert_child(&self, child: &NativeNodeRef, index: usize);

    /// Detaches `child`.
    fn remove_child(&self, child: &NativeNodeRef);

    /// Positions the node within its parent.
    fn set_layout(&self, _frame: Rect) {}
}

impl_downcast!(sync NativeNode);

/// Shared handle to a native node.
pub type NativeNodeRef = Arc<dyn NativeNode>;

/// Returns `true` when both handles point to the same node.
pub fn same_node(a: &NativeNodeRef, b: &NativeNodeRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

/// Generic container node.
///
/// Used wherever a slot must exist but no toolkit widget is available, and
/// as an in-memory node for headless hosts.
#[derive(Debug, Default)]
pub struct StackNode {
    inner: Mutex<StackNodeInner>,
}

#[derive(Debug, Default)]
struct StackNodeInner {
    children: Vec<NativeNodeRef>,
    frame: Rect,
}

impl StackNode {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty container behind a shared handle.
    pub fn new_ref() -> NativeNodeRef {
        Arc::new(Self::new())
    }

    /// Snapshot of the attached children.
    pub fn children(&self) -> Vec<NativeNodeRef> {
        self.inner.lock().children.clone()
    }

    /// Last frame set on the node.
    pub fn frame(&self) -> Rect {
        self.inner.lock().frame
    }
}

impl NativeNode for StackNode {
    fn insert_child(&self, child: &NativeNodeRef, index: usize) {
        let mut inner = self.inner.lock();
        let index = index.min(inner.children.len());
        inner.children.insert(index, Arc::clone(child));
    }

    fn remove_child(&self, child: &NativeNodeRef) {
        self.inner
            .lock()
            .children
            .retain(|attached| !same_node(attached, child));
    }

    fn set_layout(&self, frame: Rect) {
        self.inner.lock().frame = frame;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{NativeNode, NativeNodeRef, StackNode, same_node};
    use crate::layout::Rect;

    #[test]
    fn children_keep_insertion_positions() {
        let parent = StackNode::new();
        let a = StackNode::new_ref();
        let b = StackNode::new_ref();
        let c = StackNode::new_ref();
        parent.insert_child(&a, 0);
        parent.insert_child(&c, 1);
        parent.insert_child(&b, 1);
        let children = parent.children();
        assert!(same_node(&children[0], &a));
        assert!(same_node(&children[1], &b));
        assert!(same_node(&children[2], &c));

        parent.remove_child(&b);
        assert_eq!(parent.children().len(), 2);
    }

    #[test]
    fn identity_is_by_pointer() {
        let a: NativeNodeRef = Arc::new(StackNode::new());
        let alias = Arc::clone(&a);
        assert!(same_node(&a, &alias));
        assert!(!same_node(&a, &StackNode::new_ref()));
    }

    #[test]
    fn layout_is_recorded() {
        let node = StackNode::new();
        node.set_layout(Rect::new(1.0, 1.0, 5.0, 5.0));
        assert_eq!(node.frame(), Rect::new(1.0, 1.0, 5.0, 5.0));
    }
}
