//! FIFO of speculative component creation requests.
//!
//! The scheduler pushes from the JS lane; the provider pops on MAIN. This is
//! the only component-instance structure shared across lanes.

use std::{collections::VecDeque, fmt, sync::Weak};

use parking_lot::Mutex;

use crate::{ComponentHandle, Tag};

/// A component instance that may be needed soon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreallocationRequest {
    /// Node identity.
    pub tag: Tag,
    /// Numeric component class.
    pub component_handle: ComponentHandle,
    /// Component class name.
    pub component_name: String,
}

/// Notified after every push.
pub trait PreallocationRequestQueueDelegate: Send + Sync {
    /// Called once the pushed request is visible to `pop`.
    fn on_push_preallocation_request(&self);
}

/// Thread-safe FIFO of [`PreallocationRequest`]s.
#[derive(Default)]
pub struct ComponentInstancePreallocationRequestQueue {
    requests: Mutex<VecDeque<PreallocationRequest>>,
    delegate: Mutex<Option<Weak<dyn PreallocationRequestQueueDelegate>>>,
}

impl ComponentInstancePreallocationRequestQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request and notifies the delegate.
    pub fn push(&self, request: PreallocationRequest) {
        self.requests.lock().push_back(request);
        let delegate = self.delegate.lock().as_ref().and_then(Weak::upgrade);
        if let Some(delegate) = delegate {
            delegate.on_push_preallocation_request();
        }
    }

    /// Takes the oldest request.
    pub fn pop(&self) -> Option<PreallocationRequest> {
        self.requests.lock().pop_front()
    }

    /// Returns `true` when nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.requests.lock().is_empty()
    }

    /// Number of queued requests.
    pub fn len(&self) -> usize {
        self.requests.lock().len()
    }

    /// Drops every queued request.
    pub fn clear(&self) {
        self.requests.lock().clear();
    }

    /// Replaces the delegate.
    pub fn set_delegate(&self, delegate: Weak<dyn PreallocationRequestQueueDelegate>) {
        *self.delegate.lock() = Some(delegate);
    }
}

impl fmt::Debug for ComponentInstancePreallocationRequestQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstancePreallocationRequestQueue")
            .field("len", &self.len())
            .finish()
    }
}
