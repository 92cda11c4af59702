//! Tag to instance map with a native id index.
//!
//! Owned by one instance and touched only from the thread that built it.

use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use tracing::trace;

use super::ComponentInstanceRef;
use crate::{Tag, thread_utils::ThreadGuard};

/// Authoritative map of live component instances.
///
/// Every method asserts it runs on the constructing thread; the lock inside
/// is therefore never contended.
pub struct ComponentInstanceRegistry {
    guard: ThreadGuard,
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    by_tag: HashMap<Tag, ComponentInstanceRef>,
    tag_by_id: HashMap<String, Tag>,
}

impl ComponentInstanceRegistry {
    /// Creates a registry bound to the calling thread.
    pub fn new() -> Self {
        Self {
            guard: ThreadGuard::new(),
            inner: Mutex::new(RegistryInner::default()),
        }
    }

    /// Registers `instance` under its tag, replacing any previous entry.
    #[track_caller]
    pub fn insert(&self, instance: ComponentInstanceRef) {
        self.guard.assert_thread();
        let tag = instance.tag();
        if self.inner.lock().by_tag.insert(tag, instance).is_some() {
            trace!(tag, "component instance replaced");
        }
    }

    /// Looks up an instance.
    #[track_caller]
    pub fn find_by_tag(&self, tag: Tag) -> Option<ComponentInstanceRef> {
        self.guard.assert_thread();
        self.inner.lock().by_tag.get(&tag).cloned()
    }

    /// Returns `true` when `tag` is registered.
    #[track_caller]
    pub fn contains(&self, tag: Tag) -> bool {
        self.guard.assert_thread();
        self.inner.lock().by_tag.contains_key(&tag)
    }

    /// Looks up the tag registered for a native id.
    #[track_caller]
    pub fn find_tag_by_id(&self, id: &str) -> Option<Tag> {
        self.guard.assert_thread();
        self.inner.lock().tag_by_id.get(id).copied()
    }

    /// Forgets the instance under `tag` together with its id entry.
    #[track_caller]
    pub fn delete_by_tag(&self, tag: Tag) {
        self.guard.assert_thread();
        let mut inner = self.inner.lock();
        let Some(instance) = inner.by_tag.get(&tag) else {
            return;
        };
        let id = instance.id();
        if !id.is_empty() {
            inner.tag_by_id.remove(&id);
        }
        inner.by_tag.remove(&tag);
    }

    /// Moves the id index entry of `tag` from `prev_id` to `new_id`.
    ///
    /// Call before the instance receives the props carrying `new_id`, while
    /// its current id is still `prev_id`.
    #[track_caller]
    pub fn update_tag_by_id(&self, tag: Tag, new_id: &str, prev_id: &str) {
        self.guard.assert_thread();
        let mut inner = self.inner.lock();
        if !prev_id.is_empty() && inner.tag_by_id.get(prev_id) == Some(&tag) {
            inner.tag_by_id.remove(prev_id);
        }
        if !new_id.is_empty() {
            inner.tag_by_id.insert(new_id.to_string(), tag);
        }
    }

    /// Number of registered instances.
    #[track_caller]
    pub fn len(&self) -> usize {
        self.guard.assert_thread();
        self.inner.lock().by_tag.len()
    }

    /// Returns `true` when nothing is registered.
    #[track_caller]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forgets every instance.
    #[track_caller]
    pub fn clear(&self) {
        self.guard.assert_thread();
        let mut inner = self.inner.lock();
        inner.by_tag.clear();
        inner.tag_by_id.clear();
    }
}

impl Default for ComponentInstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
