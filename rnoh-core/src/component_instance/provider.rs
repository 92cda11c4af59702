//! Frame-budgeted preallocation and instance lookup.
//!
//! ## Usage
//!
//! The provider subscribes to frame ticks while preallocation requests are
//! pending and turns them into instances on MAIN, stopping once less than
//! half a frame remains. Create handling calls
//! [`ComponentInstanceProvider::get_component_instance`], which hands out a
//! preallocated instance when one exists and builds one otherwise.

use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use rustc_hash::FxHashMap as HashMap;
use tracing::{debug, trace};

use super::{
    ComponentInstanceRef,
    factory::ComponentInstanceFactory,
    preallocation::{
        ComponentInstancePreallocationRequestQueue, PreallocationRequest,
        PreallocationRequestQueueDelegate,
    },
    registry::ComponentInstanceRegistry,
};
use crate::{
    ComponentHandle, Tag,
    task_executor::{TaskExecutor, TaskThread},
    thread_utils::ThreadGuard,
    vsync::{FrameTick, VsyncSource},
};

/// Serves component instances, preallocating them between frames.
pub struct ComponentInstanceProvider {
    guard: ThreadGuard,
    weak_self: Weak<Self>,
    queue: Arc<ComponentInstancePreallocationRequestQueue>,
    factory: Arc<ComponentInstanceFactory>,
    registry: Arc<ComponentInstanceRegistry>,
    vsync: Arc<dyn VsyncSource>,
    task_executor: TaskExecutor,
    frame_duration: Duration,
    budget: Duration,
    preallocated: Mutex<HashMap<Tag, ComponentInstanceRef>>,
    subscribed: AtomicBool,
}

impl ComponentInstanceProvider {
    /// Creates a provider bound to the calling thread and registers it as
    /// the queue's delegate.
    ///
    /// A frame keeps draining requests while at least `budget` of its
    /// `frame_duration` is left.
    pub fn new(
        queue: Arc<ComponentInstancePreallocationRequestQueue>,
        factory: Arc<ComponentInstanceFactory>,
        registry: Arc<ComponentInstanceRegistry>,
        vsync: Arc<dyn VsyncSource>,
        task_executor: TaskExecutor,
        frame_duration: Duration,
        budget: Duration,
    ) -> Arc<Self> {
        let provider = Arc::new_cyclic(|weak_self| Self {
            guard: ThreadGuard::new(),
            weak_self: weak_self.clone(),
            queue,
            factory,
            registry,
            vsync,
            task_executor,
            frame_duration,
            budget,
            preallocated: Mutex::new(HashMap::default()),
            subscribed: AtomicBool::new(false),
        });
        let delegate: Weak<dyn PreallocationRequestQueueDelegate> = Arc::downgrade(&provider) as _;
        provider.queue.set_delegate(delegate);
        provider
    }

    /// Returns the preallocated instance for `tag` or builds a new one.
    ///
    /// `None` means no delegate recognizes the component.
    #[track_caller]
    pub fn get_component_instance(
        &self,
        tag: Tag,
        component_handle: ComponentHandle,
        component_name: &str,
    ) -> Option<ComponentInstanceRef> {
        self.guard.assert_thread();
        let preallocated = self.preallocated.lock().remove(&tag);
        match preallocated {
            Some(instance) if instance.component_name() == component_name => {
                trace!(tag, component_name, "using preallocated component instance");
                Some(instance)
            }
            Some(_) => {
                debug!(tag, component_name, "preallocated instance has another component type");
                self.factory.create(tag, component_handle, component_name)
            }
            None => self.factory.create(tag, component_handle, component_name),
        }
    }

    /// Drops every preallocated instance nobody claimed.
    #[track_caller]
    pub fn clear_preallocated_views(&self) {
        self.guard.assert_thread();
        self.preallocated.lock().clear();
    }

    /// Drops every pending preallocation request.
    pub fn clear_preallocation_request_queue(&self) {
        self.queue.clear();
    }

    /// Number of preallocated instances waiting to be claimed.
    pub fn preallocated_count(&self) -> usize {
        self.preallocated.lock().len()
    }

    /// Returns `true` while subscribed to frame ticks.
    pub fn is_subscribed(&self) -> bool {
        self.subscribed.load(Ordering::Acquire)
    }

    /// Drains the request queue for one frame.
    ///
    /// Called on MAIN for every tick while subscribed. Unsubscribes when the
    /// queue is empty and otherwise processes requests until less than the
    /// budget is left in the frame.
    #[track_caller]
    pub fn on_frame(&self, tick: FrameTick) {
        self.guard.assert_thread();
        if self.queue.is_empty() {
            self.subscribed.store(false, Ordering::Release);
            // A push may have raced with the store above.
            if !self.queue.is_empty() && !self.subscribed.swap(true, Ordering::AcqRel) {
                self.request_next_frame();
            }
            return;
        }

        let mut processed = 0usize;
        while tick.remaining_at(Instant::now(), self.frame_duration) >= self.budget {
            let Some(request) = self.queue.pop() else {
                break;
            };
            self.process_request(request);
            processed += 1;
        }
        trace!(frame = tick.frame_index, processed, "preallocation pass");
        #[cfg(feature = "profiling")]
        crate::profiler::record_preallocation(tick.frame_index, processed, self.queue.len());
        self.request_next_frame();
    }

    fn process_request(&self, request: PreallocationRequest) {
        let PreallocationRequest {
            tag,
            component_handle,
            component_name,
        } = request;
        if self.registry.contains(tag) || self.preallocated.lock().contains_key(&tag) {
            debug!(tag, %component_name, "dropping stale preallocation request");
            return;
        }
        match self.factory.create(tag, component_handle, &component_name) {
            Some(instance) => {
                self.preallocated.lock().insert(tag, instance);
            }
            None => trace!(tag, %component_name, "no native factory, skipping preallocation"),
        }
    }

    fn request_next_frame(&self) {
        let provider = self.weak_self.clone();
        let executor = self.task_executor.clone();
        self.vsync.request_frame(Box::new(move |tick| {
            executor.run_task(TaskThread::Main, move || {
                if let Some(provider) = provider.upgrade() {
                    provider.on_frame(tick);
                }
            });
        }));
    }
}

impl PreallocationRequestQueueDelegate for ComponentInstanceProvider {
    fn on_push_preallocation_request(&self) {
        if !self.subscribed.swap(true, Ordering::AcqRel) {
            self.request_next_frame();
        }
    }
}
