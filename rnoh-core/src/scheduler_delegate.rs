//! Adapter from the renderer's scheduler to a mounting manager.
//!
//! ## Usage
//!
//! The scheduler calls [`SchedulerDelegate::scheduler_did_finish_transaction`]
//! off the main thread. The delegate pulls the transaction and posts its
//! phases to MAIN: `will_mount` and `do_mount` whole, then `did_mount` as
//! consecutive batches that each hold a bounded number of Creates. Batches
//! are cut without reordering, so a transaction that deletes and re-creates
//! a tag applies exactly as it would in one pass.

use std::{
    fmt, mem,
    sync::{Arc, Weak},
    time::{Duration, Instant},
};

use serde_json::Value;
use tracing::{debug, trace};

use crate::{
    SurfaceId,
    component_instance::preallocation::{
        ComponentInstancePreallocationRequestQueue, PreallocationRequest,
    },
    mounting::MountingManager,
    mutation::{MutationType, ShadowViewMutation, ShadowViewMutationList},
    shadow_view::ShadowView,
    task_executor::{TaskExecutor, TaskThread},
};

/// Commit, diff and layout markers of one transaction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransactionTelemetry {
    /// Start of the JS commit.
    pub commit_start: Option<Instant>,
    /// End of the JS commit.
    pub commit_end: Option<Instant>,
    /// Start of the tree diff.
    pub diff_start: Option<Instant>,
    /// End of the tree diff.
    pub diff_end: Option<Instant>,
    /// Start of the layout pass.
    pub layout_start: Option<Instant>,
    /// End of the layout pass.
    pub layout_end: Option<Instant>,
}

fn span(start: Option<Instant>, end: Option<Instant>) -> Option<Duration> {
    Some(end?.saturating_duration_since(start?))
}

impl TransactionTelemetry {
    /// Duration of the commit, when both markers are set.
    pub fn commit_duration(&self) -> Option<Duration> {
        span(self.commit_start, self.commit_end)
    }

    /// Duration of the diff, when both markers are set.
    pub fn diff_duration(&self) -> Option<Duration> {
        span(self.diff_start, self.diff_end)
    }

    /// Duration of the layout pass, when both markers are set.
    pub fn layout_duration(&self) -> Option<Duration> {
        span(self.layout_start, self.layout_end)
    }
}

/// The mutations of one commit.
#[derive(Clone, Debug, Default)]
pub struct MountingTransaction {
    /// Surface the transaction belongs to.
    pub surface_id: SurfaceId,
    /// Sequence number within the surface.
    pub number: u64,
    /// Mutations in application order.
    pub mutations: ShadowViewMutationList,
    /// Timing markers.
    pub telemetry: TransactionTelemetry,
}

/// Source of finished transactions for one surface.
pub trait MountingCoordinator: Send + Sync {
    /// Surface served by the coordinator.
    fn surface_id(&self) -> SurfaceId;

    /// Takes the next transaction, if any.
    fn pull_transaction(&self) -> Option<MountingTransaction>;
}

/// Pulls a transaction and hands it to the three mounting phases in order.
pub struct TelemetryController<'a> {
    coordinator: &'a dyn MountingCoordinator,
}

impl<'a> TelemetryController<'a> {
    /// Wraps a coordinator.
    pub fn new(coordinator: &'a dyn MountingCoordinator) -> Self {
        Self { coordinator }
    }

    /// Pulls one transaction and calls the phases with it. Returns `false`
    /// when there was nothing to pull.
    pub fn pull_transaction(
        &self,
        will_mount: impl FnOnce(&MountingTransaction),
        do_mount: impl FnOnce(&MountingTransaction),
        did_mount: impl FnOnce(MountingTransaction),
    ) -> bool {
        let Some(transaction) = self.coordinator.pull_transaction() else {
            return false;
        };
        will_mount(&transaction);
        do_mount(&transaction);
        did_mount(transaction);
        true
    }
}

/// Receives preliminary view allocation hints.
pub trait PreliminaryViewAllocator: Send + Sync {
    /// Prepares `view` ahead of its Create mutation.
    fn preallocate(&self, surface_id: SurfaceId, view: &ShadowView);
}

impl PreliminaryViewAllocator for ComponentInstancePreallocationRequestQueue {
    fn preallocate(&self, _surface_id: SurfaceId, view: &ShadowView) {
        self.push(PreallocationRequest {
            tag: view.tag,
            component_handle: view.component_handle,
            component_name: view.component_name.clone(),
        });
    }
}

/// Cuts a `did_mount` list into consecutive batches holding at most
/// `chunk_size` Creates each.
///
/// Concatenating the batches gives back the input. The result always has at
/// least one batch, possibly empty.
pub fn fragment_mutations(
    mutations: ShadowViewMutationList,
    chunk_size: usize,
) -> Vec<ShadowViewMutationList> {
    let chunk_size = chunk_size.max(1);
    let mut batches = Vec::new();
    let mut current = Vec::new();
    let mut creates = 0;
    for mutation in mutations {
        if mutation.mutation_type == MutationType::Create {
            if creates == chunk_size {
                batches.push(mem::take(&mut current));
                creates = 0;
            }
            creates += 1;
        }
        current.push(mutation);
    }
    batches.push(current);
    batches
}

/// Feeds scheduler callbacks to a mounting manager on MAIN.
pub struct SchedulerDelegate {
    mounting_manager: Arc<dyn MountingManager>,
    task_executor: TaskExecutor,
    preallocator: Option<Weak<dyn PreliminaryViewAllocator>>,
    chunk_size: usize,
}

impl SchedulerDelegate {
    /// Creates a delegate.
    ///
    /// Without a preallocator, allocation hints are ignored.
    pub fn new(
        mounting_manager: Arc<dyn MountingManager>,
        task_executor: TaskExecutor,
        preallocator: Option<Weak<dyn PreliminaryViewAllocator>>,
        chunk_size: usize,
    ) -> Self {
        Self {
            mounting_manager,
            task_executor,
            preallocator,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Pulls the finished transaction of `coordinator` and posts its phases
    /// to MAIN.
    pub fn scheduler_did_finish_transaction(&self, coordinator: &dyn MountingCoordinator) {
        TelemetryController::new(coordinator).pull_transaction(
            |transaction| {
                let manager = Arc::clone(&self.mounting_manager);
                let mutations = transaction.mutations.clone();
                self.task_executor
                    .run_task(TaskThread::Main, move || manager.will_mount(&mutations));
            },
            |transaction| {
                let manager = Arc::clone(&self.mounting_manager);
                let mutations = transaction.mutations.clone();
                self.task_executor
                    .run_task(TaskThread::Main, move || manager.do_mount(&mutations));
            },
            |transaction| self.dispatch_did_mount(transaction),
        );
    }

    fn dispatch_did_mount(&self, transaction: MountingTransaction) {
        let MountingTransaction {
            surface_id,
            number,
            mutations,
            telemetry,
        } = transaction;
        let mutation_count = mutations.len();
        let create_count = mutations
            .iter()
            .filter(|mutation| mutation.mutation_type == MutationType::Create)
            .count();
        let mut batches = fragment_mutations(mutations, self.chunk_size);
        let batch_count = batches.len();
        let last = batches.pop().unwrap_or_default();

        for batch in batches {
            let manager = Arc::clone(&self.mounting_manager);
            self.task_executor
                .run_task(TaskThread::Main, move || manager.did_mount(&batch));
        }
        let manager = Arc::clone(&self.mounting_manager);
        self.task_executor.run_task(TaskThread::Main, move || {
            manager.did_mount(&last);
            manager.clear_preallocated_views();
        });

        debug!(
            target: "rnoh::telemetry",
            surface_id,
            transaction = number,
            mutations = mutation_count,
            creates = create_count,
            batches = batch_count,
            commit = ?telemetry.commit_duration(),
            diff = ?telemetry.diff_duration(),
            layout = ?telemetry.layout_duration(),
            "transaction dispatched"
        );
        #[cfg(feature = "profiling")]
        crate::profiler::record_transaction(crate::profiler::TransactionSample {
            surface_id,
            number,
            mutations: mutation_count,
            creates: create_count,
            batches: batch_count,
            telemetry,
        });
    }

    /// Forwards a preliminary allocation hint; dropped silently when the
    /// allocator is gone.
    pub fn scheduler_did_request_preliminary_view_allocation(
        &self,
        surface_id: SurfaceId,
        view: &ShadowView,
    ) {
        let Some(allocator) = self.preallocator.as_ref().and_then(Weak::upgrade) else {
            trace!(tag = view.tag, "preallocation hint dropped");
            return;
        };
        allocator.preallocate(surface_id, view);
    }

    /// Posts a JS command to MAIN.
    pub fn scheduler_did_dispatch_command(&self, view: &ShadowView, command_name: &str, args: Value) {
        let manager = Arc::clone(&self.mounting_manager);
        let view = view.clone();
        let command_name = command_name.to_string();
        self.task_executor.run_task(TaskThread::Main, move || {
            manager.dispatch_command(&view, &command_name, args);
        });
    }

    /// Posts a JS responder change to MAIN.
    pub fn scheduler_did_set_is_js_responder(
        &self,
        view: &ShadowView,
        is_js_responder: bool,
        block_native_responder: bool,
    ) {
        let manager = Arc::clone(&self.mounting_manager);
        let view = view.clone();
        self.task_executor.run_task(TaskThread::Main, move || {
            manager.set_is_js_responder(&view, is_js_responder, block_native_responder);
        });
    }

    /// Posts an accessibility event to MAIN.
    pub fn scheduler_did_send_accessibility_event(&self, view: &ShadowView, event_type: &str) {
        let manager = Arc::clone(&self.mounting_manager);
        let view = view.clone();
        let event_type = event_type.to_string();
        self.task_executor.run_task(TaskThread::Main, move || {
            manager.scheduler_did_send_accessibility_event(&view, &event_type);
        });
    }
}

impl fmt::Debug for SchedulerDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerDelegate")
            .field("chunk_size", &self.chunk_size)
            .finish_non_exhaustive()
    }
}
