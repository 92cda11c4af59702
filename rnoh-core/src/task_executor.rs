//! Cross-thread task scheduling.
//!
//! ## Usage
//!
//! A [`TaskExecutor`] owns four logical lanes. MAIN is driven by the host's
//! UI loop through an [`EventLoopTaskRunner`]; JS and WORKER are dedicated
//! threads; BACKGROUND is a small rayon pool. Tasks posted to one lane run in
//! FIFO order.
//!
//! ```
//! use std::sync::Arc;
//!
//! use rnoh_core::{EventLoopTaskRunner, RnohConfig, TaskExecutor, TaskThread};
//!
//! let main = Arc::new(EventLoopTaskRunner::new());
//! let executor = TaskExecutor::with_config(main.clone(), &RnohConfig::default())
//!     .expect("lanes spawn");
//! let answer = executor.run_sync_task(TaskThread::Js, || 6 * 7).expect("js lane alive");
//! assert_eq!(answer, 42);
//! ```

use std::{
    collections::VecDeque,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, mpsc},
    thread::{self, JoinHandle, ThreadId},
};

use parking_lot::Mutex;
use tracing::{debug, error};

use crate::{
    config::RnohConfig,
    error::{RnohError, RnohResult},
    thread_utils::{ThreadGuard, set_thread_name},
};

/// A unit of work posted to a lane.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Logical execution lanes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TaskThread {
    /// Native UI thread.
    Main,
    /// Thread producing shadow-tree transactions.
    Js,
    /// Pool for work with no affinity.
    Background,
    /// Optional secondary JS-like thread.
    Worker,
}

/// Runs tasks on one lane.
pub trait TaskRunner: Send + Sync {
    /// Posts a task; tasks run in posting order.
    fn run_async_task(&self, task: Task);

    /// Returns `true` when called from a thread of this lane.
    fn is_on_current_thread(&self) -> bool;
}

fn run_guarded(lane: &str, task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "<non-string panic payload>".to_string());
        error!(lane, %message, "task panicked");
    }
}

/// A lane backed by one dedicated OS thread.
pub struct ThreadTaskRunner {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Task>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
}

impl ThreadTaskRunner {
    /// Spawns the lane thread.
    pub fn new(name: impl Into<String>) -> RnohResult<Self> {
        let name = name.into();
        let (sender, receiver) = mpsc::channel::<Task>();
        let lane = name.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                set_thread_name(&lane);
                while let Ok(task) = receiver.recv() {
                    run_guarded(&lane, task);
                }
                debug!(lane, "task runner stopped");
            })
            .map_err(|err| RnohError::TaskExecutor(format!("failed to spawn {name}: {err}")))?;
        let thread_id = handle.thread().id();
        Ok(Self {
            name,
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
            thread_id,
        })
    }

    /// Name of the lane thread.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl TaskRunner for ThreadTaskRunner {
    fn run_async_task(&self, task: Task) {
        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(task).is_ok(),
            None => false,
        };
        if !sent {
            debug!(lane = %self.name, "task dropped, runner is shutting down");
        }
    }

    fn is_on_current_thread(&self) -> bool {
        thread::current().id() == self.thread_id
    }
}

impl Drop for ThreadTaskRunner {
    fn drop(&mut self) {
        self.sender.lock().take();
        let Some(handle) = self.handle.lock().take() else {
            return;
        };
        // A lane dropped from its own thread cannot wait for itself.
        if self.is_on_current_thread() {
            return;
        }
        if handle.join().is_err() {
            error!(lane = %self.name, "task runner thread panicked");
        }
    }
}

impl fmt::Debug for ThreadTaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadTaskRunner")
            .field("name", &self.name)
            .field("thread_id", &self.thread_id)
            .finish()
    }
}

/// A lane whose tasks are run by a loop the host drives.
///
/// The thread that creates the runner owns it; the host calls
/// [`EventLoopTaskRunner::run_pending`] from that thread, typically once per
/// UI loop iteration after the waker fired.
pub struct EventLoopTaskRunner {
    queue: Mutex<VecDeque<Task>>,
    guard: ThreadGuard,
    waker: Option<Box<dyn Fn() + Send + Sync>>,
}

impl EventLoopTaskRunner {
    /// Creates a runner owned by the calling thread.
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            guard: ThreadGuard::new(),
            waker: None,
        }
    }

    /// Creates a runner that calls `waker` after every post so the host can
    /// schedule a loop iteration.
    pub fn with_waker(waker: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            waker: Some(Box::new(waker)),
            ..Self::new()
        }
    }

    /// Runs queued tasks until the queue is empty, including tasks posted by
    /// the tasks themselves. Returns how many ran.
    ///
    /// # Panics
    ///
    /// Panics when called from a thread other than the owner.
    #[track_caller]
    pub fn run_pending(&self) -> usize {
        self.guard.assert_thread();
        let mut ran = 0;
        loop {
            // The lock is released before the task runs so tasks can post.
            let next = self.queue.lock().pop_front();
            let Some(task) = next else {
                return ran;
            };
            run_guarded("main", task);
            ran += 1;
        }
    }

    /// Number of queued tasks.
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }
}

impl Default for EventLoopTaskRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRunner for EventLoopTaskRunner {
    fn run_async_task(&self, task: Task) {
        self.queue.lock().push_back(task);
        if let Some(waker) = &self.waker {
            waker();
        }
    }

    fn is_on_current_thread(&self) -> bool {
        self.guard.is_owner_thread()
    }
}

/// A lane backed by a rayon pool.
pub struct RayonTaskRunner {
    pool: rayon::ThreadPool,
}

impl RayonTaskRunner {
    /// Builds a pool of `threads` threads named `{name}_{index}`.
    pub fn new(name: &str, threads: usize) -> RnohResult<Self> {
        let prefix = name.to_string();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(move |index| format!("{prefix}_{index}"))
            .panic_handler(|_| error!(lane = "background", "task panicked"))
            .build()
            .map_err(|err| RnohError::TaskExecutor(err.to_string()))?;
        Ok(Self { pool })
    }
}

impl TaskRunner for RayonTaskRunner {
    fn run_async_task(&self, task: Task) {
        self.pool.spawn(task);
    }

    fn is_on_current_thread(&self) -> bool {
        self.pool.current_thread_index().is_some()
    }
}

/// The four lanes of one instance.
#[derive(Clone)]
pub struct TaskExecutor {
    main: Arc<dyn TaskRunner>,
    js: Arc<dyn TaskRunner>,
    background: Arc<dyn TaskRunner>,
    worker: Option<Arc<dyn TaskRunner>>,
}

impl TaskExecutor {
    /// Assembles an executor from existing runners.
    ///
    /// Without a worker runner, WORKER tasks run on the JS lane.
    pub fn new(
        main: Arc<dyn TaskRunner>,
        js: Arc<dyn TaskRunner>,
        background: Arc<dyn TaskRunner>,
        worker: Option<Arc<dyn TaskRunner>>,
    ) -> Self {
        Self {
            main,
            js,
            background,
            worker,
        }
    }

    /// Spawns the JS, BACKGROUND and optional WORKER lanes around a host
    /// provided MAIN lane.
    pub fn with_config(main: Arc<dyn TaskRunner>, config: &RnohConfig) -> RnohResult<Self> {
        let js: Arc<dyn TaskRunner> = Arc::new(ThreadTaskRunner::new(&config.js_thread_name)?);
        let background: Arc<dyn TaskRunner> = Arc::new(RayonTaskRunner::new(
            &config.background_thread_name,
            config.background_threads,
        )?);
        let worker = if config.worker_thread_enabled {
            let runner: Arc<dyn TaskRunner> =
                Arc::new(ThreadTaskRunner::new(&config.worker_thread_name)?);
            Some(runner)
        } else {
            None
        };
        Ok(Self::new(main, js, background, worker))
    }

    /// The runner serving `thread`.
    pub fn runner(&self, thread: TaskThread) -> &Arc<dyn TaskRunner> {
        match thread {
            TaskThread::Main => &self.main,
            TaskThread::Js => &self.js,
            TaskThread::Background => &self.background,
            TaskThread::Worker => self.worker.as_ref().unwrap_or(&self.js),
        }
    }

    /// Posts a fire-and-forget task.
    pub fn run_task(&self, thread: TaskThread, task: impl FnOnce() + Send + 'static) {
        self.runner(thread).run_async_task(Box::new(task));
    }

    /// Runs `task` on `thread` and blocks until it finished.
    ///
    /// Runs inline when already on that lane. Fails when the lane dropped the
    /// task or the task panicked.
    pub fn run_sync_task<R, F>(&self, thread: TaskThread, task: F) -> RnohResult<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let runner = self.runner(thread);
        if runner.is_on_current_thread() {
            return Ok(task());
        }
        let (sender, receiver) = mpsc::sync_channel(1);
        runner.run_async_task(Box::new(move || {
            let _ = sender.send(task());
        }));
        receiver
            .recv()
            .map_err(|_| RnohError::TaskExecutor(format!("{thread:?} task did not complete")))
    }

    /// Returns `true` when called from a thread of `thread`'s lane.
    pub fn is_on_task_thread(&self, thread: TaskThread) -> bool {
        self.runner(thread).is_on_current_thread()
    }
}

impl fmt::Debug for TaskExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskExecutor")
            .field("worker_enabled", &self.worker.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
        mpsc,
    };

    use parking_lot::Mutex;

    use super::{
        EventLoopTaskRunner, RayonTaskRunner, TaskExecutor, TaskRunner, TaskThread,
        ThreadTaskRunner,
    };
    use crate::config::RnohConfig;

    fn executor(main: Arc<EventLoopTaskRunner>, worker: bool) -> TaskExecutor {
        let config = RnohConfig {
            worker_thread_enabled: worker,
            ..Default::default()
        };
        match TaskExecutor::with_config(main, &config) {
            Ok(executor) => executor,
            Err(err) => panic!("executor must build: {err}"),
        }
    }

    #[test]
    fn thread_runner_is_fifo() {
        let runner = ThreadTaskRunner::new("fifo_lane").expect("lane spawns");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..50 {
            let seen = Arc::clone(&seen);
            runner.run_async_task(Box::new(move || seen.lock().push(i)));
        }
        drop(runner);
        assert_eq!(*seen.lock(), (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn panicking_task_does_not_stop_the_lane() {
        let runner = ThreadTaskRunner::new("panic_lane").expect("lane spawns");
        let (tx, rx) = mpsc::channel();
        runner.run_async_task(Box::new(|| panic!("boom")));
        runner.run_async_task(Box::new(move || tx.send(7).expect("receiver alive")));
        assert_eq!(rx.recv().expect("second task ran"), 7);
    }

    #[test]
    fn event_loop_runs_nested_posts_in_order() {
        let runner = Arc::new(EventLoopTaskRunner::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let seen = Arc::clone(&seen);
            let nested = Arc::clone(&runner);
            runner.run_async_task(Box::new(move || {
                seen.lock().push("outer");
                let seen = Arc::clone(&seen);
                nested.run_async_task(Box::new(move || seen.lock().push("nested")));
            }));
        }
        assert_eq!(runner.pending(), 1);
        assert_eq!(runner.run_pending(), 2);
        assert_eq!(*seen.lock(), vec!["outer", "nested"]);
    }

    #[test]
    fn waker_fires_on_post() {
        let wakes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&wakes);
        let runner = EventLoopTaskRunner::with_waker(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        runner.run_async_task(Box::new(|| {}));
        runner.run_async_task(Box::new(|| {}));
        assert_eq!(wakes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn sync_task_runs_inline_on_own_lane() {
        let main = Arc::new(EventLoopTaskRunner::new());
        let executor = executor(main.clone(), false);
        let value = executor
            .run_sync_task(TaskThread::Main, || 5)
            .expect("inline task completes");
        assert_eq!(value, 5);
        assert_eq!(main.pending(), 0);
    }

    #[test]
    fn sync_task_hops_to_js_lane() {
        let executor = executor(Arc::new(EventLoopTaskRunner::new()), false);
        let handle = executor.clone();
        let on_js = executor
            .run_sync_task(TaskThread::Js, move || handle.is_on_task_thread(TaskThread::Js))
            .expect("js lane alive");
        assert!(on_js);
        assert!(!executor.is_on_task_thread(TaskThread::Js));
    }

    #[test]
    fn sync_task_reports_panics() {
        let executor = executor(Arc::new(EventLoopTaskRunner::new()), false);
        let result = executor.run_sync_task(TaskThread::Js, || -> i32 { panic!("boom") });
        assert!(result.is_err());
    }

    #[test]
    fn worker_falls_back_to_js() {
        let executor = executor(Arc::new(EventLoopTaskRunner::new()), false);
        let handle = executor.clone();
        let on_js = executor
            .run_sync_task(TaskThread::Worker, move || handle.is_on_task_thread(TaskThread::Js))
            .expect("worker lane alive");
        assert!(on_js);

        let executor = self::executor(Arc::new(EventLoopTaskRunner::new()), true);
        let handle = executor.clone();
        let on_js = executor
            .run_sync_task(TaskThread::Worker, move || handle.is_on_task_thread(TaskThread::Js))
            .expect("worker lane alive");
        assert!(!on_js);
    }

    #[test]
    fn rayon_runner_knows_its_threads() {
        let runner = Arc::new(RayonTaskRunner::new("bg_test", 1).expect("pool builds"));
        let (tx, rx) = mpsc::channel();
        let handle = Arc::clone(&runner);
        runner.run_async_task(Box::new(move || {
            tx.send(handle.is_on_current_thread()).expect("receiver alive");
        }));
        assert!(rx.recv().expect("background task ran"));
        assert!(!runner.is_on_current_thread());
    }
}
