//! Seams towards the ArkTS host.
//!
//! ## Usage
//!
//! The host implements [`ArkTsHost`] to receive serialized mutations and
//! out-of-band calls, [`ArkTsNodeFactory`] to hand out the native nodes it
//! renders into, and packages contribute [`ArkTsMessageHandler`]s for
//! messages coming back from ArkTS. Calls towards the host always run on the
//! MAIN lane through an [`ArkTsChannel`].

use std::{fmt, sync::Arc};

use serde_json::Value;

use crate::{
    Tag,
    error::RnohResult,
    native_node::NativeNodeRef,
    task_executor::{TaskExecutor, TaskThread},
};

/// The dynamically-typed rendering host.
pub trait ArkTsHost: Send + Sync {
    /// Receives the serialized `will_mount` batch of a transaction.
    fn will_mount(&self, mutations: Value);

    /// Receives the serialized `do_mount` batch of a transaction.
    fn do_mount(&self, mutations: Value);

    /// Receives one serialized `did_mount` batch.
    fn did_mount(&self, mutations: Value);

    /// Receives the descriptor of a node that will probably be created soon.
    fn preallocate(&self, descriptor: Value);

    /// Receives a JS command for a host-rendered node.
    fn dispatch_command(&self, tag: Tag, command_name: &str, args: Value);

    /// Receives the JS responder state of a host-rendered node.
    fn set_is_js_responder(&self, tag: Tag, is_js_responder: bool, block_native_responder: bool);

    /// Receives an accessibility event for a host-rendered node.
    fn send_accessibility_event(&self, tag: Tag, event_type: &str);

    /// Receives a message posted by native code.
    fn post_message(&self, name: &str, payload: Value);
}

/// Provides the native nodes that host-rendered components draw into.
pub trait ArkTsNodeFactory: Send + Sync {
    /// Creates the node for a host-rendered component.
    fn create_node(&self, tag: Tag, component_name: &str) -> RnohResult<NativeNodeRef>;
}

/// Handles messages sent from ArkTS to native code.
pub trait ArkTsMessageHandler: Send + Sync {
    /// Name used in diagnostics.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Handles one message. Handlers ignore names they do not know.
    fn handle_arkts_message(&self, name: &str, payload: &Value) -> RnohResult<()>;
}

/// Delivers calls to the host on the MAIN lane.
#[derive(Clone)]
pub struct ArkTsChannel {
    host: Arc<dyn ArkTsHost>,
    task_executor: TaskExecutor,
}

impl ArkTsChannel {
    /// Creates a channel.
    pub fn new(host: Arc<dyn ArkTsHost>, task_executor: TaskExecutor) -> Self {
        Self {
            host,
            task_executor,
        }
    }

    /// Runs `call` against the host on MAIN, inline when already there.
    pub fn post(&self, call: impl FnOnce(&dyn ArkTsHost) + Send + 'static) {
        if self.task_executor.is_on_task_thread(TaskThread::Main) {
            call(self.host.as_ref());
            return;
        }
        let host = Arc::clone(&self.host);
        self.task_executor
            .run_task(TaskThread::Main, move || call(host.as_ref()));
    }

    /// The host behind the channel.
    pub fn host(&self) -> &Arc<dyn ArkTsHost> {
        &self.host
    }
}

impl fmt::Debug for ArkTsChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArkTsChannel").finish_non_exhaustive()
    }
}
