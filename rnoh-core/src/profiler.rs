//! # Mounting Profiler
//!
//! ## Usage
//!
//! Stream JSONL mounting records for external analyzer tools. Enabled with
//! the `profiling` cargo feature.
//!
//! ## Format
//!
//! The first line is a header, followed by one record per line:
//!
//! ```jsonl
//! {"version":1,"format":"rnoh-profiler","generated_at":"1767008877"}
//! {"type":"transaction","surface_id":1,"transaction":4,"mutations":312,"creates":150,"batches":3,"commit_ns":210000,"diff_ns":95000,"layout_ns":180000}
//! {"type":"preallocation","frame":88,"processed":12,"queued":40}
//! ```

use std::{
    fs::{File, OpenOptions, create_dir_all},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{OnceLock, mpsc},
    thread,
    time::{SystemTime, UNIX_EPOCH},
};

use serde::Serialize;
use tracing::error;

use crate::{SurfaceId, scheduler_delegate::TransactionTelemetry};

/// Summary of one dispatched transaction.
#[derive(Clone, Copy, Debug)]
pub struct TransactionSample {
    /// Surface of the transaction.
    pub surface_id: SurfaceId,
    /// Transaction number.
    pub number: u64,
    /// Total mutations.
    pub mutations: usize,
    /// Create mutations.
    pub creates: usize,
    /// Number of `did_mount` batches posted.
    pub batches: usize,
    /// Commit, diff and layout markers.
    pub telemetry: TransactionTelemetry,
}

enum Message {
    Transaction(TransactionSample),
    Preallocation {
        frame: u64,
        processed: usize,
        queued: usize,
    },
}

struct ProfilerRuntime {
    sender: Option<mpsc::Sender<Message>>,
}

struct WorkerState {
    writer: BufWriter<File>,
    header_written: bool,
}

static RUNTIME: OnceLock<ProfilerRuntime> = OnceLock::new();
static OUTPUT_PATH: OnceLock<PathBuf> = OnceLock::new();

fn output_path() -> PathBuf {
    OUTPUT_PATH
        .get()
        .cloned()
        .unwrap_or_else(|| PathBuf::from("rnoh-profiler.jsonl"))
}

/// Set profiler output path. Must be called before any record is submitted.
pub fn set_output_path(path: impl AsRef<Path>) {
    let _ = OUTPUT_PATH.set(path.as_ref().to_path_buf());
}

fn profiler_runtime() -> &'static ProfilerRuntime {
    RUNTIME.get_or_init(|| {
        let (sender, receiver) = mpsc::channel::<Message>();
        let spawned = thread::Builder::new()
            .name("rnoh-profiler".to_string())
            .spawn(move || worker_loop(receiver));
        match spawned {
            Ok(_) => ProfilerRuntime {
                sender: Some(sender),
            },
            Err(err) => {
                error!("rnoh profiler failed to spawn worker: {err}");
                ProfilerRuntime { sender: None }
            }
        }
    })
}

fn send(message: Message) {
    let Some(sender) = &profiler_runtime().sender else {
        return;
    };
    if let Err(err) = sender.send(message) {
        error!("rnoh profiler send failed: {err}");
    }
}

fn worker_loop(receiver: mpsc::Receiver<Message>) {
    let output_path = output_path();
    if let Some(parent) = output_path.parent()
        && !parent.as_os_str().is_empty()
        && let Err(err) = create_dir_all(parent)
    {
        error!(
            "rnoh profiler failed to create output directory {}: {err}",
            parent.display()
        );
        return;
    }
    let file = match OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&output_path)
    {
        Ok(file) => file,
        Err(err) => {
            error!(
                "rnoh profiler failed to open output file {}: {err}",
                output_path.display()
            );
            return;
        }
    };
    let mut state = WorkerState {
        writer: BufWriter::new(file),
        header_written: false,
    };

    for message in receiver {
        let event = match message {
            Message::Transaction(sample) => TraceEvent::Transaction(sample.into()),
            Message::Preallocation {
                frame,
                processed,
                queued,
            } => TraceEvent::Preallocation(PreallocationRecord {
                frame,
                processed,
                queued,
            }),
        };
        write_event(&mut state, &event);
    }
}

fn write_header_if_needed(state: &mut WorkerState) {
    if state.header_written {
        return;
    }
    if serde_json::to_writer(&mut state.writer, &ProfilerHeader::new()).is_ok() {
        let _ = state.writer.write_all(b"\n");
        state.header_written = true;
    }
}

fn write_event(state: &mut WorkerState, event: &TraceEvent) {
    write_header_if_needed(state);
    if serde_json::to_writer(&mut state.writer, event).is_ok() {
        let _ = state.writer.write_all(b"\n");
    }
    let _ = state.writer.flush();
}

/// Submit a dispatched transaction.
pub fn record_transaction(sample: TransactionSample) {
    send(Message::Transaction(sample));
}

/// Submit the outcome of one preallocation tick.
pub fn record_preallocation(frame: u64, processed: usize, queued: usize) {
    send(Message::Preallocation {
        frame,
        processed,
        queued,
    });
}

#[derive(Serialize)]
struct ProfilerHeader {
    version: u32,
    format: &'static str,
    generated_at: String,
}

impl ProfilerHeader {
    fn new() -> Self {
        let generated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| format!("{}", d.as_secs()))
            .unwrap_or_else(|_| String::from("unknown"));
        Self {
            version: 1,
            format: "rnoh-profiler",
            generated_at,
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TraceEvent {
    Transaction(TransactionRecord),
    Preallocation(PreallocationRecord),
}

#[derive(Serialize)]
struct TransactionRecord {
    surface_id: SurfaceId,
    transaction: u64,
    mutations: usize,
    creates: usize,
    batches: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    commit_ns: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    diff_ns: Option<u128>,
    #[serde(skip_serializing_if = "Option::is_none")]
    layout_ns: Option<u128>,
}

impl From<TransactionSample> for TransactionRecord {
    fn from(sample: TransactionSample) -> Self {
        let telemetry = sample.telemetry;
        Self {
            surface_id: sample.surface_id,
            transaction: sample.number,
            mutations: sample.mutations,
            creates: sample.creates,
            batches: sample.batches,
            commit_ns: telemetry.commit_duration().map(|d| d.as_nanos()),
            diff_ns: telemetry.diff_duration().map(|d| d.as_nanos()),
            layout_ns: telemetry.layout_duration().map(|d| d.as_nanos()),
        }
    }
}

#[derive(Serialize)]
struct PreallocationRecord {
    frame: u64,
    processed: usize,
    queued: usize,
}
