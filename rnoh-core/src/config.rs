//! Instance configuration.
//!
//! ## Usage
//!
//! Pick the rendering architecture and tune transaction fragmentation and
//! preallocation pacing before building an instance.

use std::time::Duration;

/// Number of Create mutations dispatched to the MAIN lane per `did_mount`.
///
/// About 60µs per Create keeps one chunk under half a frame at common
/// refresh rates.
pub const DEFAULT_CREATE_MUTATION_CHUNK_SIZE: usize = 70;

/// Frame period the preallocation drain is paced against (120 Hz).
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_nanos(1_000_000_000 / 120);

/// How component instances are materialized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// Native component instances owned by this process; components without a
    /// native factory are forwarded to the ArkTS host.
    #[default]
    Capi,
    /// Every mutation is serialized and rendered by the ArkTS host.
    ArkTs,
}

/// Configuration for an instance and its mounting pipeline.
#[derive(Clone, Debug)]
pub struct RnohConfig {
    /// Rendering architecture.
    ///
    /// Defaults to [`Architecture::Capi`].
    pub architecture: Architecture,
    /// Maximum number of Create mutations per MAIN-lane `did_mount` call.
    ///
    /// Must be non-zero; zero is treated as one.
    pub create_mutation_chunk_size: usize,
    /// Frame period used to pace preallocation.
    ///
    /// Draining stops once less than half of this period remains in the
    /// current frame.
    pub frame_duration: Duration,
    /// Whether preliminary view allocation hints are honored.
    pub preallocation_enabled: bool,
    /// Whether a dedicated WORKER lane is spawned.
    ///
    /// Without it, WORKER tasks run on the JS lane.
    pub worker_thread_enabled: bool,
    /// Name of the JS lane thread.
    pub js_thread_name: String,
    /// Name of the WORKER lane thread.
    pub worker_thread_name: String,
    /// Name prefix of the BACKGROUND pool threads.
    pub background_thread_name: String,
    /// Number of BACKGROUND pool threads.
    pub background_threads: usize,
}

impl RnohConfig {
    /// Minimum remaining frame time required to process one more
    /// preallocation request.
    pub fn preallocation_budget(&self) -> Duration {
        self.frame_duration / 2
    }

    /// Chunk size with the zero case clamped.
    pub fn effective_chunk_size(&self) -> usize {
        self.create_mutation_chunk_size.max(1)
    }
}

impl Default for RnohConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::default(),
            create_mutation_chunk_size: DEFAULT_CREATE_MUTATION_CHUNK_SIZE,
            frame_duration: DEFAULT_FRAME_DURATION,
            preallocation_enabled: true,
            worker_thread_enabled: false,
            js_thread_name: "RNOH_JS".to_string(),
            worker_thread_name: "RNOH_WORKER".to_string(),
            background_thread_name: "RNOH_BG".to_string(),
            background_threads: 2,
        }
    }
}
