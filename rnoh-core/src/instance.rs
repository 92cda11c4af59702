//! Instance assembly.
//!
//! ## Usage
//!
//! Configure an instance with packages and a config before building it.
//!
//! ```
//! use std::sync::Arc;
//!
//! use rnoh_core::{
//!     EventLoopTaskRunner, InstanceBuilder, RnInstance, RnohConfig,
//!     testing::{ManualVsync, RecordingArkTsHost, event_loop_executor},
//! };
//!
//! let main = Arc::new(EventLoopTaskRunner::new());
//! let instance = InstanceBuilder::new(
//!     Arc::new(RecordingArkTsHost::default()),
//!     Arc::new(ManualVsync::new()),
//!     event_loop_executor(main),
//! )
//! .config(RnohConfig::default())
//! .build()
//! .expect("instance");
//! assert!(instance.get_turbo_module("Missing").is_none());
//! ```

use std::{
    fmt,
    sync::{Arc, Weak},
};

use serde_json::Value;
use tracing::{debug, error, info};

use crate::{
    Tag,
    arkts_bridge::{ArkTsChannel, ArkTsHost, ArkTsMessageHandler, ArkTsNodeFactory},
    component_instance::{
        factory::ComponentInstanceFactory,
        preallocation::ComponentInstancePreallocationRequestQueue,
        provider::ComponentInstanceProvider, registry::ComponentInstanceRegistry,
    },
    config::{Architecture, RnohConfig},
    error::RnohResult,
    mounting::{MountingManager, arkts::MountingManagerArkTs, capi::MountingManagerCapi},
    package::{PackageContributions, PackageRegistry, RnohPackage},
    scheduler_delegate::{PreliminaryViewAllocator, SchedulerDelegate},
    shadow_view::{ShadowView, ShadowViewRegistry},
    task_executor::{TaskExecutor, TaskThread},
    turbo_module::{TurboModule, TurboModuleProvider},
    vsync::VsyncSource,
};

/// One running React Native application instance.
pub trait RnInstance: Send + Sync {
    /// Mounting architecture of the instance.
    fn architecture(&self) -> Architecture;

    /// Delegate the renderer's scheduler reports to.
    fn scheduler_delegate(&self) -> &Arc<SchedulerDelegate>;

    /// Lanes of the instance.
    fn task_executor(&self) -> &TaskExecutor;

    /// Returns the turbo module registered under `name`.
    fn get_turbo_module(&self, name: &str) -> Option<Arc<dyn TurboModule>>;

    /// Posts a message to the ArkTS side.
    fn post_message_to_arkts(&self, name: &str, payload: Value);

    /// Hands a message from ArkTS to every registered handler.
    fn handle_arkts_message(&self, name: &str, payload: &Value);

    /// Pushes props to a mounted view and waits until MAIN applied them.
    fn synchronously_update_view(&self, tag: Tag, props: Value) -> RnohResult<()>;

    /// Latest shadow-view snapshot for `tag`.
    fn find_shadow_view(&self, tag: Tag) -> Option<ShadowView>;

    /// Releases component instances and preallocation state on MAIN.
    fn shutdown(&self) -> RnohResult<()>;
}

/// State every architecture shares.
struct InstanceShared {
    config: RnohConfig,
    task_executor: TaskExecutor,
    channel: ArkTsChannel,
    turbo_modules: TurboModuleProvider,
    message_handlers: Vec<Arc<dyn ArkTsMessageHandler>>,
    scheduler_delegate: Arc<SchedulerDelegate>,
    arkts: Arc<MountingManagerArkTs>,
}

impl InstanceShared {
    fn post_message_to_arkts(&self, name: &str, payload: Value) {
        let name = name.to_string();
        self.channel
            .post(move |host| host.post_message(&name, payload));
    }

    fn handle_arkts_message(&self, name: &str, payload: &Value) {
        for handler in &self.message_handlers {
            if let Err(err) = handler.handle_arkts_message(name, payload) {
                error!(
                    handler = handler.name(),
                    message = name,
                    %err,
                    "ArkTS message handler failed"
                );
            }
        }
    }
}

/// Instance that builds native component instances.
pub struct RnInstanceCapi {
    shared: InstanceShared,
    capi: Arc<MountingManagerCapi>,
    registry: Arc<ComponentInstanceRegistry>,
    provider: Arc<ComponentInstanceProvider>,
    _preallocation_queue: Arc<ComponentInstancePreallocationRequestQueue>,
}

impl RnInstanceCapi {
    /// The native mounting manager.
    pub fn mounting_manager(&self) -> &Arc<MountingManagerCapi> {
        &self.capi
    }

    /// The component instance registry. Use it on MAIN only.
    pub fn registry(&self) -> &Arc<ComponentInstanceRegistry> {
        &self.registry
    }

    /// The preallocating instance provider.
    pub fn provider(&self) -> &Arc<ComponentInstanceProvider> {
        &self.provider
    }
}

impl RnInstance for RnInstanceCapi {
    fn architecture(&self) -> Architecture {
        Architecture::Capi
    }

    fn scheduler_delegate(&self) -> &Arc<SchedulerDelegate> {
        &self.shared.scheduler_delegate
    }

    fn task_executor(&self) -> &TaskExecutor {
        &self.shared.task_executor
    }

    fn get_turbo_module(&self, name: &str) -> Option<Arc<dyn TurboModule>> {
        self.shared.turbo_modules.get_turbo_module(name)
    }

    fn post_message_to_arkts(&self, name: &str, payload: Value) {
        self.shared.post_message_to_arkts(name, payload);
    }

    fn handle_arkts_message(&self, name: &str, payload: &Value) {
        self.shared.handle_arkts_message(name, payload);
    }

    fn synchronously_update_view(&self, tag: Tag, props: Value) -> RnohResult<()> {
        let capi = Arc::clone(&self.capi);
        self.shared
            .task_executor
            .run_sync_task(TaskThread::Main, move || capi.update_view(tag, props))?
    }

    fn find_shadow_view(&self, tag: Tag) -> Option<ShadowView> {
        self.shared.arkts.find_shadow_view(tag)
    }

    fn shutdown(&self) -> RnohResult<()> {
        let registry = Arc::clone(&self.registry);
        let provider = Arc::clone(&self.provider);
        let arkts = Arc::clone(&self.shared.arkts);
        self.shared.task_executor.run_sync_task(TaskThread::Main, move || {
            provider.clear_preallocation_request_queue();
            provider.clear_preallocated_views();
            registry.clear();
            arkts.clear_preallocated_views();
            arkts.shadow_views().clear();
        })?;
        info!(architecture = ?Architecture::Capi, "instance shut down");
        Ok(())
    }
}

impl fmt::Debug for RnInstanceCapi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RnInstanceCapi")
            .field("config", &self.shared.config)
            .field("preallocated", &self.provider.preallocated_count())
            .finish_non_exhaustive()
    }
}

/// Instance that lets the ArkTS host render everything.
pub struct RnInstanceArkTs {
    shared: InstanceShared,
}

impl RnInstanceArkTs {
    /// The host-forwarding mounting manager.
    pub fn mounting_manager(&self) -> &Arc<MountingManagerArkTs> {
        &self.shared.arkts
    }
}

impl RnInstance for RnInstanceArkTs {
    fn architecture(&self) -> Architecture {
        Architecture::ArkTs
    }

    fn scheduler_delegate(&self) -> &Arc<SchedulerDelegate> {
        &self.shared.scheduler_delegate
    }

    fn task_executor(&self) -> &TaskExecutor {
        &self.shared.task_executor
    }

    fn get_turbo_module(&self, name: &str) -> Option<Arc<dyn TurboModule>> {
        self.shared.turbo_modules.get_turbo_module(name)
    }

    fn post_message_to_arkts(&self, name: &str, payload: Value) {
        self.shared.post_message_to_arkts(name, payload);
    }

    fn handle_arkts_message(&self, name: &str, payload: &Value) {
        self.shared.handle_arkts_message(name, payload);
    }

    fn synchronously_update_view(&self, tag: Tag, props: Value) -> RnohResult<()> {
        self.shared.arkts.update_view(tag, props)
    }

    fn find_shadow_view(&self, tag: Tag) -> Option<ShadowView> {
        self.shared.arkts.find_shadow_view(tag)
    }

    fn shutdown(&self) -> RnohResult<()> {
        let arkts = Arc::clone(&self.shared.arkts);
        self.shared.task_executor.run_sync_task(TaskThread::Main, move || {
            arkts.clear_preallocated_views();
            arkts.shadow_views().clear();
        })?;
        info!(architecture = ?Architecture::ArkTs, "instance shut down");
        Ok(())
    }
}

impl fmt::Debug for RnInstanceArkTs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RnInstanceArkTs")
            .field("config", &self.shared.config)
            .field("shadow_views", &self.shared.arkts.shadow_views().len())
            .finish_non_exhaustive()
    }
}

/// Builder for application instances.
pub struct InstanceBuilder {
    host: Arc<dyn ArkTsHost>,
    node_factory: Option<Arc<dyn ArkTsNodeFactory>>,
    vsync: Arc<dyn VsyncSource>,
    task_executor: TaskExecutor,
    registry: PackageRegistry,
    config: RnohConfig,
}

impl InstanceBuilder {
    /// Creates a builder around the host collaborators.
    pub fn new(
        host: Arc<dyn ArkTsHost>,
        vsync: Arc<dyn VsyncSource>,
        task_executor: TaskExecutor,
    ) -> Self {
        Self {
            host,
            node_factory: None,
            vsync,
            task_executor,
            registry: PackageRegistry::new(),
            config: RnohConfig::default(),
        }
    }

    /// Sets the factory providing nodes for host-rendered components.
    pub fn node_factory(mut self, node_factory: Arc<dyn ArkTsNodeFactory>) -> Self {
        self.node_factory = Some(node_factory);
        self
    }

    /// Registers a package.
    pub fn package(mut self, package: impl RnohPackage) -> Self {
        self.registry.register_package(package);
        self
    }

    /// Overrides the instance configuration.
    pub fn config(mut self, config: RnohConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the instance for the configured architecture.
    pub fn build(self) -> RnohResult<Arc<dyn RnInstance>> {
        let instance: Arc<dyn RnInstance> = match self.config.architecture {
            Architecture::Capi => Arc::new(self.build_capi()?),
            Architecture::ArkTs => Arc::new(self.build_arkts()),
        };
        Ok(instance)
    }

    /// Builds a native-mounting instance. Main-affine parts are constructed
    /// on the MAIN lane.
    pub fn build_capi(self) -> RnohResult<RnInstanceCapi> {
        init_tracing();
        init_deadlock_detection();
        let Self {
            host,
            node_factory,
            vsync,
            task_executor,
            registry,
            config,
        } = self;
        let contributions = registry.finish();
        let channel = ArkTsChannel::new(host, task_executor.clone());
        let arkts = Arc::new(MountingManagerArkTs::new(
            Arc::new(ShadowViewRegistry::new()),
            channel.clone(),
        ));
        let queue = Arc::new(ComponentInstancePreallocationRequestQueue::new());

        let main_parts = {
            let delegates = contributions.component_delegates.clone();
            let descriptors = Arc::clone(&contributions.component_descriptors);
            let arkts = Arc::clone(&arkts);
            let queue = Arc::clone(&queue);
            let executor = task_executor.clone();
            let frame_duration = config.frame_duration;
            let budget = config.preallocation_budget();
            task_executor.run_sync_task(TaskThread::Main, move || {
                let factory = Arc::new(ComponentInstanceFactory::new(delegates, node_factory));
                let registry = Arc::new(ComponentInstanceRegistry::new());
                let provider = ComponentInstanceProvider::new(
                    queue,
                    Arc::clone(&factory),
                    Arc::clone(&registry),
                    vsync,
                    executor,
                    frame_duration,
                    budget,
                );
                let capi = Arc::new(MountingManagerCapi::new(
                    arkts,
                    Arc::clone(&registry),
                    factory,
                    Arc::clone(&provider),
                    descriptors,
                ));
                (capi, registry, provider)
            })?
        };
        let (capi, registry, provider) = main_parts;

        let preallocator = config.preallocation_enabled.then(|| {
            let allocator: Arc<dyn PreliminaryViewAllocator> = Arc::clone(&queue) as _;
            Arc::downgrade(&allocator)
        });
        let mounting_manager: Arc<dyn MountingManager> = Arc::clone(&capi) as _;
        let shared = shared_state(
            config,
            task_executor,
            channel,
            contributions,
            mounting_manager,
            preallocator,
            arkts,
        );
        debug!(architecture = ?Architecture::Capi, "instance built");
        Ok(RnInstanceCapi {
            shared,
            capi,
            registry,
            provider,
            _preallocation_queue: queue,
        })
    }

    /// Builds an instance that forwards every mutation to the host.
    pub fn build_arkts(self) -> RnInstanceArkTs {
        init_tracing();
        init_deadlock_detection();
        let contributions = self.registry.finish();
        let channel = ArkTsChannel::new(self.host, self.task_executor.clone());
        let arkts = Arc::new(MountingManagerArkTs::new(
            Arc::new(ShadowViewRegistry::new()),
            channel.clone(),
        ));
        let preallocator = self.config.preallocation_enabled.then(|| {
            let allocator: Arc<dyn PreliminaryViewAllocator> = Arc::clone(&arkts) as _;
            Arc::downgrade(&allocator)
        });
        let mounting_manager: Arc<dyn MountingManager> = Arc::clone(&arkts) as _;
        let shared = shared_state(
            self.config,
            self.task_executor,
            channel,
            contributions,
            mounting_manager,
            preallocator,
            arkts,
        );
        debug!(architecture = ?Architecture::ArkTs, "instance built");
        RnInstanceArkTs { shared }
    }
}

impl fmt::Debug for InstanceBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceBuilder")
            .field("config", &self.config)
            .field("packages", &self.registry)
            .finish_non_exhaustive()
    }
}

fn shared_state(
    config: RnohConfig,
    task_executor: TaskExecutor,
    channel: ArkTsChannel,
    contributions: PackageContributions,
    mounting_manager: Arc<dyn MountingManager>,
    preallocator: Option<Weak<dyn PreliminaryViewAllocator>>,
    arkts: Arc<MountingManagerArkTs>,
) -> InstanceShared {
    let scheduler_delegate = Arc::new(SchedulerDelegate::new(
        mounting_manager,
        task_executor.clone(),
        preallocator,
        config.effective_chunk_size(),
    ));
    InstanceShared {
        config,
        task_executor,
        channel,
        turbo_modules: TurboModuleProvider::new(contributions.turbo_module_delegates),
        message_handlers: contributions.message_handlers,
        scheduler_delegate,
        arkts,
    }
}

fn init_deadlock_detection() {
    #[cfg(debug_assertions)]
    {
        use std::{sync::Once, thread, time::Duration};

        static INIT: Once = Once::new();
        INIT.call_once(|| {
            let spawned = thread::Builder::new()
                .name("rnoh-deadlock".to_string())
                .spawn(|| {
                    loop {
                        thread::sleep(Duration::from_secs(10));
                        let deadlocks = parking_lot::deadlock::check_deadlock();
                        if deadlocks.is_empty() {
                            continue;
                        }

                        error!("{} deadlocks detected", deadlocks.len());
                        for (idx, threads) in deadlocks.iter().enumerate() {
                            error!("Deadlock #{}", idx);
                            for thread in threads {
                                error!("Thread Id {:#?}", thread.thread_id());
                                error!("{:?}", thread.backtrace());
                            }
                        }
                    }
                });
            if let Err(err) = spawned {
                error!(%err, "failed to start deadlock detection");
            }
        });
    }
}

fn init_tracing() {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => match tracing_subscriber::EnvFilter::try_new("error,rnoh_core=info") {
            Ok(filter) => filter,
            Err(_) => tracing_subscriber::EnvFilter::new("error"),
        },
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
