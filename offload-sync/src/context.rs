//! # Sync Context
//!
//! Explicit context object owning every external collaborator the engine
//! talks to. Constructor-injected, no ambient globals: components receive
//! an `Arc<SyncContext>` and nothing else.

use crate::error::{Result, SyncError};
use crate::repository::{QueueRepository, SyncStateRepository};
use offload_bridge::{
    background::{BackgroundDispatcher, Scheduler},
    catalog::{AssetCatalog, MediaKind},
    fs::FileSystemAccess,
    remote::RemoteMediaStore,
    time::{Clock, SystemClock},
};
use std::path::PathBuf;
use std::sync::Arc;

/// Engine configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Worker thread lanes for the bulk queue
    pub bulk_threads: usize,

    /// Worker thread lanes for the autosync queue
    pub auto_threads: usize,

    /// Maximum assets processed per dispatch invocation
    pub batch_cap: usize,

    /// Heartbeat staleness window in seconds; a running thread whose last
    /// claim is older than this counts as stalled
    pub staleness_secs: i64,

    /// Grace delay in seconds before `cloud_only` removes local files
    pub cloud_only_grace_secs: i64,

    /// Media kinds eligible for queueing
    pub enabled_kinds: Vec<MediaKind>,

    /// Root directory of host-managed media; deletes outside it never touch
    /// the remote store
    pub managed_root: PathBuf,

    /// Folder prefix for remote public ids
    pub folder_prefix: String,

    /// Transformation string for the reduced-quality local rendition
    pub low_rendition_transform: String,

    /// Whether the autosync queue category is enabled
    pub autosync_enabled: bool,

    /// Whether the bulk queue category is enabled
    pub bulk_enabled: bool,

    /// Health monitor interval in seconds
    pub monitor_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            bulk_threads: 3,
            auto_threads: 1,
            batch_cap: 10,
            staleness_secs: 120,
            cloud_only_grace_secs: 86_400,
            enabled_kinds: vec![MediaKind::Image, MediaKind::Video],
            managed_root: PathBuf::from("/var/media"),
            folder_prefix: "media".to_string(),
            low_rendition_transform: "q_auto:low".to_string(),
            autosync_enabled: true,
            bulk_enabled: true,
            monitor_interval_secs: 60,
        }
    }
}

/// Shared context owning references to all external collaborators
pub struct SyncContext {
    pub remote: Arc<dyn RemoteMediaStore>,
    pub files: Arc<dyn FileSystemAccess>,
    pub catalog: Arc<dyn AssetCatalog>,
    pub dispatcher: Arc<dyn BackgroundDispatcher>,
    pub scheduler: Arc<dyn Scheduler>,
    pub clock: Arc<dyn Clock>,
    pub states: Arc<dyn SyncStateRepository>,
    pub queues: Arc<dyn QueueRepository>,
    pub config: SyncConfig,
}

impl SyncContext {
    /// Start building a context. Every bridge except the clock is required;
    /// the clock defaults to [`SystemClock`].
    pub fn builder() -> SyncContextBuilder {
        SyncContextBuilder::default()
    }

    /// Current Unix timestamp from the injected clock
    pub fn now(&self) -> i64 {
        self.clock.unix_timestamp()
    }
}

/// Fail-fast builder for [`SyncContext`]
#[derive(Default)]
pub struct SyncContextBuilder {
    remote: Option<Arc<dyn RemoteMediaStore>>,
    files: Option<Arc<dyn FileSystemAccess>>,
    catalog: Option<Arc<dyn AssetCatalog>>,
    dispatcher: Option<Arc<dyn BackgroundDispatcher>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    clock: Option<Arc<dyn Clock>>,
    states: Option<Arc<dyn SyncStateRepository>>,
    queues: Option<Arc<dyn QueueRepository>>,
    config: Option<SyncConfig>,
}

impl SyncContextBuilder {
    pub fn remote(mut self, remote: Arc<dyn RemoteMediaStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn files(mut self, files: Arc<dyn FileSystemAccess>) -> Self {
        self.files = Some(files);
        self
    }

    pub fn catalog(mut self, catalog: Arc<dyn AssetCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn BackgroundDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn states(mut self, states: Arc<dyn SyncStateRepository>) -> Self {
        self.states = Some(states);
        self
    }

    pub fn queues(mut self, queues: Arc<dyn QueueRepository>) -> Self {
        self.queues = Some(queues);
        self
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Build the context, failing with an actionable message when a
    /// required capability is missing.
    pub fn build(self) -> Result<SyncContext> {
        fn require<T>(value: Option<T>, capability: &str) -> Result<T> {
            value.ok_or_else(|| SyncError::CapabilityMissing {
                capability: capability.to_string(),
            })
        }

        Ok(SyncContext {
            remote: require(self.remote, "RemoteMediaStore")?,
            files: require(self.files, "FileSystemAccess")?,
            catalog: require(self.catalog, "AssetCatalog")?,
            dispatcher: require(self.dispatcher, "BackgroundDispatcher")?,
            scheduler: require(self.scheduler, "Scheduler")?,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            states: require(self.states, "SyncStateRepository")?,
            queues: require(self.queues, "QueueRepository")?,
            config: self.config.unwrap_or_default(),
        })
    }
}
