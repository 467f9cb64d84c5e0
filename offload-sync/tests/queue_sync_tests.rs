//! Integration tests for the queue sync engine
//!
//! These tests verify the end-to-end engine behavior including:
//! - Queue building, tagging, and the single-owner invariant
//! - The claim protocol (running flag, pop-and-zero, re-derivation)
//! - Signature-gated idempotence of the per-asset pass
//! - Priority ordering and pass termination guards
//! - Storage mode transitions and the cloud-only grace delay
//! - The "already exists" single retry with a uniquifying suffix
//! - Stall detection and health monitor healing

use async_trait::async_trait;
use bridge_local::MemoryCatalog;
use bytes::Bytes;
use offload_bridge::{
    background::{BackgroundDispatcher, DispatchRequest, ScheduledTask, Scheduler},
    catalog::{AssetRecord, MediaKind},
    error::Result as BridgeResult,
    fs::{FileMetadata, FileSystemAccess},
    remote::{RemoteMediaStore, RemoteResource, TransformResult, UploadRequest, UploadResult},
    time::{Clock, ManualClock},
    BridgeError,
};
use offload_sync::{
    AssetId, OffloadCoordinator, QueueKind, QueueRepository, SqliteQueueRepository,
    SqliteSyncStateRepository, StorageMode, SyncConfig, SyncContext, SyncOperation, SyncOutcome,
    SyncRegistry, SyncState, SyncStateRepository, ThreadCursor, ThreadState, SYNC_LOOP_ERROR,
};
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Mock Implementations
// ============================================================================

/// Fake remote store tracking resources and per-method call counts
struct FakeRemote {
    resources: Mutex<HashMap<String, (RemoteResource, Bytes)>>,
    /// Public ids the remote reports as already taken on upload
    taken: Mutex<HashSet<String>>,
    calls: Mutex<HashMap<&'static str, u32>>,
    reachable: AtomicBool,
}

impl FakeRemote {
    fn new() -> Self {
        Self {
            resources: Mutex::new(HashMap::new()),
            taken: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
            reachable: AtomicBool::new(true),
        }
    }

    fn mark_taken(&self, public_id: &str) {
        self.taken.lock().unwrap().insert(public_id.to_string());
    }

    fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn count(&self, method: &'static str) -> u32 {
        *self.calls.lock().unwrap().get(method).unwrap_or(&0)
    }

    fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }

    fn bump(&self, method: &'static str) {
        *self.calls.lock().unwrap().entry(method).or_insert(0) += 1;
    }

    fn store(&self, public_id: &str, data: Bytes) -> UploadResult {
        let mut resources = self.resources.lock().unwrap();
        let version = resources
            .get(public_id)
            .map(|(r, _)| r.version + 1)
            .unwrap_or(1);
        let resource = RemoteResource {
            public_id: public_id.to_string(),
            version,
            delivery_type: "upload".to_string(),
            bytes: data.len() as u64,
            url: format!("https://cdn.test/{}", public_id),
        };
        resources.insert(public_id.to_string(), (resource.clone(), data));
        UploadResult {
            public_id: resource.public_id,
            version: resource.version,
            delivery_type: resource.delivery_type,
            bytes: resource.bytes,
            url: resource.url,
        }
    }
}

#[async_trait]
impl RemoteMediaStore for FakeRemote {
    async fn upload(&self, request: UploadRequest) -> BridgeResult<UploadResult> {
        self.bump("upload");
        if self.taken.lock().unwrap().contains(&request.public_id) {
            return Err(BridgeError::AlreadyExists(request.public_id));
        }
        Ok(self.store(&request.public_id, request.data))
    }

    async fn copy(&self, from_public_id: &str, to_public_id: &str) -> BridgeResult<UploadResult> {
        self.bump("copy");
        let data = self
            .resources
            .lock()
            .unwrap()
            .get(from_public_id)
            .map(|(_, d)| d.clone())
            .ok_or_else(|| BridgeError::OperationFailed("copy source missing".to_string()))?;
        Ok(self.store(to_public_id, data))
    }

    async fn context_update(
        &self,
        _public_id: &str,
        _context: HashMap<String, String>,
    ) -> BridgeResult<()> {
        self.bump("context_update");
        Ok(())
    }

    async fn explicit_transform(
        &self,
        public_id: &str,
        _transformation: &str,
    ) -> BridgeResult<TransformResult> {
        self.bump("explicit_transform");
        Ok(TransformResult {
            url: format!("https://cdn.test/t/{}", public_id),
            bytes: 512,
        })
    }

    async fn destroy(&self, public_id: &str, _invalidate: bool) -> BridgeResult<()> {
        self.bump("destroy");
        self.resources.lock().unwrap().remove(public_id);
        Ok(())
    }

    async fn resource(&self, public_id: &str) -> BridgeResult<Option<RemoteResource>> {
        self.bump("resource");
        Ok(self
            .resources
            .lock()
            .unwrap()
            .get(public_id)
            .map(|(r, _)| r.clone()))
    }

    async fn fetch(&self, public_id: &str, transformation: Option<&str>) -> BridgeResult<Bytes> {
        self.bump("fetch");
        if transformation.is_some() {
            return Ok(Bytes::from_static(b"low-rendition-bytes"));
        }
        Ok(self
            .resources
            .lock()
            .unwrap()
            .get(public_id)
            .map(|(_, d)| d.clone())
            .unwrap_or_else(|| Bytes::from_static(b"remote-bytes")))
    }

    async fn probe(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }
}

/// Dispatcher that records requests instead of executing them
struct CapturingDispatcher {
    requests: Mutex<Vec<DispatchRequest>>,
}

impl CapturingDispatcher {
    fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
        }
    }

    fn take(&self) -> Vec<DispatchRequest> {
        std::mem::take(&mut self.requests.lock().unwrap())
    }
}

#[async_trait]
impl BackgroundDispatcher for CapturingDispatcher {
    async fn dispatch(&self, request: DispatchRequest) -> BridgeResult<()> {
        self.requests.lock().unwrap().push(request);
        Ok(())
    }
}

/// Scheduler that records registrations without firing anything
struct RecordingScheduler {
    registered: Mutex<Vec<String>>,
}

impl RecordingScheduler {
    fn new() -> Self {
        Self {
            registered: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Scheduler for RecordingScheduler {
    async fn schedule_repeating(
        &self,
        task_id: &str,
        _interval: std::time::Duration,
        _task: ScheduledTask,
    ) -> BridgeResult<()> {
        self.registered.lock().unwrap().push(task_id.to_string());
        Ok(())
    }

    async fn cancel(&self, _task_id: &str) -> BridgeResult<()> {
        Ok(())
    }
}

/// In-memory file store; tests manipulate it without touching disk
struct MemoryFiles {
    files: Mutex<HashMap<PathBuf, Bytes>>,
}

impl MemoryFiles {
    fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
        }
    }

    fn put(&self, path: &Path, data: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_path_buf(), Bytes::copy_from_slice(data));
    }

    fn remove(&self, path: &Path) {
        self.files.lock().unwrap().remove(path);
    }

    fn get(&self, path: &Path) -> Option<Bytes> {
        self.files.lock().unwrap().get(path).cloned()
    }
}

#[async_trait]
impl FileSystemAccess for MemoryFiles {
    async fn exists(&self, path: &Path) -> BridgeResult<bool> {
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn metadata(&self, path: &Path) -> BridgeResult<FileMetadata> {
        let files = self.files.lock().unwrap();
        let data = files
            .get(path)
            .ok_or_else(|| BridgeError::OperationFailed("file missing".to_string()))?;
        Ok(FileMetadata {
            size: data.len() as u64,
            modified_at: None,
            is_directory: false,
        })
    }

    async fn create_dir_all(&self, _path: &Path) -> BridgeResult<()> {
        Ok(())
    }

    async fn read_file(&self, path: &Path) -> BridgeResult<Bytes> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| BridgeError::OperationFailed("file missing".to_string()))
    }

    async fn write_file(&self, path: &Path, data: Bytes) -> BridgeResult<()> {
        self.files.lock().unwrap().insert(path.to_path_buf(), data);
        Ok(())
    }

    async fn delete_file(&self, path: &Path) -> BridgeResult<()> {
        self.files.lock().unwrap().remove(path);
        Ok(())
    }

    async fn list_directory(&self, _path: &Path) -> BridgeResult<Vec<PathBuf>> {
        Ok(Vec::new())
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    coordinator: Arc<OffloadCoordinator>,
    remote: Arc<FakeRemote>,
    catalog: Arc<MemoryCatalog>,
    files: Arc<MemoryFiles>,
    dispatcher: Arc<CapturingDispatcher>,
    clock: Arc<ManualClock>,
    #[allow(dead_code)]
    media_dir: TempDir,
}

impl Harness {
    async fn add_asset(&self, id: i64, file_name: &str, data: &[u8]) -> AssetRecord {
        let local_path = self.media_dir.path().join(file_name);
        self.files.put(&local_path, data);
        let record = AssetRecord {
            id,
            file_name: file_name.to_string(),
            local_path,
            kind: MediaKind::Image,
            byte_size: Some(data.len() as u64),
            edit_revision: 0,
            trashed: false,
        };
        self.catalog.put(record.clone()).await;
        record
    }

    fn ctx(&self) -> &Arc<SyncContext> {
        self.coordinator.context()
    }

    async fn state(&self, id: i64) -> SyncState {
        self.ctx()
            .states
            .get(AssetId::new(id))
            .await
            .unwrap()
            .expect("state row exists")
    }
}

async fn harness_with(
    mutate_config: impl FnOnce(&mut SyncConfig),
    registry: Option<SyncRegistry>,
) -> Harness {
    let media_dir = tempfile::tempdir().unwrap();

    let mut config = SyncConfig {
        managed_root: media_dir.path().to_path_buf(),
        staleness_secs: 120,
        cloud_only_grace_secs: 3600,
        ..SyncConfig::default()
    };
    mutate_config(&mut config);

    let pool = SqlitePool::connect(":memory:").await.unwrap();
    let states = SqliteSyncStateRepository::new(pool.clone());
    states.initialize().await.unwrap();
    let queues = SqliteQueueRepository::new(pool);
    queues.initialize().await.unwrap();

    let remote = Arc::new(FakeRemote::new());
    let catalog = Arc::new(MemoryCatalog::new());
    let files = Arc::new(MemoryFiles::new());
    let dispatcher = Arc::new(CapturingDispatcher::new());
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));

    let ctx = Arc::new(
        SyncContext::builder()
            .remote(remote.clone())
            .files(files.clone())
            .catalog(catalog.clone())
            .dispatcher(dispatcher.clone())
            .scheduler(Arc::new(RecordingScheduler::new()))
            .clock(clock.clone())
            .states(Arc::new(states))
            .queues(Arc::new(queues))
            .config(config)
            .build()
            .unwrap(),
    );

    let coordinator = match registry {
        Some(registry) => Arc::new(OffloadCoordinator::with_registry(ctx, registry)),
        None => Arc::new(OffloadCoordinator::new(ctx)),
    };

    Harness {
        coordinator,
        remote,
        catalog,
        files,
        dispatcher,
        clock,
        media_dir,
    }
}

async fn harness() -> Harness {
    harness_with(|_| {}, None).await
}

// ============================================================================
// Queue tagging and claiming
// ============================================================================

#[tokio::test]
async fn test_add_to_queue_single_owner_and_counts() {
    let h = harness().await;
    for id in 1..=5 {
        h.add_asset(id, &format!("photo-{}.jpg", id), b"jpeg").await;
    }
    let ids: Vec<AssetId> = (1..=5).map(AssetId::new).collect();

    let counts = h
        .coordinator
        .add_to_queue(&ids, QueueKind::Bulk)
        .await
        .unwrap();

    // Per-thread counts sum to N
    assert_eq!(counts.values().sum::<u64>(), 5);

    // Each id is tagged to exactly one thread
    let mut owners: HashMap<String, u64> = HashMap::new();
    for id in 1..=5 {
        let state = h.state(id).await;
        let owner = state.queued_thread.expect("asset is tagged");
        *owners.entry(owner).or_insert(0) += 1;
    }
    let nonzero: HashMap<String, u64> =
        counts.into_iter().filter(|(_, c)| *c > 0).collect();
    assert_eq!(owners, nonzero);

    // Re-adding moves ownership instead of duplicating it
    let counts = h
        .coordinator
        .add_to_queue(&[AssetId::new(1)], QueueKind::Auto)
        .await
        .unwrap();
    assert_eq!(counts.values().sum::<u64>(), 1);
    let state = h.state(1).await;
    assert_eq!(state.queued_thread.as_deref(), Some("queue_auto_thread_0"));
}

#[tokio::test]
async fn test_claim_requires_running_and_pops_once() {
    let h = harness().await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    h.coordinator
        .add_to_queue(&[AssetId::new(1)], QueueKind::Bulk)
        .await
        .unwrap();

    let thread = "queue_bulk_thread_0";
    let manager = h.coordinator.manager();

    // Queue not running: no claims
    assert!(manager
        .claim_next(QueueKind::Bulk, thread)
        .await
        .unwrap()
        .is_none());

    h.coordinator.start_queue(QueueKind::Bulk).await.unwrap();

    // First claim returns the asset and zeroes the cached next
    let claimed = manager.claim_next(QueueKind::Bulk, thread).await.unwrap();
    assert_eq!(claimed, Some(AssetId::new(1)));
    let cursor = h.ctx().queues.get_cursor(thread).await.unwrap().unwrap();
    assert!(cursor.next.is_none());
    assert_eq!(cursor.ping, h.clock.unix_timestamp());

    // Processing releases the tag; the next claim comes up empty
    h.coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    assert!(manager
        .claim_next(QueueKind::Bulk, thread)
        .await
        .unwrap()
        .is_none());
}

// ============================================================================
// Signature-gated idempotence
// ============================================================================

#[tokio::test]
async fn test_upload_pass_is_idempotent() {
    let h = harness().await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    let first = h
        .coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    let outcomes = &first[&AssetId::new(1)];
    assert!(matches!(
        outcomes.get("upload"),
        Some(SyncOutcome::Synced { .. })
    ));

    let state_after_first = h.state(1).await;
    assert_eq!(state_after_first.public_id.as_deref(), Some("media/sunset"));
    let calls_after_first = h.remote.total_calls();

    // Second pass with no external change: identical signatures, zero
    // remote calls, zero types run.
    let second = h
        .coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    assert!(second[&AssetId::new(1)].is_empty());

    let state_after_second = h.state(1).await;
    assert_eq!(state_after_second.signatures, state_after_first.signatures);
    assert_eq!(h.remote.total_calls(), calls_after_first);
}

#[tokio::test]
async fn test_upload_signature_prevents_rerun() {
    let h = harness().await;
    let record = h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    h.coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();

    let mut state = h.state(1).await;
    let engine = h.coordinator.engine();

    // Stored signature equals the freshly generated one
    assert!(!engine
        .needs_sync(h.ctx(), &record, &state, "upload")
        .await
        .unwrap());

    // And the next outstanding type is never "upload" again
    let next = engine
        .next_sync_type(h.ctx(), &record, &mut state)
        .await
        .unwrap();
    assert_ne!(next, Some("upload"));
}

// ============================================================================
// Priority ordering and pass termination
// ============================================================================

struct StubOp {
    slug: &'static str,
    priority: u32,
    /// When false, sync returns Skipped and never stamps its signature
    stamps: bool,
}

#[async_trait]
impl SyncOperation for StubOp {
    fn slug(&self) -> &'static str {
        self.slug
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    async fn generate_signature(
        &self,
        _ctx: &SyncContext,
        _record: &AssetRecord,
        _state: &SyncState,
    ) -> offload_sync::Result<String> {
        Ok(format!("{}-signature", self.slug))
    }

    async fn validate(
        &self,
        _ctx: &SyncContext,
        _record: &AssetRecord,
        _state: &SyncState,
    ) -> offload_sync::Result<bool> {
        Ok(true)
    }

    async fn sync(
        &self,
        _ctx: &SyncContext,
        _record: &AssetRecord,
        _state: &mut SyncState,
    ) -> offload_sync::Result<SyncOutcome> {
        if self.stamps {
            Ok(SyncOutcome::Synced {
                signature: format!("{}-signature", self.slug),
            })
        } else {
            Ok(SyncOutcome::Skipped)
        }
    }
}

#[tokio::test]
async fn test_priority_ordering_lowest_outstanding_first() {
    let mut registry = SyncRegistry::new();
    for (slug, priority) in [("p15", 15u32), ("p5", 5), ("p16", 16)] {
        registry
            .register(Arc::new(StubOp {
                slug,
                priority,
                stamps: true,
            }))
            .unwrap();
    }
    let h = harness_with(|_| {}, Some(registry)).await;
    let record = h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    let engine = h.coordinator.engine();
    let mut state = SyncState::new(AssetId::new(1), 0);

    // All outstanding: lowest priority first
    assert_eq!(
        engine
            .next_sync_type(h.ctx(), &record, &mut state)
            .await
            .unwrap(),
        Some("p5")
    );

    // Stamp p5; p15 is next, never p16 before it
    state.set_signature("p5", "p5-signature".to_string());
    assert_eq!(
        engine
            .next_sync_type(h.ctx(), &record, &mut state)
            .await
            .unwrap(),
        Some("p15")
    );

    state.set_signature("p15", "p15-signature".to_string());
    assert_eq!(
        engine
            .next_sync_type(h.ctx(), &record, &mut state)
            .await
            .unwrap(),
        Some("p16")
    );
}

#[tokio::test]
async fn test_pass_halts_when_signature_never_advances() {
    let mut registry = SyncRegistry::new();
    registry
        .register(Arc::new(StubOp {
            slug: "stubborn",
            priority: 10,
            stamps: false,
        }))
        .unwrap();
    let h = harness_with(|_| {}, Some(registry)).await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    // A handler that never updates its signature runs exactly once per
    // pass instead of retrying forever.
    let outcomes = h
        .coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    let map = &outcomes[&AssetId::new(1)];
    assert_eq!(map.len(), 1);
    assert_eq!(map.get("stubborn"), Some(&SyncOutcome::Skipped));
}

// ============================================================================
// Storage transitions
// ============================================================================

#[tokio::test]
async fn test_cloud_only_waits_for_grace_delay() {
    let h = harness().await;
    let record = h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    h.coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    h.coordinator
        .request_storage_mode(AssetId::new(1), StorageMode::CloudOnly)
        .await
        .unwrap();

    // Before the grace delay: validate vetoes, local bytes survive
    h.coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    assert!(h.files.get(&record.local_path).is_some());
    let state = h.state(1).await;
    assert!(state.sync_error.is_none());

    // After the grace delay the local file is removed
    h.clock.advance_secs(3601);
    let outcomes = h
        .coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    assert!(matches!(
        outcomes[&AssetId::new(1)].get("storage"),
        Some(SyncOutcome::Synced { .. })
    ));
    assert!(h.files.get(&record.local_path).is_none());
    let state = h.state(1).await;
    assert!(state.local_size.is_none());
}

#[tokio::test]
async fn test_dual_low_stores_reduced_rendition() {
    let h = harness().await;
    let record = h.add_asset(1, "sunset.jpg", b"jpeg-bytes-full-resolution").await;

    h.coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    h.coordinator
        .request_storage_mode(AssetId::new(1), StorageMode::DualLow)
        .await
        .unwrap();

    h.coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();

    assert_eq!(h.remote.count("explicit_transform"), 1);
    assert_eq!(
        h.files.get(&record.local_path).unwrap(),
        Bytes::from_static(b"low-rendition-bytes")
    );
    let state = h.state(1).await;
    assert_eq!(state.local_size, Some("low-rendition-bytes".len() as i64));
}

#[tokio::test]
async fn test_dual_full_restores_missing_local_file() {
    let h = harness().await;
    let record = h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    h.coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();

    // Local file disappears; mode stays dual_full
    h.files.remove(&record.local_path);
    h.coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();

    assert_eq!(
        h.files.get(&record.local_path).unwrap(),
        Bytes::from_static(b"jpeg-bytes")
    );
    let state = h.state(1).await;
    assert!(state.folder_synced);
}

// ============================================================================
// Upload collision retry
// ============================================================================

#[tokio::test]
async fn test_already_exists_retries_once_with_suffix() {
    let h = harness().await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;
    h.remote.mark_taken("media/sunset");

    let outcomes = h
        .coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    assert!(matches!(
        outcomes[&AssetId::new(1)].get("upload"),
        Some(SyncOutcome::Synced { .. })
    ));

    // Exactly one retry
    assert_eq!(h.remote.count("upload"), 2);

    // The persisted public id carries the uniquifying suffix
    let state = h.state(1).await;
    let public_id = state.public_id.unwrap();
    assert!(public_id.starts_with("media/sunset-"));
    let suffix = public_id.strip_prefix("media/sunset-").unwrap();
    assert_eq!(suffix.len(), 6);
}

// ============================================================================
// Worker dispatcher
// ============================================================================

#[tokio::test]
async fn test_run_thread_drains_and_rebuilds() {
    let h = harness().await;
    for id in 1..=4 {
        h.add_asset(id, &format!("photo-{}.jpg", id), b"jpeg").await;
    }

    h.coordinator.start_queue(QueueKind::Bulk).await.unwrap();
    let snapshot = h.coordinator.get_queue(QueueKind::Bulk).await.unwrap();
    assert_eq!(snapshot.total, 4);
    assert!(snapshot.running);

    let mut rebuilt = false;
    for thread in h.coordinator.manager().thread_names(QueueKind::Bulk) {
        let summary = h
            .coordinator
            .run_thread(QueueKind::Bulk, &thread)
            .await
            .unwrap();
        rebuilt |= summary.rebuilt;
    }

    // Everything synced and untagged; the drained queue was rebuilt
    assert!(rebuilt);
    for id in 1..=4 {
        let state = h.state(id).await;
        assert!(state.is_synced());
        assert!(state.queued_thread.is_none());
    }

    // The rebuild found nothing outstanding
    let snapshot = h.coordinator.get_queue(QueueKind::Bulk).await.unwrap();
    assert_eq!(snapshot.total, 0);
    assert!(snapshot.running);
}

#[tokio::test]
async fn test_loop_guard_force_clears_repeated_claim() {
    struct BrokenOp;

    #[async_trait]
    impl SyncOperation for BrokenOp {
        fn slug(&self) -> &'static str {
            "broken"
        }

        fn priority(&self) -> u32 {
            10
        }

        async fn generate_signature(
            &self,
            _ctx: &SyncContext,
            _record: &AssetRecord,
            _state: &SyncState,
        ) -> offload_sync::Result<String> {
            Ok("broken-signature".to_string())
        }

        async fn validate(
            &self,
            _ctx: &SyncContext,
            _record: &AssetRecord,
            _state: &SyncState,
        ) -> offload_sync::Result<bool> {
            Ok(true)
        }

        async fn sync(
            &self,
            _ctx: &SyncContext,
            _record: &AssetRecord,
            _state: &mut SyncState,
        ) -> offload_sync::Result<SyncOutcome> {
            Err(offload_sync::SyncError::Database("backend offline".to_string()))
        }
    }

    let mut registry = SyncRegistry::new();
    registry.register(Arc::new(BrokenOp)).unwrap();
    let h = harness_with(|_| {}, Some(registry)).await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    h.coordinator
        .add_to_queue(&[AssetId::new(1)], QueueKind::Bulk)
        .await
        .unwrap();
    h.coordinator.start_queue(QueueKind::Bulk).await.unwrap();

    let summary = h
        .coordinator
        .run_thread(QueueKind::Bulk, "queue_bulk_thread_0")
        .await
        .unwrap();

    // First claim fails without releasing the tag, second claim repeats
    // the id and trips the guard.
    assert_eq!(summary.claims, 2);
    assert_eq!(summary.processed, 0);

    let state = h.state(1).await;
    assert_eq!(state.sync_error.as_deref(), Some(SYNC_LOOP_ERROR));
    assert!(state.queued_thread.is_none());
}

// ============================================================================
// Stall detection and health monitor
// ============================================================================

#[tokio::test]
async fn test_stalled_thread_detection_after_window() {
    let h = harness().await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;
    h.coordinator
        .add_to_queue(&[AssetId::new(1)], QueueKind::Bulk)
        .await
        .unwrap();
    h.coordinator.start_queue(QueueKind::Bulk).await.unwrap();

    let manager = h.coordinator.manager();
    manager
        .claim_next(QueueKind::Bulk, "queue_bulk_thread_0")
        .await
        .unwrap();

    let states = manager.thread_states(QueueKind::Bulk).await.unwrap();
    let (_, state) = states
        .iter()
        .find(|(c, _)| c.thread == "queue_bulk_thread_0")
        .unwrap();
    assert_eq!(*state, ThreadState::Active);

    // Past the staleness window the same thread reads as stalled
    h.clock.advance_secs(121);
    let states = manager.thread_states(QueueKind::Bulk).await.unwrap();
    let (_, state) = states
        .iter()
        .find(|(c, _)| c.thread == "queue_bulk_thread_0")
        .unwrap();
    assert_eq!(*state, ThreadState::Stalled);
}

#[tokio::test]
async fn test_monitor_pokes_only_stalled_threads() {
    let h = harness_with(|c| c.bulk_threads = 2, None).await;
    let now = h.clock.unix_timestamp();

    // One live thread, one stalled, both with pending work
    h.ctx()
        .queues
        .put_cursor(&ThreadCursor {
            thread: "queue_bulk_thread_0".to_string(),
            next: None,
            ping: now,
            pending: 2,
        })
        .await
        .unwrap();
    h.ctx()
        .queues
        .put_cursor(&ThreadCursor {
            thread: "queue_bulk_thread_1".to_string(),
            next: None,
            ping: now - 300,
            pending: 2,
        })
        .await
        .unwrap();
    h.ctx()
        .queues
        .set_running(QueueKind::Bulk, true)
        .await
        .unwrap();
    h.dispatcher.take();

    h.coordinator.monitor().check().await;

    let requests = h.dispatcher.take();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        DispatchRequest::run_thread("bulk", "queue_bulk_thread_1")
    );
}

#[tokio::test]
async fn test_monitor_rebuilds_when_all_threads_stalled() {
    let h = harness_with(|c| c.bulk_threads = 2, None).await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;
    let now = h.clock.unix_timestamp();

    for thread in ["queue_bulk_thread_0", "queue_bulk_thread_1"] {
        h.ctx()
            .queues
            .put_cursor(&ThreadCursor {
                thread: thread.to_string(),
                next: None,
                ping: now - 300,
                pending: 1,
            })
            .await
            .unwrap();
    }
    h.ctx()
        .queues
        .set_running(QueueKind::Bulk, true)
        .await
        .unwrap();
    h.dispatcher.take();

    h.coordinator.monitor().check().await;

    // Stop + rebuild + restart: the rebuilt queue is running and its
    // freshly seeded (never-claimed) lane got poked back into action.
    assert!(h.coordinator.is_running(QueueKind::Bulk).await.unwrap());
    let snapshot = h.coordinator.get_queue(QueueKind::Bulk).await.unwrap();
    assert_eq!(snapshot.total, 1);

    let requests = h.dispatcher.take();
    assert!(requests
        .iter()
        .any(|r| r.operation == "run_thread" && r.queue.as_deref() == Some("bulk")));
}

#[tokio::test]
async fn test_monitor_defers_heal_while_remote_unreachable() {
    let media_dir = tempfile::tempdir().unwrap();
    let pool = SqlitePool::connect(":memory:").await.unwrap();
    let states = SqliteSyncStateRepository::new(pool.clone());
    states.initialize().await.unwrap();
    let queues = SqliteQueueRepository::new(pool);
    queues.initialize().await.unwrap();

    let remote = FakeRemote::new();
    remote.set_reachable(false);

    let dispatcher = Arc::new(CapturingDispatcher::new());
    let clock = Arc::new(ManualClock::at_timestamp(1_700_000_000));
    let now = clock.unix_timestamp();

    let ctx = Arc::new(
        SyncContext::builder()
            .remote(Arc::new(remote))
            .files(Arc::new(MemoryFiles::new()))
            .catalog(Arc::new(MemoryCatalog::new()))
            .dispatcher(dispatcher.clone())
            .scheduler(Arc::new(RecordingScheduler::new()))
            .clock(clock)
            .states(Arc::new(states))
            .queues(Arc::new(queues))
            .config(SyncConfig {
                managed_root: media_dir.path().to_path_buf(),
                ..SyncConfig::default()
            })
            .build()
            .unwrap(),
    );
    let coordinator = Arc::new(OffloadCoordinator::new(ctx.clone()));

    ctx.queues
        .put_cursor(&ThreadCursor {
            thread: "queue_bulk_thread_0".to_string(),
            next: None,
            ping: now - 300,
            pending: 1,
        })
        .await
        .unwrap();
    ctx.queues.set_running(QueueKind::Bulk, true).await.unwrap();

    coordinator.monitor().check().await;

    // Unreachable remote: nothing is poked, nothing is rebuilt
    assert!(dispatcher.take().is_empty());
    assert!(ctx.queues.is_running(QueueKind::Bulk).await.unwrap());
}

// ============================================================================
// Rollback and deletion
// ============================================================================

#[tokio::test]
async fn test_unsync_restores_local_file_and_resyncs_from_scratch() {
    let h = harness().await;
    let record = h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    h.coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    let original = h.state(1).await;
    let original_version = original.version;

    // Local bytes gone, rollback requested
    h.files.remove(&record.local_path);
    h.coordinator.request_unsync(AssetId::new(1)).await.unwrap();

    let outcomes = h
        .coordinator
        .process_assets(&[AssetId::new(1)])
        .await
        .unwrap();
    let map = &outcomes[&AssetId::new(1)];
    assert!(matches!(map.get("unsync"), Some(SyncOutcome::Synced { .. })));

    // The canonical bytes came back before the rollback cleared state
    assert_eq!(
        h.files.get(&record.local_path).unwrap(),
        Bytes::from_static(b"jpeg-bytes")
    );

    // Rollback cleared everything, then the same pass resynced from
    // scratch: fresh upload, bumped remote version.
    assert!(matches!(map.get("upload"), Some(SyncOutcome::Synced { .. })));
    let state = h.state(1).await;
    assert!(!state.unsync_requested);
    assert_eq!(state.public_id.as_deref(), Some("media/sunset"));
    assert!(state.version > original_version);
}

#[tokio::test]
async fn test_delete_skips_destroy_when_public_id_shared() {
    let h = harness().await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;
    h.add_asset(2, "copy.jpg", b"jpeg-bytes").await;

    // Two assets sharing one remote resource
    let now = h.ctx().now();
    for id in [1, 2] {
        let mut state = SyncState::new(AssetId::new(id), now);
        state.set_remote(
            "media/shared".to_string(),
            1,
            offload_sync::DeliveryType::Upload,
        );
        h.ctx().states.upsert(&state).await.unwrap();
    }
    h.catalog.trash(1).await;

    h.coordinator.delete_asset(AssetId::new(1)).await.unwrap();
    assert_eq!(h.remote.count("destroy"), 0);
    assert!(h.ctx().states.get(AssetId::new(1)).await.unwrap().is_none());

    // Last owner standing triggers the remote destroy + invalidate
    h.catalog.trash(2).await;
    h.coordinator.delete_asset(AssetId::new(2)).await.unwrap();
    assert_eq!(h.remote.count("destroy"), 1);
}

#[tokio::test]
async fn test_delete_blocked_while_sync_in_flight() {
    let h = harness().await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    h.coordinator
        .add_to_queue(&[AssetId::new(1)], QueueKind::Bulk)
        .await
        .unwrap();
    h.catalog.trash(1).await;

    let result = h.coordinator.delete_asset(AssetId::new(1)).await;
    assert!(matches!(
        result,
        Err(offload_sync::SyncError::DeletePending { .. })
    ));

    // A recorded error lifts the block so the asset is never locked out
    let mut state = h.state(1).await;
    state.record_error("upload failed previously");
    h.ctx().states.upsert(&state).await.unwrap();

    h.coordinator.delete_asset(AssetId::new(1)).await.unwrap();
    assert!(h.ctx().states.get(AssetId::new(1)).await.unwrap().is_none());
}

// ============================================================================
// Error lifecycle and reporting
// ============================================================================

#[tokio::test]
async fn test_errored_assets_excluded_until_cleared() {
    let h = harness().await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    let now = h.ctx().now();
    let mut state = SyncState::new(AssetId::new(1), now);
    state.record_error("remote exploded");
    h.ctx().states.upsert(&state).await.unwrap();

    // The builder skips errored assets entirely
    let built = h.coordinator.builder().build(QueueKind::Bulk).await.unwrap();
    assert_eq!(built.total, 0);

    // Explicit clear re-enables dispatch
    h.coordinator.clear_error(AssetId::new(1)).await.unwrap();
    let built = h.coordinator.builder().build(QueueKind::Bulk).await.unwrap();
    assert_eq!(built.total, 1);
}

#[tokio::test]
async fn test_bypass_stamps_signature_without_remote_calls() {
    let h = harness().await;
    let record = h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;

    h.coordinator.bypass(AssetId::new(1), "upload").await.unwrap();
    assert_eq!(h.remote.count("upload"), 0);

    let state = h.state(1).await;
    assert!(state.signature("upload").is_some());
    assert!(!h
        .coordinator
        .engine()
        .needs_sync(h.ctx(), &record, &state, "upload")
        .await
        .unwrap());
}

#[tokio::test]
async fn test_size_totals_reporting() {
    let h = harness().await;
    h.add_asset(1, "sunset.jpg", b"jpeg-bytes").await;
    h.add_asset(2, "beach.jpg", b"more-jpeg-bytes").await;

    h.coordinator
        .process_assets(&[AssetId::new(1), AssetId::new(2)])
        .await
        .unwrap();

    let totals = h.coordinator.size_totals().await.unwrap();
    assert_eq!(
        totals.local_bytes,
        (b"jpeg-bytes".len() + b"more-jpeg-bytes".len()) as i64
    );
    assert_eq!(totals.remote_bytes, totals.local_bytes);
}
