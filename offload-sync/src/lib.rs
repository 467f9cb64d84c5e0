//! # Media Offload Sync Engine
//!
//! Keeps local media storage and a remote object/CDN store eventually
//! consistent.
//!
//! ## Overview
//!
//! The engine is a signature-driven, multi-worker job queue. It decides
//! what needs syncing by fingerprinting each (asset, sync type) pair,
//! distributes pending work across persisted thread lanes, and processes it
//! in bounded background passes that tolerate crashes, stale claims, and
//! partial failure without losing or double-committing work.
//!
//! ## Components
//!
//! - **Signature Engine** (`signature`): per-(asset, sync type)
//!   fingerprints deciding if work is needed
//! - **Sync Type Registry** (`registry`): ordered set of pluggable sync
//!   operations
//! - **Thread/Queue Manager** (`queue`): persisted per-thread cursors,
//!   claim protocol, stall detection
//! - **Queue Builder** (`builder`): catalog scan and distribution across
//!   thread lanes
//! - **Worker Dispatcher** (`dispatcher`): bounded per-invocation claim
//!   and process loop
//! - **Remote Execution Handlers** (`handlers`): upload, storage offload,
//!   download, size, delete, unsync
//! - **Health Monitor** (`monitor`): periodic restart of stalled threads,
//!   full rebuild of dead queues
//! - **Coordinator** (`coordinator`): the public surface wiring it all
//!   over one explicit [`SyncContext`]
//!
//! ## Concurrency model
//!
//! Workers share no memory; every coordination primitive is persisted,
//! re-derivable state. The id claim is read-then-clear and not atomic
//! across processes: duplicate claims are accepted and made harmless by
//! signature-gated idempotent handlers.

pub mod asset;
pub mod builder;
pub mod context;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod monitor;
pub mod queue;
pub mod registry;
pub mod repository;
pub mod signature;

pub use asset::{
    AssetId, DeliveryType, OutcomeMap, StorageMode, SyncOutcome, SyncState,
};
pub use builder::QueueBuilder;
pub use context::{SyncConfig, SyncContext, SyncContextBuilder};
pub use coordinator::{OffloadCoordinator, SizeTotals};
pub use dispatcher::{RunSummary, WorkerDispatcher, SYNC_LOOP_ERROR};
pub use error::{Result, SyncError};
pub use monitor::HealthMonitor;
pub use queue::{
    BulkQueueState, QueueKind, QueueManager, QueueSnapshot, ThreadCursor, ThreadState,
    ThreadStatus,
};
pub use registry::{SyncOperation, SyncRegistry};
pub use repository::{
    QueueRepository, SqliteQueueRepository, SqliteSyncStateRepository, SyncStateRepository,
};
pub use signature::SignatureEngine;
