//! # Sync Type Registry
//!
//! Ordered set of pluggable synchronization operations.
//!
//! ## Overview
//!
//! Each sync type is a [`SyncOperation`]: a slug, an ascending priority, a
//! signature generator over the inputs it cares about, a `validate` veto,
//! and the `sync` body itself. The registry holds them priority-sorted so a
//! per-asset pass always works lowest-priority-first.

use crate::asset::{SyncOutcome, SyncState};
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use async_trait::async_trait;
use offload_bridge::catalog::AssetRecord;
use std::sync::Arc;

/// A named, prioritized synchronization operation
///
/// Contract:
/// - `generate_signature` must be cheap and must not call the remote store;
///   it is evaluated on every scan of every candidate asset.
/// - `validate` returning `false` is a legitimate skip, not an error. The
///   engine advances the stored signature so the type is not reconsidered
///   until its inputs change.
/// - `sync` never propagates remote-call failures: it persists the error
///   marker on the state and returns [`SyncOutcome::Failed`]. `Err` is
///   reserved for infrastructure faults (database, serialization).
#[async_trait]
pub trait SyncOperation: Send + Sync {
    /// Stable identifier, also the signature map key
    fn slug(&self) -> &'static str;

    /// Ascending priority; lower runs earlier
    fn priority(&self) -> u32;

    /// Whether the overall sync of an asset is incomplete without this type
    fn required(&self) -> bool {
        true
    }

    /// Fingerprint of this type's current inputs for the asset
    async fn generate_signature(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
    ) -> Result<String>;

    /// Whether the type may run right now; `false` is a silent skip
    async fn validate(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
    ) -> Result<bool>;

    /// Execute the sync operation
    async fn sync(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
    ) -> Result<SyncOutcome>;
}

/// Priority-sorted collection of sync operations
pub struct SyncRegistry {
    ops: Vec<Arc<dyn SyncOperation>>,
}

impl SyncRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Build the standard registry: upload, storage, download, size,
    /// delete, unsync.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for op in crate::handlers::standard_operations() {
            registry
                .register(op)
                .expect("standard operations have unique slugs");
        }
        registry
    }

    /// Register an operation, keeping the set sorted by ascending priority
    ///
    /// # Errors
    ///
    /// Returns an error if an operation with the same slug is already
    /// registered.
    pub fn register(&mut self, op: Arc<dyn SyncOperation>) -> Result<()> {
        if self.ops.iter().any(|o| o.slug() == op.slug()) {
            return Err(SyncError::DuplicateSyncType(op.slug().to_string()));
        }
        self.ops.push(op);
        self.ops.sort_by_key(|o| o.priority());
        Ok(())
    }

    /// Look up an operation by slug
    pub fn get(&self, slug: &str) -> Result<Arc<dyn SyncOperation>> {
        self.ops
            .iter()
            .find(|o| o.slug() == slug)
            .cloned()
            .ok_or_else(|| SyncError::UnknownSyncType(slug.to_string()))
    }

    /// Iterate operations in ascending priority order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SyncOperation>> {
        self.ops.iter()
    }

    /// Registered slugs in priority order
    pub fn slugs(&self) -> Vec<&'static str> {
        self.ops.iter().map(|o| o.slug()).collect()
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

impl Default for SyncRegistry {
    fn default() -> Self {
        Self::new()
    }
}
