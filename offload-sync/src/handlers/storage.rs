//! Storage offload sync type
//!
//! State machine over the three storage modes:
//! - `cloud_only` removes local files, but only after the configured grace
//!   delay since the mode was requested; until then `validate` vetoes the
//!   run (policy-not-due, a normal skip).
//! - `dual_low` fetches a reduced-quality remote rendition for local
//!   serving.
//! - `dual_full` re-downloads the canonical asset when the local file is
//!   missing.

use crate::asset::{StorageMode, SyncOutcome, SyncState};
use crate::context::SyncContext;
use crate::error::Result;
use crate::registry::SyncOperation;
use crate::signature::fingerprint;
use async_trait::async_trait;
use offload_bridge::catalog::AssetRecord;
use offload_bridge::fs::FileSystemAccess;
use offload_bridge::remote::RemoteMediaStore;
use tracing::{debug, info};

pub struct StorageSync;

impl StorageSync {
    /// Whether the cloud-only grace delay has elapsed
    fn cloud_only_due(ctx: &SyncContext, state: &SyncState) -> bool {
        state
            .mode_requested_at
            .map(|requested| ctx.now() >= requested + ctx.config.cloud_only_grace_secs)
            .unwrap_or(false)
    }

    async fn apply_cloud_only(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
    ) -> Result<Option<String>> {
        if ctx.files.exists(&record.local_path).await? {
            if let Err(e) = ctx.files.delete_file(&record.local_path).await {
                let message = format!("failed to remove local file: {}", e);
                state.record_error(message.clone());
                return Ok(Some(message));
            }
            info!(asset_id = %record.id, "Removed local file for cloud-only storage");
        }
        state.local_size = None;
        state.folder_synced = false;
        Ok(None)
    }

    async fn apply_dual_low(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
        public_id: &str,
    ) -> Result<Option<String>> {
        let transformation = ctx.config.low_rendition_transform.clone();

        if let Err(e) = ctx
            .remote
            .explicit_transform(public_id, &transformation)
            .await
        {
            // A restricted file type will never transform; record it as
            // fatal so the asset is not retried.
            let message = e.to_string();
            state.record_error(message.clone());
            return Ok(Some(message));
        }

        let data = match ctx.remote.fetch(public_id, Some(&transformation)).await {
            Ok(data) => data,
            Err(e) => {
                let message = format!("rendition download failed: {}", e);
                state.record_error(message.clone());
                return Ok(Some(message));
            }
        };

        let size = data.len() as i64;
        if let Err(e) = ctx.files.write_file(&record.local_path, data).await {
            let message = format!("failed to write local rendition: {}", e);
            state.record_error(message.clone());
            return Ok(Some(message));
        }

        info!(asset_id = %record.id, bytes = size, "Stored low rendition locally");
        state.local_size = Some(size);
        state.folder_synced = true;
        Ok(None)
    }

    async fn apply_dual_full(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
        public_id: &str,
    ) -> Result<Option<String>> {
        if ctx.files.exists(&record.local_path).await? {
            debug!(asset_id = %record.id, "Local file present, nothing to restore");
            return Ok(None);
        }

        let data = match ctx.remote.fetch(public_id, None).await {
            Ok(data) => data,
            Err(e) => {
                let message = format!("canonical download failed: {}", e);
                state.record_error(message.clone());
                return Ok(Some(message));
            }
        };

        let size = data.len() as i64;
        if let Err(e) = ctx.files.write_file(&record.local_path, data).await {
            let message = format!("failed to restore local file: {}", e);
            state.record_error(message.clone());
            return Ok(Some(message));
        }

        info!(asset_id = %record.id, bytes = size, "Restored canonical local file");
        state.local_size = Some(size);
        state.folder_synced = true;
        Ok(None)
    }
}

#[async_trait]
impl SyncOperation for StorageSync {
    fn slug(&self) -> &'static str {
        "storage"
    }

    fn priority(&self) -> u32 {
        20
    }

    async fn generate_signature(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
    ) -> Result<String> {
        let local_present = ctx.files.exists(&record.local_path).await?;
        // The due flag must be an input: a not-yet-due cloud_only skip
        // stamps the signature, and only the flag flipping makes the type
        // outstanding again once the grace delay elapses.
        let due = state.storage_mode != StorageMode::CloudOnly
            || Self::cloud_only_due(ctx, state);
        Ok(fingerprint(&format!(
            "storage|{}|{}|{}|{}",
            state.storage_mode,
            state.mode_requested_at.unwrap_or(0),
            local_present,
            due
        )))
    }

    async fn validate(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
    ) -> Result<bool> {
        if state.public_id.is_none() || state.unsync_requested || record.trashed {
            return Ok(false);
        }

        if state.storage_mode == StorageMode::CloudOnly {
            // Not yet due is a skip, not an error: local bytes survive
            // until the grace delay has elapsed.
            return Ok(Self::cloud_only_due(ctx, state));
        }

        Ok(true)
    }

    async fn sync(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
    ) -> Result<SyncOutcome> {
        let public_id = state
            .public_id
            .clone()
            .unwrap_or_default();

        let failure = match state.storage_mode {
            StorageMode::CloudOnly => self.apply_cloud_only(ctx, record, state).await?,
            StorageMode::DualLow => {
                self.apply_dual_low(ctx, record, state, &public_id).await?
            }
            StorageMode::DualFull => {
                self.apply_dual_full(ctx, record, state, &public_id).await?
            }
        };

        if let Some(error) = failure {
            return Ok(SyncOutcome::Failed { error });
        }

        state.clear_error();
        let signature = self.generate_signature(ctx, record, state).await?;
        Ok(SyncOutcome::Synced { signature })
    }
}
