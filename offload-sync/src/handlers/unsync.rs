//! Unsync sync type
//!
//! Full rollback: re-downloads the canonical remote asset if the local
//! bytes are gone (cloud-only or missing file), then clears every tracked
//! field so the asset resyncs from scratch if it is ever queued again.

use crate::asset::{StorageMode, SyncOutcome, SyncState};
use crate::context::SyncContext;
use crate::error::Result;
use crate::registry::SyncOperation;
use crate::signature::fingerprint;
use async_trait::async_trait;
use offload_bridge::catalog::AssetRecord;
use offload_bridge::fs::FileSystemAccess;
use offload_bridge::remote::RemoteMediaStore;
use tracing::info;

pub struct UnsyncSync;

#[async_trait]
impl SyncOperation for UnsyncSync {
    fn slug(&self) -> &'static str {
        "unsync"
    }

    fn priority(&self) -> u32 {
        60
    }

    fn required(&self) -> bool {
        false
    }

    async fn generate_signature(
        &self,
        _ctx: &SyncContext,
        _record: &AssetRecord,
        state: &SyncState,
    ) -> Result<String> {
        Ok(fingerprint(&format!("unsync|{}", state.unsync_requested)))
    }

    async fn validate(
        &self,
        _ctx: &SyncContext,
        _record: &AssetRecord,
        state: &SyncState,
    ) -> Result<bool> {
        Ok(state.unsync_requested)
    }

    async fn sync(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
    ) -> Result<SyncOutcome> {
        if let Some(public_id) = state.public_id.clone() {
            let local_missing = !ctx.files.exists(&record.local_path).await?;

            if state.storage_mode == StorageMode::CloudOnly || local_missing {
                let data = match ctx.remote.fetch(&public_id, None).await {
                    Ok(data) => data,
                    Err(e) => {
                        let error = format!("rollback download failed: {}", e);
                        state.record_error(error.clone());
                        return Ok(SyncOutcome::Failed { error });
                    }
                };

                if let Err(e) = ctx.files.write_file(&record.local_path, data).await {
                    let error = format!("failed to restore local file: {}", e);
                    state.record_error(error.clone());
                    return Ok(SyncOutcome::Failed { error });
                }
            }
        }

        state.reset();
        info!(asset_id = %record.id, "Unsynced asset; state rolled back");

        let signature = self.generate_signature(ctx, record, state).await?;
        Ok(SyncOutcome::Synced { signature })
    }
}
