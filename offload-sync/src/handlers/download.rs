//! Download sync type
//!
//! Streams the canonical remote bytes back into local storage when a
//! download has been requested, then restores local size metadata and the
//! folder-in-sync flag.

use crate::asset::{SyncOutcome, SyncState};
use crate::context::SyncContext;
use crate::error::Result;
use crate::registry::SyncOperation;
use crate::signature::fingerprint;
use async_trait::async_trait;
use offload_bridge::catalog::AssetRecord;
use offload_bridge::fs::FileSystemAccess;
use offload_bridge::remote::RemoteMediaStore;
use tracing::info;

pub struct DownloadSync;

#[async_trait]
impl SyncOperation for DownloadSync {
    fn slug(&self) -> &'static str {
        "download"
    }

    fn priority(&self) -> u32 {
        30
    }

    async fn generate_signature(
        &self,
        _ctx: &SyncContext,
        _record: &AssetRecord,
        state: &SyncState,
    ) -> Result<String> {
        Ok(fingerprint(&format!(
            "download|{}|{}|{}",
            state.public_id.as_deref().unwrap_or("-"),
            state.version.unwrap_or(0),
            state.downloading
        )))
    }

    async fn validate(
        &self,
        _ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
    ) -> Result<bool> {
        Ok(state.downloading
            && state.public_id.is_some()
            && !state.unsync_requested
            && !record.trashed)
    }

    async fn sync(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
    ) -> Result<SyncOutcome> {
        let public_id = state.public_id.clone().unwrap_or_default();

        let data = match ctx.remote.fetch(&public_id, None).await {
            Ok(data) => data,
            Err(e) => {
                let error = format!("download failed: {}", e);
                state.record_error(error.clone());
                return Ok(SyncOutcome::Failed { error });
            }
        };

        let size = data.len() as i64;
        if let Err(e) = ctx.files.write_file(&record.local_path, data).await {
            let error = format!("failed to write downloaded file: {}", e);
            state.record_error(error.clone());
            return Ok(SyncOutcome::Failed { error });
        }

        info!(
            asset_id = %record.id,
            public_id = %public_id,
            bytes = size,
            "Downloaded asset to local storage"
        );

        state.local_size = Some(size);
        state.downloading = false;
        state.folder_synced = true;
        state.clear_error();

        let signature = self.generate_signature(ctx, record, state).await?;
        Ok(SyncOutcome::Synced { signature })
    }
}
