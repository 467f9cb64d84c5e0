//! Size sync type
//!
//! Non-required bookkeeping: records local-vs-remote byte sizes for
//! reporting. A "restricted file type" remote response is recorded as a
//! fatal, non-retried error.

use crate::asset::{SyncOutcome, SyncState};
use crate::context::SyncContext;
use crate::error::Result;
use crate::registry::SyncOperation;
use crate::signature::fingerprint;
use async_trait::async_trait;
use offload_bridge::catalog::AssetRecord;
use offload_bridge::fs::FileSystemAccess;
use offload_bridge::remote::RemoteMediaStore;

pub struct SizeSync;

#[async_trait]
impl SyncOperation for SizeSync {
    fn slug(&self) -> &'static str {
        "size"
    }

    fn priority(&self) -> u32 {
        40
    }

    fn required(&self) -> bool {
        false
    }

    async fn generate_signature(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
    ) -> Result<String> {
        let local = ctx.files.file_size(&record.local_path).await?;
        Ok(fingerprint(&format!(
            "size|{}|{}",
            local.unwrap_or(0),
            state.version.unwrap_or(0)
        )))
    }

    async fn validate(
        &self,
        _ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
    ) -> Result<bool> {
        Ok(state.is_synced() && !state.unsync_requested && !record.trashed)
    }

    async fn sync(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
    ) -> Result<SyncOutcome> {
        let public_id = state.public_id.clone().unwrap_or_default();

        let resource = match ctx.remote.resource(&public_id).await {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                let error = format!("remote resource missing: {}", public_id);
                state.record_error(error.clone());
                return Ok(SyncOutcome::Failed { error });
            }
            Err(e) => {
                let error = e.to_string();
                state.record_error(error.clone());
                return Ok(SyncOutcome::Failed { error });
            }
        };

        state.remote_size = Some(resource.bytes as i64);
        state.local_size = ctx
            .files
            .file_size(&record.local_path)
            .await?
            .map(|s| s as i64);
        state.clear_error();

        let signature = self.generate_signature(ctx, record, state).await?;
        Ok(SyncOutcome::Synced { signature })
    }
}
