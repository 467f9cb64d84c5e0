//! Upload sync type
//!
//! Pushes an asset's canonical bytes to the remote store. Distinguishes
//! three contexts: a new upload, a rename of an already-uploaded asset
//! (server-side copy), and an edited derivative (context refresh). A
//! "public id already exists" response is retried exactly once with a
//! uniquifying suffix.

use crate::asset::{DeliveryType, SyncOutcome, SyncState};
use crate::context::SyncContext;
use crate::error::Result;
use crate::handlers::{content_type_for, context_map, desired_public_id, unique_suffix};
use crate::registry::SyncOperation;
use crate::signature::fingerprint;
use async_trait::async_trait;
use offload_bridge::catalog::AssetRecord;
use offload_bridge::fs::FileSystemAccess;
use offload_bridge::remote::{RemoteMediaStore, UploadRequest};
use offload_bridge::BridgeError;
use tracing::{info, warn};

pub struct UploadSync;

impl UploadSync {
    /// Rename detection: the stored public id no longer matches what the
    /// record would produce. A suffixed id from a previous collision retry
    /// is not a rename.
    fn is_rename(current: &str, desired: &str) -> bool {
        current != desired && !current.starts_with(&format!("{}-", desired))
    }

    async fn create(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
        desired: String,
    ) -> Result<Option<String>> {
        let data = match ctx.files.read_file(&record.local_path).await {
            Ok(data) => data,
            Err(_) => {
                let message =
                    format!("local file missing: {}", record.local_path.display());
                state.record_error(message.clone());
                return Ok(Some(message));
            }
        };

        let request = UploadRequest {
            public_id: desired.clone(),
            data: data.clone(),
            content_type: content_type_for(record).to_string(),
            context: context_map(record),
        };

        let result = match ctx.remote.upload(request.clone()).await {
            Ok(result) => result,
            Err(BridgeError::AlreadyExists(_)) => {
                // Taken remotely: retry exactly once with a random suffix.
                let suffixed = format!("{}-{}", desired, unique_suffix());
                warn!(
                    asset_id = %record.id,
                    public_id = %desired,
                    retry_public_id = %suffixed,
                    "Public id taken, retrying with suffix"
                );
                match ctx
                    .remote
                    .upload(UploadRequest {
                        public_id: suffixed,
                        ..request
                    })
                    .await
                {
                    Ok(result) => result,
                    Err(e) => {
                        let message = e.to_string();
                        state.record_error(message.clone());
                        return Ok(Some(message));
                    }
                }
            }
            Err(e) => {
                let message = e.to_string();
                state.record_error(message.clone());
                return Ok(Some(message));
            }
        };

        info!(
            asset_id = %record.id,
            public_id = %result.public_id,
            version = result.version,
            "Uploaded asset"
        );

        let delivery = result
            .delivery_type
            .parse::<DeliveryType>()
            .unwrap_or_default();
        state.set_remote(result.public_id, result.version, delivery);
        state.remote_size = Some(result.bytes as i64);
        state.local_size = Some(data.len() as i64);
        state.folder_synced = true;
        Ok(None)
    }

    async fn rename(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
        current: &str,
        desired: &str,
    ) -> Result<Option<String>> {
        match ctx.remote.copy(current, desired).await {
            Ok(result) => {
                info!(
                    asset_id = %record.id,
                    from = %current,
                    to = %result.public_id,
                    "Renamed remote asset"
                );
                let delivery = result
                    .delivery_type
                    .parse::<DeliveryType>()
                    .unwrap_or_default();
                state.set_remote(result.public_id, result.version, delivery);
                Ok(None)
            }
            Err(e) => {
                let message = e.to_string();
                state.record_error(message.clone());
                Ok(Some(message))
            }
        }
    }

    async fn refresh_context(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
        current: &str,
    ) -> Result<Option<String>> {
        match ctx.remote.context_update(current, context_map(record)).await {
            Ok(()) => Ok(None),
            Err(e) => {
                let message = e.to_string();
                state.record_error(message.clone());
                Ok(Some(message))
            }
        }
    }
}

#[async_trait]
impl SyncOperation for UploadSync {
    fn slug(&self) -> &'static str {
        "upload"
    }

    fn priority(&self) -> u32 {
        10
    }

    async fn generate_signature(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        _state: &SyncState,
    ) -> Result<String> {
        Ok(fingerprint(&format!(
            "upload|{}|{}|{}",
            desired_public_id(&ctx.config, record),
            record.edit_revision,
            record.byte_size.unwrap_or(0)
        )))
    }

    async fn validate(
        &self,
        _ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
    ) -> Result<bool> {
        Ok(!state.downloading && !state.unsync_requested && !record.trashed)
    }

    async fn sync(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
    ) -> Result<SyncOutcome> {
        let desired = desired_public_id(&ctx.config, record);

        let failure = match state.public_id.clone() {
            None => self.create(ctx, record, state, desired).await?,
            Some(current) if Self::is_rename(&current, &desired) => {
                self.rename(ctx, record, state, &current, &desired).await?
            }
            Some(current) => {
                // Same id, new signature: the host edited the asset or its
                // metadata. Refresh the remote context.
                self.refresh_context(ctx, record, state, &current).await?
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
