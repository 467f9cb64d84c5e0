//! Delete sync type
//!
//! Remote cleanup for trashed assets. The remote destroy (with CDN
//! invalidation) only fires when no sibling record shares the public id
//! and the asset lives under the managed root; otherwise only the local
//! sync state is cleared.

use crate::asset::{public_id_key, SyncOutcome, SyncState};
use crate::context::SyncContext;
use crate::error::Result;
use crate::registry::SyncOperation;
use crate::repository::SyncStateRepository;
use crate::signature::fingerprint;
use async_trait::async_trait;
use offload_bridge::catalog::AssetRecord;
use offload_bridge::remote::RemoteMediaStore;
use tracing::{debug, info};

pub struct DeleteSync;

#[async_trait]
impl SyncOperation for DeleteSync {
    fn slug(&self) -> &'static str {
        "delete"
    }

    fn priority(&self) -> u32 {
        50
    }

    async fn generate_signature(
        &self,
        _ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
    ) -> Result<String> {
        Ok(fingerprint(&format!(
            "delete|{}|{}",
            record.trashed,
            state.public_id.as_deref().unwrap_or("-")
        )))
    }

    async fn validate(
        &self,
        _ctx: &SyncContext,
        record: &AssetRecord,
        _state: &SyncState,
    ) -> Result<bool> {
        Ok(record.trashed)
    }

    async fn sync(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
    ) -> Result<SyncOutcome> {
        if let Some(public_id) = state.public_id.clone() {
            let hash = state
                .public_id_hash
                .clone()
                .unwrap_or_else(|| public_id_key(&public_id));

            let shared = ctx
                .states
                .find_by_public_id_hash(&hash)
                .await?
                .into_iter()
                .any(|sibling| sibling != state.asset_id);

            let managed = record.local_path.starts_with(&ctx.config.managed_root);

            if shared {
                debug!(
                    asset_id = %record.id,
                    public_id = %public_id,
                    "Sibling shares public id; skipping remote destroy"
                );
            } else if !managed {
                debug!(
                    asset_id = %record.id,
                    path = %record.local_path.display(),
                    "Asset outside managed root; skipping remote destroy"
                );
            } else if let Err(e) = ctx.remote.destroy(&public_id, true).await {
                let error = e.to_string();
                state.record_error(error.clone());
                return Ok(SyncOutcome::Failed { error });
            } else {
                info!(
                    asset_id = %record.id,
                    public_id = %public_id,
                    "Destroyed remote resource and invalidated CDN"
                );
            }
        }

        state.public_id = None;
        state.public_id_hash = None;
        state.version = None;
        state.delivery_type = None;
        state.remote_size = None;
        state.clear_error();

        let signature = self.generate_signature(ctx, record, state).await?;
        Ok(SyncOutcome::Synced { signature })
    }
}
