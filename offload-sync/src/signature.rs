//! # Signature Engine
//!
//! Decides whether an (asset, sync type) pair needs work.
//!
//! ## Overview
//!
//! Each sync type fingerprints the inputs it cares about. A stored
//! fingerprint equal to the freshly generated one means the type is in
//! sync; anything else means work is outstanding. Signatures are written
//! only on sync success or explicit bypass, never on failure, so a failed
//! attempt stays outstanding.
//!
//! A `validate() == false` veto is a legitimate skip: the engine silently
//! advances the stored signature so the type is not reconsidered until its
//! inputs change again.

use crate::asset::SyncState;
use crate::context::SyncContext;
use crate::error::Result;
use crate::registry::{SyncOperation, SyncRegistry};
use offload_bridge::catalog::AssetRecord;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Hex SHA-256 fingerprint of a canonical input string
pub fn fingerprint(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// Signature-driven staleness decisions over a registry
pub struct SignatureEngine {
    registry: Arc<SyncRegistry>,
}

impl SignatureEngine {
    pub fn new(registry: Arc<SyncRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<SyncRegistry> {
        &self.registry
    }

    /// Whether one sync type has outstanding work for an asset
    pub async fn needs_sync(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
        slug: &str,
    ) -> Result<bool> {
        let op = self.registry.get(slug)?;
        let current = op.generate_signature(ctx, record, state).await?;
        Ok(state.signature(slug) != Some(current.as_str()))
    }

    /// First outstanding sync type in ascending priority order.
    ///
    /// Types whose `validate` veto fires are skip-advanced: their current
    /// fingerprint is stamped into `state` (the caller persists it) and the
    /// scan moves on.
    pub async fn next_sync_type(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
    ) -> Result<Option<&'static str>> {
        for op in self.registry.iter() {
            let current = op.generate_signature(ctx, record, state).await?;
            if state.signature(op.slug()) == Some(current.as_str()) {
                continue;
            }

            if op.validate(ctx, record, state).await? {
                return Ok(Some(op.slug()));
            }

            // Not due: advance the signature so the type is not reconsidered
            // until its inputs change.
            debug!(
                asset_id = %record.id,
                sync_type = op.slug(),
                "Validate veto, advancing signature"
            );
            state.set_signature(op.slug(), current);
        }

        Ok(None)
    }

    /// Non-mutating probe used by the queue builder: does any type have
    /// outstanding, currently runnable work?
    pub async fn has_outstanding(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &SyncState,
    ) -> Result<bool> {
        for op in self.registry.iter() {
            let current = op.generate_signature(ctx, record, state).await?;
            if state.signature(op.slug()) == Some(current.as_str()) {
                continue;
            }
            if op.validate(ctx, record, state).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Force-stamp a type's signature to its current fingerprint.
    ///
    /// Used after success and for explicit bypass.
    pub async fn stamp_current(
        &self,
        ctx: &SyncContext,
        record: &AssetRecord,
        state: &mut SyncState,
        slug: &str,
    ) -> Result<String> {
        let op = self.registry.get(slug)?;
        let current = op.generate_signature(ctx, record, state).await?;
        state.set_signature(slug, current.clone());
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = fingerprint("upload|media/sunset|0|52110");
        let b = fingerprint("upload|media/sunset|0|52110");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_fingerprint_changes_with_input() {
        assert_ne!(
            fingerprint("upload|media/sunset|0|52110"),
            fingerprint("upload|media/sunset|1|52110")
        );
    }
}
