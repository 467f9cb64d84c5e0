//! # Asset Sync State
//!
//! Strongly-typed per-asset synchronization record.
//!
//! ## Overview
//!
//! Every managed asset has one [`SyncState`] row holding everything the
//! engine knows about its remote counterpart: the per-type signature map,
//! the storage offload mode, remote identity (public id, version, delivery
//! type), the queue ownership tag, and the persisted error marker. The
//! record replaces the loosely-typed metadata bag the engine's lineage used
//! for coordination.

use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// ID Type
// ============================================================================

/// Host-assigned numeric asset identifier
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AssetId(i64);

impl AssetId {
    pub fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw numeric value
    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for AssetId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl From<AssetId> for i64 {
    fn from(id: AssetId) -> Self {
        id.0
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Storage Mode
// ============================================================================

/// Local/remote storage policy for an asset's bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    /// Full-resolution copy kept both locally and remotely
    #[default]
    DualFull,
    /// Reduced-quality local rendition, canonical bytes remote
    DualLow,
    /// Remote only; local files removed after the grace delay
    CloudOnly,
}

impl StorageMode {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DualFull => "dual_full",
            Self::DualLow => "dual_low",
            Self::CloudOnly => "cloud_only",
        }
    }

    /// Whether this mode wants a local copy of some rendition
    pub fn keeps_local_copy(&self) -> bool {
        !matches!(self, Self::CloudOnly)
    }
}

impl FromStr for StorageMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "dual_full" => Ok(Self::DualFull),
            "dual_low" => Ok(Self::DualLow),
            "cloud_only" => Ok(Self::CloudOnly),
            _ => Err(SyncError::InvalidValue(format!("storage mode: {}", s))),
        }
    }
}

impl std::fmt::Display for StorageMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Delivery Type
// ============================================================================

/// Remote delivery classification assigned at upload time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryType {
    #[default]
    Upload,
    Private,
    Authenticated,
}

impl DeliveryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upload => "upload",
            Self::Private => "private",
            Self::Authenticated => "authenticated",
        }
    }
}

impl FromStr for DeliveryType {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "upload" => Ok(Self::Upload),
            "private" => Ok(Self::Private),
            "authenticated" => Ok(Self::Authenticated),
            _ => Err(SyncError::InvalidValue(format!("delivery type: {}", s))),
        }
    }
}

// ============================================================================
// Sync Outcome
// ============================================================================

/// Result of running one sync type against one asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum SyncOutcome {
    /// Work done; the new signature was stamped
    Synced { signature: String },
    /// Nothing to do for this type right now
    Skipped,
    /// Failure; the error marker was persisted
    Failed { error: String },
}

impl SyncOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Synced { .. } | Self::Skipped)
    }
}

/// Per-pass result map, keyed by sync type slug
pub type OutcomeMap = HashMap<String, SyncOutcome>;

// ============================================================================
// Sync State Record
// ============================================================================

/// Reverse-lookup key for a public id: hex SHA-256 of the id string.
///
/// Stored alongside the state row so "does any sibling share this public
/// id" is an indexed equality query instead of a scan.
pub fn public_id_key(public_id: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(public_id.as_bytes());
    hex::encode(hasher.finalize())
}

/// Per-asset synchronization state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Asset this record belongs to
    pub asset_id: AssetId,
    /// Signature map: sync type slug → fingerprint of its last synced inputs
    pub signatures: HashMap<String, String>,
    /// Storage offload policy
    pub storage_mode: StorageMode,
    /// When the current storage mode was requested (grace-delay anchor)
    pub mode_requested_at: Option<i64>,
    /// Remote public id, set after a successful upload
    pub public_id: Option<String>,
    /// Reverse-lookup key, always `public_id_key(public_id)` when set
    pub public_id_hash: Option<String>,
    /// Remote version number
    pub version: Option<i64>,
    /// Remote delivery classification
    pub delivery_type: Option<DeliveryType>,
    /// A download back to local storage is pending
    pub downloading: bool,
    /// A full rollback has been requested
    pub unsync_requested: bool,
    /// Owning queue thread, exactly one while queued
    pub queued_thread: Option<String>,
    /// Persisted error marker; excludes the asset from auto-dispatch
    pub sync_error: Option<String>,
    /// Local byte size as last recorded
    pub local_size: Option<i64>,
    /// Remote byte size as last recorded
    pub remote_size: Option<i64>,
    /// Local folder matches the remote folder layout
    pub folder_synced: bool,
    /// Unix timestamp the record was created
    pub created_at: i64,
    /// Unix timestamp the record was last written
    pub updated_at: i64,
}

impl SyncState {
    /// Create a fresh, never-synced record
    pub fn new(asset_id: AssetId, now: i64) -> Self {
        Self {
            asset_id,
            signatures: HashMap::new(),
            storage_mode: StorageMode::default(),
            mode_requested_at: None,
            public_id: None,
            public_id_hash: None,
            version: None,
            delivery_type: None,
            downloading: false,
            unsync_requested: false,
            queued_thread: None,
            sync_error: None,
            local_size: None,
            remote_size: None,
            folder_synced: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stored signature for a sync type
    pub fn signature(&self, slug: &str) -> Option<&str> {
        self.signatures.get(slug).map(String::as_str)
    }

    /// Stamp a sync type's signature
    pub fn set_signature(&mut self, slug: &str, signature: String) {
        self.signatures.insert(slug.to_string(), signature);
    }

    /// Whether the asset has a remote counterpart
    pub fn is_synced(&self) -> bool {
        self.public_id.is_some()
    }

    pub fn has_error(&self) -> bool {
        self.sync_error.is_some()
    }

    /// Persist an error marker. First error wins within a pass.
    pub fn record_error(&mut self, message: impl Into<String>) {
        if self.sync_error.is_none() {
            self.sync_error = Some(message.into());
        }
    }

    pub fn clear_error(&mut self) {
        self.sync_error = None;
    }

    /// Tag the asset to a queue thread, replacing any prior owner
    pub fn tag(&mut self, thread: impl Into<String>) {
        self.queued_thread = Some(thread.into());
    }

    /// Remove queue ownership
    pub fn untag(&mut self) {
        self.queued_thread = None;
    }

    /// Record remote identity after a successful upload or copy
    pub fn set_remote(&mut self, public_id: String, version: i64, delivery_type: DeliveryType) {
        self.public_id_hash = Some(public_id_key(&public_id));
        self.public_id = Some(public_id);
        self.version = Some(version);
        self.delivery_type = Some(delivery_type);
    }

    /// Request a storage mode change; anchors the grace delay
    pub fn request_mode(&mut self, mode: StorageMode, now: i64) {
        self.storage_mode = mode;
        self.mode_requested_at = Some(now);
    }

    /// Full rollback to a never-synced record, keeping only identity and
    /// creation time. Forces resync from scratch.
    pub fn reset(&mut self) {
        let asset_id = self.asset_id;
        let created_at = self.created_at;
        let updated_at = self.updated_at;
        *self = Self::new(asset_id, created_at);
        self.updated_at = updated_at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_asset_id_display() {
        let id = AssetId::new(42);
        assert_eq!(id.to_string(), "42");
        assert_eq!(i64::from(id), 42);
    }

    #[test]
    fn test_storage_mode_round_trip() {
        for mode in [
            StorageMode::DualFull,
            StorageMode::DualLow,
            StorageMode::CloudOnly,
        ] {
            assert_eq!(mode.as_str().parse::<StorageMode>().unwrap(), mode);
        }
        assert!("hybrid".parse::<StorageMode>().is_err());
    }

    #[test]
    fn test_storage_mode_local_copy() {
        assert!(StorageMode::DualFull.keeps_local_copy());
        assert!(StorageMode::DualLow.keeps_local_copy());
        assert!(!StorageMode::CloudOnly.keeps_local_copy());
    }

    #[test]
    fn test_public_id_key_is_stable() {
        let a = public_id_key("media/sunset");
        let b = public_id_key("media/sunset");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert_ne!(a, public_id_key("media/sunrise"));
    }

    #[test]
    fn test_state_tagging_replaces_owner() {
        let mut state = SyncState::new(AssetId::new(1), 1000);
        state.tag("queue_bulk_thread_0");
        state.tag("queue_bulk_thread_2");
        assert_eq!(state.queued_thread.as_deref(), Some("queue_bulk_thread_2"));

        state.untag();
        assert!(state.queued_thread.is_none());
    }

    #[test]
    fn test_first_error_wins() {
        let mut state = SyncState::new(AssetId::new(1), 1000);
        state.record_error("first");
        state.record_error("second");
        assert_eq!(state.sync_error.as_deref(), Some("first"));

        state.clear_error();
        state.record_error("second");
        assert_eq!(state.sync_error.as_deref(), Some("second"));
    }

    #[test]
    fn test_set_remote_keeps_hash_consistent() {
        let mut state = SyncState::new(AssetId::new(1), 1000);
        state.set_remote("media/sunset".to_string(), 7, DeliveryType::Upload);

        assert_eq!(
            state.public_id_hash.as_deref(),
            Some(public_id_key("media/sunset").as_str())
        );
        assert_eq!(state.version, Some(7));
        assert!(state.is_synced());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut state = SyncState::new(AssetId::new(1), 1000);
        state.set_remote("media/sunset".to_string(), 7, DeliveryType::Upload);
        state.set_signature("upload", "abc".to_string());
        state.request_mode(StorageMode::CloudOnly, 2000);
        state.record_error("boom");
        state.downloading = true;

        state.reset();

        assert!(!state.is_synced());
        assert!(state.signatures.is_empty());
        assert_eq!(state.storage_mode, StorageMode::DualFull);
        assert!(state.mode_requested_at.is_none());
        assert!(state.sync_error.is_none());
        assert!(!state.downloading);
        assert_eq!(state.asset_id, AssetId::new(1));
        assert_eq!(state.created_at, 1000);
    }

    #[test]
    fn test_outcome_success() {
        assert!(SyncOutcome::Synced {
            signature: "s".to_string()
        }
        .is_success());
        assert!(SyncOutcome::Skipped.is_success());
        assert!(!SyncOutcome::Failed {
            error: "e".to_string()
        }
        .is_success());
    }
}
