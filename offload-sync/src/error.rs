use crate::asset::AssetId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Asset {0} not found in catalog")]
    AssetNotFound(AssetId),

    #[error("Unknown sync type: {0}")]
    UnknownSyncType(String),

    #[error("Duplicate sync type registered: {0}")]
    DuplicateSyncType(String),

    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Invalid queue kind: {0}")]
    InvalidQueueKind(String),

    #[error("Deletion blocked: sync still in progress for asset {asset_id}")]
    DeletePending { asset_id: AssetId },

    #[error("Remote cleanup failed: {0}")]
    RemoteCleanup(String),

    #[error("Required capability missing: {capability}")]
    CapabilityMissing { capability: String },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Logging initialization failed: {0}")]
    Logging(String),

    #[error(transparent)]
    Bridge(#[from] offload_bridge::BridgeError),
}

pub type Result<T> = std::result::Result<T, SyncError>;
