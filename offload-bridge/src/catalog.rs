//! Asset Catalog Abstraction
//!
//! The host owns the media library; the engine only queries it. Catalog
//! records carry just enough for the sync handlers: where the bytes live,
//! what kind of media it is, and whether the host has trashed it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Media kind classification used for queue filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

impl MediaKind {
    /// Get the string representation for storage and logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Audio => "audio",
            Self::Document => "document",
        }
    }
}

impl FromStr for MediaKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "image" => Ok(Self::Image),
            "video" => Ok(Self::Video),
            "audio" => Ok(Self::Audio),
            "document" => Ok(Self::Document),
            _ => Err(BridgeError::OperationFailed(format!(
                "Invalid media kind: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A host media asset as the engine sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetRecord {
    /// Host-assigned numeric id
    pub id: i64,
    /// Display/file name, e.g. `sunset.jpg`
    pub file_name: String,
    /// Absolute path of the canonical local file
    pub local_path: PathBuf,
    /// Media classification
    pub kind: MediaKind,
    /// Byte size as the host last recorded it
    pub byte_size: Option<u64>,
    /// Monotonic edit counter; bumps when the host regenerates derivatives
    pub edit_revision: u32,
    /// Host has trashed the asset; remote cleanup may be due
    pub trashed: bool,
}

impl AssetRecord {
    /// File stem used when building remote public ids
    pub fn file_stem(&self) -> &str {
        self.file_name
            .rsplit_once('.')
            .map(|(stem, _)| stem)
            .unwrap_or(&self.file_name)
    }
}

/// Query access to the host's media library
///
/// Implementations must be cheap to call repeatedly; the queue builder walks
/// the catalog on every rebuild.
#[async_trait]
pub trait AssetCatalog: Send + Sync {
    /// Fetch a single asset. `Ok(None)` when the host no longer has it.
    async fn get(&self, id: i64) -> Result<Option<AssetRecord>>;

    /// List asset ids of the given kinds, ascending by id
    async fn list_ids(&self, kinds: &[MediaKind]) -> Result<Vec<i64>>;

    /// Total number of assets of the given kinds
    async fn count(&self, kinds: &[MediaKind]) -> Result<u64> {
        Ok(self.list_ids(kinds).await?.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_round_trip() {
        assert_eq!(MediaKind::Image.as_str(), "image");
        assert_eq!("video".parse::<MediaKind>().unwrap(), MediaKind::Video);
        assert!("spreadsheet".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_file_stem() {
        let record = AssetRecord {
            id: 1,
            file_name: "sunset.jpg".to_string(),
            local_path: PathBuf::from("/media/sunset.jpg"),
            kind: MediaKind::Image,
            byte_size: Some(1024),
            edit_revision: 0,
            trashed: false,
        };
        assert_eq!(record.file_stem(), "sunset");

        let no_ext = AssetRecord {
            file_name: "README".to_string(),
            ..record
        };
        assert_eq!(no_ext.file_stem(), "README");
    }
}
