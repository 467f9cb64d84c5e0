//! # Remote Execution Handlers
//!
//! Concrete sync type implementations: upload, storage offload, download,
//! size accounting, delete, and unsync.
//!
//! Shared conventions: handlers persist remote-call failures on the state
//! and return a failure-shaped outcome, never an `Err`; a success clears
//! any stale error marker because the condition it recorded is resolved.

use offload_bridge::catalog::AssetRecord;
use std::collections::HashMap;
use std::sync::Arc;

use crate::context::SyncConfig;
use crate::registry::SyncOperation;

mod delete;
mod download;
mod size;
mod storage;
mod unsync;
mod upload;

pub use delete::DeleteSync;
pub use download::DownloadSync;
pub use size::SizeSync;
pub use storage::StorageSync;
pub use unsync::UnsyncSync;
pub use upload::UploadSync;

/// The standard operation set in ascending priority order
pub fn standard_operations() -> Vec<Arc<dyn SyncOperation>> {
    vec![
        Arc::new(UploadSync),
        Arc::new(StorageSync),
        Arc::new(DownloadSync),
        Arc::new(SizeSync),
        Arc::new(DeleteSync),
        Arc::new(UnsyncSync),
    ]
}

/// Remote public id an asset should live under: folder prefix + file stem
pub(crate) fn desired_public_id(config: &SyncConfig, record: &AssetRecord) -> String {
    let prefix = config.folder_prefix.trim_matches('/');
    if prefix.is_empty() {
        record.file_stem().to_string()
    } else {
        format!("{}/{}", prefix, record.file_stem())
    }
}

/// Content type from the file extension; the remote sniffs bytes anyway,
/// this only seeds the request header.
pub(crate) fn content_type_for(record: &AssetRecord) -> &'static str {
    let extension = record
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

/// Context metadata pushed alongside the remote resource
pub(crate) fn context_map(record: &AssetRecord) -> HashMap<String, String> {
    let mut context = HashMap::new();
    context.insert("asset_id".to_string(), record.id.to_string());
    context.insert("file_name".to_string(), record.file_name.clone());
    context
}

/// Six hex chars of a fresh UUID v4, used to uniquify a taken public id.
///
/// Best-effort: one retry with negligible collision odds, no persisted
/// counter state.
pub(crate) fn unique_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..6].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use offload_bridge::catalog::MediaKind;
    use std::path::PathBuf;

    fn record(file_name: &str) -> AssetRecord {
        AssetRecord {
            id: 1,
            file_name: file_name.to_string(),
            local_path: PathBuf::from(format!("/var/media/{}", file_name)),
            kind: MediaKind::Image,
            byte_size: Some(100),
            edit_revision: 0,
            trashed: false,
        }
    }

    #[test]
    fn test_desired_public_id_uses_folder_prefix() {
        let config = SyncConfig::default();
        assert_eq!(
            desired_public_id(&config, &record("sunset.jpg")),
            "media/sunset"
        );

        let bare = SyncConfig {
            folder_prefix: String::new(),
            ..SyncConfig::default()
        };
        assert_eq!(desired_public_id(&bare, &record("sunset.jpg")), "sunset");
    }

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(content_type_for(&record("a.JPG")), "image/jpeg");
        assert_eq!(content_type_for(&record("clip.mp4")), "video/mp4");
        assert_eq!(
            content_type_for(&record("unknown.xyz")),
            "application/octet-stream"
        );
    }

    #[test]
    fn test_unique_suffix_shape() {
        let a = unique_suffix();
        let b = unique_suffix();
        assert_eq!(a.len(), 6);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, b);
    }
}
