//! In-Memory Asset Catalog
//!
//! Catalog backing for embedding hosts that push their library in at startup,
//! and for tests.

use async_trait::async_trait;
use offload_bridge::{
    catalog::{AssetCatalog, AssetRecord, MediaKind},
    error::Result,
};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// In-memory `AssetCatalog` implementation
pub struct MemoryCatalog {
    records: RwLock<BTreeMap<i64, AssetRecord>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
        }
    }

    /// Insert or replace an asset record
    pub async fn put(&self, record: AssetRecord) {
        let mut records = self.records.write().await;
        records.insert(record.id, record);
    }

    /// Remove an asset record
    pub async fn remove(&self, id: i64) {
        let mut records = self.records.write().await;
        records.remove(&id);
    }

    /// Mark an asset as trashed without removing it
    pub async fn trash(&self, id: i64) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id) {
            record.trashed = true;
        }
    }

    /// Bump an asset's edit revision, as hosts do after re-editing media
    pub async fn touch(&self, id: i64) {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&id) {
            record.edit_revision += 1;
        }
    }
}

impl Default for MemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AssetCatalog for MemoryCatalog {
    async fn get(&self, id: i64) -> Result<Option<AssetRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&id).cloned())
    }

    async fn list_ids(&self, kinds: &[MediaKind]) -> Result<Vec<i64>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| kinds.contains(&r.kind) && !r.trashed)
            .map(|r| r.id)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn record(id: i64, kind: MediaKind) -> AssetRecord {
        AssetRecord {
            id,
            file_name: format!("asset-{}.bin", id),
            local_path: PathBuf::from(format!("/media/asset-{}.bin", id)),
            kind,
            byte_size: Some(100),
            edit_revision: 0,
            trashed: false,
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_kind_and_trash() {
        let catalog = MemoryCatalog::new();
        catalog.put(record(1, MediaKind::Image)).await;
        catalog.put(record(2, MediaKind::Video)).await;
        catalog.put(record(3, MediaKind::Image)).await;
        catalog.trash(3).await;

        let ids = catalog.list_ids(&[MediaKind::Image]).await.unwrap();
        assert_eq!(ids, vec![1]);

        let all = catalog
            .list_ids(&[MediaKind::Image, MediaKind::Video])
            .await
            .unwrap();
        assert_eq!(all, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_touch_bumps_revision() {
        let catalog = MemoryCatalog::new();
        catalog.put(record(1, MediaKind::Image)).await;
        catalog.touch(1).await;

        let rec = catalog.get(1).await.unwrap().unwrap();
        assert_eq!(rec.edit_revision, 1);
    }
}
