use moka::{future::Cache, Expiry};
use std::time::{Duration, Instant};

use crate::models::file_info::FileInfo;

#[derive(Clone)]
struct CachedFileInfo {
    info: FileInfo,
    ttl: Duration,
}

struct PerEntryExpiry;

impl Expiry<String, CachedFileInfo> for PerEntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CachedFileInfo,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-process cache of file-info projections, keyed `file_info_<fid>`.
#[derive(Clone)]
pub struct FileInfoCache {
    inner: Cache<String, CachedFileInfo>,
}

impl FileInfoCache {
    pub fn new(max_capacity: u64) -> Self {
        let inner = Cache::builder()
            .max_capacity(max_capacity)
            .expire_after(PerEntryExpiry)
            .build();
        Self { inner }
    }

    pub fn key(fid: &str) -> String {
        format!("file_info_{fid}")
    }

    pub async fn get(&self, fid: &str) -> Option<FileInfo> {
        self.inner.get(&Self::key(fid)).await.map(|entry| entry.info)
    }

    pub async fn put(&self, fid: &str, info: FileInfo, ttl: Duration) {
        if ttl.is_zero() {
            return;
        }
        self.inner
            .insert(Self::key(fid), CachedFileInfo { info, ttl })
            .await;
    }

    pub async fn invalidate(&self, fid: &str) {
        self.inner.invalidate(&Self::key(fid)).await;
    }
}

impl Default for FileInfoCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}
