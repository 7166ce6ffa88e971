use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::{pin_mut, Stream, StreamExt};
use std::collections::BTreeMap;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use url::Url;
use uuid::Uuid;

use super::{RenditionPlan, StorageDriver, StorageError, UploadCredential, UploadTarget};
use crate::entities::file::{self, FileType};
use crate::models::settings::{DiskSettings, DriverKind};
use crate::services::signer::{TokenSigner, UPLOAD_KIND};
use crate::utils::qualify_url;

const MAX_OBJECT_KEY_LEN: usize = 1024;

pub const DOWNLOAD_ROUTE: &str = "/api/file-storage/file";
pub const UPLOAD_ROUTE: &str = "/api/file-storage/upload";

/// Object files under a root directory.
#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

/// Outcome of a streamed write.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub size: i64,
    pub md5: String,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn ensure_key_safe(key: &str) -> Result<(), StorageError> {
        let invalid = key.is_empty()
            || key.len() > MAX_OBJECT_KEY_LEN
            || key.starts_with('/')
            || key.contains("..")
            || key
                .bytes()
                .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0' || b == b'?');
        if invalid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(())
    }

    pub fn resolve(&self, key: &str) -> Result<PathBuf, StorageError> {
        Self::ensure_key_safe(key)?;
        Ok(self.root.join(key))
    }

    /// Streams bytes into `key`, replacing any existing object atomically.
    pub async fn write_stream<S>(&self, key: &str, stream: S) -> Result<StoredObject, StorageError>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_path = self.resolve(key)?;
        let parent = file_path
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| StorageError::InvalidKey(key.to_string()))?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size: i64 = 0;
        let mut digest = md5::Context::new();
        pin_mut!(stream);
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }

        Ok(StoredObject {
            size,
            md5: format!("{:x}", digest.compute()),
        })
    }

    pub async fn write_bytes(&self, key: &str, data: Vec<u8>) -> Result<StoredObject, StorageError> {
        let stream = futures::stream::once(async move { Ok::<_, io::Error>(Bytes::from(data)) });
        self.write_stream(key, stream).await
    }

    pub async fn read(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.resolve(key)?;
        fs::read(&path).await.map_err(not_found)
    }

    pub async fn open(&self, key: &str) -> Result<(File, u64), StorageError> {
        let path = self.resolve(key)?;
        let file = File::open(&path).await.map_err(not_found)?;
        let len = file.metadata().await?.len();
        Ok((file, len))
    }

    pub async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let path = self.resolve(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(StorageError::Io(err)),
        }
    }
}

fn not_found(err: io::Error) -> StorageError {
    if err.kind() == ErrorKind::NotFound {
        StorageError::NotFound
    } else {
        StorageError::Io(err)
    }
}

/// Files on the gateway's own disk, served through signed gateway URLs.
pub struct LocalDriver {
    settings: DiskSettings,
    store: LocalStore,
    signer: TokenSigner,
}

impl LocalDriver {
    pub fn new(settings: DiskSettings, store: LocalStore, signer: TokenSigner) -> Self {
        Self {
            settings,
            store,
            signer,
        }
    }

    fn route_url(&self, route: &str) -> Result<Url, StorageError> {
        Url::parse(&qualify_url(route, &self.settings.bucket_domain))
            .map_err(|e| StorageError::Config(format!("invalid bucket domain: {e}")))
    }
}

#[async_trait]
impl StorageDriver for LocalDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Local
    }

    async fn signed_url(
        &self,
        file: &file::Model,
        plan: &RenditionPlan,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let expires = expires_at.timestamp();
        let code = plan.rendition.code();
        let token = self.signer.sign(&file.fid, expires, code);

        let mut url = self.route_url(DOWNLOAD_ROUTE)?;
        url.query_pairs_mut()
            .append_pair("fid", &file.fid)
            .append_pair("token", &token)
            .append_pair("time", &expires.to_string())
            .append_pair("type", code);
        Ok(url.to_string())
    }

    fn public_url(&self, file: &file::Model, plan: &RenditionPlan) -> Result<String, StorageError> {
        let mut url = self.route_url(DOWNLOAD_ROUTE)?;
        url.query_pairs_mut()
            .append_pair("fid", &file.fid)
            .append_pair("type", plan.rendition.code());
        Ok(url.to_string())
    }

    async fn upload_credential(
        &self,
        target: &UploadTarget,
    ) -> Result<UploadCredential, StorageError> {
        self.store.resolve(&target.path)?;
        let expires = target.expires_at.timestamp();
        let token = self.signer.sign(&target.path, expires, UPLOAD_KIND);

        let mut url = self.route_url(UPLOAD_ROUTE)?;
        url.query_pairs_mut()
            .append_pair("path", &target.path)
            .append_pair("time", &expires.to_string())
            .append_pair("token", &token);

        let mut headers = BTreeMap::new();
        if let Some(mime) = &target.mime {
            headers.insert("Content-Type".to_string(), mime.clone());
        }

        Ok(UploadCredential {
            method: "PUT".to_string(),
            url: url.to_string(),
            headers,
            fields: BTreeMap::new(),
        })
    }

    fn stores_renditions(&self) -> bool {
        true
    }

    async fn delete_object(&self, _file_type: FileType, path: &str) -> Result<(), StorageError> {
        self.store.remove(path).await
    }
}
