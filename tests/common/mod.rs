#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use storage_gateway::config::Config;
use storage_gateway::entities::file::{self, FileType};
use storage_gateway::models::settings::{DriverKind, StorageSettings};
use storage_gateway::routes::AppState;
use storage_gateway::services::policy::ConfigUploadPolicy;
use storage_gateway::services::storage::{
    RenditionPlan, StorageDriver, StorageDrivers, StorageError, UploadCredential, UploadTarget,
};
use storage_gateway::services::upload::{UploadTokenRequest, Uploader};

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const APP_KEY: &str = "test-app-key";
pub const PLATFORM_ID: i32 = 4;

/// Scripted backend: records deletes and fails on request.
#[derive(Default)]
pub struct FakeDriver {
    pub deleted: Mutex<Vec<String>>,
    pub fail_delete: Mutex<HashSet<String>>,
    pub fail_credential: AtomicBool,
    pub issues_posters: bool,
}

impl FakeDriver {
    pub fn with_posters() -> Self {
        Self {
            issues_posters: true,
            ..Self::default()
        }
    }

    pub fn fail_delete_of(&self, path: &str) {
        self.fail_delete.lock().unwrap().insert(path.to_string());
    }

    pub fn fail_credentials(&self) {
        self.fail_credential.store(true, Ordering::SeqCst);
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl StorageDriver for FakeDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::S3
    }

    async fn signed_url(
        &self,
        file: &file::Model,
        plan: &RenditionPlan,
        expires_at: DateTime<Utc>,
    ) -> Result<String, StorageError> {
        let expires = expires_at.timestamp();
        let signature = format!(
            "{:x}",
            md5::compute(format!("{}{}{}", file.fid, expires, plan.rendition.code()))
        );
        Ok(format!(
            "https://fake.example.com/{}?expires={expires}&sig={signature}",
            plan.object_path
        ))
    }

    fn public_url(&self, _file: &file::Model, plan: &RenditionPlan) -> Result<String, StorageError> {
        Ok(format!("https://fake.example.com/{}", plan.object_path))
    }

    async fn upload_credential(
        &self,
        target: &UploadTarget,
    ) -> Result<UploadCredential, StorageError> {
        if self.fail_credential.load(Ordering::SeqCst) {
            return Err(StorageError::Request("vendor unavailable".to_string()));
        }
        Ok(UploadCredential {
            method: "PUT".to_string(),
            url: format!("https://fake.example.com/{}?upload=1", target.path),
            headers: BTreeMap::new(),
            fields: BTreeMap::new(),
        })
    }

    fn video_poster_path(&self, file_type: FileType, path: &str) -> Option<String> {
        (self.issues_posters && file_type == FileType::Video)
            .then(|| storage_gateway::utils::replace_extension(path, "jpg"))
    }

    async fn delete_object(&self, _file_type: FileType, path: &str) -> Result<(), StorageError> {
        if self.fail_delete.lock().unwrap().contains(path) {
            return Err(StorageError::Request(format!("cannot delete {path}")));
        }
        self.deleted.lock().unwrap().push(path.to_string());
        Ok(())
    }
}

pub async fn setup_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    Migrator::up(&db, None).await.unwrap();
    db
}

pub fn test_config(storage: StorageSettings) -> Config {
    Config {
        host: "127.0.0.1".to_string(),
        port: 0,
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: JWT_SECRET.to_string(),
        app_key: APP_KEY.to_string(),
        storage,
    }
}

/// App state over a fake backend for every file type.
pub async fn fake_state(storage: StorageSettings) -> (AppState, Arc<FakeDriver>) {
    fake_state_with(storage, FakeDriver::default()).await
}

pub async fn fake_state_with(
    storage: StorageSettings,
    driver: FakeDriver,
) -> (AppState, Arc<FakeDriver>) {
    let db = setup_db().await;
    let driver = Arc::new(driver);
    let drivers = Arc::new(StorageDrivers::uniform(driver.clone()));
    let policy = Arc::new(ConfigUploadPolicy::new(storage.upload.clone()));
    let state = AppState::new(db, Arc::new(test_config(storage)), drivers, policy);
    (state, driver)
}

pub fn uploader(user_id: i64) -> Uploader {
    Uploader {
        platform_id: PLATFORM_ID,
        user_id,
    }
}

pub fn image_request() -> UploadTokenRequest {
    UploadTokenRequest {
        file_type: "image".to_string(),
        usage_type: "post".to_string(),
        usage_fsid: Some("pAbc".to_string()),
        table_id: None,
        name: "sunset.jpg".to_string(),
        mime: Some("image/jpeg".to_string()),
        extension: "jpg".to_string(),
        size: 100_000,
        width: Some(1200),
        height: Some(800),
        duration: None,
        sha: None,
        sha_type: None,
        warning: None,
        sort_order: None,
        more_info: None,
    }
}

pub fn video_request() -> UploadTokenRequest {
    UploadTokenRequest {
        file_type: "video".to_string(),
        name: "clip.mp4".to_string(),
        mime: Some("video/mp4".to_string()),
        extension: "mp4".to_string(),
        size: 2_000_000,
        width: None,
        height: None,
        duration: Some(30),
        ..image_request()
    }
}

/// Issues a credential and confirms it, returning the fid.
pub async fn uploaded_file(state: &AppState, user_id: i64, request: UploadTokenRequest) -> String {
    let token = state
        .uploads
        .request_upload_credential(uploader(user_id), request)
        .await
        .unwrap();
    state.uploads.confirm_upload(&token.fid, user_id).await.unwrap();
    token.fid
}
