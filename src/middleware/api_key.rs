use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{NaiveDateTime, Utc};
use rand::{thread_rng, RngCore};
use sea_orm::{ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::entities::api_key::{self, Entity as ApiKey};
use crate::error::AppError;
use crate::routes::AppState;

/// Platform that owns the API key of the current request.
#[derive(Clone, Copy, Debug)]
pub struct PlatformContext {
    pub platform_id: i32,
}

pub fn hash_api_key(raw_key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Creates a key for a platform and returns the plaintext, which is never stored.
pub async fn issue_api_key(
    db: &DatabaseConnection,
    platform_id: i32,
    name: &str,
    expires_at: Option<NaiveDateTime>,
) -> Result<String, AppError> {
    let mut key_bytes = [0u8; 32];
    thread_rng().fill_bytes(&mut key_bytes);
    let raw_key = format!("sgk_{}", general_purpose::URL_SAFE_NO_PAD.encode(key_bytes));

    api_key::ActiveModel {
        id: Set(Uuid::new_v4()),
        platform_id: Set(platform_id),
        name: Set(name.to_string()),
        key_hash: Set(hash_api_key(&raw_key)),
        created_at: Set(Utc::now().naive_utc()),
        expires_at: Set(expires_at),
        is_active: Set(true),
    }
    .insert(db)
    .await?;

    tracing::info!(platform_id, name, "api key issued");
    Ok(raw_key)
}

pub async fn api_key_auth(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let api_key_header = headers
        .get("x-api-key")
        .ok_or(AppError::Unauthorized("Missing API Key".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid API Key format".to_string()))?;

    let api_key = ApiKey::find()
        .filter(api_key::Column::KeyHash.eq(hash_api_key(api_key_header)))
        .one(&state.db)
        .await?
        .ok_or(AppError::Unauthorized("Invalid API Key".to_string()))?;

    if !api_key.is_active {
        return Err(AppError::Unauthorized("API Key is inactive".to_string()));
    }

    if let Some(expires_at) = api_key.expires_at {
        if expires_at < Utc::now().naive_utc() {
            return Err(AppError::Unauthorized("API Key has expired".to_string()));
        }
    }

    request.extensions_mut().insert(PlatformContext {
        platform_id: api_key.platform_id,
    });

    Ok(next.run(request).await)
}
