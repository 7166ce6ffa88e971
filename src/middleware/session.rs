//! Signed cookie carrying the browser upload session.
//!
//! The cookie itself lives for the browser session; the signed claims expire
//! after [`SESSION_MINUTES`].

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::entities::file::FileType;
use crate::error::AppError;

pub const SESSION_COOKIE: &str = "storage_gateway_upload_session";
pub const SESSION_MINUTES: i64 = 15;
const SESSION_AUDIENCE: &str = "upload-session";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    pub platform_id: i32,
    pub user_id: i64,
    /// Usage name as requested by the embedding page (`post`, `userAvatar`, ...).
    pub usage_type: String,
    pub usage_fsid: Option<String>,
    pub file_type: FileType,
    /// Unix seconds when the page opened the session.
    pub issued_at: i64,
    /// Credentials this session may request.
    pub max_upload_number: u32,
}

#[derive(Serialize, Deserialize)]
struct SessionClaims {
    aud: String,
    exp: usize,
    #[serde(flatten)]
    session: UploadSession,
}

impl UploadSession {
    pub fn to_cookie(&self, secret: &str) -> Result<Cookie<'static>, AppError> {
        let claims = SessionClaims {
            aud: SESSION_AUDIENCE.to_string(),
            exp: (chrono::Utc::now() + chrono::Duration::minutes(SESSION_MINUTES)).timestamp()
                as usize,
            session: self.clone(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_ref()),
        )
        .map_err(|e| AppError::Internal(format!("failed to sign upload session: {e}")))?;

        Ok(Cookie::build((SESSION_COOKIE, token))
            .path("/upload")
            .http_only(true)
            .same_site(SameSite::None)
            .secure(true)
            .build())
    }

    pub fn from_jar(jar: &CookieJar, secret: &str) -> Result<Self, AppError> {
        let cookie = jar
            .get(SESSION_COOKIE)
            .ok_or_else(|| AppError::Unauthorized("Upload session missing".to_string()))?;

        let mut validation = Validation::default();
        validation.set_audience(&[SESSION_AUDIENCE]);
        let data = decode::<SessionClaims>(
            cookie.value(),
            &DecodingKey::from_secret(secret.as_ref()),
            &validation,
        )
        .map_err(|e| {
            tracing::debug!(error = %e, "upload session rejected");
            AppError::Unauthorized("Upload session expired".to_string())
        })?;

        Ok(data.claims.session)
    }
}
