use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::routes::AppState;

/// Authenticated end user of the host application.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i64,
    /// Platform the host minted the token for, when it says so.
    pub platform_id: Option<i32>,
}

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pid: Option<i32>,
}

pub fn decode_user_token(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "jwt decode error");
        AppError::Unauthorized("Invalid or expired token".to_string())
    })?;

    let user_id = token_data
        .claims
        .sub
        .parse::<i64>()
        .map_err(|_| AppError::Unauthorized("Invalid token subject".to_string()))?;

    Ok(AuthUser {
        user_id,
        platform_id: token_data.claims.pid,
    })
}

/// Signs a user token. Hosts normally mint these; the gateway uses it in tests
/// and tooling.
pub fn encode_user_token(
    user: AuthUser,
    secret: &str,
    ttl: chrono::Duration,
) -> Result<String, AppError> {
    let claims = Claims {
        sub: user.user_id.to_string(),
        exp: (chrono::Utc::now() + ttl).timestamp() as usize,
        pid: user.platform_id,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_ref()),
    )
    .map_err(|e| AppError::Internal(format!("failed to sign token: {e}")))
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&req)
        .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;
    let auth_user = decode_user_token(token, &state.config.jwt_secret)?;

    req.extensions_mut().insert(auth_user);
    Ok(next.run(req).await)
}

/// Attaches the user when a valid bearer token is present. Requests without a
/// token pass through anonymously; an invalid token is still rejected.
pub async fn optional_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    if let Some(token) = bearer_token(&req) {
        let auth_user = decode_user_token(token, &state.config.jwt_secret)?;
        req.extensions_mut().insert(auth_user);
    }
    Ok(next.run(req).await)
}
