//! Token issuance and the actor-context extractor.
//!
//! Every mutating ticket operation receives an [`AuthUser`] — the strongly
//! typed {id, role, tenant} triple the authorization core works with.

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use chrono::{Duration, Utc};
use diesel::prelude::*;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};

use crate::core::shared::error::{CoreError, CoreResult};
use crate::core::shared::schema::users;
use crate::core::shared::state::AppState;
use crate::core::shared::UserRole;
use crate::users::{NewUser, User, UserPublic};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: i32,
    pub role: UserRole,
    pub empresa_id: Option<i32>,
    pub exp: i64,
}

/// Authenticated actor attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i32,
    pub role: UserRole,
    pub empresa_id: Option<i32>,
}

#[axum::async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or((
                StatusCode::UNAUTHORIZED,
                "missing authorization header".to_string(),
            ))?;
        let token = header.strip_prefix("Bearer ").ok_or((
            StatusCode::UNAUTHORIZED,
            "expected bearer token".to_string(),
        ))?;

        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| (StatusCode::UNAUTHORIZED, format!("invalid token: {e}")))?;

        Ok(AuthUser {
            id: data.claims.sub,
            role: data.claims.role,
            empresa_id: data.claims.empresa_id,
        })
    }
}

pub fn issue_token(user: &User, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user.id,
        role: user.role,
        empresa_id: user.empresa_id,
        exp: (Utc::now() + Duration::hours(12)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn hash_password(password: &str) -> CoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CoreError::validation(format!("could not hash password: {e}")))
}

pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    PasswordHash::new(stored_hash)
        .map(|parsed| {
            Argon2::default()
                .verify_password(password.as_bytes(), &parsed)
                .is_ok()
        })
        .unwrap_or(false)
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Option<UserRole>,
    pub empresa_id: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserPublic,
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> CoreResult<Json<LoginResponse>> {
    let mut conn = state.conn.get()?;

    let user: User = users::table
        .filter(users::email.eq(&req.email))
        .first(&mut conn)
        .optional()?
        .ok_or_else(|| CoreError::forbidden("invalid credentials"))?;

    if !user.is_active || !verify_password(&req.password, &user.password_hash) {
        return Err(CoreError::forbidden("invalid credentials"));
    }

    let token = issue_token(&user, &state.config.jwt_secret)
        .map_err(|e| CoreError::validation(format!("could not issue token: {e}")))?;

    Ok(Json(LoginResponse {
        token,
        user: user.into(),
    }))
}

async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> CoreResult<Json<UserPublic>> {
    if req.username.trim().is_empty() || req.email.trim().is_empty() {
        return Err(CoreError::validation("username and email are required"));
    }
    let mut conn = state.conn.get()?;

    let new_user = NewUser {
        username: req.username,
        email: req.email,
        password_hash: hash_password(&req.password)?,
        role: req.role.unwrap_or_default(),
        empresa_id: req.empresa_id,
        is_active: true,
        smtp_password: None,
    };

    let user: User = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(&mut conn)?;

    Ok(Json(user.into()))
}

pub fn configure_auth_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_hash_verifies() {
        let hash = hash_password("s3cret").unwrap();
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn verify_rejects_garbage_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }
}
