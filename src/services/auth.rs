//! Password hashing, access tokens and the authenticated-caller extractor.

use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::db::models::{User, UserRole};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ============================================================================
// Passwords
// ============================================================================

/// bcrypt is CPU-bound, so it runs on the blocking pool.
pub async fn hash_password(password: String, cost: u32) -> AppResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(format!("password hashing task failed: {}", e)))?
        .map_err(|e| AppError::Internal(format!("password hashing failed: {}", e)))
}

/// A malformed stored hash verifies as `false`.
pub async fn verify_password(password: String, hash: String) -> AppResult<bool> {
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .map_err(|e| AppError::Internal(format!("password verification task failed: {}", e)))?;
    Ok(verified.unwrap_or(false))
}

// ============================================================================
// Tokens
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,      // User ID
    pub username: String, // Username at issue time
    pub role: String,     // Role name at issue time
    pub exp: i64,         // Expiry timestamp
    pub iat: i64,         // Issued at timestamp
}

pub fn create_access_token(config: &AppConfig, user: &User, role: &str) -> AppResult<String> {
    let now = Utc::now();
    let claims = Claims {
        sub: user.id.to_string(),
        username: user.username.clone(),
        role: role.to_string(),
        exp: (now + Duration::minutes(config.access_token_minutes)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(format!("token encoding failed: {}", e)))
}

pub fn verify_access_token(
    config: &AppConfig,
    token: &str,
) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

// ============================================================================
// Login
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
    pub user: User,
    pub role: &'static str,
}

/// Accepts an email or a username. Inactive accounts cannot log in.
pub async fn login(state: &AppState, login: &str, password: &str) -> AppResult<LoginOutcome> {
    let login = login.trim();
    if login.is_empty() || password.is_empty() {
        return Err(AppError::validation("Login and password are required"));
    }

    let invalid = || AppError::Unauthorized("Invalid credentials".to_string());
    let user = state.store.user_by_login(login).await?.ok_or_else(invalid)?;
    if !verify_password(password.to_string(), user.password_hash.clone()).await? {
        tracing::warn!(login = %login, "failed login attempt");
        return Err(invalid());
    }
    if !user.is_active {
        return Err(AppError::Unauthorized(
            "Account is not verified yet".to_string(),
        ));
    }

    let role = state.store.resolve_role(user.id).await?;
    let access_token = create_access_token(&state.config, &user, role.name())?;
    tracing::info!(user_id = %user.id, role = role.name(), "user logged in");

    Ok(LoginOutcome {
        access_token,
        token_type: "Bearer",
        expires_in: state.config.access_token_minutes * 60,
        role: role.name(),
        user,
    })
}

// ============================================================================
// Extractor
// ============================================================================

/// The authenticated caller with its role resolved once for the request.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user: User,
    pub role: UserRole,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;
        let claims = verify_access_token(&state.config, token)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;
        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        let user = state
            .store
            .user_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or_else(|| AppError::Unauthorized("Account no longer active".to_string()))?;
        let role = state.store.resolve_role(user.id).await?;

        Ok(AuthUser { user, role })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SubscriptionPlan;
    use crate::testing::{test_config, TestContext};
    use axum::http::HeaderValue;

    #[test]
    fn test_verify_access_token_invalid_returns_err() {
        assert!(verify_access_token(&test_config(), "invalid.jwt.token").is_err());
    }

    #[test]
    fn test_token_round_trip_keeps_role() {
        let config = test_config();
        let user = User {
            id: Uuid::new_v4(),
            username: "lena".into(),
            email: "lena@x.com".into(),
            password_hash: String::new(),
            is_active: true,
            created_at: Utc::now(),
        };
        let token = create_access_token(&config, &user, "artist").unwrap();
        let claims = verify_access_token(&config, &token).unwrap();
        assert_eq!(claims.sub, user.id.to_string());
        assert_eq!(claims.role, "artist");

        let other = AppConfig {
            jwt_secret: "other".into(),
            ..test_config()
        };
        assert!(verify_access_token(&other, &token).is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert("authorization", HeaderValue::from_static("Bearer abc"));
        assert_eq!(extract_bearer_token(&headers), Some("abc"));
        headers.insert("authorization", HeaderValue::from_static("Basic abc"));
        assert!(extract_bearer_token(&headers).is_none());
    }

    #[tokio::test]
    async fn test_password_hash_and_verify() {
        let hash = hash_password("secret123".into(), 4).await.unwrap();
        assert!(verify_password("secret123".into(), hash.clone()).await.unwrap());
        assert!(!verify_password("wrong".into(), hash).await.unwrap());
        assert!(!verify_password("x".into(), "not-a-hash".into()).await.unwrap());
    }

    #[tokio::test]
    async fn test_login_by_email_or_username() {
        let ctx = TestContext::new();
        ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;

        let by_email = login(&ctx.state, "LENA@x.com", "password123").await.unwrap();
        assert_eq!(by_email.role, "artist");
        let by_name = login(&ctx.state, "lena", "password123").await.unwrap();
        assert_eq!(by_name.user.email, "lena@x.com");
        assert!(matches!(
            login(&ctx.state, "lena", "wrong-password").await,
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            login(&ctx.state, "", "x").await,
            Err(AppError::Validation(_))
        ));
    }
}
