/**
 * Authentication Routes
 * Signup (explorer and artist), OTP verification and login
 */
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::routes::SuccessResponse;
use crate::services::{auth as auth_service, signup};
use crate::state::AppState;

// ============================================================================
// Request Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpVerifyRequest {
    pub email: String,
    #[serde(alias = "otp")]
    pub code: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email or username.
    #[serde(alias = "email", alias = "username")]
    pub login: String,
    pub password: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/signup/explorer
/// Creates an inactive explorer account and emails a verification code
pub async fn signup_explorer(
    State(state): State<AppState>,
    Json(payload): Json<signup::ExplorerSignup>,
) -> AppResult<impl IntoResponse> {
    let started = signup::start_explorer_signup(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// POST /api/auth/signup/artist
/// Records a pending artist signup for the chosen package and emails a code
pub async fn signup_artist(
    State(state): State<AppState>,
    Json(payload): Json<signup::ArtistSignup>,
) -> AppResult<impl IntoResponse> {
    let started = signup::start_artist_signup(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// POST /api/auth/otp/request
pub async fn request_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpRequest>,
) -> AppResult<Json<SuccessResponse>> {
    signup::request_otp(&state, &payload.email).await?;
    Ok(Json(SuccessResponse::new("Verification code sent")))
}

/// POST /api/auth/otp/verify
/// Activates explorers; returns a checkout redirect for artists
pub async fn verify_otp(
    State(state): State<AppState>,
    Json(payload): Json<OtpVerifyRequest>,
) -> AppResult<Json<signup::VerifyOutcome>> {
    Ok(Json(
        signup::verify_otp(&state, &payload.email, &payload.code).await?,
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> AppResult<Json<auth_service::LoginOutcome>> {
    Ok(Json(
        auth_service::login(&state, &payload.login, &payload.password).await?,
    ))
}
