/**
 * Rating Routes
 * Explorer ratings of artists; every write answers with the new artist mean
 */
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db::models::Rating;
use crate::error::AppResult;
use crate::services::auth::AuthUser;
use crate::services::ratings;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct RatingRequest {
    #[serde(alias = "value")]
    pub rating: Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RatingResponse {
    pub rating: Option<Rating>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<bool>,
    pub artist_rating: Option<Decimal>,
}

/// POST /api/artists/{slug}/rating - 201 on first rating, 200 on update
pub async fn submit_rating(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(slug): Path<String>,
    Json(payload): Json<RatingRequest>,
) -> AppResult<impl IntoResponse> {
    let value = ratings::parse_rating_value(&payload.rating)?;
    let write = ratings::submit_rating(&state, &auth.role, &slug, value).await?;
    let status = if write.created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((
        status,
        Json(RatingResponse {
            rating: Some(write.rating),
            created: Some(write.created),
            artist_rating: write.artist_rating,
        }),
    ))
}

/// GET /api/artists/{slug}/rating - The caller's own rating, if any
pub async fn get_rating(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(slug): Path<String>,
) -> AppResult<Json<Option<Rating>>> {
    Ok(Json(ratings::get_rating(&state, &auth.role, &slug).await?))
}

/// DELETE /api/artists/{slug}/rating
pub async fn delete_rating(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(slug): Path<String>,
) -> AppResult<Json<RatingResponse>> {
    let artist_rating = ratings::delete_rating(&state, &auth.role, &slug).await?;
    Ok(Json(RatingResponse {
        rating: None,
        created: None,
        artist_rating,
    }))
}
