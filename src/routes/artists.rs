/**
 * Artist Routes
 * Public directory, artist detail and the owner's dashboard
 */
use axum::{
    extract::{Path, Query, State},
    Json,
};

use crate::db::models::ProfileChanges;
use crate::error::AppResult;
use crate::services::auth::AuthUser;
use crate::services::listing::{self, ArtistDetail, ArtistPage, ListingParams};
use crate::services::visibility::{self, Dashboard};
use crate::services::require_artist;
use crate::state::AppState;

/// GET /api/artists?q=&location=&page=&page_size=
pub async fn list_artists(
    State(state): State<AppState>,
    Query(params): Query<ListingParams>,
) -> AppResult<Json<ArtistPage>> {
    let pagination = params.pagination(&state.config)?;
    Ok(Json(
        listing::list_artists(&state, params.filter(), pagination).await?,
    ))
}

/// GET /api/artists/featured?page=&page_size=
pub async fn list_featured(
    State(state): State<AppState>,
    Query(params): Query<ListingParams>,
) -> AppResult<Json<ArtistPage>> {
    let pagination = params.pagination(&state.config)?;
    Ok(Json(listing::list_featured(&state, pagination).await?))
}

/// GET /api/artists/{slug} - Visible profile with its portfolio
pub async fn get_artist(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> AppResult<Json<ArtistDetail>> {
    Ok(Json(listing::artist_detail(&state, &slug).await?))
}

/// GET /api/artists/me - Owner dashboard
pub async fn get_dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Dashboard>> {
    let profile = require_artist(&auth.role)?;
    Ok(Json(visibility::dashboard(&state, profile.id).await?))
}

/// PATCH /api/artists/me - Partial profile update, returns the dashboard
pub async fn update_dashboard(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(changes): Json<ProfileChanges>,
) -> AppResult<Json<Dashboard>> {
    let profile = require_artist(&auth.role)?;
    visibility::update_profile(&state, profile.id, changes).await?;
    Ok(Json(visibility::dashboard(&state, profile.id).await?))
}
