/*!
 * Services Module
 * Domain operations shared by the HTTP handlers and the admin binaries
 */
pub mod auth;
pub mod bookmarks;
pub mod completeness;
pub mod explorers;
pub mod listing;
pub mod naming;
pub mod portfolio;
pub mod ratings;
pub mod signup;
pub mod visibility;

use crate::db::models::{ArtistProfile, ExplorerProfile, UserRole};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub(crate) fn require_explorer<'a>(
    role: &'a UserRole,
    denial: &str,
) -> AppResult<&'a ExplorerProfile> {
    match role {
        UserRole::Explorer(profile) => Ok(profile),
        _ => Err(AppError::forbidden(denial)),
    }
}

pub(crate) fn require_artist<'a>(role: &'a UserRole) -> AppResult<&'a ArtistProfile> {
    match role {
        UserRole::Artist(profile) => Ok(profile),
        _ => Err(AppError::forbidden("Only artists can do this")),
    }
}

/// Public lookup: hidden profiles are indistinguishable from absent ones.
pub(crate) async fn visible_artist(state: &AppState, slug: &str) -> AppResult<ArtistProfile> {
    match state.store.artist_by_slug(slug).await? {
        Some(profile) if profile.is_visible => Ok(profile),
        _ => Err(AppError::not_found("Artist not found")),
    }
}
