//! Visibility Gate and the artist dashboard.
//!
//! Visibility is a one-way ratchet: an edit that leaves a visible profile
//! incomplete demotes it, but nothing here ever turns visibility back on
//! unless the caller asks for it with every mandatory field present.

use serde::Serialize;
use uuid::Uuid;

use super::completeness::{check_completeness, Completeness};
use super::naming::is_valid_slug;
use crate::db::models::{ArtistProfile, ProfileChanges, Subscription};
use crate::db::store::{StoreError, UniqueField};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub profile: ArtistProfile,
    pub completeness: Completeness,
    pub portfolio_count: usize,
    pub portfolio_quota: usize,
    pub subscription: Option<Subscription>,
}

pub async fn dashboard(state: &AppState, artist_id: Uuid) -> AppResult<Dashboard> {
    let profile = state
        .store
        .artist_by_id(artist_id)
        .await?
        .ok_or_else(|| AppError::not_found("Artist profile not found"))?;
    let portfolio_count = state.store.portfolio_images(profile.id).await?.len();
    let subscription = state.store.subscription_for(profile.user_id).await?;

    Ok(Dashboard {
        completeness: check_completeness(&profile),
        portfolio_quota: profile.subscription_plan.portfolio_quota(),
        portfolio_count,
        subscription,
        profile,
    })
}

/// Persist the provided fields, then demote visibility if the stored result
/// is no longer complete.
pub async fn update_profile(
    state: &AppState,
    artist_id: Uuid,
    mut changes: ProfileChanges,
) -> AppResult<ArtistProfile> {
    if let Some(slug) = changes.slug.as_mut() {
        *slug = slug.trim().to_string();
        if !is_valid_slug(slug) {
            return Err(AppError::validation(
                "Slug may only contain lowercase letters, digits and single hyphens",
            ));
        }
    }

    let current = state
        .store
        .artist_by_id(artist_id)
        .await?
        .ok_or_else(|| AppError::not_found("Artist profile not found"))?;
    if changes.is_empty() {
        return Ok(current);
    }

    if changes.is_visible == Some(true) {
        let mut merged = current.clone();
        changes.apply_to(&mut merged);
        let report = check_completeness(&merged);
        if !report.is_complete {
            return Err(AppError::validation(format!(
                "Profile is incomplete. Missing fields: {}",
                report.missing.join(", ")
            )));
        }
    }

    let mut updated = match state.store.update_artist(artist_id, &changes).await {
        Ok(profile) => profile,
        Err(StoreError::UniqueViolation(UniqueField::Slug)) => {
            return Err(AppError::conflict("That slug is already taken"));
        }
        Err(e) => return Err(e.into()),
    };

    if updated.is_visible && !check_completeness(&updated).is_complete {
        state.store.set_artist_visibility(artist_id, false).await?;
        updated.is_visible = false;
        tracing::info!(
            artist_id = %artist_id,
            slug = %updated.slug,
            "profile hidden after edit left it incomplete"
        );
    }

    state
        .cache
        .artist_changed(Some(&current.slug), &updated.slug)
        .await;
    Ok(updated)
}

/// Admin toggle for the featured flag.
pub async fn set_featured(state: &AppState, slug: &str, featured: bool) -> AppResult<ArtistProfile> {
    let mut profile = state
        .store
        .artist_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::not_found("Artist not found"))?;
    state
        .store
        .set_artist_featured(profile.id, featured)
        .await?;
    profile.is_featured = featured;
    tracing::info!(artist_id = %profile.id, slug = %slug, featured, "featured flag updated");

    state.cache.artist_changed(None, slug).await;
    Ok(profile)
}
