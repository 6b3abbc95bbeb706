//! Rating Aggregator.
//!
//! The stored artist mean is never edited directly: every rating write
//! recomputes it from all current rows inside the same storage transaction.

use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::Value;

use super::{require_explorer, visible_artist};
use crate::db::models::{Rating, RatingWrite, UserRole};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Arithmetic mean rounded half away from zero to one decimal, `None` when
/// there are no ratings.
pub fn mean_rating(values: &[i16]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: i64 = values.iter().map(|v| i64::from(*v)).sum();
    let mean = Decimal::from(sum) / Decimal::from(values.len() as i64);
    Some(mean.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
}

/// Accepts an integer, or a string holding one, in 1..=5.
pub fn parse_rating_value(value: &Value) -> AppResult<i16> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    match parsed {
        Some(v @ 1..=5) => Ok(v as i16),
        _ => Err(AppError::validation(
            "Rating must be an integer between 1 and 5",
        )),
    }
}

fn rater(role: &UserRole) -> AppResult<uuid::Uuid> {
    if matches!(role, UserRole::Artist(_)) {
        return Err(AppError::forbidden("Artists cannot rate artists"));
    }
    require_explorer(role, "Only explorers can rate artists").map(|e| e.id)
}

/// Upsert the caller's rating of a visible artist.
pub async fn submit_rating(
    state: &AppState,
    role: &UserRole,
    slug: &str,
    value: i16,
) -> AppResult<RatingWrite> {
    if !(1..=5).contains(&value) {
        return Err(AppError::validation(
            "Rating must be an integer between 1 and 5",
        ));
    }
    let explorer_id = rater(role)?;
    let artist = visible_artist(state, slug).await?;

    let write = state
        .store
        .upsert_rating(artist.id, explorer_id, value)
        .await?;
    tracing::info!(
        artist_id = %artist.id,
        explorer_id = %explorer_id,
        value,
        created = write.created,
        mean = ?write.artist_rating,
        "rating recorded"
    );

    state.cache.artist_changed(None, &artist.slug).await;
    Ok(write)
}

pub async fn get_rating(state: &AppState, role: &UserRole, slug: &str) -> AppResult<Option<Rating>> {
    let explorer_id = rater(role)?;
    let artist = state
        .store
        .artist_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::not_found("Artist not found"))?;
    Ok(state.store.rating_for(artist.id, explorer_id).await?)
}

/// Remove the caller's rating; returns the recomputed mean.
pub async fn delete_rating(
    state: &AppState,
    role: &UserRole,
    slug: &str,
) -> AppResult<Option<Decimal>> {
    let explorer_id = rater(role)?;
    let artist = state
        .store
        .artist_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::not_found("Artist not found"))?;

    let mean = state
        .store
        .delete_rating(artist.id, explorer_id)
        .await?
        .ok_or_else(|| AppError::not_found("Rating not found"))?;
    tracing::info!(artist_id = %artist.id, explorer_id = %explorer_id, mean = ?mean, "rating removed");

    state.cache.artist_changed(None, &artist.slug).await;
    Ok(mean)
}
