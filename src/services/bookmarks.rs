//! Explorer bookmarks of artist profiles.

use serde::{Deserialize, Serialize};

use super::require_explorer;
use crate::db::models::{ArtistProfile, UserRole};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

const EXPLORERS_ONLY: &str = "Only explorers can bookmark artists";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkState {
    pub slug: String,
    pub bookmarked: bool,
}

/// Hidden artists may still be un-bookmarked, but never newly bookmarked.
pub async fn toggle(state: &AppState, role: &UserRole, slug: &str) -> AppResult<BookmarkState> {
    let explorer = require_explorer(role, EXPLORERS_ONLY)?;
    let artist = state
        .store
        .artist_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::not_found("Artist not found"))?;
    if !artist.is_visible && !state.store.is_bookmarked(explorer.id, artist.id).await? {
        return Err(AppError::not_found("Artist not found"));
    }

    let bookmarked = state.store.toggle_bookmark(explorer.id, artist.id).await?;
    tracing::debug!(explorer_id = %explorer.id, artist_id = %artist.id, bookmarked, "bookmark toggled");
    Ok(BookmarkState {
        slug: artist.slug,
        bookmarked,
    })
}

pub async fn check(state: &AppState, role: &UserRole, slug: &str) -> AppResult<BookmarkState> {
    let explorer = require_explorer(role, EXPLORERS_ONLY)?;
    let artist = state
        .store
        .artist_by_slug(slug)
        .await?
        .ok_or_else(|| AppError::not_found("Artist not found"))?;
    let bookmarked = state.store.is_bookmarked(explorer.id, artist.id).await?;
    Ok(BookmarkState {
        slug: artist.slug,
        bookmarked,
    })
}

/// Bookmarked artists that are currently visible, most recent bookmark first.
pub async fn list(state: &AppState, role: &UserRole) -> AppResult<Vec<ArtistProfile>> {
    let explorer = require_explorer(role, EXPLORERS_ONLY)?;
    let artists = state.store.bookmarked_artists(explorer.id).await?;
    Ok(artists.into_iter().filter(|a| a.is_visible).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{ProfileChanges, SubscriptionPlan};
    use crate::db::store::Store;
    use crate::services::visibility;
    use crate::testing::TestContext;

    #[tokio::test]
    async fn test_toggle_check_and_list() {
        let ctx = TestContext::new();
        let artist = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let slug = ctx.publish(artist.id).await;
        let explorer = ctx.explorer("e@x.com").await;
        let role = ctx.store.resolve_role(explorer.id).await.unwrap();

        assert!(toggle(&ctx.state, &role, &slug).await.unwrap().bookmarked);
        assert!(check(&ctx.state, &role, &slug).await.unwrap().bookmarked);
        assert_eq!(list(&ctx.state, &role).await.unwrap().len(), 1);

        let profile = ctx.store.artist_by_slug(&slug).await.unwrap().unwrap();
        visibility::update_profile(
            &ctx.state,
            profile.id,
            ProfileChanges {
                is_visible: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(list(&ctx.state, &role).await.unwrap().is_empty());

        assert!(!toggle(&ctx.state, &role, &slug).await.unwrap().bookmarked);
        assert!(matches!(
            toggle(&ctx.state, &role, &slug).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_only_explorers_bookmark() {
        let ctx = TestContext::new();
        let artist = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let slug = ctx.publish(artist.id).await;
        let role = ctx.store.resolve_role(artist.id).await.unwrap();
        assert!(matches!(
            toggle(&ctx.state, &role, &slug).await,
            Err(AppError::PermissionDenied(_))
        ));
    }
}
