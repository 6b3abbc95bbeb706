/**
 * Bookmark Routes
 * Explorer bookmarks of artist profiles
 */
use axum::{
    extract::{Path, State},
    Json,
};

use crate::db::models::ArtistProfile;
use crate::error::AppResult;
use crate::services::auth::AuthUser;
use crate::services::bookmarks::{self, BookmarkState};
use crate::state::AppState;

/// GET /api/bookmarks
pub async fn list_bookmarks(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<ArtistProfile>>> {
    Ok(Json(bookmarks::list(&state, &auth.role).await?))
}

/// GET /api/bookmarks/{slug}
pub async fn check_bookmark(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(slug): Path<String>,
) -> AppResult<Json<BookmarkState>> {
    Ok(Json(bookmarks::check(&state, &auth.role, &slug).await?))
}

/// POST /api/bookmarks/{slug} - Toggle
pub async fn toggle_bookmark(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(slug): Path<String>,
) -> AppResult<Json<BookmarkState>> {
    Ok(Json(bookmarks::toggle(&state, &auth.role, &slug).await?))
}

#[cfg(test)]
mod tests {
    use crate::db::models::SubscriptionPlan;
    use crate::testing::{send, TestContext};
    use axum::http::{Method, StatusCode};

    #[tokio::test]
    async fn test_toggle_round_trip_over_http() {
        let ctx = TestContext::new();
        let artist = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let slug = ctx.publish(artist.id).await;
        let explorer = ctx.explorer("a@x.com").await;
        let token = ctx.token(&explorer).await;
        let app = crate::create_app(ctx.state.clone());
        let uri = format!("/api/bookmarks/{}", slug);

        let (status, body) = send(app.clone(), Method::POST, &uri, Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bookmarked"], true);

        let (_, body) = send(app.clone(), Method::GET, "/api/bookmarks", Some(&token), None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (_, body) = send(app.clone(), Method::POST, &uri, Some(&token), None).await;
        assert_eq!(body["bookmarked"], false);

        let (_, body) = send(app, Method::GET, &uri, Some(&token), None).await;
        assert_eq!(body["bookmarked"], false);
    }

    #[tokio::test]
    async fn test_artists_cannot_bookmark() {
        let ctx = TestContext::new();
        let artist = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let token = ctx.token(&artist).await;
        let (status, _) = send(
            crate::create_app(ctx.state),
            Method::GET,
            "/api/bookmarks",
            Some(&token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
