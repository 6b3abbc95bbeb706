/**
 * Explorer Routes
 * The explorer's own profile
 */
use axum::{extract::State, Json};

use crate::db::models::ExplorerChanges;
use crate::error::AppResult;
use crate::services::auth::AuthUser;
use crate::services::explorers::{self, ExplorerView};
use crate::services::require_explorer;
use crate::state::AppState;

const EXPLORERS_ONLY: &str = "Only explorers have an explorer profile";

/// GET /api/explorers/me
pub async fn get_profile(auth: AuthUser) -> AppResult<Json<ExplorerView>> {
    let profile = require_explorer(&auth.role, EXPLORERS_ONLY)?;
    Ok(Json(profile.clone().into()))
}

/// PATCH /api/explorers/me
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(changes): Json<ExplorerChanges>,
) -> AppResult<Json<ExplorerView>> {
    let profile = require_explorer(&auth.role, EXPLORERS_ONLY)?;
    Ok(Json(explorers::update(&state, profile, changes).await?))
}

#[cfg(test)]
mod tests {
    use crate::testing::{send, TestContext};
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    #[tokio::test]
    async fn test_get_and_patch_profile() {
        let ctx = TestContext::new();
        let explorer = ctx.explorer("a@x.com").await;
        let token = ctx.token(&explorer).await;
        let app = crate::create_app(ctx.state.clone());

        let (status, body) = send(app.clone(), Method::GET, "/api/explorers/me", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["completeness"]["isComplete"], false);

        let (status, body) = send(
            app,
            Method::PATCH,
            "/api/explorers/me",
            Some(&token),
            Some(json!({"firstName": "  Ana ", "city": "Austin"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["profile"]["firstName"], "Ana");
        assert_eq!(body["profile"]["city"], "Austin");
    }

    #[tokio::test]
    async fn test_requires_token() {
        let ctx = TestContext::new();
        let (status, body) = send(
            crate::create_app(ctx.state),
            Method::GET,
            "/api/explorers/me",
            None,
            None,
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }
}
