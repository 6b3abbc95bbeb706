/**
 * Portfolio Routes
 * The authenticated artist's image gallery
 */
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;

use crate::db::models::PortfolioImage;
use crate::error::{AppError, AppResult};
use crate::services::auth::AuthUser;
use crate::services::portfolio::{self, ImageUpload};
use crate::services::require_artist;
use crate::state::AppState;

/// Multipart requests carry several images; the global cap is raised to this
/// on the upload route only.
pub const MAX_BATCH_BYTES: usize = 32 * 1024 * 1024;

/// GET /api/portfolio
pub async fn list_images(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<PortfolioImage>>> {
    let profile = require_artist(&auth.role)?;
    Ok(Json(portfolio::list_images(&state, profile).await?))
}

/// POST /api/portfolio - multipart: one or more file fields plus an
/// optional "caption" text field
pub async fn upload_images(
    State(state): State<AppState>,
    auth: AuthUser,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let profile = require_artist(&auth.role)?;

    let mut uploads = Vec::new();
    let mut caption = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        tracing::warn!("Multipart error: {}", e);
        AppError::validation("Invalid multipart data")
    })? {
        if field.name() == Some("caption") {
            caption = Some(
                field
                    .text()
                    .await
                    .map_err(|_| AppError::validation("Invalid caption field"))?,
            );
            continue;
        }
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let bytes = field.bytes().await.map_err(|e| {
            tracing::warn!(file = %file_name, "Failed to read upload: {}", e);
            AppError::validation("Failed to read uploaded file")
        })?;
        uploads.push(ImageUpload {
            file_name,
            bytes: bytes.to_vec(),
        });
    }

    let created = portfolio::upload_images(&state, profile.id, uploads, caption).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// DELETE /api/portfolio/{id}
pub async fn delete_image(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(image_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    let profile = require_artist(&auth.role)?;
    portfolio::delete_image(&state, profile, image_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
