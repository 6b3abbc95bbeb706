//! Portfolio images: validation, file storage and plan quota.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use crate::db::models::{ArtistProfile, NewPortfolioImage, PortfolioImage};
use crate::db::store::StoreError;
use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const PUBLIC_PREFIX: &str = "/uploads/portfolio";
const ALLOWED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif"];
const MAX_CAPTION_LEN: usize = 200;

/// One file taken from a multipart upload.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

fn validate_image_magic_bytes(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 4 {
        return None;
    }
    match bytes {
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47, ..] => Some("image/png"),
        // GIF: 47 49 46 38
        [0x47, 0x49, 0x46, 0x38, ..] => Some("image/gif"),
        // WebP: 52 49 46 46 ... 57 45 42 50
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for_mime(mime: &str) -> &'static str {
    match mime {
        "image/jpeg" => "jpg",
        "image/png" => "png",
        "image/gif" => "gif",
        _ => "webp",
    }
}

/// Returns the extension the file is stored under, taken from its content.
pub fn validate_image(upload: &ImageUpload, max_bytes: usize) -> AppResult<&'static str> {
    let declared = upload
        .file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    if !ALLOWED_EXTENSIONS.contains(&declared.as_str()) {
        return Err(AppError::validation(format!(
            "{}: unsupported file type. Allowed: JPEG, PNG, WebP, GIF.",
            upload.file_name
        )));
    }
    if upload.bytes.is_empty() {
        return Err(AppError::validation(format!("{}: file is empty", upload.file_name)));
    }
    if upload.bytes.len() > max_bytes {
        return Err(AppError::validation(format!(
            "{}: file too large. Maximum size is {} bytes.",
            upload.file_name, max_bytes
        )));
    }
    validate_image_magic_bytes(&upload.bytes)
        .map(extension_for_mime)
        .ok_or_else(|| {
            AppError::validation(format!(
                "{}: file content is not a valid image",
                upload.file_name
            ))
        })
}

fn stored_path(upload_dir: &str, image_url: &str) -> Option<PathBuf> {
    let file = image_url.strip_prefix(PUBLIC_PREFIX)?.trim_start_matches('/');
    if file.is_empty() || file.contains("..") || file.contains('/') || file.contains('\\') {
        return None;
    }
    Some(Path::new(upload_dir).join(file))
}

async fn remove_files(paths: &[PathBuf]) {
    for path in paths {
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(path = %path.display(), error = %e, "failed to remove image file");
        }
    }
}

pub async fn list_images(state: &AppState, artist: &ArtistProfile) -> AppResult<Vec<PortfolioImage>> {
    Ok(state.store.portfolio_images(artist.id).await?)
}

/// Validate, write and record a batch. The plan quota is checked before any
/// file is written and again, authoritatively, inside the storage write.
pub async fn upload_images(
    state: &AppState,
    artist_id: Uuid,
    uploads: Vec<ImageUpload>,
    caption: Option<String>,
) -> AppResult<Vec<PortfolioImage>> {
    if uploads.is_empty() {
        return Err(AppError::validation("No images provided"));
    }
    let caption = caption.map(|c| c.trim().to_string()).unwrap_or_default();
    if caption.chars().count() > MAX_CAPTION_LEN {
        return Err(AppError::validation(format!(
            "Caption must be at most {} characters",
            MAX_CAPTION_LEN
        )));
    }
    let extensions = uploads
        .iter()
        .map(|u| validate_image(u, state.config.max_upload_bytes))
        .collect::<AppResult<Vec<_>>>()?;

    let artist = state
        .store
        .artist_by_id(artist_id)
        .await?
        .ok_or_else(|| AppError::not_found("Artist profile not found"))?;
    let quota = artist.subscription_plan.portfolio_quota();
    let current = state.store.portfolio_images(artist_id).await?.len();
    if current + uploads.len() > quota {
        return Err(StoreError::QuotaExceeded {
            quota,
            remaining: quota.saturating_sub(current),
        }
        .into());
    }

    let upload_dir = PathBuf::from(&state.config.upload_dir);
    tokio::fs::create_dir_all(&upload_dir)
        .await
        .map_err(|e| AppError::Internal(format!("failed to create upload directory: {}", e)))?;

    let mut written = Vec::with_capacity(uploads.len());
    let mut images = Vec::with_capacity(uploads.len());
    for (upload, ext) in uploads.iter().zip(extensions) {
        let file_name = format!("{}.{}", Uuid::new_v4(), ext);
        let path = upload_dir.join(&file_name);
        if let Err(e) = tokio::fs::write(&path, &upload.bytes).await {
            remove_files(&written).await;
            return Err(AppError::Internal(format!("failed to store image: {}", e)));
        }
        written.push(path);
        images.push(NewPortfolioImage {
            image_url: format!("{}/{}", PUBLIC_PREFIX, file_name),
            caption: caption.clone(),
        });
    }

    let created = match state.store.add_portfolio_images(artist_id, images).await {
        Ok(created) => created,
        Err(e) => {
            remove_files(&written).await;
            return Err(e.into());
        }
    };
    tracing::info!(artist_id = %artist_id, count = created.len(), "portfolio images uploaded");

    state.cache.artist_changed(None, &artist.slug).await;
    Ok(created)
}

pub async fn delete_image(state: &AppState, artist: &ArtistProfile, image_id: Uuid) -> AppResult<()> {
    let image = state
        .store
        .delete_portfolio_image(artist.id, image_id)
        .await?
        .ok_or_else(|| AppError::not_found("Image not found"))?;
    if let Some(path) = stored_path(&state.config.upload_dir, &image.image_url) {
        remove_files(&[path]).await;
    }
    tracing::info!(artist_id = %artist.id, image_id = %image_id, "portfolio image deleted");

    state.cache.artist_changed(None, &artist.slug).await;
    Ok(())
}

#[cfg(test)]
pub(crate) const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::SubscriptionPlan;
    use crate::db::store::Store;
    use crate::services::signup;
    use crate::testing::TestContext;

    fn png(name: &str) -> ImageUpload {
        ImageUpload {
            file_name: name.to_string(),
            bytes: PNG.to_vec(),
        }
    }

    #[test]
    fn test_magic_bytes_decide_stored_extension() {
        assert_eq!(validate_image(&png("a.jpg"), 1024).unwrap(), "png");
        let fake = ImageUpload {
            file_name: "a.png".into(),
            bytes: b"<?php echo 1; ?>".to_vec(),
        };
        assert!(validate_image(&fake, 1024).is_err());
        assert!(validate_image(&png("a.exe"), 1024).is_err());
        assert!(validate_image(&png("a.png"), 4).is_err());
    }

    #[test]
    fn test_stored_path_rejects_traversal() {
        assert!(stored_path("up", "/uploads/portfolio/a.png").is_some());
        assert!(stored_path("up", "/uploads/portfolio/../secret").is_none());
        assert!(stored_path("up", "/elsewhere/a.png").is_none());
    }

    #[tokio::test]
    async fn test_quota_then_upgrade_scenario() {
        let ctx = TestContext::new();
        let user = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let artist = ctx.store.artist_by_user(user.id).await.unwrap().unwrap();

        let batch: Vec<_> = (0..6).map(|i| png(&format!("{}.png", i))).collect();
        let created = upload_images(&ctx.state, artist.id, batch, Some("sheet".into()))
            .await
            .unwrap();
        assert_eq!(created.len(), 6);

        let err = upload_images(&ctx.state, artist.id, vec![png("7.png")], None)
            .await
            .unwrap_err();
        match &err {
            AppError::Conflict(msg) => assert!(msg.contains("0 slots remaining")),
            other => panic!("unexpected error: {:?}", other),
        }

        signup::start_plan_change(&ctx.state, &user, &artist, SubscriptionPlan::Premium)
            .await
            .unwrap();
        let session_id = ctx.gateway.settle_last("paid").unwrap();
        signup::complete_payment(&ctx.state, &session_id).await.unwrap();

        let created = upload_images(&ctx.state, artist.id, vec![png("7.png")], None)
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(ctx.store.portfolio_images(artist.id).await.unwrap().len(), 7);
    }

    #[tokio::test]
    async fn test_batch_over_quota_writes_nothing() {
        let ctx = TestContext::new();
        let user = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let artist = ctx.store.artist_by_user(user.id).await.unwrap().unwrap();
        let batch: Vec<_> = (0..7).map(|i| png(&format!("{}.png", i))).collect();
        let err = upload_images(&ctx.state, artist.id, batch, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("6 slots remaining"));
        assert!(ctx.store.portfolio_images(artist.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_own_image() {
        let ctx = TestContext::new();
        let user = ctx.artist("lena@x.com", "lena", SubscriptionPlan::Basic).await;
        let artist = ctx.store.artist_by_user(user.id).await.unwrap().unwrap();
        let created = upload_images(&ctx.state, artist.id, vec![png("a.png")], None)
            .await
            .unwrap();
        let path = stored_path(&ctx.state.config.upload_dir, &created[0].image_url).unwrap();
        assert!(path.exists());

        delete_image(&ctx.state, &artist, created[0].id).await.unwrap();
        assert!(!path.exists());
        assert!(matches!(
            delete_image(&ctx.state, &artist, created[0].id).await,
            Err(AppError::NotFound(_))
        ));
    }
}
