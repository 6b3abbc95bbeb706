//! Explorer profile read and update.

use serde::Serialize;

use super::completeness::{check_explorer_completeness, Completeness};
use crate::db::models::{ExplorerChanges, ExplorerProfile};
use crate::error::AppResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerView {
    pub profile: ExplorerProfile,
    pub completeness: Completeness,
}

impl From<ExplorerProfile> for ExplorerView {
    fn from(profile: ExplorerProfile) -> Self {
        Self {
            completeness: check_explorer_completeness(&profile),
            profile,
        }
    }
}

fn trimmed(value: &mut Option<String>) {
    if let Some(v) = value.as_mut() {
        *v = v.trim().to_string();
    }
}

pub async fn update(
    state: &AppState,
    profile: &ExplorerProfile,
    mut changes: ExplorerChanges,
) -> AppResult<ExplorerView> {
    for field in [
        &mut changes.first_name,
        &mut changes.last_name,
        &mut changes.phone_number,
        &mut changes.street_number,
        &mut changes.street_address,
        &mut changes.city,
        &mut changes.state,
        &mut changes.zip_code,
        &mut changes.promotion_keywords,
    ] {
        trimmed(field);
    }
    let updated = state.store.update_explorer(profile.id, &changes).await?;
    tracing::debug!(explorer_id = %updated.id, "explorer profile updated");
    Ok(updated.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::UserRole;
    use crate::db::store::Store;
    use crate::testing::TestContext;

    #[tokio::test]
    async fn test_update_trims_and_reports_completeness() {
        let ctx = TestContext::new();
        let user = ctx.explorer("e@x.com").await;
        let UserRole::Explorer(profile) = ctx.store.resolve_role(user.id).await.unwrap() else {
            panic!("expected explorer role");
        };

        let view = update(
            &ctx.state,
            &profile,
            ExplorerChanges {
                first_name: Some("  Ada ".into()),
                city: Some("London".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(view.profile.first_name, "Ada");
        assert!(!view.completeness.is_complete);
        assert!(!view.completeness.missing.contains(&"city".to_string()));

        let view = update(
            &ctx.state,
            &view.profile,
            ExplorerChanges {
                first_name: Some("Grace".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(view.profile.first_name, "Ada");
    }
}
