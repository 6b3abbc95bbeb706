//! Profile Completeness Evaluator.
//!
//! Pure functions over a profile's fields. `missing` follows a fixed field
//! priority so callers and tests see a stable order.

use serde::{Deserialize, Serialize};

use crate::db::models::{ArtistProfile, ExplorerProfile};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completeness {
    pub is_complete: bool,
    pub missing: Vec<String>,
}

impl Completeness {
    fn from_checks(checks: &[(&str, bool)]) -> Self {
        let missing: Vec<String> = checks
            .iter()
            .filter(|(_, present)| !present)
            .map(|(field, _)| field.to_string())
            .collect();
        Self {
            is_complete: missing.is_empty(),
            missing,
        }
    }
}

pub fn check_completeness(profile: &ArtistProfile) -> Completeness {
    Completeness::from_checks(&[
        ("artist_name", !profile.artist_name.is_empty()),
        ("slug", !profile.slug.is_empty()),
        ("location_state", !profile.location_state.is_empty()),
        ("location_city", !profile.location_city.is_empty()),
        ("short_bio", !profile.short_bio.is_empty()),
        ("full_bio", !profile.full_bio.is_empty()),
        ("categories", !profile.categories.is_empty()),
        (
            "profile_image",
            profile
                .profile_image_url
                .as_deref()
                .is_some_and(|url| !url.is_empty()),
        ),
    ])
}

pub fn check_explorer_completeness(profile: &ExplorerProfile) -> Completeness {
    Completeness::from_checks(&[
        ("first_name", !profile.first_name.is_empty()),
        ("last_name", !profile.last_name.is_empty()),
        ("phone_number", !profile.phone_number.is_empty()),
        ("street_number", !profile.street_number.is_empty()),
        ("street_address", !profile.street_address.is_empty()),
        ("city", !profile.city.is_empty()),
        ("state", !profile.state.is_empty()),
        ("zip_code", !profile.zip_code.is_empty()),
    ])
}

#[cfg(test)]
pub(crate) fn complete_profile(name: &str) -> ArtistProfile {
    use crate::db::models::{Category, SubscriptionPlan};

    let mut profile =
        ArtistProfile::new(uuid::Uuid::new_v4(), name, name, SubscriptionPlan::Basic);
    profile.location_state = "Texas".to_string();
    profile.location_city = "Austin".to_string();
    profile.short_bio = "Stickers and prints".to_string();
    profile.full_bio = "Handmade stickers and prints since 2019.".to_string();
    profile.categories = vec![Category::Stickers];
    profile.profile_image_url = Some("/uploads/portfolio/me.png".to_string());
    profile
}
