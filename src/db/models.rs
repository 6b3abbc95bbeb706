//! Database Models - canonical records shared by both storage backends.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::db::store::StoreError;

/// Subscription plan. Only the payment flow changes it after signup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionPlan {
    Basic,
    Express,
    Premium,
}

impl SubscriptionPlan {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionPlan::Basic => "basic",
            SubscriptionPlan::Express => "express",
            SubscriptionPlan::Premium => "premium",
        }
    }

    /// Maximum number of portfolio images the plan allows.
    pub fn portfolio_quota(&self) -> usize {
        match self {
            SubscriptionPlan::Basic | SubscriptionPlan::Express => 6,
            SubscriptionPlan::Premium => 50,
        }
    }
}

impl fmt::Display for SubscriptionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionPlan {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "basic" => Ok(SubscriptionPlan::Basic),
            "express" => Ok(SubscriptionPlan::Express),
            "premium" => Ok(SubscriptionPlan::Premium),
            other => Err(format!("unknown subscription plan '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "stickers")]
    Stickers,
    #[serde(rename = "fan_art")]
    FanArt,
    #[serde(rename = "keychains")]
    Keychains,
    #[serde(rename = "prints")]
    Prints,
    #[serde(rename = "t-shirts")]
    TShirts,
    #[serde(rename = "posters")]
    Posters,
    #[serde(rename = "pins")]
    Pins,
    #[serde(rename = "mugs")]
    Mugs,
    #[serde(rename = "other")]
    Other,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Stickers => "stickers",
            Category::FanArt => "fan_art",
            Category::Keychains => "keychains",
            Category::Prints => "prints",
            Category::TShirts => "t-shirts",
            Category::Posters => "posters",
            Category::Pins => "pins",
            Category::Mugs => "mugs",
            Category::Other => "other",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stickers" => Ok(Category::Stickers),
            "fan_art" => Ok(Category::FanArt),
            "keychains" => Ok(Category::Keychains),
            "prints" => Ok(Category::Prints),
            "t-shirts" => Ok(Category::TShirts),
            "posters" => Ok(Category::Posters),
            "pins" => Ok(Category::Pins),
            "mugs" => Ok(Category::Mugs),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// Account record. Inactive until the signup flow verifies it.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ArtistProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub artist_name: String,
    pub slug: String,
    pub short_bio: String,
    pub full_bio: String,
    pub location_city: String,
    pub location_state: String,
    pub product_keywords: String,
    pub seo_tags: String,
    pub categories: Vec<Category>,
    pub etsy_url: String,
    pub shopify_url: String,
    pub instagram_url: String,
    pub tiktok_url: String,
    pub profile_image_url: Option<String>,
    pub banner_image_url: Option<String>,
    pub subscription_plan: SubscriptionPlan,
    pub rating: Option<Decimal>,
    pub is_featured: bool,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ArtistProfile {
    /// A freshly activated profile: everything optional left blank, hidden.
    pub fn new(user_id: Uuid, artist_name: &str, slug: &str, plan: SubscriptionPlan) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            artist_name: artist_name.to_string(),
            slug: slug.to_string(),
            short_bio: String::new(),
            full_bio: String::new(),
            location_city: String::new(),
            location_state: String::new(),
            product_keywords: String::new(),
            seo_tags: String::new(),
            categories: Vec::new(),
            etsy_url: String::new(),
            shopify_url: String::new(),
            instagram_url: String::new(),
            tiktok_url: String::new(),
            profile_image_url: None,
            banner_image_url: None,
            subscription_plan: plan,
            rating: None,
            is_featured: false,
            is_visible: false,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Raw `artist_profiles` row; enum columns are stored as text.
#[derive(Debug, Clone, FromRow)]
pub struct ArtistRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub artist_name: String,
    pub slug: String,
    pub short_bio: String,
    pub full_bio: String,
    pub location_city: String,
    pub location_state: String,
    pub product_keywords: String,
    pub seo_tags: String,
    pub categories: Vec<String>,
    pub etsy_url: String,
    pub shopify_url: String,
    pub instagram_url: String,
    pub tiktok_url: String,
    pub profile_image_url: Option<String>,
    pub banner_image_url: Option<String>,
    pub subscription_plan: String,
    pub rating: Option<Decimal>,
    pub is_featured: bool,
    pub is_visible: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<ArtistRow> for ArtistProfile {
    type Error = StoreError;

    fn try_from(row: ArtistRow) -> Result<Self, Self::Error> {
        let subscription_plan = row
            .subscription_plan
            .parse::<SubscriptionPlan>()
            .map_err(StoreError::Corrupt)?;
        let categories = row
            .categories
            .iter()
            .filter_map(|c| match c.parse::<Category>() {
                Ok(category) => Some(category),
                Err(e) => {
                    tracing::warn!(artist_id = %row.id, error = %e, "skipping stored category");
                    None
                }
            })
            .collect();

        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            artist_name: row.artist_name,
            slug: row.slug,
            short_bio: row.short_bio,
            full_bio: row.full_bio,
            location_city: row.location_city,
            location_state: row.location_state,
            product_keywords: row.product_keywords,
            seo_tags: row.seo_tags,
            categories,
            etsy_url: row.etsy_url,
            shopify_url: row.shopify_url,
            instagram_url: row.instagram_url,
            tiktok_url: row.tiktok_url,
            profile_image_url: row.profile_image_url,
            banner_image_url: row.banner_image_url,
            subscription_plan,
            rating: row.rating,
            is_featured: row.is_featured,
            is_visible: row.is_visible,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Partial update of an artist's owner-editable fields. `None` leaves the
/// field untouched; an empty image reference clears the image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileChanges {
    pub artist_name: Option<String>,
    pub slug: Option<String>,
    pub short_bio: Option<String>,
    pub full_bio: Option<String>,
    pub location_city: Option<String>,
    pub location_state: Option<String>,
    pub product_keywords: Option<String>,
    pub seo_tags: Option<String>,
    pub categories: Option<Vec<Category>>,
    pub etsy_url: Option<String>,
    pub shopify_url: Option<String>,
    pub instagram_url: Option<String>,
    pub tiktok_url: Option<String>,
    pub profile_image_url: Option<String>,
    pub banner_image_url: Option<String>,
    pub is_visible: Option<bool>,
}

pub(crate) fn image_ref(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl ProfileChanges {
    pub fn is_empty(&self) -> bool {
        self.artist_name.is_none()
            && self.slug.is_none()
            && self.short_bio.is_none()
            && self.full_bio.is_none()
            && self.location_city.is_none()
            && self.location_state.is_none()
            && self.product_keywords.is_none()
            && self.seo_tags.is_none()
            && self.categories.is_none()
            && self.etsy_url.is_none()
            && self.shopify_url.is_none()
            && self.instagram_url.is_none()
            && self.tiktok_url.is_none()
            && self.profile_image_url.is_none()
            && self.banner_image_url.is_none()
            && self.is_visible.is_none()
    }

    /// Apply the provided fields onto `profile` in place.
    pub fn apply_to(&self, profile: &mut ArtistProfile) {
        fn set(target: &mut String, value: &Option<String>) {
            if let Some(v) = value {
                *target = v.clone();
            }
        }

        set(&mut profile.artist_name, &self.artist_name);
        set(&mut profile.slug, &self.slug);
        set(&mut profile.short_bio, &self.short_bio);
        set(&mut profile.full_bio, &self.full_bio);
        set(&mut profile.location_city, &self.location_city);
        set(&mut profile.location_state, &self.location_state);
        set(&mut profile.product_keywords, &self.product_keywords);
        set(&mut profile.seo_tags, &self.seo_tags);
        set(&mut profile.etsy_url, &self.etsy_url);
        set(&mut profile.shopify_url, &self.shopify_url);
        set(&mut profile.instagram_url, &self.instagram_url);
        set(&mut profile.tiktok_url, &self.tiktok_url);
        if let Some(categories) = &self.categories {
            profile.categories = categories.clone();
        }
        if let Some(url) = &self.profile_image_url {
            profile.profile_image_url = image_ref(url);
        }
        if let Some(url) = &self.banner_image_url {
            profile.banner_image_url = image_ref(url);
        }
        if let Some(visible) = self.is_visible {
            profile.is_visible = visible;
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioImage {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub image_url: String,
    pub caption: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewPortfolioImage {
    pub image_url: String,
    pub caption: String,
}

/// One explorer's opinion of one artist; unique per (artist, explorer).
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Rating {
    pub id: Uuid,
    pub artist_id: Uuid,
    pub explorer_id: Uuid,
    pub value: i16,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a rating upsert, including the recomputed artist mean.
#[derive(Debug, Clone)]
pub struct RatingWrite {
    pub rating: Rating,
    pub created: bool,
    pub artist_rating: Option<Decimal>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerProfile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
    pub street_number: String,
    pub street_address: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub promotion_keywords: String,
}

impl ExplorerProfile {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            first_name: String::new(),
            last_name: String::new(),
            phone_number: String::new(),
            street_number: String::new(),
            street_address: String::new(),
            city: String::new(),
            state: String::new(),
            zip_code: String::new(),
            promotion_keywords: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplorerChanges {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone_number: Option<String>,
    pub street_number: Option<String>,
    pub street_address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub promotion_keywords: Option<String>,
}

impl ExplorerChanges {
    /// Names are only accepted while still empty on the profile.
    pub fn apply_to(&self, profile: &mut ExplorerProfile) {
        if let Some(v) = &self.first_name {
            if profile.first_name.is_empty() {
                profile.first_name = v.clone();
            }
        }
        if let Some(v) = &self.last_name {
            if profile.last_name.is_empty() {
                profile.last_name = v.clone();
            }
        }
        for (target, value) in [
            (&mut profile.phone_number, &self.phone_number),
            (&mut profile.street_number, &self.street_number),
            (&mut profile.street_address, &self.street_address),
            (&mut profile.city, &self.city),
            (&mut profile.state, &self.state),
            (&mut profile.zip_code, &self.zip_code),
            (&mut profile.promotion_keywords, &self.promotion_keywords),
        ] {
            if let Some(v) = value {
                *target = v.clone();
            }
        }
    }
}

/// Position of a signup in the activation state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupState {
    Pending,
    OtpSent,
    Verified,
    AwaitingPayment,
    Paid,
    PaymentFailed,
}

impl SignupState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignupState::Pending => "pending",
            SignupState::OtpSent => "otp_sent",
            SignupState::Verified => "verified",
            SignupState::AwaitingPayment => "awaiting_payment",
            SignupState::Paid => "paid",
            SignupState::PaymentFailed => "payment_failed",
        }
    }

    /// Allowed edges. A restarted signup may always go back to `Pending`, and
    /// a code may be re-requested from any state short of `Paid`. A paid,
    /// correlated session reaches `Paid` from any state.
    pub fn can_transition_to(&self, next: SignupState) -> bool {
        use SignupState::*;
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (_, Pending)
                | (Pending | Verified | AwaitingPayment | PaymentFailed, OtpSent)
                | (OtpSent, Verified)
                | (Verified | PaymentFailed, AwaitingPayment)
                | (_, Paid)
                | (AwaitingPayment, PaymentFailed)
        )
    }
}

impl FromStr for SignupState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SignupState::Pending),
            "otp_sent" => Ok(SignupState::OtpSent),
            "verified" => Ok(SignupState::Verified),
            "awaiting_payment" => Ok(SignupState::AwaitingPayment),
            "paid" => Ok(SignupState::Paid),
            "payment_failed" => Ok(SignupState::PaymentFailed),
            other => Err(format!("unknown signup state '{}'", other)),
        }
    }
}

/// Transient pre-activation record for the payment-gated artist signup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingArtist {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub package: SubscriptionPlan,
    pub state: SignupState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct PendingArtistRow {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub package: String,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<PendingArtistRow> for PendingArtist {
    type Error = StoreError;

    fn try_from(row: PendingArtistRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            email: row.email,
            username: row.username,
            password_hash: row.password_hash,
            package: row.package.parse().map_err(StoreError::Corrupt)?,
            state: row.state.parse().map_err(StoreError::Corrupt)?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone)]
pub struct NewPendingArtist {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub package: SubscriptionPlan,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway_customer_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    pub plan_name: SubscriptionPlan,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct SubscriptionRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub gateway_customer_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
    pub plan_name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            user_id: row.user_id,
            gateway_customer_id: row.gateway_customer_id,
            gateway_subscription_id: row.gateway_subscription_id,
            plan_name: row.plan_name.parse().map_err(StoreError::Corrupt)?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// New inactive explorer account; the user and its profile are written together.
#[derive(Debug, Clone)]
pub struct NewExplorerAccount {
    pub username: String,
    pub email: String,
    pub password_hash: String,
}

/// Everything needed to turn a paid pending signup into a permanent artist.
#[derive(Debug, Clone)]
pub struct ArtistActivation {
    pub pending_id: Uuid,
    pub username: String,
    pub slug: String,
    /// The plan the settled checkout paid for.
    pub plan: SubscriptionPlan,
    pub gateway_customer_id: Option<String>,
    pub gateway_subscription_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ActivatedArtist {
    pub user: User,
    pub profile: ArtistProfile,
    pub subscription: Subscription,
}

/// Role carried in the request context, resolved once per authenticated request.
#[derive(Debug, Clone)]
pub enum UserRole {
    Artist(ArtistProfile),
    Explorer(ExplorerProfile),
    Unassigned,
}

impl UserRole {
    /// A user may own at most one role profile.
    pub fn from_profiles(
        user_id: Uuid,
        artist: Option<ArtistProfile>,
        explorer: Option<ExplorerProfile>,
    ) -> Result<Self, StoreError> {
        match (artist, explorer) {
            (Some(_), Some(_)) => Err(StoreError::RoleConflict(user_id)),
            (Some(a), None) => Ok(UserRole::Artist(a)),
            (None, Some(e)) => Ok(UserRole::Explorer(e)),
            (None, None) => Ok(UserRole::Unassigned),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UserRole::Artist(_) => "artist",
            UserRole::Explorer(_) => "explorer",
            UserRole::Unassigned => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_quota() {
        assert_eq!(SubscriptionPlan::Basic.portfolio_quota(), 6);
        assert_eq!(SubscriptionPlan::Express.portfolio_quota(), 6);
        assert_eq!(SubscriptionPlan::Premium.portfolio_quota(), 50);
    }

    #[test]
    fn test_category_serde_uses_stored_tags() {
        let json = serde_json::to_string(&vec![Category::TShirts, Category::FanArt]).unwrap();
        assert_eq!(json, r#"["t-shirts","fan_art"]"#);
        assert_eq!("t-shirts".parse::<Category>().unwrap(), Category::TShirts);
        assert!("hats".parse::<Category>().is_err());
    }

    #[test]
    fn test_profile_changes_clear_image_with_empty_string() {
        let mut profile = ArtistProfile::new(Uuid::new_v4(), "A", "a", SubscriptionPlan::Basic);
        profile.profile_image_url = Some("/img.png".to_string());
        let changes = ProfileChanges {
            profile_image_url: Some("  ".to_string()),
            full_bio: Some("bio".to_string()),
            ..Default::default()
        };
        changes.apply_to(&mut profile);
        assert!(profile.profile_image_url.is_none());
        assert_eq!(profile.full_bio, "bio");
    }

    #[test]
    fn test_explorer_names_only_set_when_empty() {
        let mut profile = ExplorerProfile::new(Uuid::new_v4());
        profile.first_name = "Ada".to_string();
        let changes = ExplorerChanges {
            first_name: Some("Grace".to_string()),
            last_name: Some("Lovelace".to_string()),
            city: Some("London".to_string()),
            ..Default::default()
        };
        changes.apply_to(&mut profile);
        assert_eq!(profile.first_name, "Ada");
        assert_eq!(profile.last_name, "Lovelace");
        assert_eq!(profile.city, "London");
    }

    #[test]
    fn test_role_resolution_rejects_both_profiles() {
        let user_id = Uuid::new_v4();
        let artist = ArtistProfile::new(user_id, "A", "a", SubscriptionPlan::Basic);
        let explorer = ExplorerProfile::new(user_id);
        assert!(UserRole::from_profiles(user_id, Some(artist), Some(explorer)).is_err());
        assert!(matches!(
            UserRole::from_profiles(user_id, None, None),
            Ok(UserRole::Unassigned)
        ));
    }

    #[test]
    fn test_signup_state_edges() {
        assert!(SignupState::Pending.can_transition_to(SignupState::OtpSent));
        assert!(SignupState::AwaitingPayment.can_transition_to(SignupState::PaymentFailed));
        assert!(SignupState::PaymentFailed.can_transition_to(SignupState::Paid));
        assert!(SignupState::Pending.can_transition_to(SignupState::Paid));
        assert!(SignupState::OtpSent.can_transition_to(SignupState::Paid));
        assert!(!SignupState::OtpSent.can_transition_to(SignupState::AwaitingPayment));
        assert!(SignupState::Paid.can_transition_to(SignupState::Pending));
        assert!(SignupState::Verified.can_transition_to(SignupState::OtpSent));
        assert!(!SignupState::Paid.can_transition_to(SignupState::OtpSent));
        assert!(!SignupState::Pending.can_transition_to(SignupState::PaymentFailed));
    }
}
