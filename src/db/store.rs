//! Storage seam. Every component is written against [`Store`]; the server picks
//! [`PgStore`](crate::db::postgres::PgStore) when a database is configured and
//! [`MemoryStore`](crate::db::memory::MemoryStore) otherwise.

use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::db::models::{
    ActivatedArtist, ArtistActivation, ArtistProfile, ExplorerChanges, ExplorerProfile,
    NewExplorerAccount, NewPendingArtist, NewPortfolioImage, PendingArtist, PortfolioImage,
    ProfileChanges, Rating, RatingWrite, SignupState, Subscription, SubscriptionPlan, User,
    UserRole,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniqueField {
    Username,
    Email,
    Slug,
    Other,
}

impl fmt::Display for UniqueField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UniqueField::Username => "username",
            UniqueField::Email => "email",
            UniqueField::Slug => "slug",
            UniqueField::Other => "record",
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unique constraint violated on {0}")]
    UniqueViolation(UniqueField),
    #[error("portfolio quota of {quota} exceeded, {remaining} slots remaining")]
    QuotaExceeded { quota: usize, remaining: usize },
    #[error("record not found")]
    NotFound,
    #[error("user {0} holds both an artist and an explorer profile")]
    RoleConflict(Uuid),
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtistOrder {
    /// Rating descending (nulls last), newest first on ties.
    RatingDesc,
    /// Featured profiles first, newest first within each group.
    FeaturedFirst,
    Newest,
}

/// Storage-level listing query over visible profiles.
#[derive(Debug, Clone)]
pub struct ArtistQuery {
    pub search: Option<String>,
    pub location: Option<String>,
    pub featured_only: bool,
    pub order: ArtistOrder,
    pub offset: i64,
    pub limit: i64,
}

fn contains_ci(haystack: &str, needle_lower: &str) -> bool {
    haystack.to_lowercase().contains(needle_lower)
}

impl ArtistQuery {
    /// In-process evaluation of the filter. `PgStore` expresses the same
    /// predicate in SQL.
    pub fn matches(&self, profile: &ArtistProfile) -> bool {
        if !profile.is_visible {
            return false;
        }
        if self.featured_only && !profile.is_featured {
            return false;
        }
        if let Some(q) = &self.search {
            let q = q.to_lowercase();
            let hit = contains_ci(&profile.artist_name, &q)
                || contains_ci(&profile.full_bio, &q)
                || contains_ci(&profile.product_keywords, &q)
                || contains_ci(&profile.seo_tags, &q)
                || profile.categories.iter().any(|c| c.as_str().contains(&q));
            if !hit {
                return false;
            }
        }
        if let Some(loc) = &self.location {
            let loc = loc.to_lowercase();
            if !(contains_ci(&profile.location_city, &loc)
                || contains_ci(&profile.location_state, &loc))
            {
                return false;
            }
        }
        true
    }

    pub fn compare(&self, a: &ArtistProfile, b: &ArtistProfile) -> Ordering {
        let newest = b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id));
        match self.order {
            ArtistOrder::RatingDesc => match (a.rating, b.rating) {
                (Some(x), Some(y)) => y.cmp(&x).then(newest),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => newest,
            },
            ArtistOrder::FeaturedFirst => b.is_featured.cmp(&a.is_featured).then(newest),
            ArtistOrder::Newest => newest,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Round-trip latency to the backing store.
    async fn ping(&self) -> Result<Duration, StoreError>;

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError>;
    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError>;
    /// Look up by email or username, case-insensitively.
    async fn user_by_login(&self, login: &str) -> Result<Option<User>, StoreError>;
    /// Insert an inactive user together with its explorer profile.
    async fn create_explorer_account(
        &self,
        account: NewExplorerAccount,
    ) -> Result<(User, ExplorerProfile), StoreError>;
    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError>;
    async fn activate_user(&self, user_id: Uuid) -> Result<(), StoreError>;
    async fn resolve_role(&self, user_id: Uuid) -> Result<UserRole, StoreError>;

    /// Insert or, for a retried signup, overwrite the pending record for an email.
    async fn upsert_pending_artist(
        &self,
        pending: NewPendingArtist,
    ) -> Result<PendingArtist, StoreError>;
    async fn pending_artist_by_email(&self, email: &str)
        -> Result<Option<PendingArtist>, StoreError>;
    async fn pending_artist_by_id(&self, id: Uuid) -> Result<Option<PendingArtist>, StoreError>;
    async fn set_pending_state(&self, id: Uuid, state: SignupState) -> Result<(), StoreError>;
    /// Create user, artist profile and subscription, and delete the pending
    /// record, all or nothing.
    async fn activate_artist(
        &self,
        activation: ArtistActivation,
    ) -> Result<ActivatedArtist, StoreError>;

    async fn artist_by_id(&self, id: Uuid) -> Result<Option<ArtistProfile>, StoreError>;
    async fn artist_by_slug(&self, slug: &str) -> Result<Option<ArtistProfile>, StoreError>;
    async fn artist_by_user(&self, user_id: Uuid) -> Result<Option<ArtistProfile>, StoreError>;
    /// Write only the fields present in `changes`.
    async fn update_artist(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<ArtistProfile, StoreError>;
    async fn set_artist_visibility(&self, id: Uuid, visible: bool) -> Result<(), StoreError>;
    async fn set_artist_featured(&self, id: Uuid, featured: bool) -> Result<(), StoreError>;
    /// Switch an artist's plan and upsert the matching active subscription.
    async fn change_plan(
        &self,
        user_id: Uuid,
        plan: SubscriptionPlan,
        gateway_customer_id: Option<&str>,
        gateway_subscription_id: Option<&str>,
    ) -> Result<ArtistProfile, StoreError>;
    async fn subscription_for(&self, user_id: Uuid) -> Result<Option<Subscription>, StoreError>;
    async fn list_artists(
        &self,
        query: &ArtistQuery,
    ) -> Result<(Vec<ArtistProfile>, i64), StoreError>;

    /// Upsert the (artist, explorer) rating and store the freshly recomputed
    /// mean in the same atomic unit.
    async fn upsert_rating(
        &self,
        artist_id: Uuid,
        explorer_id: Uuid,
        value: i16,
    ) -> Result<RatingWrite, StoreError>;
    async fn rating_for(
        &self,
        artist_id: Uuid,
        explorer_id: Uuid,
    ) -> Result<Option<Rating>, StoreError>;
    /// Remove a rating and recompute the mean. `None` when nothing was deleted,
    /// otherwise the new mean.
    async fn delete_rating(
        &self,
        artist_id: Uuid,
        explorer_id: Uuid,
    ) -> Result<Option<Option<Decimal>>, StoreError>;

    async fn portfolio_images(&self, artist_id: Uuid) -> Result<Vec<PortfolioImage>, StoreError>;
    /// Insert a batch after checking the plan quota against the current count.
    async fn add_portfolio_images(
        &self,
        artist_id: Uuid,
        images: Vec<NewPortfolioImage>,
    ) -> Result<Vec<PortfolioImage>, StoreError>;
    async fn delete_portfolio_image(
        &self,
        artist_id: Uuid,
        image_id: Uuid,
    ) -> Result<Option<PortfolioImage>, StoreError>;

    /// Flip the bookmark; returns whether it now exists.
    async fn toggle_bookmark(&self, explorer_id: Uuid, artist_id: Uuid) -> Result<bool, StoreError>;
    async fn is_bookmarked(&self, explorer_id: Uuid, artist_id: Uuid) -> Result<bool, StoreError>;
    async fn bookmarked_artists(&self, explorer_id: Uuid)
        -> Result<Vec<ArtistProfile>, StoreError>;

    async fn update_explorer(
        &self,
        id: Uuid,
        changes: &ExplorerChanges,
    ) -> Result<ExplorerProfile, StoreError>;
}
