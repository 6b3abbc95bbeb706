//! In-process storage used when no DATABASE_URL is configured, and by tests.
//!
//! A single lock guards every table and each trait call holds the write lock
//! for its whole duration, so multi-record writes are atomic.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::db::models::{
    ActivatedArtist, ArtistActivation, ArtistProfile, ExplorerChanges, ExplorerProfile,
    NewExplorerAccount, NewPendingArtist, NewPortfolioImage, PendingArtist, PortfolioImage,
    ProfileChanges, Rating, RatingWrite, SignupState, Subscription, SubscriptionPlan, User,
    UserRole,
};
use crate::db::store::{ArtistQuery, Store, StoreError, UniqueField};
use crate::services::ratings::mean_rating;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    artists: HashMap<Uuid, ArtistProfile>,
    explorers: HashMap<Uuid, ExplorerProfile>,
    pending: HashMap<Uuid, PendingArtist>,
    subscriptions: HashMap<Uuid, Subscription>,
    ratings: HashMap<(Uuid, Uuid), Rating>,
    portfolio: Vec<PortfolioImage>,
    bookmarks: HashMap<(Uuid, Uuid), DateTime<Utc>>,
}

impl Tables {
    fn username_taken(&self, username: &str) -> bool {
        self.users.values().any(|u| u.username == username)
    }

    fn email_taken(&self, email: &str) -> bool {
        self.users
            .values()
            .any(|u| u.email.eq_ignore_ascii_case(email))
    }

    fn slug_taken(&self, slug: &str, except: Option<Uuid>) -> bool {
        self.artists
            .values()
            .any(|a| a.slug == slug && Some(a.id) != except)
    }

    /// A user holds at most one role profile.
    fn ensure_roleless(&self, user_id: Uuid) -> Result<(), StoreError> {
        let has_artist = self.artists.values().any(|a| a.user_id == user_id);
        let has_explorer = self.explorers.values().any(|e| e.user_id == user_id);
        if has_artist || has_explorer {
            return Err(StoreError::RoleConflict(user_id));
        }
        Ok(())
    }

    fn recompute_rating(&mut self, artist_id: Uuid) -> Option<Decimal> {
        let values: Vec<i16> = self
            .ratings
            .values()
            .filter(|r| r.artist_id == artist_id)
            .map(|r| r.value)
            .collect();
        let mean = mean_rating(&values);
        if let Some(artist) = self.artists.get_mut(&artist_id) {
            artist.rating = mean;
        }
        mean
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        let _guard = self.tables.read().await;
        Ok(start.elapsed())
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(login) || u.username.eq_ignore_ascii_case(login))
            .cloned())
    }

    async fn create_explorer_account(
        &self,
        account: NewExplorerAccount,
    ) -> Result<(User, ExplorerProfile), StoreError> {
        let mut tables = self.tables.write().await;
        if tables.username_taken(&account.username) {
            return Err(StoreError::UniqueViolation(UniqueField::Username));
        }
        if tables.email_taken(&account.email) {
            return Err(StoreError::UniqueViolation(UniqueField::Email));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: account.username,
            email: account.email,
            password_hash: account.password_hash,
            is_active: false,
            created_at: Utc::now(),
        };
        tables.ensure_roleless(user.id)?;
        let profile = ExplorerProfile::new(user.id);
        tables.users.insert(user.id, user.clone());
        tables.explorers.insert(profile.id, profile.clone());
        Ok((user, profile))
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn activate_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let user = tables.users.get_mut(&user_id).ok_or(StoreError::NotFound)?;
        user.is_active = true;
        Ok(())
    }

    async fn resolve_role(&self, user_id: Uuid) -> Result<UserRole, StoreError> {
        let tables = self.tables.read().await;
        let artist = tables.artists.values().find(|a| a.user_id == user_id).cloned();
        let explorer = tables
            .explorers
            .values()
            .find(|e| e.user_id == user_id)
            .cloned();
        UserRole::from_profiles(user_id, artist, explorer)
    }

    async fn upsert_pending_artist(
        &self,
        pending: NewPendingArtist,
    ) -> Result<PendingArtist, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        if let Some(existing) = tables
            .pending
            .values_mut()
            .find(|p| p.email.eq_ignore_ascii_case(&pending.email))
        {
            existing.password_hash = pending.password_hash;
            existing.package = pending.package;
            existing.username = pending.username;
            existing.state = SignupState::Pending;
            existing.updated_at = now;
            return Ok(existing.clone());
        }

        let record = PendingArtist {
            id: Uuid::new_v4(),
            email: pending.email,
            username: pending.username,
            password_hash: pending.password_hash,
            package: pending.package,
            state: SignupState::Pending,
            created_at: now,
            updated_at: now,
        };
        tables.pending.insert(record.id, record.clone());
        Ok(record)
    }

    async fn pending_artist_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PendingArtist>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .pending
            .values()
            .find(|p| p.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn pending_artist_by_id(&self, id: Uuid) -> Result<Option<PendingArtist>, StoreError> {
        Ok(self.tables.read().await.pending.get(&id).cloned())
    }

    async fn set_pending_state(&self, id: Uuid, state: SignupState) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let pending = tables.pending.get_mut(&id).ok_or(StoreError::NotFound)?;
        pending.state = state;
        pending.updated_at = Utc::now();
        Ok(())
    }

    async fn activate_artist(
        &self,
        activation: ArtistActivation,
    ) -> Result<ActivatedArtist, StoreError> {
        let mut tables = self.tables.write().await;
        let pending = tables
            .pending
            .get(&activation.pending_id)
            .cloned()
            .ok_or(StoreError::NotFound)?;
        if tables.username_taken(&activation.username) {
            return Err(StoreError::UniqueViolation(UniqueField::Username));
        }
        if tables.email_taken(&pending.email) {
            return Err(StoreError::UniqueViolation(UniqueField::Email));
        }
        if tables.slug_taken(&activation.slug, None) {
            return Err(StoreError::UniqueViolation(UniqueField::Slug));
        }

        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            username: activation.username.clone(),
            email: pending.email.clone(),
            password_hash: pending.password_hash.clone(),
            is_active: true,
            created_at: now,
        };
        tables.ensure_roleless(user.id)?;
        let profile = ArtistProfile::new(
            user.id,
            &activation.username,
            &activation.slug,
            activation.plan,
        );
        let subscription = Subscription {
            id: Uuid::new_v4(),
            user_id: user.id,
            gateway_customer_id: activation.gateway_customer_id,
            gateway_subscription_id: activation.gateway_subscription_id,
            plan_name: activation.plan,
            is_active: true,
            created_at: now,
            updated_at: now,
        };

        tables.users.insert(user.id, user.clone());
        tables.artists.insert(profile.id, profile.clone());
        tables.subscriptions.insert(subscription.id, subscription.clone());
        tables.pending.remove(&pending.id);

        Ok(ActivatedArtist {
            user,
            profile,
            subscription,
        })
    }

    async fn artist_by_id(&self, id: Uuid) -> Result<Option<ArtistProfile>, StoreError> {
        Ok(self.tables.read().await.artists.get(&id).cloned())
    }

    async fn artist_by_slug(&self, slug: &str) -> Result<Option<ArtistProfile>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.artists.values().find(|a| a.slug == slug).cloned())
    }

    async fn artist_by_user(&self, user_id: Uuid) -> Result<Option<ArtistProfile>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .artists
            .values()
            .find(|a| a.user_id == user_id)
            .cloned())
    }

    async fn update_artist(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<ArtistProfile, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(slug) = &changes.slug {
            if tables.slug_taken(slug, Some(id)) {
                return Err(StoreError::UniqueViolation(UniqueField::Slug));
            }
        }
        let artist = tables.artists.get_mut(&id).ok_or(StoreError::NotFound)?;
        changes.apply_to(artist);
        artist.updated_at = Utc::now();
        Ok(artist.clone())
    }

    async fn set_artist_visibility(&self, id: Uuid, visible: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let artist = tables.artists.get_mut(&id).ok_or(StoreError::NotFound)?;
        artist.is_visible = visible;
        Ok(())
    }

    async fn set_artist_featured(&self, id: Uuid, featured: bool) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let artist = tables.artists.get_mut(&id).ok_or(StoreError::NotFound)?;
        artist.is_featured = featured;
        Ok(())
    }

    async fn change_plan(
        &self,
        user_id: Uuid,
        plan: SubscriptionPlan,
        gateway_customer_id: Option<&str>,
        gateway_subscription_id: Option<&str>,
    ) -> Result<ArtistProfile, StoreError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let artist = tables
            .artists
            .values_mut()
            .find(|a| a.user_id == user_id)
            .ok_or(StoreError::NotFound)?;
        artist.subscription_plan = plan;
        let artist = artist.clone();

        match tables
            .subscriptions
            .values_mut()
            .find(|s| s.user_id == user_id)
        {
            Some(sub) => {
                sub.plan_name = plan;
                sub.is_active = true;
                if let Some(c) = gateway_customer_id {
                    sub.gateway_customer_id = Some(c.to_string());
                }
                if let Some(s) = gateway_subscription_id {
                    sub.gateway_subscription_id = Some(s.to_string());
                }
                sub.updated_at = now;
            }
            None => {
                let sub = Subscription {
                    id: Uuid::new_v4(),
                    user_id,
                    gateway_customer_id: gateway_customer_id.map(str::to_string),
                    gateway_subscription_id: gateway_subscription_id.map(str::to_string),
                    plan_name: plan,
                    is_active: true,
                    created_at: now,
                    updated_at: now,
                };
                tables.subscriptions.insert(sub.id, sub);
            }
        }
        Ok(artist)
    }

    async fn subscription_for(&self, user_id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions
            .values()
            .find(|s| s.user_id == user_id)
            .cloned())
    }

    async fn list_artists(
        &self,
        query: &ArtistQuery,
    ) -> Result<(Vec<ArtistProfile>, i64), StoreError> {
        let tables = self.tables.read().await;
        let mut matching: Vec<&ArtistProfile> =
            tables.artists.values().filter(|a| query.matches(a)).collect();
        matching.sort_by(|a, b| query.compare(a, b));
        let total = matching.len() as i64;
        let items = matching
            .into_iter()
            .skip(query.offset.max(0) as usize)
            .take(query.limit.max(0) as usize)
            .cloned()
            .collect();
        Ok((items, total))
    }

    async fn upsert_rating(
        &self,
        artist_id: Uuid,
        explorer_id: Uuid,
        value: i16,
    ) -> Result<RatingWrite, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.artists.contains_key(&artist_id) {
            return Err(StoreError::NotFound);
        }
        let now = Utc::now();
        let (rating, created) = match tables.ratings.get_mut(&(artist_id, explorer_id)) {
            Some(existing) => {
                existing.value = value;
                existing.updated_at = now;
                (existing.clone(), false)
            }
            None => {
                let rating = Rating {
                    id: Uuid::new_v4(),
                    artist_id,
                    explorer_id,
                    value,
                    created_at: now,
                    updated_at: now,
                };
                tables
                    .ratings
                    .insert((artist_id, explorer_id), rating.clone());
                (rating, true)
            }
        };
        let artist_rating = tables.recompute_rating(artist_id);
        Ok(RatingWrite {
            rating,
            created,
            artist_rating,
        })
    }

    async fn rating_for(
        &self,
        artist_id: Uuid,
        explorer_id: Uuid,
    ) -> Result<Option<Rating>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.ratings.get(&(artist_id, explorer_id)).cloned())
    }

    async fn delete_rating(
        &self,
        artist_id: Uuid,
        explorer_id: Uuid,
    ) -> Result<Option<Option<Decimal>>, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.ratings.remove(&(artist_id, explorer_id)).is_none() {
            return Ok(None);
        }
        Ok(Some(tables.recompute_rating(artist_id)))
    }

    async fn portfolio_images(&self, artist_id: Uuid) -> Result<Vec<PortfolioImage>, StoreError> {
        let tables = self.tables.read().await;
        let mut images: Vec<PortfolioImage> = tables
            .portfolio
            .iter()
            .filter(|i| i.artist_id == artist_id)
            .cloned()
            .collect();
        images.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(images)
    }

    async fn add_portfolio_images(
        &self,
        artist_id: Uuid,
        images: Vec<NewPortfolioImage>,
    ) -> Result<Vec<PortfolioImage>, StoreError> {
        let mut tables = self.tables.write().await;
        let quota = tables
            .artists
            .get(&artist_id)
            .ok_or(StoreError::NotFound)?
            .subscription_plan
            .portfolio_quota();
        let current = tables
            .portfolio
            .iter()
            .filter(|i| i.artist_id == artist_id)
            .count();
        if current + images.len() > quota {
            return Err(StoreError::QuotaExceeded {
                quota,
                remaining: quota.saturating_sub(current),
            });
        }

        let now = Utc::now();
        let created: Vec<PortfolioImage> = images
            .into_iter()
            .map(|i| PortfolioImage {
                id: Uuid::new_v4(),
                artist_id,
                image_url: i.image_url,
                caption: i.caption,
                created_at: now,
            })
            .collect();
        tables.portfolio.extend(created.iter().cloned());
        Ok(created)
    }

    async fn delete_portfolio_image(
        &self,
        artist_id: Uuid,
        image_id: Uuid,
    ) -> Result<Option<PortfolioImage>, StoreError> {
        let mut tables = self.tables.write().await;
        let position = tables
            .portfolio
            .iter()
            .position(|i| i.id == image_id && i.artist_id == artist_id);
        Ok(position.map(|idx| tables.portfolio.remove(idx)))
    }

    async fn toggle_bookmark(&self, explorer_id: Uuid, artist_id: Uuid) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        if !tables.artists.contains_key(&artist_id) {
            return Err(StoreError::NotFound);
        }
        let key = (explorer_id, artist_id);
        if tables.bookmarks.remove(&key).is_some() {
            Ok(false)
        } else {
            tables.bookmarks.insert(key, Utc::now());
            Ok(true)
        }
    }

    async fn is_bookmarked(&self, explorer_id: Uuid, artist_id: Uuid) -> Result<bool, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.bookmarks.contains_key(&(explorer_id, artist_id)))
    }

    async fn bookmarked_artists(
        &self,
        explorer_id: Uuid,
    ) -> Result<Vec<ArtistProfile>, StoreError> {
        let tables = self.tables.read().await;
        let mut marks: Vec<(&DateTime<Utc>, &ArtistProfile)> = tables
            .bookmarks
            .iter()
            .filter(|((e, _), _)| *e == explorer_id)
            .filter_map(|((_, a), at)| tables.artists.get(a).map(|artist| (at, artist)))
            .collect();
        marks.sort_by(|x, y| y.0.cmp(x.0));
        Ok(marks.into_iter().map(|(_, a)| a.clone()).collect())
    }

    async fn update_explorer(
        &self,
        id: Uuid,
        changes: &ExplorerChanges,
    ) -> Result<ExplorerProfile, StoreError> {
        let mut tables = self.tables.write().await;
        let explorer = tables.explorers.get_mut(&id).ok_or(StoreError::NotFound)?;
        changes.apply_to(explorer);
        Ok(explorer.clone())
    }
}
