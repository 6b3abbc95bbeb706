//! PostgreSQL storage backend.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use crate::db::models::{
    image_ref, ActivatedArtist, ArtistActivation, ArtistProfile, ArtistRow, ExplorerChanges,
    ExplorerProfile, NewExplorerAccount, NewPendingArtist, NewPortfolioImage, PendingArtist,
    PendingArtistRow, PortfolioImage, ProfileChanges, Rating, RatingWrite, SignupState,
    Subscription, SubscriptionPlan, SubscriptionRow, User, UserRole,
};
use crate::db::store::{ArtistOrder, ArtistQuery, Store, StoreError, UniqueField};
use crate::services::ratings::mean_rating;

const ARTIST_COLUMNS: &str = "id, user_id, artist_name, slug, short_bio, full_bio, \
    location_city, location_state, product_keywords, seo_tags, categories, etsy_url, \
    shopify_url, instagram_url, tiktok_url, profile_image_url, banner_image_url, \
    subscription_plan, rating, is_featured, is_visible, created_at, updated_at";

const USER_COLUMNS: &str = "id, username, email, password_hash, is_active, created_at";

const EXPLORER_COLUMNS: &str = "id, user_id, first_name, last_name, phone_number, \
    street_number, street_address, city, state, zip_code, promotion_keywords";

const PENDING_COLUMNS: &str =
    "id, email, username, password_hash, package, state, created_at, updated_at";

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, gateway_customer_id, \
    gateway_subscription_id, plan_name, is_active, created_at, updated_at";

const RATING_COLUMNS: &str = "id, artist_id, explorer_id, value, created_at, updated_at";

/// Map unique-constraint violations onto the field they guard.
fn classify(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            let field = match db.constraint() {
                Some("users_username_key") => UniqueField::Username,
                Some("users_email_key") => UniqueField::Email,
                Some("artist_profiles_slug_key") => UniqueField::Slug,
                _ => UniqueField::Other,
            };
            return StoreError::UniqueViolation(field);
        }
    }
    StoreError::Database(err)
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let escaped = needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, query: &ArtistQuery) {
    qb.push(" WHERE is_visible = TRUE");
    if query.featured_only {
        qb.push(" AND is_featured = TRUE");
    }
    if let Some(search) = &query.search {
        let pattern = like_pattern(search);
        qb.push(" AND (artist_name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR full_bio ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR product_keywords ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR seo_tags ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM unnest(categories) AS c WHERE c ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
    if let Some(location) = &query.location {
        let pattern = like_pattern(location);
        qb.push(" AND (location_city ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR location_state ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

fn order_clause(order: ArtistOrder) -> &'static str {
    match order {
        ArtistOrder::RatingDesc => " ORDER BY rating DESC NULLS LAST, created_at DESC, id ASC",
        ArtistOrder::FeaturedFirst => " ORDER BY is_featured DESC, created_at DESC, id ASC",
        ArtistOrder::Newest => " ORDER BY created_at DESC, id ASC",
    }
}

fn artist(row: Option<ArtistRow>) -> Result<Option<ArtistProfile>, StoreError> {
    row.map(ArtistProfile::try_from).transpose()
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn recompute_rating(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        artist_id: Uuid,
    ) -> Result<Option<Decimal>, StoreError> {
        let values: Vec<i16> = sqlx::query_scalar("SELECT value FROM ratings WHERE artist_id = $1")
            .bind(artist_id)
            .fetch_all(&mut **tx)
            .await?;
        let mean = mean_rating(&values);
        sqlx::query("UPDATE artist_profiles SET rating = $1 WHERE id = $2")
            .bind(mean)
            .bind(artist_id)
            .execute(&mut **tx)
            .await?;
        Ok(mean)
    }

    async fn lock_artist(
        tx: &mut sqlx::Transaction<'_, Postgres>,
        artist_id: Uuid,
    ) -> Result<String, StoreError> {
        let plan: Option<String> = sqlx::query_scalar(
            "SELECT subscription_plan FROM artist_profiles WHERE id = $1 FOR UPDATE",
        )
        .bind(artist_id)
        .fetch_optional(&mut **tx)
        .await?;
        plan.ok_or(StoreError::NotFound)
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> Result<Duration, StoreError> {
        let start = Instant::now();
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(start.elapsed())
    }

    async fn user_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn user_by_login(&self, login: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE LOWER(email) = LOWER($1) OR LOWER(username) = LOWER($1) \
             ORDER BY created_at LIMIT 1"
        ))
        .bind(login)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_explorer_account(
        &self,
        account: NewExplorerAccount,
    ) -> Result<(User, ExplorerProfile), StoreError> {
        let mut tx = self.pool.begin().await?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, email, password_hash, is_active) \
             VALUES ($1, $2, $3, $4, FALSE) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&account.username)
        .bind(&account.email)
        .bind(&account.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let profile = sqlx::query_as::<_, ExplorerProfile>(&format!(
            "INSERT INTO explorer_profiles (id, user_id) \
             SELECT $1::uuid, $2::uuid \
             WHERE NOT EXISTS (SELECT 1 FROM artist_profiles WHERE user_id = $2) \
             RETURNING {EXPLORER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user.id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?
        .ok_or(StoreError::RoleConflict(user.id))?;

        tx.commit().await?;
        Ok((user, profile))
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET password_hash = $1 WHERE id = $2")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn activate_user(&self, user_id: Uuid) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE users SET is_active = TRUE WHERE id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn resolve_role(&self, user_id: Uuid) -> Result<UserRole, StoreError> {
        let artist = self.artist_by_user(user_id).await?;
        let explorer = sqlx::query_as::<_, ExplorerProfile>(&format!(
            "SELECT {EXPLORER_COLUMNS} FROM explorer_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        UserRole::from_profiles(user_id, artist, explorer)
    }

    async fn upsert_pending_artist(
        &self,
        pending: NewPendingArtist,
    ) -> Result<PendingArtist, StoreError> {
        let row = sqlx::query_as::<_, PendingArtistRow>(&format!(
            "INSERT INTO pending_artists (id, email, username, password_hash, package, state) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (email) DO UPDATE SET \
                username = EXCLUDED.username, \
                password_hash = EXCLUDED.password_hash, \
                package = EXCLUDED.package, \
                state = EXCLUDED.state, \
                updated_at = now() \
             RETURNING {PENDING_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&pending.email)
        .bind(&pending.username)
        .bind(&pending.password_hash)
        .bind(pending.package.as_str())
        .bind(SignupState::Pending.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(classify)?;
        PendingArtist::try_from(row)
    }

    async fn pending_artist_by_email(
        &self,
        email: &str,
    ) -> Result<Option<PendingArtist>, StoreError> {
        let row = sqlx::query_as::<_, PendingArtistRow>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_artists WHERE LOWER(email) = LOWER($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PendingArtist::try_from).transpose()
    }

    async fn pending_artist_by_id(&self, id: Uuid) -> Result<Option<PendingArtist>, StoreError> {
        let row = sqlx::query_as::<_, PendingArtistRow>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_artists WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(PendingArtist::try_from).transpose()
    }

    async fn set_pending_state(&self, id: Uuid, state: SignupState) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE pending_artists SET state = $1, updated_at = now() WHERE id = $2",
        )
        .bind(state.as_str())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn activate_artist(
        &self,
        activation: ArtistActivation,
    ) -> Result<ActivatedArtist, StoreError> {
        let mut tx = self.pool.begin().await?;

        let pending_row = sqlx::query_as::<_, PendingArtistRow>(&format!(
            "SELECT {PENDING_COLUMNS} FROM pending_artists WHERE id = $1 FOR UPDATE"
        ))
        .bind(activation.pending_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        let pending = PendingArtist::try_from(pending_row)?;

        let user = sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (id, username, email, password_hash, is_active) \
             VALUES ($1, $2, $3, $4, TRUE) RETURNING {USER_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(&activation.username)
        .bind(&pending.email)
        .bind(&pending.password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;

        let profile = ArtistProfile::new(
            user.id,
            &activation.username,
            &activation.slug,
            activation.plan,
        );
        let row = sqlx::query_as::<_, ArtistRow>(&format!(
            "INSERT INTO artist_profiles (id, user_id, artist_name, slug, subscription_plan) \
             SELECT $1::uuid, $2::uuid, $3, $4, $5 \
             WHERE NOT EXISTS (SELECT 1 FROM explorer_profiles WHERE user_id = $2) \
             RETURNING {ARTIST_COLUMNS}"
        ))
        .bind(profile.id)
        .bind(profile.user_id)
        .bind(&profile.artist_name)
        .bind(&profile.slug)
        .bind(profile.subscription_plan.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(classify)?
        .ok_or(StoreError::RoleConflict(user.id))?;
        let profile = ArtistProfile::try_from(row)?;

        let subscription = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "INSERT INTO subscriptions \
                (id, user_id, gateway_customer_id, gateway_subscription_id, plan_name, is_active) \
             VALUES ($1, $2, $3, $4, $5, TRUE) RETURNING {SUBSCRIPTION_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(user.id)
        .bind(&activation.gateway_customer_id)
        .bind(&activation.gateway_subscription_id)
        .bind(activation.plan.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;
        let subscription = Subscription::try_from(subscription)?;

        sqlx::query("DELETE FROM pending_artists WHERE id = $1")
            .bind(pending.id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(ActivatedArtist {
            user,
            profile,
            subscription,
        })
    }

    async fn artist_by_id(&self, id: Uuid) -> Result<Option<ArtistProfile>, StoreError> {
        let row = sqlx::query_as::<_, ArtistRow>(&format!(
            "SELECT {ARTIST_COLUMNS} FROM artist_profiles WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        artist(row)
    }

    async fn artist_by_slug(&self, slug: &str) -> Result<Option<ArtistProfile>, StoreError> {
        let row = sqlx::query_as::<_, ArtistRow>(&format!(
            "SELECT {ARTIST_COLUMNS} FROM artist_profiles WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await?;
        artist(row)
    }

    async fn artist_by_user(&self, user_id: Uuid) -> Result<Option<ArtistProfile>, StoreError> {
        let row = sqlx::query_as::<_, ArtistRow>(&format!(
            "SELECT {ARTIST_COLUMNS} FROM artist_profiles WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        artist(row)
    }

    async fn update_artist(
        &self,
        id: Uuid,
        changes: &ProfileChanges,
    ) -> Result<ArtistProfile, StoreError> {
        let mut qb = QueryBuilder::<Postgres>::new("UPDATE artist_profiles SET updated_at = now()");

        for (column, value) in [
            ("artist_name", &changes.artist_name),
            ("slug", &changes.slug),
            ("short_bio", &changes.short_bio),
            ("full_bio", &changes.full_bio),
            ("location_city", &changes.location_city),
            ("location_state", &changes.location_state),
            ("product_keywords", &changes.product_keywords),
            ("seo_tags", &changes.seo_tags),
            ("etsy_url", &changes.etsy_url),
            ("shopify_url", &changes.shopify_url),
            ("instagram_url", &changes.instagram_url),
            ("tiktok_url", &changes.tiktok_url),
        ] {
            if let Some(v) = value {
                qb.push(", ").push(column).push(" = ").push_bind(v.clone());
            }
        }
        if let Some(categories) = &changes.categories {
            let tags: Vec<String> = categories.iter().map(|c| c.as_str().to_string()).collect();
            qb.push(", categories = ").push_bind(tags);
        }
        if let Some(url) = &changes.profile_image_url {
            qb.push(", profile_image_url = ").push_bind(image_ref(url));
        }
        if let Some(url) = &changes.banner_image_url {
            qb.push(", banner_image_url = ").push_bind(image_ref(url));
        }
        if let Some(visible) = changes.is_visible {
            qb.push(", is_visible = ").push_bind(visible);
        }
        qb.push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(ARTIST_COLUMNS);

        let row: Option<ArtistRow> = qb
            .build_query_as()
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        artist(row)?.ok_or(StoreError::NotFound)
    }

    async fn set_artist_visibility(&self, id: Uuid, visible: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE artist_profiles SET is_visible = $1 WHERE id = $2")
            .bind(visible)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn set_artist_featured(&self, id: Uuid, featured: bool) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE artist_profiles SET is_featured = $1 WHERE id = $2")
            .bind(featured)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn change_plan(
        &self,
        user_id: Uuid,
        plan: SubscriptionPlan,
        gateway_customer_id: Option<&str>,
        gateway_subscription_id: Option<&str>,
    ) -> Result<ArtistProfile, StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ArtistRow>(&format!(
            "UPDATE artist_profiles SET subscription_plan = $1, updated_at = now() \
             WHERE user_id = $2 RETURNING {ARTIST_COLUMNS}"
        ))
        .bind(plan.as_str())
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        let profile = artist(row)?.ok_or(StoreError::NotFound)?;

        sqlx::query(
            "INSERT INTO subscriptions \
                (id, user_id, gateway_customer_id, gateway_subscription_id, plan_name, is_active) \
             VALUES ($1, $2, $3, $4, $5, TRUE) \
             ON CONFLICT (user_id) DO UPDATE SET \
                gateway_customer_id = COALESCE(EXCLUDED.gateway_customer_id, subscriptions.gateway_customer_id), \
                gateway_subscription_id = COALESCE(EXCLUDED.gateway_subscription_id, subscriptions.gateway_subscription_id), \
                plan_name = EXCLUDED.plan_name, \
                is_active = TRUE, \
                updated_at = now()",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(gateway_customer_id)
        .bind(gateway_subscription_id)
        .bind(plan.as_str())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(profile)
    }

    async fn subscription_for(&self, user_id: Uuid) -> Result<Option<Subscription>, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Subscription::try_from).transpose()
    }

    async fn list_artists(
        &self,
        query: &ArtistQuery,
    ) -> Result<(Vec<ArtistProfile>, i64), StoreError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM artist_profiles");
        push_filters(&mut count, query);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        if total == 0 || query.offset >= total {
            return Ok((Vec::new(), total));
        }

        let mut select = QueryBuilder::<Postgres>::new("SELECT ");
        select.push(ARTIST_COLUMNS).push(" FROM artist_profiles");
        push_filters(&mut select, query);
        select
            .push(order_clause(query.order))
            .push(" LIMIT ")
            .push_bind(query.limit)
            .push(" OFFSET ")
            .push_bind(query.offset);

        let rows: Vec<ArtistRow> = select.build_query_as().fetch_all(&self.pool).await?;
        let items = rows
            .into_iter()
            .map(ArtistProfile::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((items, total))
    }

    async fn upsert_rating(
        &self,
        artist_id: Uuid,
        explorer_id: Uuid,
        value: i16,
    ) -> Result<RatingWrite, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_artist(&mut tx, artist_id).await?;

        let row = sqlx::query(&format!(
            "INSERT INTO ratings (id, artist_id, explorer_id, value) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (artist_id, explorer_id) DO UPDATE SET \
                value = EXCLUDED.value, updated_at = now() \
             RETURNING {RATING_COLUMNS}, (xmax = 0) AS inserted"
        ))
        .bind(Uuid::new_v4())
        .bind(artist_id)
        .bind(explorer_id)
        .bind(value)
        .fetch_one(&mut *tx)
        .await?;
        let rating = Rating::from_row(&row)?;
        let created: bool = row.try_get("inserted")?;

        let artist_rating = Self::recompute_rating(&mut tx, artist_id).await?;
        tx.commit().await?;

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
        let rating = sqlx::query_as::<_, Rating>(&format!(
            "SELECT {RATING_COLUMNS} FROM ratings WHERE artist_id = $1 AND explorer_id = $2"
        ))
        .bind(artist_id)
        .bind(explorer_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(rating)
    }

    async fn delete_rating(
        &self,
        artist_id: Uuid,
        explorer_id: Uuid,
    ) -> Result<Option<Option<Decimal>>, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_artist(&mut tx, artist_id).await?;

        let deleted = sqlx::query("DELETE FROM ratings WHERE artist_id = $1 AND explorer_id = $2")
            .bind(artist_id)
            .bind(explorer_id)
            .execute(&mut *tx)
            .await?;
        if deleted.rows_affected() == 0 {
            return Ok(None);
        }

        let mean = Self::recompute_rating(&mut tx, artist_id).await?;
        tx.commit().await?;
        Ok(Some(mean))
    }

    async fn portfolio_images(&self, artist_id: Uuid) -> Result<Vec<PortfolioImage>, StoreError> {
        let images = sqlx::query_as::<_, PortfolioImage>(
            "SELECT id, artist_id, image_url, caption, created_at FROM portfolio_images \
             WHERE artist_id = $1 ORDER BY created_at DESC",
        )
        .bind(artist_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(images)
    }

    async fn add_portfolio_images(
        &self,
        artist_id: Uuid,
        images: Vec<NewPortfolioImage>,
    ) -> Result<Vec<PortfolioImage>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let plan: SubscriptionPlan = Self::lock_artist(&mut tx, artist_id)
            .await?
            .parse()
            .map_err(StoreError::Corrupt)?;
        let quota = plan.portfolio_quota();

        let current: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM portfolio_images WHERE artist_id = $1")
                .bind(artist_id)
                .fetch_one(&mut *tx)
                .await?;
        let current = current.max(0) as usize;
        if current + images.len() > quota {
            return Err(StoreError::QuotaExceeded {
                quota,
                remaining: quota.saturating_sub(current),
            });
        }

        let mut created = Vec::with_capacity(images.len());
        for image in images {
            let row = sqlx::query_as::<_, PortfolioImage>(
                "INSERT INTO portfolio_images (id, artist_id, image_url, caption) \
                 VALUES ($1, $2, $3, $4) \
                 RETURNING id, artist_id, image_url, caption, created_at",
            )
            .bind(Uuid::new_v4())
            .bind(artist_id)
            .bind(&image.image_url)
            .bind(&image.caption)
            .fetch_one(&mut *tx)
            .await?;
            created.push(row);
        }

        tx.commit().await?;
        Ok(created)
    }

    async fn delete_portfolio_image(
        &self,
        artist_id: Uuid,
        image_id: Uuid,
    ) -> Result<Option<PortfolioImage>, StoreError> {
        let image = sqlx::query_as::<_, PortfolioImage>(
            "DELETE FROM portfolio_images WHERE id = $1 AND artist_id = $2 \
             RETURNING id, artist_id, image_url, caption, created_at",
        )
        .bind(image_id)
        .bind(artist_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(image)
    }

    async fn toggle_bookmark(&self, explorer_id: Uuid, artist_id: Uuid) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;
        Self::lock_artist(&mut tx, artist_id).await?;

        let removed = sqlx::query("DELETE FROM bookmarks WHERE explorer_id = $1 AND artist_id = $2")
            .bind(explorer_id)
            .bind(artist_id)
            .execute(&mut *tx)
            .await?;
        let now_bookmarked = if removed.rows_affected() > 0 {
            false
        } else {
            sqlx::query("INSERT INTO bookmarks (explorer_id, artist_id) VALUES ($1, $2)")
                .bind(explorer_id)
                .bind(artist_id)
                .execute(&mut *tx)
                .await?;
            true
        };

        tx.commit().await?;
        Ok(now_bookmarked)
    }

    async fn is_bookmarked(&self, explorer_id: Uuid, artist_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM bookmarks WHERE explorer_id = $1 AND artist_id = $2)",
        )
        .bind(explorer_id)
        .bind(artist_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn bookmarked_artists(
        &self,
        explorer_id: Uuid,
    ) -> Result<Vec<ArtistProfile>, StoreError> {
        let columns = ARTIST_COLUMNS
            .split(", ")
            .map(|c| format!("a.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let rows = sqlx::query_as::<_, ArtistRow>(&format!(
            "SELECT {columns} FROM bookmarks b \
             JOIN artist_profiles a ON a.id = b.artist_id \
             WHERE b.explorer_id = $1 ORDER BY b.created_at DESC"
        ))
        .bind(explorer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(ArtistProfile::try_from).collect()
    }

    async fn update_explorer(
        &self,
        id: Uuid,
        changes: &ExplorerChanges,
    ) -> Result<ExplorerProfile, StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut profile = sqlx::query_as::<_, ExplorerProfile>(&format!(
            "SELECT {EXPLORER_COLUMNS} FROM explorer_profiles WHERE id = $1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(StoreError::NotFound)?;
        changes.apply_to(&mut profile);

        let profile = sqlx::query_as::<_, ExplorerProfile>(&format!(
            "UPDATE explorer_profiles SET first_name = $1, last_name = $2, phone_number = $3, \
                street_number = $4, street_address = $5, city = $6, state = $7, \
                zip_code = $8, promotion_keywords = $9 \
             WHERE id = $10 RETURNING {EXPLORER_COLUMNS}"
        ))
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(&profile.phone_number)
        .bind(&profile.street_number)
        .bind(&profile.street_address)
        .bind(&profile.city)
        .bind(&profile.state)
        .bind(&profile.zip_code)
        .bind(&profile.promotion_keywords)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(profile)
    }
}
