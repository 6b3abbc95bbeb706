pub mod memory;
pub mod models;
pub mod postgres;
pub mod store;

use sqlx::{postgres::PgPoolOptions, PgPool};

#[derive(Debug, Clone)]
pub struct DbConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/artisanshub".to_string()),
            max_connections: std::env::var("DB_POOL_MAX")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            min_connections: std::env::var("DB_POOL_MIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            connect_timeout_secs: std::env::var("DB_CONNECT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(10),
            idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(300),
        }
    }
}

impl DbConfig {
    /// Only build a config when DATABASE_URL is actually set; otherwise the
    /// server runs on the in-process store.
    pub fn from_env() -> Option<Self> {
        std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|_| Self::default())
    }

    fn redacted_url(&self) -> String {
        match (self.url.find("://"), self.url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}://***{}", &self.url[..scheme_end], &self.url[at..])
            }
            _ => self.url.clone(),
        }
    }
}

pub async fn init_pool(config: &DbConfig) -> Result<PgPool, sqlx::Error> {
    tracing::info!("Initializing database connection pool...");
    tracing::debug!("Database URL: {}", config.redacted_url());

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(std::time::Duration::from_secs(config.idle_timeout_secs))
        .max_lifetime(std::time::Duration::from_secs(1800))
        .test_before_acquire(true)
        .connect(&config.url)
        .await?;

    sqlx::query("SELECT 1").fetch_one(&pool).await?;

    tracing::info!("Database connection pool initialized successfully");
    Ok(pool)
}

/// Schema statements, applied in order. Every statement is idempotent.
const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS users (
        id UUID PRIMARY KEY,
        username TEXT NOT NULL CONSTRAINT users_username_key UNIQUE,
        email TEXT NOT NULL CONSTRAINT users_email_key UNIQUE,
        password_hash TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT false,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS explorer_profiles (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
        first_name TEXT NOT NULL DEFAULT '',
        last_name TEXT NOT NULL DEFAULT '',
        phone_number TEXT NOT NULL DEFAULT '',
        street_number TEXT NOT NULL DEFAULT '',
        street_address TEXT NOT NULL DEFAULT '',
        city TEXT NOT NULL DEFAULT '',
        state TEXT NOT NULL DEFAULT '',
        zip_code TEXT NOT NULL DEFAULT '',
        promotion_keywords TEXT NOT NULL DEFAULT ''
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS artist_profiles (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
        artist_name TEXT NOT NULL,
        slug TEXT NOT NULL CONSTRAINT artist_profiles_slug_key UNIQUE,
        short_bio TEXT NOT NULL DEFAULT '',
        full_bio TEXT NOT NULL DEFAULT '',
        location_city TEXT NOT NULL DEFAULT '',
        location_state TEXT NOT NULL DEFAULT '',
        product_keywords TEXT NOT NULL DEFAULT '',
        seo_tags TEXT NOT NULL DEFAULT '',
        categories TEXT[] NOT NULL DEFAULT '{}',
        etsy_url TEXT NOT NULL DEFAULT '',
        shopify_url TEXT NOT NULL DEFAULT '',
        instagram_url TEXT NOT NULL DEFAULT '',
        tiktok_url TEXT NOT NULL DEFAULT '',
        profile_image_url TEXT,
        banner_image_url TEXT,
        subscription_plan TEXT NOT NULL DEFAULT 'basic',
        rating NUMERIC(2, 1),
        is_featured BOOLEAN NOT NULL DEFAULT false,
        is_visible BOOLEAN NOT NULL DEFAULT false,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_artist_profiles_listing
        ON artist_profiles(is_visible, is_featured DESC, created_at DESC)
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_artist_profiles_rating
        ON artist_profiles(rating DESC NULLS LAST)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS portfolio_images (
        id UUID PRIMARY KEY,
        artist_id UUID NOT NULL REFERENCES artist_profiles(id) ON DELETE CASCADE,
        image_url TEXT NOT NULL,
        caption TEXT NOT NULL DEFAULT '',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_portfolio_images_artist
        ON portfolio_images(artist_id, created_at DESC)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ratings (
        id UUID PRIMARY KEY,
        artist_id UUID NOT NULL REFERENCES artist_profiles(id) ON DELETE CASCADE,
        explorer_id UUID NOT NULL REFERENCES explorer_profiles(id) ON DELETE CASCADE,
        value SMALLINT NOT NULL CHECK (value BETWEEN 1 AND 5),
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        CONSTRAINT ratings_artist_explorer_key UNIQUE (artist_id, explorer_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bookmarks (
        explorer_id UUID NOT NULL REFERENCES explorer_profiles(id) ON DELETE CASCADE,
        artist_id UUID NOT NULL REFERENCES artist_profiles(id) ON DELETE CASCADE,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        PRIMARY KEY (explorer_id, artist_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS pending_artists (
        id UUID PRIMARY KEY,
        email TEXT NOT NULL UNIQUE,
        username TEXT NOT NULL,
        password_hash TEXT NOT NULL,
        package TEXT NOT NULL,
        state TEXT NOT NULL DEFAULT 'pending',
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS subscriptions (
        id UUID PRIMARY KEY,
        user_id UUID NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
        gateway_customer_id TEXT,
        gateway_subscription_id TEXT,
        plan_name TEXT NOT NULL,
        is_active BOOLEAN NOT NULL DEFAULT true,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    "#,
];

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Running database migrations...");

    for statement in MIGRATIONS {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!(
        statements = MIGRATIONS.len(),
        "Database migrations completed successfully"
    );
    Ok(())
}
