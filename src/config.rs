//! Application configuration read from environment variables.

use std::time::Duration;

use crate::db::models::SubscriptionPlan;

pub const DEFAULT_JWT_SECRET: &str = "default-jwt-secret-change-in-production";

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Bounds of the listing parameter space that may be cached, and therefore
/// the space swept on every artist write.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub key_prefix: String,
    pub detail_ttl: Duration,
    pub listing_ttl: Duration,
    pub sweep_max_page: u32,
    pub sweep_page_sizes: Vec<u32>,
}

impl Default for CachePolicy {
    fn default() -> Self {
        let sweep_page_sizes = std::env::var("CACHE_SWEEP_PAGE_SIZES")
            .ok()
            .map(|s| {
                s.split(',')
                    .filter_map(|v| v.trim().parse::<u32>().ok())
                    .filter(|v| *v > 0)
                    .collect::<Vec<_>>()
            })
            .filter(|sizes| !sizes.is_empty())
            .unwrap_or_else(|| vec![6, 9, 12]);

        Self {
            key_prefix: std::env::var("CACHE_KEY_PREFIX").unwrap_or_else(|_| "ah".to_string()),
            detail_ttl: Duration::from_secs(env_or("CACHE_DETAIL_TTL_SECS", 300)),
            listing_ttl: Duration::from_secs(env_or("CACHE_LISTING_TTL_SECS", 300)),
            sweep_max_page: env_or("CACHE_SWEEP_MAX_PAGE", 10),
            sweep_page_sizes,
        }
    }
}

/// Monthly price per plan in cents.
#[derive(Debug, Clone)]
pub struct PlanPricing {
    pub basic_cents: i64,
    pub express_cents: i64,
    pub premium_cents: i64,
}

impl PlanPricing {
    pub fn price_cents(&self, plan: SubscriptionPlan) -> i64 {
        match plan {
            SubscriptionPlan::Basic => self.basic_cents,
            SubscriptionPlan::Express => self.express_cents,
            SubscriptionPlan::Premium => self.premium_cents,
        }
    }
}

impl Default for PlanPricing {
    fn default() -> Self {
        Self {
            basic_cents: env_or("PLAN_PRICE_BASIC_CENTS", 2900),
            express_cents: env_or("PLAN_PRICE_EXPRESS_CENTS", 5900),
            premium_cents: env_or("PLAN_PRICE_PREMIUM_CENTS", 9900),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: String,
    pub jwt_secret: String,
    pub access_token_minutes: i64,
    pub bcrypt_cost: u32,
    pub otp_ttl: Duration,
    pub otp_length: usize,
    pub username_max_attempts: u32,
    pub slug_max_attempts: u32,
    pub public_base_url: String,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub upload_dir: String,
    pub max_upload_bytes: usize,
    pub redis_url: Option<String>,
    pub stripe_secret_key: Option<String>,
    pub stripe_api_base: String,
    pub mail_relay_url: Option<String>,
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub pricing: PlanPricing,
    pub cache: CachePolicy,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            environment: std::env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
            jwt_secret: std::env::var("JWT_SECRET")
                .unwrap_or_else(|_| DEFAULT_JWT_SECRET.to_string()),
            access_token_minutes: env_or("ACCESS_TOKEN_MINUTES", 60),
            bcrypt_cost: env_or("BCRYPT_COST", bcrypt::DEFAULT_COST),
            otp_ttl: Duration::from_secs(env_or("OTP_TTL_SECS", 300)),
            otp_length: env_or("OTP_LENGTH", 8),
            username_max_attempts: env_or("USERNAME_MAX_ATTEMPTS", 10),
            slug_max_attempts: env_or("SLUG_MAX_ATTEMPTS", 10),
            public_base_url: std::env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            default_page_size: env_or("DEFAULT_PAGE_SIZE", 9),
            max_page_size: env_or("MAX_PAGE_SIZE", 100),
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "uploads/portfolio".to_string()),
            max_upload_bytes: env_or("MAX_UPLOAD_BYTES", 5 * 1024 * 1024),
            redis_url: env_string("REDIS_URL"),
            stripe_secret_key: env_string("STRIPE_SECRET_KEY"),
            stripe_api_base: std::env::var("STRIPE_API_BASE")
                .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
            mail_relay_url: env_string("MAIL_RELAY_URL"),
            telegram_bot_token: env_string("TELEGRAM_BOT_TOKEN"),
            telegram_chat_id: env_string("TELEGRAM_CHAT_ID"),
            pricing: PlanPricing::default(),
            cache: CachePolicy::default(),
        }
    }
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// Refuse to run in production with the insecure default JWT secret.
    pub fn validate(&self) -> Result<(), String> {
        if self.is_production()
            && (self.jwt_secret.is_empty() || self.jwt_secret == DEFAULT_JWT_SECRET)
        {
            return Err(
                "JWT_SECRET must be set to a secure, unique value in production".to_string(),
            );
        }
        if !(4..=31).contains(&self.bcrypt_cost) {
            return Err("BCRYPT_COST must be between 4 and 31".to_string());
        }
        if self.otp_length == 0 {
            return Err("OTP_LENGTH must be at least 1".to_string());
        }
        if self.cache.sweep_page_sizes.is_empty() {
            return Err("CACHE_SWEEP_PAGE_SIZES must list at least one size".to_string());
        }
        Ok(())
    }
}
