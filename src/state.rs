//! Shared application state handed to every handler through axum `State`.

use std::sync::Arc;

use crate::cache::{CacheCoordinator, CacheStore, MemoryCache, RedisCache};
use crate::config::AppConfig;
use crate::db::{self, memory::MemoryStore, postgres::PgStore, store::Store, DbConfig};
use crate::integrations::notify::{HttpNotifier, LogNotifier, Notifier, TelegramTarget};
use crate::integrations::payment::{PaymentGateway, StripeGateway, UnconfiguredGateway};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: CacheCoordinator,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        cache: Arc<dyn CacheStore>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        config: AppConfig,
    ) -> Self {
        Self {
            store,
            cache: CacheCoordinator::new(cache, config.cache.clone()),
            gateway,
            notifier,
            config: Arc::new(config),
        }
    }

    /// Wire every collaborator from configuration, falling back to the
    /// in-process implementations when a backing service is not configured.
    pub async fn from_config(config: AppConfig) -> Result<Self, String> {
        let store: Arc<dyn Store> = match DbConfig::from_env() {
            Some(db_config) => {
                let pool = db::init_pool(&db_config)
                    .await
                    .map_err(|e| format!("Failed to initialize database pool: {}", e))?;
                db::run_migrations(&pool)
                    .await
                    .map_err(|e| format!("Failed to run database migrations: {}", e))?;
                Arc::new(PgStore::new(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL not set. Using the in-memory store; data is not persisted.");
                Arc::new(MemoryStore::new())
            }
        };

        let cache: Arc<dyn CacheStore> = match &config.redis_url {
            Some(url) => {
                let redis = RedisCache::new(url.clone())
                    .map_err(|e| e.to_string())?
                    .with_key_prefix(config.cache.key_prefix.clone());
                tracing::info!("Redis cache configured");
                Arc::new(redis)
            }
            None => {
                tracing::info!("REDIS_URL not set. Using the in-process cache.");
                Arc::new(MemoryCache::new())
            }
        };

        let gateway: Arc<dyn PaymentGateway> = match &config.stripe_secret_key {
            Some(key) => Arc::new(StripeGateway::new(config.stripe_api_base.clone(), key.clone())),
            None => {
                tracing::warn!("STRIPE_SECRET_KEY not set. Paid signups and plan changes are disabled.");
                Arc::new(UnconfiguredGateway)
            }
        };

        let telegram = match (&config.telegram_bot_token, &config.telegram_chat_id) {
            (Some(bot_token), Some(chat_id)) => Some(TelegramTarget {
                bot_token: bot_token.clone(),
                chat_id: chat_id.clone(),
            }),
            _ => None,
        };
        let notifier: Arc<dyn Notifier> = match &config.mail_relay_url {
            Some(url) => Arc::new(HttpNotifier::new(url.clone(), telegram)),
            None => {
                tracing::info!("MAIL_RELAY_URL not set. Verification codes are written to the log.");
                Arc::new(LogNotifier)
            }
        };

        Ok(Self::new(store, cache, gateway, notifier, config))
    }
}
