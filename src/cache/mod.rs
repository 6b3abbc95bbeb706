/*!
 * Cache Module
 * Key-value cache seam, structured keys and the invalidation coordinator
 */
pub mod coordinator;
pub mod memory;
pub mod redis_backend;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

pub use coordinator::CacheCoordinator;
pub use memory::MemoryCache;
pub use redis_backend::RedisCache;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("cache pool error: {0}")]
    Pool(String),
    #[error("cache command failed: {0}")]
    Command(#[from] redis::RedisError),
    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Key-value store with per-entry TTL. No transactional guarantee with the
/// primary store.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Delete `key` only if it currently holds `expected`, in one step.
    /// Returns whether the entry was consumed.
    async fn consume(&self, key: &str, expected: &str) -> Result<bool, CacheError>;

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        for key in keys {
            self.delete(key).await?;
        }
        Ok(())
    }

    async fn ping(&self) -> Result<Duration, CacheError>;
}

/// Which cached listing a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListingMode {
    /// Unfiltered browse listing, featured first.
    Browse,
    Featured,
}

impl ListingMode {
    pub const ALL: [ListingMode; 2] = [ListingMode::Browse, ListingMode::Featured];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingMode::Browse => "browse",
            ListingMode::Featured => "featured",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    ArtistDetail(String),
    Listing {
        mode: ListingMode,
        page: u32,
        page_size: u32,
    },
    Otp(String),
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheKey::ArtistDetail(slug) => write!(f, "artist:detail:{}", slug),
            CacheKey::Listing {
                mode,
                page,
                page_size,
            } => write!(f, "artists:{}:page:{}:size:{}", mode.as_str(), page, page_size),
            CacheKey::Otp(email) => write!(f, "otp:{}", email.to_lowercase()),
        }
    }
}
