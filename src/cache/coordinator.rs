//! Cache Invalidation Coordinator.
//!
//! Write paths call [`CacheCoordinator::artist_changed`] after their store
//! write has returned. Every listing page that may have been cached is purged,
//! so invalidation over-approximates and never misses an entry. Failures are
//! logged and swallowed; they never fail the triggering write.

use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};

use super::{CacheError, CacheKey, CacheStore, ListingMode};
use crate::config::CachePolicy;

#[derive(Clone)]
pub struct CacheCoordinator {
    store: Arc<dyn CacheStore>,
    policy: CachePolicy,
}

impl CacheCoordinator {
    pub fn new(store: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
        Self { store, policy }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Only pages inside the sweep range are ever written, so the sweep covers
    /// every listing entry that can exist.
    pub fn listing_cacheable(&self, page: u32, page_size: u32) -> bool {
        page >= 1
            && page <= self.policy.sweep_max_page
            && self.policy.sweep_page_sizes.contains(&page_size)
    }

    /// The full listing key space swept on every artist write.
    pub fn listing_keys(&self) -> Vec<CacheKey> {
        let mut keys = Vec::new();
        for mode in ListingMode::ALL {
            for page in 1..=self.policy.sweep_max_page {
                for &page_size in &self.policy.sweep_page_sizes {
                    keys.push(CacheKey::Listing {
                        mode,
                        page,
                        page_size,
                    });
                }
            }
        }
        keys
    }

    /// Cached JSON value, or `None` on miss. Read failures count as misses.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let raw = match self.store.get(&key.to_string()).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry");
                let _ = self.store.delete(&key.to_string()).await;
                None
            }
        }
    }

    /// Best-effort write.
    pub async fn put_json<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) {
        let result = match serde_json::to_string(value) {
            Ok(raw) => self.store.set(&key.to_string(), &raw, ttl).await,
            Err(e) => Err(CacheError::from(e)),
        };
        if let Err(e) = result {
            tracing::warn!(key = %key, error = %e, "cache write failed");
        }
    }

    pub async fn get_listing<T: DeserializeOwned>(
        &self,
        mode: ListingMode,
        page: u32,
        page_size: u32,
    ) -> Option<T> {
        if !self.listing_cacheable(page, page_size) {
            return None;
        }
        self.get_json(&CacheKey::Listing {
            mode,
            page,
            page_size,
        })
        .await
    }

    pub async fn put_listing<T: Serialize>(
        &self,
        mode: ListingMode,
        page: u32,
        page_size: u32,
        value: &T,
    ) {
        if !self.listing_cacheable(page, page_size) {
            return;
        }
        let key = CacheKey::Listing {
            mode,
            page,
            page_size,
        };
        self.put_json(&key, value, self.policy.listing_ttl).await;
    }

    pub async fn get_detail<T: DeserializeOwned>(&self, slug: &str) -> Option<T> {
        self.get_json(&CacheKey::ArtistDetail(slug.to_string()))
            .await
    }

    pub async fn put_detail<T: Serialize>(&self, slug: &str, value: &T) {
        let key = CacheKey::ArtistDetail(slug.to_string());
        self.put_json(&key, value, self.policy.detail_ttl).await;
    }

    /// Purge the detail entries for both slugs and the whole listing space.
    pub async fn artist_changed(&self, old_slug: Option<&str>, new_slug: &str) {
        let mut keys: Vec<String> = Vec::with_capacity(2 + self.listing_keys().len());
        keys.push(CacheKey::ArtistDetail(new_slug.to_string()).to_string());
        if let Some(old) = old_slug.filter(|old| *old != new_slug) {
            keys.push(CacheKey::ArtistDetail(old.to_string()).to_string());
        }
        keys.extend(self.listing_keys().iter().map(CacheKey::to_string));

        match self.store.delete_many(&keys).await {
            Ok(()) => tracing::debug!(
                slug = %new_slug,
                old_slug = ?old_slug,
                keys = keys.len(),
                "artist cache entries invalidated"
            ),
            Err(e) => tracing::warn!(
                slug = %new_slug,
                error = %e,
                "cache invalidation failed"
            ),
        }
    }

    pub async fn store_otp(&self, email: &str, code: &str, ttl: Duration) -> Result<(), CacheError> {
        self.store
            .set(&CacheKey::Otp(email.to_string()).to_string(), code, ttl)
            .await
    }

    /// Single-use check: true only for the one caller that removed a
    /// matching code.
    pub async fn consume_otp(&self, email: &str, code: &str) -> Result<bool, CacheError> {
        self.store
            .consume(&CacheKey::Otp(email.to_string()).to_string(), code)
            .await
    }

    pub async fn ping(&self) -> Result<Duration, CacheError> {
        self.store.ping().await
    }
}
