//! Listing Query Engine.
//!
//! Unfiltered listings are cached per (mode, page, page_size); filtered
//! searches always go to storage.

use serde::{Deserialize, Serialize};

use super::visible_artist;
use crate::cache::ListingMode;
use crate::config::AppConfig;
use crate::db::models::{ArtistProfile, PortfolioImage};
use crate::db::store::{ArtistOrder, ArtistQuery};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Raw query-string parameters. Pagination arrives as text so malformed
/// values become validation errors rather than extractor rejections.
#[derive(Debug, Default, Deserialize)]
pub struct ListingParams {
    pub q: Option<String>,
    pub location: Option<String>,
    pub page: Option<String>,
    #[serde(alias = "pageSize")]
    pub page_size: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
}

impl Pagination {
    pub fn offset(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArtistFilter {
    pub query: Option<String>,
    pub location: Option<String>,
}

impl ArtistFilter {
    pub fn is_active(&self) -> bool {
        self.query.is_some() || self.location.is_some()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn positive(name: &str, raw: Option<&str>, default: u32) -> AppResult<u32> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(raw) => match raw.parse::<u32>() {
            Ok(v) if v >= 1 => Ok(v),
            _ => Err(AppError::validation(format!(
                "{} must be a positive integer",
                name
            ))),
        },
    }
}

impl ListingParams {
    pub fn filter(&self) -> ArtistFilter {
        ArtistFilter {
            query: non_blank(self.q.clone()),
            location: non_blank(self.location.clone()),
        }
    }

    pub fn pagination(&self, config: &AppConfig) -> AppResult<Pagination> {
        let page = positive("page", self.page.as_deref(), 1)?;
        let page_size = positive(
            "page_size",
            self.page_size.as_deref(),
            config.default_page_size,
        )?;
        if page_size > config.max_page_size {
            return Err(AppError::validation(format!(
                "page_size must not exceed {}",
                config.max_page_size
            )));
        }
        Ok(Pagination { page, page_size })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistPage {
    pub items: Vec<ArtistProfile>,
    pub total_count: i64,
    pub page: u32,
    pub page_size: u32,
    pub has_more: bool,
}

impl ArtistPage {
    fn new(items: Vec<ArtistProfile>, total_count: i64, pagination: Pagination) -> Self {
        Self {
            has_more: pagination.offset() + i64::from(pagination.page_size) < total_count,
            items,
            total_count,
            page: pagination.page,
            page_size: pagination.page_size,
        }
    }
}

pub async fn list_artists(
    state: &AppState,
    filter: ArtistFilter,
    pagination: Pagination,
) -> AppResult<ArtistPage> {
    let active = filter.is_active();
    if !active {
        if let Some(page) = state
            .cache
            .get_listing::<ArtistPage>(ListingMode::Browse, pagination.page, pagination.page_size)
            .await
        {
            return Ok(page);
        }
    }

    let query = ArtistQuery {
        search: filter.query,
        location: filter.location,
        featured_only: false,
        order: if active {
            ArtistOrder::RatingDesc
        } else {
            ArtistOrder::FeaturedFirst
        },
        offset: pagination.offset(),
        limit: i64::from(pagination.page_size),
    };
    let (items, total) = state.store.list_artists(&query).await?;
    let page = ArtistPage::new(items, total, pagination);

    if !active {
        state
            .cache
            .put_listing(ListingMode::Browse, pagination.page, pagination.page_size, &page)
            .await;
    }
    Ok(page)
}

/// Featured artists newest first, or every visible artist newest first when
/// none is featured.
pub async fn list_featured(state: &AppState, pagination: Pagination) -> AppResult<ArtistPage> {
    if let Some(page) = state
        .cache
        .get_listing::<ArtistPage>(ListingMode::Featured, pagination.page, pagination.page_size)
        .await
    {
        return Ok(page);
    }

    let mut query = ArtistQuery {
        search: None,
        location: None,
        featured_only: true,
        order: ArtistOrder::Newest,
        offset: pagination.offset(),
        limit: i64::from(pagination.page_size),
    };
    let (mut items, mut total) = state.store.list_artists(&query).await?;
    if total == 0 {
        query.featured_only = false;
        (items, total) = state.store.list_artists(&query).await?;
    }
    let page = ArtistPage::new(items, total, pagination);

    state
        .cache
        .put_listing(ListingMode::Featured, pagination.page, pagination.page_size, &page)
        .await;
    Ok(page)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtistDetail {
    #[serde(flatten)]
    pub profile: ArtistProfile,
    pub portfolio: Vec<PortfolioImage>,
}

pub async fn artist_detail(state: &AppState, slug: &str) -> AppResult<ArtistDetail> {
    if let Some(detail) = state.cache.get_detail::<ArtistDetail>(slug).await {
        return Ok(detail);
    }

    let profile = visible_artist(state, slug).await?;
    let portfolio = state.store.portfolio_images(profile.id).await?;
    let detail = ArtistDetail { profile, portfolio };

    state.cache.put_detail(slug, &detail).await;
    Ok(detail)
}
