use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::error::Error;
use crate::page::{PageRequest, PageResult, Pagination};
use crate::query::Predicate;
use crate::storage::{DigestStore, FacetField, ProfileStore};
use crate::types::{Digest, UserProfile};
use crate::Result;

/// Fetch one page of digests plus pagination metadata. Items and total are
/// computed under the same predicate; a page past the end yields empty
/// items with accurate metadata, not an error.
pub async fn fetch_page(
    store: &dyn DigestStore,
    predicate: &Predicate,
    page: &PageRequest,
) -> Result<PageResult<Digest>> {
    let items = store.find(predicate, page).await?;
    let total = store.count(predicate).await?;
    Ok(PageResult {
        items,
        pagination: Pagination::new(total, page),
    })
}

/// Merge a user's stored category preferences into the base predicate.
/// An empty preference set imposes no constraint: a user with no declared
/// interests sees everything, not nothing.
pub fn resolve(base: Predicate, profile: &UserProfile) -> Predicate {
    if profile.preferences.categories.is_empty() {
        base
    } else {
        base.with_category_set(&profile.preferences.categories)
    }
}

/// Personalized feed for a known user. Fails with `Error::ProfileNotFound`
/// when the uid has no profile; callers are expected to provision a default
/// profile on first contact and retry rather than surfacing the error.
pub async fn personalized_page(
    digests: &dyn DigestStore,
    profiles: &dyn ProfileStore,
    uid: &str,
    base: Predicate,
    page: &PageRequest,
) -> Result<PageResult<Digest>> {
    let profile = profiles
        .find_by_uid(uid)
        .await?
        .ok_or_else(|| Error::ProfileNotFound(uid.to_string()))?;
    let predicate = resolve(base, &profile);
    fetch_page(digests, &predicate, page).await
}

/// Append a read event. Unconditional: duplicate reads of the same digest
/// are separate entries, and the digest need not exist in the store.
pub async fn record_read(
    profiles: &dyn ProfileStore,
    uid: &str,
    digest_id: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    profiles.push_history(uid, digest_id, at).await
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamedCount {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimePeriodCounts {
    pub last_day: u64,
    pub last_week: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestStats {
    pub total: u64,
    pub by_category: Vec<NamedCount>,
    pub by_source: Vec<NamedCount>,
    pub by_time_period: TimePeriodCounts,
}

/// Corpus-wide counts: total, per-category, per-source, and recent-activity
/// windows relative to `now`.
pub async fn digest_stats(store: &dyn DigestStore, now: DateTime<Utc>) -> Result<DigestStats> {
    let everything = Predicate::default();
    let total = store.count(&everything).await?;

    let named = |facets: Vec<crate::storage::FacetCount>| {
        facets
            .into_iter()
            .map(|f| NamedCount {
                name: f.value,
                count: f.count,
            })
            .collect::<Vec<_>>()
    };
    let by_category = named(store.facets(FacetField::Category, None).await?);
    let by_source = named(store.facets(FacetField::Source, None).await?);

    let since = |days: i64| Predicate {
        created_from: Some(now - ChronoDuration::days(days)),
        ..Predicate::default()
    };
    let last_day = store.count(&since(1)).await?;
    let last_week = store.count(&since(7)).await?;

    Ok(DigestStats {
        total,
        by_category,
        by_source,
        by_time_period: TimePeriodCounts {
            last_day,
            last_week,
        },
    })
}

/// Run a storage operation under a request-level timeout, retrying once on
/// expiry before giving up with `Error::StorageTimeout`.
pub async fn with_timeout<T, F, Fut>(limit: Duration, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    for attempt in 0..2u8 {
        match tokio::time::timeout(limit, op()).await {
            Ok(result) => return result,
            Err(_) if attempt == 0 => {
                warn!("storage call timed out after {:?}, retrying once", limit);
            }
            Err(_) => break,
        }
    }
    Err(Error::StorageTimeout(format!(
        "storage call exceeded {:?} twice",
        limit
    )))
}
