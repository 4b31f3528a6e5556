use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::page::PageRequest;
use crate::query::Predicate;
use crate::types::{Category, Digest, DigestFrequency, Preferences, ReadEntry, UserProfile};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetField {
    Category,
    Source,
    Tag,
}

/// One distinct value with its count. Backends must return these sorted by
/// count descending, ties broken by value ascending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FacetCount {
    pub value: String,
    pub count: u64,
}

#[async_trait]
pub trait DigestStore: Send + Sync {
    /// Upsert by `content_id` (the ingestion idempotency key). The stored
    /// `id` and `date_created` of an existing record are preserved.
    async fn insert(&self, digest: &Digest) -> Result<()>;

    /// Fetch one page under the predicate, sorted newest-first by
    /// `date_created` with `id` ascending as the tiebreak, so repeated
    /// calls paginate deterministically.
    async fn find(&self, predicate: &Predicate, page: &PageRequest) -> Result<Vec<Digest>>;

    /// Count all digests matching the predicate, independent of paging.
    async fn count(&self, predicate: &Predicate) -> Result<u64>;

    async fn get(&self, id: &str) -> Result<Option<Digest>>;

    /// Distinct-value counts for the field, over the whole corpus when no
    /// predicate is given. A digest contributes one count per tag it holds.
    async fn facets(
        &self,
        field: FacetField,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<FacetCount>>;

    /// The only permitted mutation of a stored digest: set the enhancement
    /// fields in a single atomic update.
    async fn mark_enhanced(
        &self,
        id: &str,
        at: DateTime<Utc>,
        metadata: Option<serde_json::Value>,
    ) -> Result<()>;
}

/// Partial preferences update; absent fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct PreferencesUpdate {
    pub categories: Option<Vec<Category>>,
    pub digest_frequency: Option<DigestFrequency>,
    pub notifications_enabled: Option<bool>,
}

#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<UserProfile>>;

    /// Create or replace the whole profile document.
    async fn upsert(&self, profile: &UserProfile) -> Result<()>;

    /// Nested-field update of the preferences; fails with
    /// `Error::ProfileNotFound` when no profile exists for the uid.
    async fn update_preferences(
        &self,
        uid: &str,
        update: &PreferencesUpdate,
    ) -> Result<Preferences>;

    /// Atomic append to the read-history log, provisioning a minimal
    /// profile when none exists yet. Never validates digest existence.
    async fn push_history(&self, uid: &str, digest_id: &str, at: DateTime<Utc>) -> Result<()>;

    async fn history(&self, uid: &str) -> Result<Vec<ReadEntry>>;
}
