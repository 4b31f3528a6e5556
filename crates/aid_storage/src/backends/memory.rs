use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use aid_core::{
    Digest, DigestStore, Error, FacetCount, FacetField, PageRequest, Predicate, Preferences,
    PreferencesUpdate, ProfileStore, ReadEntry, Result, UserProfile,
};

use crate::StorageBackend;

/// Plain in-process store. Default backend for development and the
/// reference implementation the SQLite backend is tested against.
#[derive(Default)]
struct Inner {
    digests: Vec<Digest>,
    profiles: HashMap<String, UserProfile>,
}

impl Inner {
    fn matching<'a>(&'a self, predicate: &'a Predicate) -> impl Iterator<Item = &'a Digest> {
        self.digests.iter().filter(|d| predicate.matches(d))
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorage {
    fn get_error_message() -> &'static str {
        "Memory storage should be available"
    }

    async fn new() -> Result<Self> {
        Ok(Self::new())
    }
}

#[async_trait]
impl DigestStore for MemoryStorage {
    async fn insert(&self, digest: &Digest) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner
            .digests
            .iter_mut()
            .find(|d| d.content_id == digest.content_id)
        {
            // Re-ingestion of the same item: keep the stored identity and
            // creation time so pagination keys stay stable.
            let mut updated = digest.clone();
            updated.id = existing.id.clone();
            updated.date_created = existing.date_created;
            *existing = updated;
        } else {
            let mut stored = digest.clone();
            if stored.id.is_empty() {
                stored.id = stored.content_id.clone();
            }
            inner.digests.push(stored);
        }
        Ok(())
    }

    async fn find(&self, predicate: &Predicate, page: &PageRequest) -> Result<Vec<Digest>> {
        let inner = self.inner.read().await;
        let mut matched: Vec<Digest> = inner.matching(predicate).cloned().collect();
        // Newest first; id ascending keeps equal timestamps deterministic.
        matched.sort_by(|a, b| {
            b.date_created
                .cmp(&a.date_created)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(matched
            .into_iter()
            .skip(page.skip() as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner.matching(predicate).count() as u64)
    }

    async fn get(&self, id: &str) -> Result<Option<Digest>> {
        let inner = self.inner.read().await;
        Ok(inner.digests.iter().find(|d| d.id == id).cloned())
    }

    async fn facets(
        &self,
        field: FacetField,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<FacetCount>> {
        let everything = Predicate::default();
        let predicate = predicate.unwrap_or(&everything);
        let inner = self.inner.read().await;

        let mut counts: HashMap<String, u64> = HashMap::new();
        for digest in inner.matching(predicate) {
            match field {
                FacetField::Category => {
                    *counts.entry(digest.category.as_str().to_string()).or_default() += 1;
                }
                FacetField::Source => {
                    *counts.entry(digest.source.clone()).or_default() += 1;
                }
                FacetField::Tag => {
                    for tag in &digest.tags {
                        *counts.entry(tag.clone()).or_default() += 1;
                    }
                }
            }
        }

        let mut facets: Vec<FacetCount> = counts
            .into_iter()
            .map(|(value, count)| FacetCount { value, count })
            .collect();
        facets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        Ok(facets)
    }

    async fn mark_enhanced(
        &self,
        id: &str,
        at: DateTime<Utc>,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let digest = inner
            .digests
            .iter_mut()
            .find(|d| d.id == id)
            .ok_or_else(|| Error::Storage(format!("Digest not found: {}", id)))?;
        digest.is_enhanced = true;
        digest.enhanced_at = Some(at);
        if metadata.is_some() {
            digest.metadata = metadata;
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for MemoryStorage {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<UserProfile>> {
        let inner = self.inner.read().await;
        Ok(inner.profiles.get(uid).cloned())
    }

    async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.profiles.insert(profile.uid.clone(), profile.clone());
        Ok(())
    }

    async fn update_preferences(
        &self,
        uid: &str,
        update: &PreferencesUpdate,
    ) -> Result<Preferences> {
        let mut inner = self.inner.write().await;
        let profile = inner
            .profiles
            .get_mut(uid)
            .ok_or_else(|| Error::ProfileNotFound(uid.to_string()))?;
        if let Some(categories) = &update.categories {
            profile.preferences.categories = categories.clone();
        }
        if let Some(frequency) = update.digest_frequency {
            profile.preferences.digest_frequency = frequency;
        }
        if let Some(enabled) = update.notifications_enabled {
            profile.preferences.notifications_enabled = enabled;
        }
        Ok(profile.preferences.clone())
    }

    async fn push_history(&self, uid: &str, digest_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let profile = inner
            .profiles
            .entry(uid.to_string())
            .or_insert_with(|| UserProfile::new(uid, ""));
        profile.read_history.push(ReadEntry {
            digest_id: digest_id.to_string(),
            read_at: at,
        });
        Ok(())
    }

    async fn history(&self, uid: &str) -> Result<Vec<ReadEntry>> {
        let inner = self.inner.read().await;
        Ok(inner
            .profiles
            .get(uid)
            .map(|p| p.read_history.clone())
            .unwrap_or_default())
    }
}
