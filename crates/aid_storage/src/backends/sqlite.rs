use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use aid_core::{
    Digest, DigestStore, Error, FacetCount, FacetField, PageRequest, Predicate, Preferences,
    PreferencesUpdate, ProfileStore, ReadEntry, Result, UserProfile,
};

use crate::StorageBackend;

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS digests (
        id TEXT PRIMARY KEY,
        content_id TEXT NOT NULL UNIQUE,
        title TEXT NOT NULL,
        summary TEXT NOT NULL,
        category TEXT NOT NULL,
        source TEXT NOT NULL,
        tags TEXT NOT NULL DEFAULT '[]',
        url TEXT,
        original_date TEXT,
        date_created TEXT NOT NULL,
        is_enhanced INTEGER NOT NULL DEFAULT 0,
        enhanced_at TEXT,
        metadata TEXT
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_digests_category_created ON digests (category, date_created DESC)",
    "CREATE INDEX IF NOT EXISTS idx_digests_source_created ON digests (source, date_created DESC)",
    r#"
    CREATE TABLE IF NOT EXISTS profiles (
        uid TEXT PRIMARY KEY,
        email TEXT NOT NULL,
        display_name TEXT NOT NULL DEFAULT '',
        photo_url TEXT NOT NULL DEFAULT '',
        preferences TEXT NOT NULL,
        last_login TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS read_history (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        uid TEXT NOT NULL,
        digest_id TEXT NOT NULL,
        read_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_read_history_uid ON read_history (uid, seq)",
    // Add future migrations here
];

/// Timestamps are stored as fixed-width RFC 3339 UTC strings so string
/// comparison in SQL agrees with chronological order.
fn encode_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_date(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .map_err(|e| Error::Storage(format!("Failed to parse date '{}': {}", raw, e)))
}

/// Escape LIKE metacharacters; patterns are applied with `ESCAPE '\'`.
fn escape_like(needle: &str) -> String {
    needle
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Render the predicate as a WHERE fragment plus its string binds, in the
/// same AND semantics as `Predicate::matches`.
fn predicate_sql(predicate: &Predicate) -> (String, Vec<String>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut binds: Vec<String> = Vec::new();

    if let Some(category) = &predicate.category {
        clauses.push("digests.category = ?".to_string());
        binds.push(category.clone());
    }
    if !predicate.categories_any.is_empty() {
        let placeholders = vec!["?"; predicate.categories_any.len()].join(", ");
        clauses.push(format!("digests.category IN ({})", placeholders));
        binds.extend(
            predicate
                .categories_any
                .iter()
                .map(|c| c.as_str().to_string()),
        );
    }
    if let Some(source) = &predicate.source {
        clauses.push("digests.source = ?".to_string());
        binds.push(source.clone());
    }
    if !predicate.tags.is_empty() {
        let placeholders = vec!["?"; predicate.tags.len()].join(", ");
        clauses.push(format!(
            "EXISTS (SELECT 1 FROM json_each(digests.tags) WHERE json_each.value IN ({}))",
            placeholders
        ));
        binds.extend(predicate.tags.iter().cloned());
    }
    if let Some(from) = &predicate.created_from {
        clauses.push("digests.date_created >= ?".to_string());
        binds.push(encode_date(from));
    }
    if let Some(to) = &predicate.created_to {
        clauses.push("digests.date_created <= ?".to_string());
        binds.push(encode_date(to));
    }
    if let Some(needle) = &predicate.search {
        clauses.push(
            "(LOWER(digests.title) LIKE ? ESCAPE '\\' OR LOWER(digests.summary) LIKE ? ESCAPE '\\')"
                .to_string(),
        );
        let pattern = format!("%{}%", escape_like(needle));
        binds.push(pattern.clone());
        binds.push(pattern);
    }

    if clauses.is_empty() {
        (String::new(), binds)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), binds)
    }
}

fn row_to_digest(row: &sqlx::sqlite::SqliteRow) -> Result<Digest> {
    let tags: String = row.get("tags");
    let metadata: Option<String> = row.get("metadata");
    Ok(Digest {
        id: row.get("id"),
        content_id: row.get("content_id"),
        title: row.get("title"),
        summary: row.get("summary"),
        category: row
            .get::<String, _>("category")
            .parse()
            .map_err(|_| Error::Storage("Unknown category in digests table".to_string()))?,
        source: row.get("source"),
        tags: serde_json::from_str(&tags)?,
        url: row.get("url"),
        original_date: row
            .get::<Option<String>, _>("original_date")
            .as_deref()
            .map(decode_date)
            .transpose()?,
        date_created: decode_date(&row.get::<String, _>("date_created"))?,
        is_enhanced: row.get::<i64, _>("is_enhanced") != 0,
        enhanced_at: row
            .get::<Option<String>, _>("enhanced_at")
            .as_deref()
            .map(decode_date)
            .transpose()?,
        metadata: metadata.as_deref().map(serde_json::from_str).transpose()?,
    })
}

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
    db_path: PathBuf,
}

#[async_trait]
impl StorageBackend for SqliteStorage {
    fn get_error_message() -> &'static str {
        "SQLite database should be available at ./digests.db"
    }

    async fn new() -> Result<Self> {
        Self::new_with_path(Path::new("digests.db")).await
    }
}

impl SqliteStorage {
    pub async fn new_with_path(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| Error::Storage(format!("Failed to connect to database: {}", e)))?;

        for (i, migration) in MIGRATIONS.iter().enumerate() {
            sqlx::query(migration)
                .execute(&pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to run migration {}: {}", i, e)))?;
        }

        Ok(Self {
            pool: Arc::new(pool),
            db_path: db_path.to_path_buf(),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

#[async_trait]
impl DigestStore for SqliteStorage {
    async fn insert(&self, digest: &Digest) -> Result<()> {
        let id = if digest.id.is_empty() {
            digest.content_id.clone()
        } else {
            digest.id.clone()
        };
        let tags = serde_json::to_string(&digest.tags)?;
        let metadata = digest
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        // id and date_created are deliberately absent from the update set:
        // re-ingestion keeps the stored pagination keys stable.
        sqlx::query(
            r#"
            INSERT INTO digests
            (id, content_id, title, summary, category, source, tags, url,
             original_date, date_created, is_enhanced, enhanced_at, metadata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(content_id) DO UPDATE SET
                title = excluded.title,
                summary = excluded.summary,
                category = excluded.category,
                source = excluded.source,
                tags = excluded.tags,
                url = excluded.url,
                original_date = excluded.original_date,
                is_enhanced = excluded.is_enhanced,
                enhanced_at = excluded.enhanced_at,
                metadata = excluded.metadata
            "#,
        )
        .bind(&id)
        .bind(&digest.content_id)
        .bind(&digest.title)
        .bind(&digest.summary)
        .bind(digest.category.as_str())
        .bind(&digest.source)
        .bind(tags)
        .bind(digest.url.as_deref())
        .bind(digest.original_date.as_ref().map(encode_date))
        .bind(encode_date(&digest.date_created))
        .bind(digest.is_enhanced as i64)
        .bind(digest.enhanced_at.as_ref().map(encode_date))
        .bind(metadata)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to store digest: {}", e)))?;

        Ok(())
    }

    async fn find(&self, predicate: &Predicate, page: &PageRequest) -> Result<Vec<Digest>> {
        let (where_clause, binds) = predicate_sql(predicate);
        let sql = format!(
            "SELECT * FROM digests{} ORDER BY date_created DESC, id ASC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query
            .bind(page.limit as i64)
            .bind(page.skip() as i64)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch digests: {}", e)))?;

        rows.iter().map(row_to_digest).collect()
    }

    async fn count(&self, predicate: &Predicate) -> Result<u64> {
        let (where_clause, binds) = predicate_sql(predicate);
        let sql = format!("SELECT COUNT(*) AS total FROM digests{}", where_clause);

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let row = query
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to count digests: {}", e)))?;
        Ok(row.get::<i64, _>("total") as u64)
    }

    async fn get(&self, id: &str) -> Result<Option<Digest>> {
        let row = sqlx::query("SELECT * FROM digests WHERE id = ?")
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch digest: {}", e)))?;
        row.as_ref().map(row_to_digest).transpose()
    }

    async fn facets(
        &self,
        field: FacetField,
        predicate: Option<&Predicate>,
    ) -> Result<Vec<FacetCount>> {
        let everything = Predicate::default();
        let predicate = predicate.unwrap_or(&everything);
        let (where_clause, binds) = predicate_sql(predicate);

        let sql = match field {
            FacetField::Category => format!(
                "SELECT digests.category AS value, COUNT(*) AS total FROM digests{} \
                 GROUP BY digests.category ORDER BY total DESC, value ASC",
                where_clause
            ),
            FacetField::Source => format!(
                "SELECT digests.source AS value, COUNT(*) AS total FROM digests{} \
                 GROUP BY digests.source ORDER BY total DESC, value ASC",
                where_clause
            ),
            FacetField::Tag => format!(
                "SELECT tag_list.value AS value, COUNT(*) AS total \
                 FROM digests, json_each(digests.tags) AS tag_list{} \
                 GROUP BY tag_list.value ORDER BY total DESC, value ASC",
                where_clause
            ),
        };

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }
        let rows = query
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to aggregate facets: {}", e)))?;

        Ok(rows
            .iter()
            .map(|row| FacetCount {
                value: row.get("value"),
                count: row.get::<i64, _>("total") as u64,
            })
            .collect())
    }

    async fn mark_enhanced(
        &self,
        id: &str,
        at: DateTime<Utc>,
        metadata: Option<serde_json::Value>,
    ) -> Result<()> {
        let metadata = metadata.as_ref().map(serde_json::to_string).transpose()?;
        let result = sqlx::query(
            "UPDATE digests SET is_enhanced = 1, enhanced_at = ?, \
             metadata = COALESCE(?, metadata) WHERE id = ?",
        )
        .bind(encode_date(&at))
        .bind(metadata)
        .bind(id)
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to mark digest enhanced: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(Error::Storage(format!("Digest not found: {}", id)));
        }
        Ok(())
    }
}

impl SqliteStorage {
    async fn history_rows(&self, uid: &str) -> Result<Vec<ReadEntry>> {
        let rows =
            sqlx::query("SELECT digest_id, read_at FROM read_history WHERE uid = ? ORDER BY seq")
                .bind(uid)
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to fetch read history: {}", e)))?;
        rows.iter()
            .map(|row| {
                Ok(ReadEntry {
                    digest_id: row.get("digest_id"),
                    read_at: decode_date(&row.get::<String, _>("read_at"))?,
                })
            })
            .collect()
    }
}

#[async_trait]
impl ProfileStore for SqliteStorage {
    async fn find_by_uid(&self, uid: &str) -> Result<Option<UserProfile>> {
        let row = sqlx::query("SELECT * FROM profiles WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch profile: {}", e)))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let preferences: Preferences =
            serde_json::from_str(&row.get::<String, _>("preferences"))?;
        Ok(Some(UserProfile {
            uid: row.get("uid"),
            email: row.get("email"),
            display_name: row.get("display_name"),
            photo_url: row.get("photo_url"),
            preferences,
            read_history: self.history_rows(uid).await?,
            last_login: decode_date(&row.get::<String, _>("last_login"))?,
        }))
    }

    async fn upsert(&self, profile: &UserProfile) -> Result<()> {
        let preferences = serde_json::to_string(&profile.preferences)?;
        sqlx::query(
            r#"
            INSERT INTO profiles (uid, email, display_name, photo_url, preferences, last_login)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(uid) DO UPDATE SET
                email = excluded.email,
                display_name = excluded.display_name,
                photo_url = excluded.photo_url,
                preferences = excluded.preferences,
                last_login = excluded.last_login
            "#,
        )
        .bind(&profile.uid)
        .bind(&profile.email)
        .bind(&profile.display_name)
        .bind(&profile.photo_url)
        .bind(preferences)
        .bind(encode_date(&profile.last_login))
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to upsert profile: {}", e)))?;
        Ok(())
    }

    async fn update_preferences(
        &self,
        uid: &str,
        update: &PreferencesUpdate,
    ) -> Result<Preferences> {
        // Nested-field update via json_set keeps this a single atomic
        // UPDATE; absent fields never appear in the set expression.
        let mut paths: Vec<String> = Vec::new();
        let mut binds: Vec<String> = Vec::new();
        if let Some(categories) = &update.categories {
            paths.push("'$.categories', json(?)".to_string());
            binds.push(serde_json::to_string(categories)?);
        }
        if let Some(frequency) = update.digest_frequency {
            paths.push("'$.digestFrequency', ?".to_string());
            binds.push(
                serde_json::to_value(frequency)?
                    .as_str()
                    .unwrap_or_default()
                    .to_string(),
            );
        }
        if let Some(enabled) = update.notifications_enabled {
            paths.push("'$.notificationsEnabled', json(?)".to_string());
            binds.push(enabled.to_string());
        }

        if !paths.is_empty() {
            let sql = format!(
                "UPDATE profiles SET preferences = json_set(preferences, {}) WHERE uid = ?",
                paths.join(", ")
            );
            let mut query = sqlx::query(&sql);
            for bind in &binds {
                query = query.bind(bind);
            }
            let result = query
                .bind(uid)
                .execute(&*self.pool)
                .await
                .map_err(|e| Error::Storage(format!("Failed to update preferences: {}", e)))?;
            if result.rows_affected() == 0 {
                return Err(Error::ProfileNotFound(uid.to_string()));
            }
        }

        let row = sqlx::query("SELECT preferences FROM profiles WHERE uid = ?")
            .bind(uid)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to fetch preferences: {}", e)))?
            .ok_or_else(|| Error::ProfileNotFound(uid.to_string()))?;
        Ok(serde_json::from_str(&row.get::<String, _>("preferences"))?)
    }

    async fn push_history(&self, uid: &str, digest_id: &str, at: DateTime<Utc>) -> Result<()> {
        let defaults = serde_json::to_string(&Preferences::default())?;
        sqlx::query(
            "INSERT OR IGNORE INTO profiles (uid, email, preferences, last_login) \
             VALUES (?, '', ?, ?)",
        )
        .bind(uid)
        .bind(defaults)
        .bind(encode_date(&at))
        .execute(&*self.pool)
        .await
        .map_err(|e| Error::Storage(format!("Failed to provision profile: {}", e)))?;

        sqlx::query("INSERT INTO read_history (uid, digest_id, read_at) VALUES (?, ?, ?)")
            .bind(uid)
            .bind(digest_id)
            .bind(encode_date(&at))
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Storage(format!("Failed to append read history: {}", e)))?;
        Ok(())
    }

    async fn history(&self, uid: &str) -> Result<Vec<ReadEntry>> {
        self.history_rows(uid).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStorage;
    use aid_core::query::{build, FilterRequest};
    use aid_core::Category;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn digest(id: &str, category: Category, source: &str, tags: &[&str], day: u32) -> Digest {
        Digest {
            id: id.to_string(),
            content_id: format!("content-{}", id),
            title: format!("Digest {} on attention", id),
            summary: format!("Summary {} covering 100% of the topic", id),
            category,
            source: source.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            url: Some(format!("https://example.com/{}", id)),
            original_date: None,
            date_created: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            is_enhanced: false,
            enhanced_at: None,
            metadata: None,
        }
    }

    fn corpus() -> Vec<Digest> {
        vec![
            digest("d01", Category::Llm, "github", &["llm", "agents"], 1),
            digest("d02", Category::Llm, "github", &["llm"], 2),
            digest("d03", Category::Llm, "github", &["llm", "rag", "eval"], 3),
            digest("d04", Category::Llm, "arxiv", &["llm"], 4),
            digest("d05", Category::Llm, "arxiv", &["llm", "agents"], 5),
            digest("d06", Category::Nlp, "huggingface", &["tokenizers"], 6),
            digest("d07", Category::ComputerVision, "arxiv", &["detection"], 7),
            digest("d08", Category::Mlops, "github", &["pipelines"], 8),
        ]
    }

    async fn seeded() -> (tempfile::TempDir, SqliteStorage) {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new_with_path(&dir.path().join("test.db"))
            .await
            .unwrap();
        for d in corpus() {
            storage.insert(&d).await.unwrap();
        }
        (dir, storage)
    }

    #[tokio::test]
    async fn agrees_with_memory_backend() {
        let (_dir, sqlite) = seeded().await;
        let memory = MemoryStorage::new();
        for d in corpus() {
            memory.insert(&d).await.unwrap();
        }

        let predicates = vec![
            Predicate::default(),
            build(&FilterRequest {
                category: Some("llm".to_string()),
                ..FilterRequest::default()
            }),
            build(&FilterRequest {
                source: Some("arxiv".to_string()),
                tags: vec!["agents".to_string(), "detection".to_string()],
                ..FilterRequest::default()
            }),
            build(&FilterRequest {
                search: Some("ATTENTION".to_string()),
                ..FilterRequest::default()
            }),
            build(&FilterRequest {
                date_range: Some(aid_core::DateRange {
                    from: Some(Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap()),
                    to: Some(Utc.with_ymd_and_hms(2024, 3, 6, 12, 0, 0).unwrap()),
                }),
                ..FilterRequest::default()
            }),
        ];

        let page = PageRequest::clamped(1, 50, 100);
        for predicate in &predicates {
            let a = sqlite.find(predicate, &page).await.unwrap();
            let b = memory.find(predicate, &page).await.unwrap();
            let ids = |items: &[Digest]| items.iter().map(|d| d.id.clone()).collect::<Vec<_>>();
            assert_eq!(ids(&a), ids(&b), "find disagreement for {:?}", predicate);
            assert_eq!(
                sqlite.count(predicate).await.unwrap(),
                memory.count(predicate).await.unwrap(),
                "count disagreement for {:?}",
                predicate
            );
            for field in [FacetField::Category, FacetField::Source, FacetField::Tag] {
                assert_eq!(
                    sqlite.facets(field, Some(predicate)).await.unwrap(),
                    memory.facets(field, Some(predicate)).await.unwrap(),
                    "facet disagreement for {:?} {:?}",
                    field,
                    predicate
                );
            }
        }
    }

    #[tokio::test]
    async fn pagination_is_deterministic() {
        let (_dir, storage) = seeded().await;
        let predicate = Predicate::default();
        let mut all = Vec::new();
        for page in 1..=3 {
            let items = storage
                .find(&predicate, &PageRequest::clamped(page, 3, 100))
                .await
                .unwrap();
            all.extend(items.into_iter().map(|d| d.id));
        }
        assert_eq!(
            all,
            vec!["d08", "d07", "d06", "d05", "d04", "d03", "d02", "d01"]
        );
    }

    #[tokio::test]
    async fn like_metacharacters_are_literal() {
        let (_dir, storage) = seeded().await;
        // Every summary contains "100%"; a search for "0%" must match via
        // the literal percent, not a wildcard.
        let predicate = build(&FilterRequest {
            search: Some("100%".to_string()),
            ..FilterRequest::default()
        });
        assert_eq!(storage.count(&predicate).await.unwrap(), 8);

        let predicate = build(&FilterRequest {
            search: Some("100_".to_string()),
            ..FilterRequest::default()
        });
        assert_eq!(storage.count(&predicate).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reingestion_upserts_by_content_id() {
        let (_dir, storage) = seeded().await;
        let mut updated = digest("d01", Category::Llm, "github", &["llm"], 1);
        updated.id = "other-id".to_string();
        updated.title = "Rewritten".to_string();
        storage.insert(&updated).await.unwrap();

        assert_eq!(storage.count(&Predicate::default()).await.unwrap(), 8);
        let stored = storage.get("d01").await.unwrap().unwrap();
        assert_eq!(stored.title, "Rewritten");
    }

    #[tokio::test]
    async fn digest_round_trips_all_fields() {
        let dir = tempdir().unwrap();
        let storage = SqliteStorage::new_with_path(&dir.path().join("test.db"))
            .await
            .unwrap();
        let mut d = digest("d01", Category::Multimodal, "huggingface", &["vlm"], 1);
        d.original_date = Some(Utc.with_ymd_and_hms(2024, 2, 28, 9, 30, 0).unwrap());
        d.metadata = Some(serde_json::json!({"stars": 421}));
        storage.insert(&d).await.unwrap();

        let stored = storage.get("d01").await.unwrap().unwrap();
        assert_eq!(stored.content_id, d.content_id);
        assert_eq!(stored.category, Category::Multimodal);
        assert_eq!(stored.tags, vec!["vlm"]);
        assert_eq!(stored.original_date, d.original_date);
        assert_eq!(stored.date_created, d.date_created);
        assert_eq!(stored.metadata, d.metadata);
    }

    #[tokio::test]
    async fn mark_enhanced_updates_one_row() {
        let (_dir, storage) = seeded().await;
        let at = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap();
        storage.mark_enhanced("d02", at, None).await.unwrap();
        let stored = storage.get("d02").await.unwrap().unwrap();
        assert!(stored.is_enhanced);
        assert_eq!(stored.enhanced_at, Some(at));
        assert!(storage.mark_enhanced("ghost", at, None).await.is_err());
    }

    #[tokio::test]
    async fn profile_round_trip_and_partial_update() {
        let (_dir, storage) = seeded().await;
        let mut profile = UserProfile::new("u1", "u1@example.com");
        profile.display_name = "Ada".to_string();
        storage.upsert(&profile).await.unwrap();

        let loaded = storage.find_by_uid("u1").await.unwrap().unwrap();
        assert_eq!(loaded.display_name, "Ada");
        assert!(loaded.preferences.categories.is_empty());

        let update = PreferencesUpdate {
            categories: Some(vec![Category::Llm, Category::Research]),
            notifications_enabled: Some(false),
            ..PreferencesUpdate::default()
        };
        let prefs = storage.update_preferences("u1", &update).await.unwrap();
        assert_eq!(prefs.categories, vec![Category::Llm, Category::Research]);
        assert!(!prefs.notifications_enabled);
        // Untouched field retains its value.
        assert_eq!(
            prefs.digest_frequency,
            aid_core::DigestFrequency::Daily
        );

        let missing = storage.update_preferences("ghost", &update).await;
        assert!(matches!(missing, Err(Error::ProfileNotFound(_))));
    }

    #[tokio::test]
    async fn history_is_an_append_only_log() {
        let (_dir, storage) = seeded().await;
        let t1 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 3, 4, 8, 0, 0).unwrap();
        storage.push_history("u1", "d01", t1).await.unwrap();
        storage.push_history("u1", "d01", t2).await.unwrap();
        storage.push_history("u1", "never-stored", t2).await.unwrap();

        let history = storage.history("u1").await.unwrap();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].read_at, t1);
        assert_eq!(history[1].read_at, t2);

        // The append provisioned a minimal profile.
        let profile = storage.find_by_uid("u1").await.unwrap().unwrap();
        assert_eq!(profile.read_history.len(), 3);
    }
}
