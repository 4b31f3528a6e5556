use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;

use aid_core::page::DEFAULT_PAGE_SIZE;
use aid_core::query::{build, DateRange, FilterRequest};
use aid_core::{
    feed, Digest, Error, FacetField, PageRequest, Pagination, Preferences, PreferencesUpdate,
    ReadEntry, Result, UserProfile,
};

use crate::auth;
use crate::error::ApiError;
use crate::AppState;

/// Raw query parameters of the digest list endpoints. Everything arrives as
/// strings so malformed numbers can be rejected with a readable message
/// instead of a generic deserialization failure.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DigestQuery {
    pub category: Option<String>,
    pub source: Option<String>,
    /// Comma-separated.
    pub tags: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct DigestPage {
    pub digests: Vec<Digest>,
    pub pagination: Pagination,
}

fn parse_integer(name: &str, raw: Option<&str>, default: i64) -> Result<i64> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(default),
        Some(s) => s.parse::<i64>().map_err(|_| {
            Error::Validation(format!("Invalid {}: must be a positive integer", name))
        }),
    }
}

fn parse_date(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(Some(Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN))));
    }
    Err(Error::Validation(format!(
        "Invalid {}: expected an RFC 3339 timestamp or YYYY-MM-DD",
        name
    )))
}

/// Reject filter-shape problems before touching the store; clamp paging
/// into the configured bounds.
fn parse_query(query: &DigestQuery, max_page_size: u32) -> Result<(FilterRequest, PageRequest)> {
    let page = parse_integer("page", query.page.as_deref(), 1)?;
    let limit = parse_integer("limit", query.limit.as_deref(), DEFAULT_PAGE_SIZE as i64)?;

    let from = parse_date("startDate", query.start_date.as_deref())?;
    let to = parse_date("endDate", query.end_date.as_deref())?;
    let date_range = (from.is_some() || to.is_some()).then_some(DateRange { from, to });

    let filter = FilterRequest {
        category: query.category.clone(),
        source: query.source.clone(),
        tags: query
            .tags
            .as_deref()
            .map(|raw| raw.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
        date_range,
        search: query.search.clone(),
    };
    Ok((filter, PageRequest::clamped(page, limit, max_page_size)))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn list_digests(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DigestQuery>,
) -> std::result::Result<Json<DigestPage>, ApiError> {
    let (filter, page) = parse_query(&query, state.max_page_size)?;
    let predicate = build(&filter);
    let result = feed::with_timeout(state.storage_timeout, || {
        feed::fetch_page(state.digests.as_ref(), &predicate, &page)
    })
    .await?;
    Ok(Json(DigestPage {
        digests: result.items,
        pagination: result.pagination,
    }))
}

pub async fn personalized_digests(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<DigestQuery>,
) -> std::result::Result<Json<DigestPage>, ApiError> {
    let identity = auth::authenticate(state.verifier.as_ref(), &headers).await?;
    let (filter, page) = parse_query(&query, state.max_page_size)?;
    let predicate = build(&filter);

    let fetch = || {
        feed::with_timeout(state.storage_timeout, || {
            feed::personalized_page(
                state.digests.as_ref(),
                state.profiles.as_ref(),
                &identity.uid,
                predicate.clone(),
                &page,
            )
        })
    };

    let result = match fetch().await {
        Ok(result) => result,
        Err(Error::ProfileNotFound(_)) => {
            // First authenticated contact: provision a default profile and
            // serve the unpersonalized feed.
            state
                .profiles
                .upsert(&UserProfile::new(&identity.uid, &identity.email))
                .await?;
            fetch().await?
        }
        Err(err) => return Err(err.into()),
    };
    Ok(Json(DigestPage {
        digests: result.items,
        pagination: result.pagination,
    }))
}

pub async fn get_digest(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> std::result::Result<Json<Digest>, ApiError> {
    let digest = feed::with_timeout(state.storage_timeout, || state.digests.get(&id)).await?;
    digest
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Digest not found"))
}

async fn facet_list(
    state: &AppState,
    field: FacetField,
    key: &str,
) -> std::result::Result<Json<Vec<Value>>, ApiError> {
    let facets =
        feed::with_timeout(state.storage_timeout, || state.digests.facets(field, None)).await?;
    let body = facets
        .into_iter()
        .map(|facet| {
            let mut entry = Map::new();
            entry.insert(key.to_string(), json!(facet.value));
            entry.insert("count".to_string(), json!(facet.count));
            Value::Object(entry)
        })
        .collect();
    Ok(Json(body))
}

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<Vec<Value>>, ApiError> {
    facet_list(&state, FacetField::Category, "category").await
}

pub async fn list_sources(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<Vec<Value>>, ApiError> {
    facet_list(&state, FacetField::Source, "source").await
}

pub async fn list_tags(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<Vec<Value>>, ApiError> {
    facet_list(&state, FacetField::Tag, "tag").await
}

pub async fn stats(
    State(state): State<Arc<AppState>>,
) -> std::result::Result<Json<feed::DigestStats>, ApiError> {
    let stats = feed::with_timeout(state.storage_timeout, || {
        feed::digest_stats(state.digests.as_ref(), Utc::now())
    })
    .await?;
    Ok(Json(stats))
}

/// Raw preference fields, validated strictly before they can be stored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PreferencesPatch {
    pub categories: Option<Vec<String>>,
    pub digest_frequency: Option<String>,
    pub notifications_enabled: Option<bool>,
}

fn validate_patch(patch: &PreferencesPatch) -> Result<PreferencesUpdate> {
    let categories = patch
        .categories
        .as_ref()
        .map(|raw| raw.iter().map(|c| c.parse()).collect::<Result<Vec<_>>>())
        .transpose()?;
    let digest_frequency = patch
        .digest_frequency
        .as_deref()
        .map(str::parse)
        .transpose()?;
    Ok(PreferencesUpdate {
        categories,
        digest_frequency,
        notifications_enabled: patch.notifications_enabled,
    })
}

fn apply_update(preferences: &mut Preferences, update: &PreferencesUpdate) {
    if let Some(categories) = &update.categories {
        preferences.categories = categories.clone();
    }
    if let Some(frequency) = update.digest_frequency {
        preferences.digest_frequency = frequency;
    }
    if let Some(enabled) = update.notifications_enabled {
        preferences.notifications_enabled = enabled;
    }
}

pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> std::result::Result<Json<UserProfile>, ApiError> {
    let identity = auth::authenticate(state.verifier.as_ref(), &headers).await?;
    let profile = feed::with_timeout(state.storage_timeout, || {
        state.profiles.find_by_uid(&identity.uid)
    })
    .await?;
    profile
        .map(Json)
        .ok_or_else(|| ApiError::not_found("User profile not found"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileBody {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub preferences: Option<PreferencesPatch>,
}

/// Create-or-update the caller's profile. Missing profiles are created
/// with defaults; present fields overwrite, absent fields are untouched.
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ProfileBody>,
) -> std::result::Result<Json<UserProfile>, ApiError> {
    let identity = auth::authenticate(state.verifier.as_ref(), &headers).await?;
    let update = body
        .preferences
        .as_ref()
        .map(validate_patch)
        .transpose()?
        .unwrap_or_default();

    let mut profile = state
        .profiles
        .find_by_uid(&identity.uid)
        .await?
        .unwrap_or_else(|| UserProfile::new(&identity.uid, &identity.email));
    if let Some(display_name) = body.display_name {
        profile.display_name = display_name;
    }
    if let Some(photo_url) = body.photo_url {
        profile.photo_url = photo_url;
    }
    apply_update(&mut profile.preferences, &update);
    profile.last_login = Utc::now();

    state.profiles.upsert(&profile).await?;
    Ok(Json(profile))
}

pub async fn get_preferences(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> std::result::Result<Json<Preferences>, ApiError> {
    let identity = auth::authenticate(state.verifier.as_ref(), &headers).await?;
    let profile = state
        .profiles
        .find_by_uid(&identity.uid)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(profile.preferences))
}

pub async fn update_preferences(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<PreferencesPatch>,
) -> std::result::Result<Json<Preferences>, ApiError> {
    let identity = auth::authenticate(state.verifier.as_ref(), &headers).await?;
    let update = validate_patch(&body)?;
    let preferences = feed::with_timeout(state.storage_timeout, || {
        state.profiles.update_preferences(&identity.uid, &update)
    })
    .await?;
    Ok(Json(preferences))
}

pub async fn get_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> std::result::Result<Json<Vec<ReadEntry>>, ApiError> {
    let identity = auth::authenticate(state.verifier.as_ref(), &headers).await?;
    let profile = state
        .profiles
        .find_by_uid(&identity.uid)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(profile.read_history))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HistoryBody {
    pub digest_id: Option<String>,
}

/// Append a read event. No validation against digest existence: history is
/// a client-observed event, not a foreign key.
pub async fn add_history(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<HistoryBody>,
) -> std::result::Result<Json<Vec<ReadEntry>>, ApiError> {
    let identity = auth::authenticate(state.verifier.as_ref(), &headers).await?;
    let digest_id = body
        .digest_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| Error::Validation("Digest ID is required".to_string()))?;

    feed::record_read(state.profiles.as_ref(), &identity.uid, digest_id, Utc::now()).await?;
    let history =
        feed::with_timeout(state.storage_timeout, || state.profiles.history(&identity.uid))
            .await?;
    Ok(Json(history))
}
