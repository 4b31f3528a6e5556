use chrono::{DateTime, Utc};

use crate::types::{Category, Digest};

/// Parsed filter input from a digest list request. Absent fields impose no
/// constraint.
#[derive(Debug, Clone, Default)]
pub struct FilterRequest {
    pub category: Option<String>,
    pub source: Option<String>,
    pub tags: Vec<String>,
    pub date_range: Option<DateRange>,
    pub search: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Storage-agnostic filter condition. Built once from a `FilterRequest` and
/// passed by value to the pagination and facet paths; every field is ANDed,
/// `tags` and `categories_any` are any-of within themselves.
///
/// `category` and `source` stay raw strings on purpose: unknown values come
/// from untrusted query input and must match nothing rather than error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    pub category: Option<String>,
    pub source: Option<String>,
    pub tags: Vec<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    /// Lowercased at build time; matched as substring of title or summary.
    pub search: Option<String>,
    /// Personalization narrowing: digest category must be in this set when
    /// non-empty.
    pub categories_any: Vec<Category>,
}

/// Translate a filter request into a predicate. Empty strings and empty tag
/// lists are dropped so they impose no constraint.
pub fn build(filter: &FilterRequest) -> Predicate {
    let non_empty = |s: &Option<String>| s.as_deref().filter(|v| !v.is_empty()).map(String::from);

    Predicate {
        category: non_empty(&filter.category),
        source: non_empty(&filter.source),
        tags: filter
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        created_from: filter.date_range.and_then(|r| r.from),
        created_to: filter.date_range.and_then(|r| r.to),
        search: non_empty(&filter.search).map(|s| s.to_lowercase()),
        categories_any: Vec::new(),
    }
}

impl Predicate {
    /// AND this predicate with "category ∈ categories". Used by the
    /// personalization resolver; an empty set leaves the predicate as-is.
    pub fn with_category_set(mut self, categories: &[Category]) -> Self {
        self.categories_any = categories.to_vec();
        self
    }

    pub fn is_unconstrained(&self) -> bool {
        self.category.is_none()
            && self.source.is_none()
            && self.tags.is_empty()
            && self.created_from.is_none()
            && self.created_to.is_none()
            && self.search.is_none()
            && self.categories_any.is_empty()
    }

    /// In-process evaluation of the predicate, used by the memory backend
    /// and as the reference semantics for SQL translation.
    pub fn matches(&self, digest: &Digest) -> bool {
        if let Some(category) = &self.category {
            if digest.category.as_str() != category {
                return false;
            }
        }
        if !self.categories_any.is_empty() && !self.categories_any.contains(&digest.category) {
            return false;
        }
        if let Some(source) = &self.source {
            if &digest.source != source {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| digest.tags.contains(t)) {
            return false;
        }
        if let Some(from) = self.created_from {
            if digest.date_created < from {
                return false;
            }
        }
        if let Some(to) = self.created_to {
            if digest.date_created > to {
                return false;
            }
        }
        if let Some(needle) = &self.search {
            let in_title = digest.title.to_lowercase().contains(needle.as_str());
            let in_summary = digest.summary.to_lowercase().contains(needle.as_str());
            if !in_title && !in_summary {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn digest(category: Category, source: &str, tags: &[&str], day: u32) -> Digest {
        Digest {
            id: format!("d{}", day),
            content_id: format!("content-{}", day),
            title: "Attention Is All You Need".to_string(),
            summary: "A transformer architecture survey".to_string(),
            category,
            source: source.to_string(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            url: None,
            original_date: None,
            date_created: Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap(),
            is_enhanced: false,
            enhanced_at: None,
            metadata: None,
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let predicate = build(&FilterRequest::default());
        assert!(predicate.is_unconstrained());
        assert!(predicate.matches(&digest(Category::Llm, "arxiv", &[], 1)));
    }

    #[test]
    fn fields_narrow_with_and() {
        let predicate = build(&FilterRequest {
            category: Some("llm".to_string()),
            source: Some("arxiv".to_string()),
            ..FilterRequest::default()
        });
        assert!(predicate.matches(&digest(Category::Llm, "arxiv", &[], 1)));
        assert!(!predicate.matches(&digest(Category::Llm, "github", &[], 1)));
        assert!(!predicate.matches(&digest(Category::Nlp, "arxiv", &[], 1)));
    }

    #[test]
    fn unknown_category_matches_nothing() {
        let predicate = build(&FilterRequest {
            category: Some("not_a_category".to_string()),
            ..FilterRequest::default()
        });
        for category in Category::ALL {
            assert!(!predicate.matches(&digest(category, "arxiv", &[], 1)));
        }
    }

    #[test]
    fn tags_match_on_intersection() {
        let predicate = build(&FilterRequest {
            tags: vec!["transformers".to_string(), "rag".to_string()],
            ..FilterRequest::default()
        });
        assert!(predicate.matches(&digest(Category::Llm, "arxiv", &["rag", "eval"], 1)));
        assert!(!predicate.matches(&digest(Category::Llm, "arxiv", &["eval"], 1)));
    }

    #[test]
    fn blank_tags_are_dropped() {
        let predicate = build(&FilterRequest {
            tags: vec![" ".to_string(), String::new()],
            ..FilterRequest::default()
        });
        assert!(predicate.tags.is_empty());
        assert!(predicate.is_unconstrained());
    }

    #[test]
    fn date_range_bounds_are_inclusive() {
        let range = DateRange {
            from: Some(Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()),
            to: Some(Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()),
        };
        let predicate = build(&FilterRequest {
            date_range: Some(range),
            ..FilterRequest::default()
        });
        assert!(predicate.matches(&digest(Category::Llm, "arxiv", &[], 5)));
        assert!(predicate.matches(&digest(Category::Llm, "arxiv", &[], 10)));
        assert!(!predicate.matches(&digest(Category::Llm, "arxiv", &[], 4)));
        assert!(!predicate.matches(&digest(Category::Llm, "arxiv", &[], 11)));
    }

    #[test]
    fn search_is_case_insensitive_over_title_or_summary() {
        let predicate = build(&FilterRequest {
            search: Some("TRANSFORMER".to_string()),
            ..FilterRequest::default()
        });
        // "transformer" appears in the summary only.
        assert!(predicate.matches(&digest(Category::Llm, "arxiv", &[], 1)));

        let predicate = build(&FilterRequest {
            search: Some("attention".to_string()),
            ..FilterRequest::default()
        });
        assert!(predicate.matches(&digest(Category::Llm, "arxiv", &[], 1)));

        let predicate = build(&FilterRequest {
            search: Some("diffusion".to_string()),
            ..FilterRequest::default()
        });
        assert!(!predicate.matches(&digest(Category::Llm, "arxiv", &[], 1)));
    }

    #[test]
    fn category_set_narrows_composably() {
        let base = build(&FilterRequest {
            source: Some("arxiv".to_string()),
            ..FilterRequest::default()
        });
        let narrowed = base.clone().with_category_set(&[Category::Llm, Category::Nlp]);
        assert!(narrowed.matches(&digest(Category::Nlp, "arxiv", &[], 1)));
        assert!(!narrowed.matches(&digest(Category::Mlops, "arxiv", &[], 1)));
        // The original constraint still applies.
        assert!(!narrowed.matches(&digest(Category::Llm, "github", &[], 1)));
    }

    #[test]
    fn same_filter_builds_equal_predicates() {
        let filter = FilterRequest {
            category: Some("llm".to_string()),
            tags: vec!["rag".to_string()],
            search: Some("Eval".to_string()),
            ..FilterRequest::default()
        };
        assert_eq!(build(&filter), build(&filter));
    }
}
