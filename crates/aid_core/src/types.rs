use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// The fixed set of digest categories. Stored preferences must stay within
/// this set; free-form filter input is compared against `as_str` instead of
/// being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Llm,
    ComputerVision,
    ReinforcementLearning,
    Nlp,
    Mlops,
    Multimodal,
    Research,
    AiTools,
}

impl Category {
    pub const ALL: [Category; 8] = [
        Category::Llm,
        Category::ComputerVision,
        Category::ReinforcementLearning,
        Category::Nlp,
        Category::Mlops,
        Category::Multimodal,
        Category::Research,
        Category::AiTools,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Llm => "llm",
            Category::ComputerVision => "computer_vision",
            Category::ReinforcementLearning => "reinforcement_learning",
            Category::Nlp => "nlp",
            Category::Mlops => "mlops",
            Category::Multimodal => "multimodal",
            Category::Research => "research",
            Category::AiTools => "ai_tools",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::Validation(format!("Invalid category: {}", s)))
    }
}

/// A summarized content item. Immutable after ingestion except for the
/// enhancement fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    /// Storage id; also the stable secondary sort key for pagination.
    #[serde(default)]
    pub id: String,
    pub content_id: String,
    pub title: String,
    pub summary: String,
    pub category: Category,
    pub source: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub url: Option<String>,
    pub original_date: Option<DateTime<Utc>>,
    pub date_created: DateTime<Utc>,
    #[serde(default)]
    pub is_enhanced: bool,
    pub enhanced_at: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestFrequency {
    Daily,
    Weekly,
}

impl FromStr for DigestFrequency {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "daily" => Ok(DigestFrequency::Daily),
            "weekly" => Ok(DigestFrequency::Weekly),
            _ => Err(Error::Validation(
                "Invalid digest frequency. Must be \"daily\" or \"weekly\"".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub categories: Vec<Category>,
    pub digest_frequency: DigestFrequency,
    pub notifications_enabled: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            categories: Vec::new(),
            digest_frequency: DigestFrequency::Daily,
            notifications_enabled: true,
        }
    }
}

/// One read event. Duplicate digest ids are expected; history is a log of
/// events, not a set of read digests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadEntry {
    pub digest_id: String,
    pub read_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub photo_url: String,
    #[serde(default)]
    pub preferences: Preferences,
    #[serde(default)]
    pub read_history: Vec<ReadEntry>,
    pub last_login: DateTime<Utc>,
}

impl UserProfile {
    /// Default profile created on first authenticated contact.
    pub fn new(uid: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            display_name: String::new(),
            photo_url: String::new(),
            preferences: Preferences::default(),
            read_history: Vec::new(),
            last_login: Utc::now(),
        }
    }
}
