//! Core domain model for the news aggregator: article records, the standard
//! category set and validation.

pub mod category;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

pub use category::{is_standard_category, map_section, standard_categories, Taxonomy};

pub const CRATE_NAME: &str = "newsagg-core";

/// Fallback title used by every adapter when upstream omits one.
pub const DEFAULT_TITLE: &str = "No Title";

pub const DEFAULT_SUMMARY_LEN: usize = 150;

/// Closed set of categories every stored article resolves into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StandardCategory {
    Business,
    Entertainment,
    General,
    Health,
    Science,
    Sports,
    Technology,
}

impl StandardCategory {
    pub const ALL: [StandardCategory; 7] = [
        StandardCategory::Business,
        StandardCategory::Entertainment,
        StandardCategory::General,
        StandardCategory::Health,
        StandardCategory::Science,
        StandardCategory::Sports,
        StandardCategory::Technology,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StandardCategory::Business => "business",
            StandardCategory::Entertainment => "entertainment",
            StandardCategory::General => "general",
            StandardCategory::Health => "health",
            StandardCategory::Science => "science",
            StandardCategory::Sports => "sports",
            StandardCategory::Technology => "technology",
        }
    }
}

impl fmt::Display for StandardCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown category: {0}")]
pub struct UnknownCategory(pub String);

impl FromStr for StandardCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        StandardCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("article title is empty")]
    EmptyTitle,
    #[error("article url is empty")]
    EmptyUrl,
    #[error("article url is malformed: {url}")]
    MalformedUrl { url: String },
}

/// Normalized handoff contract from source adapters into the aggregator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    pub content: Option<String>,
    pub description: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub source_name: String,
    pub source_id: Option<String>,
    pub category: Option<StandardCategory>,
    pub published_at: DateTime<Utc>,
}

impl ArticleDraft {
    /// Checks the gate every draft must pass before it may be persisted.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.url.trim().is_empty() {
            return Err(ValidationError::EmptyUrl);
        }
        // The stored url is the dedup key, so it must already be canonical.
        if self.url.trim() != self.url {
            return Err(ValidationError::MalformedUrl {
                url: self.url.clone(),
            });
        }
        match Url::parse(&self.url) {
            Ok(parsed) if parsed.has_host() => Ok(()),
            _ => Err(ValidationError::MalformedUrl {
                url: self.url.clone(),
            }),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// Description, falling back to content, cut to `max_chars`.
    pub fn summary(&self, max_chars: usize) -> String {
        let text = self
            .description
            .as_deref()
            .or(self.content.as_deref())
            .unwrap_or_default();
        truncate_chars(text, max_chars)
    }
}

/// Canonical persisted article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: Option<String>,
    pub description: Option<String>,
    pub url: String,
    pub image_url: Option<String>,
    pub source_name: String,
    pub source_id: Option<String>,
    pub category: Option<StandardCategory>,
    pub published_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Article {
    pub fn from_draft(id: i64, draft: ArticleDraft, stored_at: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            content: draft.content,
            description: draft.description,
            url: draft.url,
            image_url: draft.image_url,
            source_name: draft.source_name,
            source_id: draft.source_id,
            category: draft.category,
            published_at: draft.published_at,
            created_at: stored_at,
            updated_at: stored_at,
        }
    }
}

/// Truncates on a char boundary and appends `...` when anything was cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
