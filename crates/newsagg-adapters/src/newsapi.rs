use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use newsagg_core::{ArticleDraft, DEFAULT_TITLE};
use serde_json::Value as JsonValue;

use crate::{
    join_endpoint, json_items, json_str, optional_text, param, parse_published_at, pick_text,
    AdapterContext, SourceAdapter, SourceKind,
};

const EVERYTHING_PATH: &str = "/everything";

/// NewsAPI.org `/everything` search. Upstream carries no taxonomy, so drafts
/// are never categorized.
#[derive(Debug, Clone)]
pub struct NewsApiAdapter {
    base_url: String,
    api_key: String,
}

impl NewsApiAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn normalize_article(&self, item: &JsonValue, ctx: &AdapterContext) -> ArticleDraft {
        ArticleDraft {
            title: pick_text(item, &[&["title"]]).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            content: optional_text(item, &[&["content"]]),
            description: optional_text(item, &[&["description"]]),
            url: json_str(item, &["url"]).map(str::trim).unwrap_or_default().to_string(),
            image_url: optional_text(item, &[&["urlToImage"]]),
            source_name: self.source_name().to_string(),
            source_id: optional_text(item, &[&["source", "id"]]),
            category: None,
            published_at: parse_published_at(json_str(item, &["publishedAt"]), ctx.fetched_at),
        }
    }
}

#[async_trait]
impl SourceAdapter for NewsApiAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::NewsApi
    }

    fn endpoint_url(&self) -> String {
        join_endpoint(&self.base_url, EVERYTHING_PATH)
    }

    fn default_params(&self) -> Vec<(String, String)> {
        vec![
            param("apiKey", self.api_key.as_str()),
            param("language", "en"),
            param("sortBy", "publishedAt"),
            param("pageSize", "100"),
        ]
    }

    fn window_params(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Vec<(String, String)> {
        [("from", from), ("to", to)]
            .into_iter()
            .filter_map(|(key, bound)| {
                bound.map(|ts| param(key, ts.to_rfc3339_opts(SecondsFormat::Secs, true)))
            })
            .collect()
    }

    fn parse_body(&self, body: &JsonValue, ctx: &AdapterContext) -> Vec<ArticleDraft> {
        json_items(body, &["articles"])
            .iter()
            .map(|item| self.normalize_article(item, ctx))
            .collect()
    }
}
