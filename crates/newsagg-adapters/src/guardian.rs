use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsagg_core::{map_section, ArticleDraft, Taxonomy, DEFAULT_TITLE};
use serde_json::Value as JsonValue;

use crate::{
    clean_content, join_endpoint, json_items, json_str, optional_text, param, parse_published_at,
    pick_text, AdapterContext, SourceAdapter, SourceKind,
};

const SEARCH_PATH: &str = "/search";

/// Guardian content API `/search`.
#[derive(Debug, Clone)]
pub struct GuardianAdapter {
    base_url: String,
    api_key: String,
}

impl GuardianAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn normalize_article(&self, item: &JsonValue, ctx: &AdapterContext) -> ArticleDraft {
        ArticleDraft {
            title: pick_text(item, &[&["fields", "headline"], &["webTitle"]])
                .unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            content: clean_content(optional_text(item, &[&["fields", "body"]])),
            description: optional_text(item, &[&["fields", "trailText"]]),
            url: json_str(item, &["webUrl"]).map(str::trim).unwrap_or_default().to_string(),
            image_url: optional_text(item, &[&["fields", "thumbnail"]]),
            source_name: self.source_name().to_string(),
            source_id: optional_text(item, &[&["id"]]),
            category: map_section(json_str(item, &["sectionName"]), Taxonomy::Guardian),
            published_at: parse_published_at(json_str(item, &["webPublicationDate"]), ctx.fetched_at),
        }
    }
}

#[async_trait]
impl SourceAdapter for GuardianAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::Guardian
    }

    fn endpoint_url(&self) -> String {
        join_endpoint(&self.base_url, SEARCH_PATH)
    }

    fn default_params(&self) -> Vec<(String, String)> {
        vec![
            param("api-key", self.api_key.as_str()),
            param("show-fields", "headline,byline,body,thumbnail,trailText"),
            param("show-tags", "keyword"),
            param("page-size", "50"),
            param("order-by", "newest"),
        ]
    }

    fn window_params(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Vec<(String, String)> {
        [("from-date", from), ("to-date", to)]
            .into_iter()
            .filter_map(|(key, bound)| bound.map(|ts| param(key, ts.format("%Y-%m-%d").to_string())))
            .collect()
    }

    fn parse_body(&self, body: &JsonValue, ctx: &AdapterContext) -> Vec<ArticleDraft> {
        json_items(body, &["response", "results"])
            .iter()
            .map(|item| self.normalize_article(item, ctx))
            .collect()
    }
}
