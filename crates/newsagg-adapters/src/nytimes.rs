use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsagg_core::{map_section, ArticleDraft, Taxonomy, DEFAULT_TITLE};
use serde_json::Value as JsonValue;

use crate::{
    join_endpoint, json_items, json_str, optional_text, param, parse_published_at, pick_text,
    AdapterContext, SourceAdapter, SourceKind,
};

const ARTICLE_SEARCH_PATH: &str = "/search/v2/articlesearch.json";

/// Multimedia paths in article search results are relative to this.
pub const NYT_MEDIA_BASE_URL: &str = "https://www.nytimes.com/";

/// NYTimes article search API.
#[derive(Debug, Clone)]
pub struct NyTimesAdapter {
    base_url: String,
    api_key: String,
}

impl NyTimesAdapter {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    pub fn normalize_article(&self, item: &JsonValue, ctx: &AdapterContext) -> ArticleDraft {
        ArticleDraft {
            title: pick_text(item, &[&["headline", "main"]]).unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            content: optional_text(item, &[&["lead_paragraph"], &["snippet"]]),
            description: optional_text(item, &[&["abstract"], &["snippet"]]),
            url: json_str(item, &["web_url"]).map(str::trim).unwrap_or_default().to_string(),
            image_url: first_image_url(item),
            source_name: self.source_name().to_string(),
            source_id: optional_text(item, &[&["_id"]]),
            category: map_section(json_str(item, &["section_name"]), Taxonomy::NyTimes),
            published_at: parse_published_at(json_str(item, &["pub_date"]), ctx.fetched_at),
        }
    }
}

fn first_image_url(item: &JsonValue) -> Option<String> {
    let media = json_items(item, &["multimedia"]);
    let path = media
        .iter()
        .filter(|m| json_str(m, &["type"]) == Some("image"))
        .find_map(|m| json_str(m, &["url"]).map(str::trim).filter(|u| !u.is_empty()))?;

    if path.starts_with("http://") || path.starts_with("https://") {
        Some(path.to_string())
    } else {
        Some(format!("{NYT_MEDIA_BASE_URL}{}", path.trim_start_matches('/')))
    }
}

#[async_trait]
impl SourceAdapter for NyTimesAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::NyTimes
    }

    fn endpoint_url(&self) -> String {
        join_endpoint(&self.base_url, ARTICLE_SEARCH_PATH)
    }

    fn default_params(&self) -> Vec<(String, String)> {
        vec![param("api-key", self.api_key.as_str())]
    }

    fn window_params(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Vec<(String, String)> {
        [("begin_date", from), ("end_date", to)]
            .into_iter()
            .filter_map(|(key, bound)| bound.map(|ts| param(key, ts.format("%Y%m%d").to_string())))
            .collect()
    }

    fn parse_body(&self, body: &JsonValue, ctx: &AdapterContext) -> Vec<ArticleDraft> {
        json_items(body, &["response", "docs"])
            .iter()
            .map(|item| self.normalize_article(item, ctx))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_image_entry_wins_and_is_prefixed() {
        let item = json!({
            "multimedia": [
                { "type": "video", "url": "videos/clip.mp4" },
                { "type": "image", "url": "" },
                { "type": "image", "url": "images/2023/09/06/lead.jpg" },
                { "type": "image", "url": "images/second.jpg" }
            ]
        });
        assert_eq!(
            first_image_url(&item).as_deref(),
            Some("https://www.nytimes.com/images/2023/09/06/lead.jpg")
        );
    }

    #[test]
    fn absolute_or_missing_media_is_handled() {
        let absolute = json!({ "multimedia": [{ "type": "image", "url": "https://static01.nyt.com/a.jpg" }] });
        assert_eq!(first_image_url(&absolute).as_deref(), Some("https://static01.nyt.com/a.jpg"));
        assert_eq!(first_image_url(&json!({ "multimedia": "none" })), None);
        assert_eq!(first_image_url(&json!({})), None);
        assert_eq!(first_image_url(&json!({ "multimedia": [{ "type": "video", "url": "v.mp4" }] })), None);
    }
}
