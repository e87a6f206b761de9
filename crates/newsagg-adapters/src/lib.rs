//! Source adapter contracts + the three upstream news API adapters.

mod guardian;
mod newsapi;
mod nytimes;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use newsagg_core::ArticleDraft;
use newsagg_storage::HttpFetcher;
use scraper::Html;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info};
use uuid::Uuid;

pub use guardian::GuardianAdapter;
pub use newsapi::NewsApiAdapter;
pub use nytimes::NyTimesAdapter;

pub const CRATE_NAME: &str = "newsagg-adapters";

/// Guardian bodies are HTML; stored content is capped at this many chars.
pub const MAX_CONTENT_CHARS: usize = 10_000;

/// The fixed set of upstreams this aggregator knows how to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    NewsApi,
    Guardian,
    NyTimes,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::NewsApi, SourceKind::Guardian, SourceKind::NyTimes];

    pub fn key(self) -> &'static str {
        match self {
            SourceKind::NewsApi => "newsapi",
            SourceKind::Guardian => "guardian",
            SourceKind::NyTimes => "nytimes",
        }
    }

    /// Provenance name stamped onto every article from this source.
    pub fn display_name(self) -> &'static str {
        match self {
            SourceKind::NewsApi => "NewsAPI",
            SourceKind::Guardian => "The Guardian",
            SourceKind::NyTimes => "New York Times",
        }
    }

    /// Newest-first ordering hints in each upstream's own parameter names.
    pub fn sort_hints(self) -> Vec<(&'static str, &'static str)> {
        match self {
            SourceKind::NewsApi => vec![("sortBy", "publishedAt"), ("language", "en")],
            SourceKind::Guardian => vec![("order-by", "newest")],
            SourceKind::NyTimes => vec![("sort", "newest")],
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown source `{0}` (expected one of: newsapi, guardian, nytimes)")]
pub struct UnknownSource(pub String);

impl FromStr for SourceKind {
    type Err = UnknownSource;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim();
        SourceKind::ALL
            .into_iter()
            .find(|k| k.key().eq_ignore_ascii_case(needle))
            .ok_or_else(|| UnknownSource(s.to_string()))
    }
}

/// Per-run identity shared by every adapter call of one aggregation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterContext {
    pub run_id: Uuid,
    /// Ingestion time; substituted for missing or unparsable publish dates.
    pub fetched_at: DateTime<Utc>,
}

impl AdapterContext {
    pub fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            fetched_at: Utc::now(),
        }
    }
}

impl Default for AdapterContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Caller-supplied run parameters: a time window and per-source query hints.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub hints: BTreeMap<SourceKind, BTreeMap<String, String>>,
    /// Restricts the run to these sources when set.
    pub sources: Option<BTreeSet<SourceKind>>,
}

impl FetchParams {
    pub fn window(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            ..Default::default()
        }
    }

    pub fn with_hint(mut self, kind: SourceKind, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.hints
            .entry(kind)
            .or_default()
            .insert(key.into(), value.into());
        self
    }

    pub fn with_sort_hints(self, kind: SourceKind) -> Self {
        kind.sort_hints()
            .into_iter()
            .fold(self, |params, (k, v)| params.with_hint(kind, k, v))
    }

    pub fn only(mut self, kind: SourceKind) -> Self {
        self.sources.get_or_insert_with(BTreeSet::new).insert(kind);
        self
    }

    pub fn includes(&self, kind: SourceKind) -> bool {
        self.sources.as_ref().map_or(true, |s| s.contains(&kind))
    }

    pub fn hints_for(&self, kind: SourceKind) -> Option<&BTreeMap<String, String>> {
        self.hints.get(&kind)
    }
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid endpoint url {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    fn source_name(&self) -> &'static str {
        self.kind().display_name()
    }

    /// Full search/listing endpoint, without query string.
    fn endpoint_url(&self) -> String;

    /// Adapter defaults, credential included.
    fn default_params(&self) -> Vec<(String, String)>;

    /// Window bounds translated into the upstream's own parameter names.
    fn window_params(&self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Vec<(String, String)>;

    /// Converts a decoded response body into drafts. Never fails; a body
    /// without the expected item list yields no drafts.
    fn parse_body(&self, body: &JsonValue, ctx: &AdapterContext) -> Vec<ArticleDraft>;

    /// Defaults, then window bounds, then this source's hints; later keys win.
    fn query_params(&self, params: &FetchParams) -> Vec<(String, String)> {
        let mut merged = BTreeMap::new();
        merged.extend(self.default_params());
        merged.extend(self.window_params(params.from, params.to));
        if let Some(hints) = params.hints_for(self.kind()) {
            merged.extend(hints.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        merged.into_iter().collect()
    }

    /// One GET against the upstream. Transport and upstream failures are
    /// logged and produce an empty list so other sources keep running.
    async fn fetch(
        &self,
        http: &HttpFetcher,
        ctx: &AdapterContext,
        params: &FetchParams,
    ) -> Result<Vec<ArticleDraft>, AdapterError> {
        let endpoint = self.endpoint_url();
        url::Url::parse(&endpoint).map_err(|e| AdapterError::InvalidEndpoint {
            url: endpoint.clone(),
            reason: e.to_string(),
        })?;

        info!(source = self.kind().key(), "fetching articles from {}", self.source_name());
        let query = self.query_params(params);
        match http.get_json(ctx.run_id, self.kind().key(), &endpoint, &query).await {
            Ok(resp) => Ok(self.parse_body(&resp.body, ctx)),
            Err(err) => {
                error!(
                    source = self.kind().key(),
                    endpoint = %endpoint,
                    status = err.status(),
                    error = %err,
                    "news API request failed for {}",
                    self.source_name()
                );
                Ok(Vec::new())
            }
        }
    }
}

pub fn adapter_for_source(
    kind: SourceKind,
    base_url: impl Into<String>,
    api_key: impl Into<String>,
) -> Box<dyn SourceAdapter> {
    match kind {
        SourceKind::NewsApi => Box::new(NewsApiAdapter::new(base_url, api_key)),
        SourceKind::Guardian => Box::new(GuardianAdapter::new(base_url, api_key)),
        SourceKind::NyTimes => Box::new(NyTimesAdapter::new(base_url, api_key)),
    }
}

pub fn load_fixture_body(path: impl AsRef<Path>) -> Result<JsonValue> {
    let path = path.as_ref();
    let data = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
}

fn join_endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

fn param(key: &str, value: impl Into<String>) -> (String, String) {
    (key.to_string(), value.into())
}

fn json_str<'a>(value: &'a JsonValue, path: &[&str]) -> Option<&'a str> {
    let mut cur = value;
    for segment in path {
        cur = cur.get(*segment)?;
    }
    cur.as_str()
}

fn json_items<'a>(value: &'a JsonValue, path: &[&str]) -> &'a [JsonValue] {
    let mut cur = value;
    for segment in path {
        match cur.get(*segment) {
            Some(next) => cur = next,
            None => return &[],
        }
    }
    cur.as_array().map(Vec::as_slice).unwrap_or_default()
}

/// First non-blank string among `paths`, else the first string present.
fn pick_text(value: &JsonValue, paths: &[&[&str]]) -> Option<String> {
    let present = paths
        .iter()
        .filter_map(|path| json_str(value, path))
        .collect::<Vec<_>>();
    present
        .iter()
        .find(|s| !s.trim().is_empty())
        .or(present.first())
        .map(|s| s.to_string())
}

/// Like [`pick_text`] but blank values collapse to `None`.
fn optional_text(value: &JsonValue, paths: &[&[&str]]) -> Option<String> {
    pick_text(value, paths).filter(|s| !s.trim().is_empty())
}

/// Accepts RFC 3339, `+0000`-style offsets and bare dates; anything else
/// falls back to `fallback`.
fn parse_published_at(raw: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return fallback;
    };
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%z") {
        return dt.with_timezone(&Utc);
    }
    if let Some(dt) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
    {
        return dt.and_utc();
    }
    debug!(raw, "unparsable publish date, using ingestion time");
    fallback
}

/// Strips markup, decodes entities and caps the length.
fn clean_content(html: Option<String>) -> Option<String> {
    let html = html?;
    let fragment = Html::parse_fragment(&html);
    let text = fragment.root_element().text().collect::<String>();
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(newsagg_core::truncate_chars(text, MAX_CONTENT_CHARS))
}
