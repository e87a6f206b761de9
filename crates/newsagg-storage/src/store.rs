use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsagg_core::{Article, ArticleDraft, StandardCategory};
use thiserror::Error;
use tokio::sync::Mutex;

pub const DEFAULT_PER_PAGE: u32 = 15;
pub const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The unique index on `url` rejected the write.
    #[error("article with url {url} already exists")]
    Duplicate { url: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored row could not be decoded: {0}")]
    Corrupt(String),
    #[error("database error: {0}")]
    Database(#[source] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl StoreError {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// Read-side filter over stored articles, newest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleFilter {
    pub source_name: Option<String>,
    pub category: Option<StandardCategory>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// Case-insensitive substring match on title or description.
    pub keyword: Option<String>,
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
}

impl Default for ArticleFilter {
    fn default() -> Self {
        Self {
            source_name: None,
            category: None,
            from: None,
            to: None,
            keyword: None,
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl ArticleFilter {
    pub fn page(&self) -> u32 {
        self.page.max(1)
    }

    pub fn per_page(&self) -> u32 {
        self.per_page.clamp(1, MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.per_page())
    }

    fn keyword(&self) -> Option<String> {
        self.keyword
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_lowercase)
    }

    fn matches(&self, article: &Article) -> bool {
        if let Some(source) = &self.source_name {
            if &article.source_name != source {
                return false;
            }
        }
        if self.category.is_some() && article.category != self.category {
            return false;
        }
        if self.from.is_some_and(|from| article.published_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| article.published_at > to) {
            return false;
        }
        if let Some(keyword) = self.keyword() {
            let in_title = article.title.to_lowercase().contains(&keyword);
            let in_description = article
                .description
                .as_deref()
                .is_some_and(|d| d.to_lowercase().contains(&keyword));
            if !in_title && !in_description {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArticlePage {
    pub items: Vec<Article>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

impl ArticlePage {
    pub fn last_page(&self) -> u32 {
        let pages = self.total.div_ceil(u64::from(self.per_page.max(1)));
        u32::try_from(pages).unwrap_or(u32::MAX).max(1)
    }
}

/// Persistent relational store of articles, keyed uniquely by `url`.
#[async_trait]
pub trait ArticleStore: Send + Sync {
    /// Cheap reachability probe.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>, StoreError>;

    /// Inserts a new article. An existing `url` yields [`StoreError::Duplicate`]
    /// and leaves the stored row untouched.
    async fn insert(&self, draft: &ArticleDraft) -> Result<Article, StoreError>;

    /// Deletes every article published strictly before `cutoff`.
    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError>;

    async fn count(&self) -> Result<u64, StoreError>;

    async fn query(&self, filter: &ArticleFilter) -> Result<ArticlePage, StoreError>;

    async fn distinct_sources(&self) -> Result<Vec<String>, StoreError>;

    async fn distinct_categories(&self) -> Result<Vec<StandardCategory>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    rows: BTreeMap<i64, Article>,
    by_url: HashMap<String, i64>,
}

/// Process-local store with the same uniqueness guarantees as the SQL schema.
#[derive(Debug, Default)]
pub struct MemoryArticleStore {
    state: Mutex<MemoryState>,
}

impl MemoryArticleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored article in insertion order.
    pub async fn all(&self) -> Vec<Article> {
        self.state.lock().await.rows.values().cloned().collect()
    }
}

#[async_trait]
impl ArticleStore for MemoryArticleStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .by_url
            .get(url)
            .and_then(|id| state.rows.get(id))
            .cloned())
    }

    async fn insert(&self, draft: &ArticleDraft) -> Result<Article, StoreError> {
        let mut state = self.state.lock().await;
        if state.by_url.contains_key(&draft.url) {
            return Err(StoreError::Duplicate {
                url: draft.url.clone(),
            });
        }
        state.next_id += 1;
        let id = state.next_id;
        let article = Article::from_draft(id, draft.clone(), Utc::now());
        state.by_url.insert(article.url.clone(), id);
        state.rows.insert(id, article.clone());
        Ok(article)
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let expired = state
            .rows
            .values()
            .filter(|a| a.published_at < cutoff)
            .map(|a| (a.id, a.url.clone()))
            .collect::<Vec<_>>();
        for (id, url) in &expired {
            state.rows.remove(id);
            state.by_url.remove(url);
        }
        Ok(expired.len() as u64)
    }

    async fn count(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().await.rows.len() as u64)
    }

    async fn query(&self, filter: &ArticleFilter) -> Result<ArticlePage, StoreError> {
        let state = self.state.lock().await;
        let mut matched = state
            .rows
            .values()
            .filter(|a| filter.matches(a))
            .collect::<Vec<_>>();
        matched.sort_by(|a, b| {
            b.published_at
                .cmp(&a.published_at)
                .then_with(|| b.id.cmp(&a.id))
        });

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(usize::try_from(filter.offset()).unwrap_or(usize::MAX))
            .take(filter.per_page() as usize)
            .cloned()
            .collect();

        Ok(ArticlePage {
            items,
            total,
            page: filter.page(),
            per_page: filter.per_page(),
        })
    }

    async fn distinct_sources(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.lock().await;
        let sources = state
            .rows
            .values()
            .map(|a| a.source_name.clone())
            .collect::<BTreeSet<_>>();
        Ok(sources.into_iter().collect())
    }

    async fn distinct_categories(&self) -> Result<Vec<StandardCategory>, StoreError> {
        let state = self.state.lock().await;
        let categories = state
            .rows
            .values()
            .filter_map(|a| a.category)
            .collect::<BTreeSet<_>>();
        Ok(categories.into_iter().collect())
    }
}
