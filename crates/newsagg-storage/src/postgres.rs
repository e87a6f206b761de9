use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use newsagg_core::{Article, ArticleDraft, StandardCategory};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::info;

use crate::store::{ArticleFilter, ArticlePage, ArticleStore, StoreError};

const ARTICLE_COLUMNS: &str = "id, title, content, description, url, image_url, source_name, \
     source_id, category, published_at, created_at, updated_at";

/// PostgreSQL-backed [`ArticleStore`]; uniqueness is enforced by the
/// `articles_url_unique` constraint.
#[derive(Debug, Clone)]
pub struct PgArticleStore {
    pool: PgPool,
}

impl PgArticleStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(classify)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("article schema migrations applied");
        Ok(())
    }
}

fn classify(err: sqlx::Error) -> StoreError {
    match err {
        e @ (sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed) => StoreError::Unavailable(e.to_string()),
        e => StoreError::Database(e),
    }
}

fn parse_category(raw: Option<String>) -> Result<Option<StandardCategory>, StoreError> {
    raw.map(|value| {
        value
            .parse::<StandardCategory>()
            .map_err(|e| StoreError::Corrupt(e.to_string()))
    })
    .transpose()
}

fn row_to_article(row: &PgRow) -> Result<Article, StoreError> {
    let get_err = |e: sqlx::Error| StoreError::Corrupt(e.to_string());
    Ok(Article {
        id: row.try_get("id").map_err(get_err)?,
        title: row.try_get("title").map_err(get_err)?,
        content: row.try_get("content").map_err(get_err)?,
        description: row.try_get("description").map_err(get_err)?,
        url: row.try_get("url").map_err(get_err)?,
        image_url: row.try_get("image_url").map_err(get_err)?,
        source_name: row.try_get("source_name").map_err(get_err)?,
        source_id: row.try_get("source_id").map_err(get_err)?,
        category: parse_category(row.try_get("category").map_err(get_err)?)?,
        published_at: row.try_get("published_at").map_err(get_err)?,
        created_at: row.try_get("created_at").map_err(get_err)?,
        updated_at: row.try_get("updated_at").map_err(get_err)?,
    })
}

fn escape_like(input: &str) -> String {
    input
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ArticleFilter) {
    qb.push(" WHERE TRUE");
    if let Some(source) = &filter.source_name {
        qb.push(" AND source_name = ").push_bind(source.clone());
    }
    if let Some(category) = filter.category {
        qb.push(" AND category = ").push_bind(category.as_str());
    }
    if let Some(from) = filter.from {
        qb.push(" AND published_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        qb.push(" AND published_at <= ").push_bind(to);
    }
    if let Some(keyword) = filter.keyword.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        let pattern = format!("%{}%", escape_like(keyword));
        qb.push(" AND (title ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl ArticleStore for PgArticleStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn find_by_url(&self, url: &str) -> Result<Option<Article>, StoreError> {
        let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE url = $1");
        let row = sqlx::query(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;
        row.as_ref().map(row_to_article).transpose()
    }

    async fn insert(&self, draft: &ArticleDraft) -> Result<Article, StoreError> {
        let sql = format!(
            r#"
            INSERT INTO articles
                (title, content, description, url, image_url, source_name, source_id, category, published_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (url) DO NOTHING
            RETURNING {ARTICLE_COLUMNS}
            "#
        );
        let row = sqlx::query(&sql)
            .bind(&draft.title)
            .bind(&draft.content)
            .bind(&draft.description)
            .bind(&draft.url)
            .bind(&draft.image_url)
            .bind(&draft.source_name)
            .bind(&draft.source_id)
            .bind(draft.category.map(StandardCategory::as_str))
            .bind(draft.published_at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|err| {
                let unique = err
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation());
                if unique {
                    StoreError::Duplicate {
                        url: draft.url.clone(),
                    }
                } else {
                    classify(err)
                }
            })?;

        match row {
            Some(row) => row_to_article(&row),
            None => Err(StoreError::Duplicate {
                url: draft.url.clone(),
            }),
        }
    }

    async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM articles WHERE published_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(result.rows_affected())
    }

    async fn count(&self) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM articles")
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn query(&self, filter: &ArticleFilter) -> Result<ArticlePage, StoreError> {
        let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM articles");
        push_filters(&mut count_qb, filter);
        let total: i64 = count_qb
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        let mut qb = QueryBuilder::<Postgres>::new(format!("SELECT {ARTICLE_COLUMNS} FROM articles"));
        push_filters(&mut qb, filter);
        qb.push(" ORDER BY published_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(filter.per_page()))
            .push(" OFFSET ")
            .push_bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX));
        let rows = qb.build().fetch_all(&self.pool).await.map_err(classify)?;

        let items = rows.iter().map(row_to_article).collect::<Result<Vec<_>, _>>()?;
        Ok(ArticlePage {
            items,
            total: u64::try_from(total).unwrap_or_default(),
            page: filter.page(),
            per_page: filter.per_page(),
        })
    }

    async fn distinct_sources(&self) -> Result<Vec<String>, StoreError> {
        sqlx::query_scalar("SELECT DISTINCT source_name FROM articles ORDER BY source_name")
            .fetch_all(&self.pool)
            .await
            .map_err(classify)
    }

    async fn distinct_categories(&self) -> Result<Vec<StandardCategory>, StoreError> {
        let raw: Vec<String> = sqlx::query_scalar(
            "SELECT DISTINCT category FROM articles WHERE category IS NOT NULL ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;
        raw.into_iter()
            .map(|value| {
                value
                    .parse::<StandardCategory>()
                    .map_err(|e| StoreError::Corrupt(e.to_string()))
            })
            .collect()
    }
}
