use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use newsagg_storage::{ArticleStore, StoreError};
use tracing::info;

pub const DEFAULT_RETENTION_DAYS: u32 = 30;

/// Deletes articles whose publication time falls outside the retention window.
#[derive(Clone)]
pub struct RetentionSweeper {
    store: Arc<dyn ArticleStore>,
}

impl RetentionSweeper {
    pub fn new(store: Arc<dyn ArticleStore>) -> Self {
        Self { store }
    }

    pub async fn sweep(&self, max_age_days: u32) -> Result<u64, StoreError> {
        self.sweep_at(Utc::now(), max_age_days).await
    }

    /// Removes everything published strictly before `now - max_age_days`.
    /// A window reaching past the earliest representable time deletes nothing.
    pub async fn sweep_at(&self, now: DateTime<Utc>, max_age_days: u32) -> Result<u64, StoreError> {
        let Some(cutoff) = retention_cutoff(now, max_age_days) else {
            info!(max_age_days, "retention window predates the calendar, nothing to sweep");
            return Ok(0);
        };
        let deleted = self.store.delete_older_than(cutoff).await?;
        info!(deleted, %cutoff, max_age_days, "retention sweep complete");
        Ok(deleted)
    }
}

/// `now - days`, or `None` when that falls outside the representable range.
pub fn retention_cutoff(now: DateTime<Utc>, days: u32) -> Option<DateTime<Utc>> {
    Duration::try_days(i64::from(days)).and_then(|window| now.checked_sub_signed(window))
}
