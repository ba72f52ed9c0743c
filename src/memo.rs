//! Request-scoped memoization of store reads.
//!
//! A `RequestScope` lives for exactly one request. Nothing here outlives it, so
//! there is nothing to invalidate after a write.

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use chrono::NaiveDate;
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use crate::db;
use crate::error::CrmResult;
use crate::followups::{self, Bucket, FollowUpWindow};
use crate::models::{CustomerDetail, DashboardStats, FollowUpDate, FollowUpEntry, FollowUpView};

#[derive(Debug)]
pub struct Memo<K, V> {
    entries: HashMap<K, Arc<V>>,
}

impl<K, V> Default for Memo<K, V> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, V> Memo<K, V> {
    /// Return the cached value for `key`, running `fetch` on a miss. Failed
    /// fetches are not cached.
    pub async fn get_or_try_insert_with<F, Fut, E>(&mut self, key: K, fetch: F) -> Result<Arc<V>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.entries.get(&key) {
            return Ok(Arc::clone(value));
        }

        let value = Arc::new(fetch().await?);
        self.entries.insert(key, Arc::clone(&value));
        Ok(value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The read paths of a single request: dashboard, follow-ups list and
/// customer detail, all classified against the same `today` and window.
pub struct RequestScope<'a> {
    pool: &'a PgPool,
    window: FollowUpWindow,
    candidates: Memo<NaiveDate, Vec<FollowUpEntry>>,
    dates: Memo<NaiveDate, Vec<FollowUpDate>>,
    customers: Memo<Uuid, CustomerDetail>,
}

impl<'a> RequestScope<'a> {
    pub fn new(pool: &'a PgPool, window: FollowUpWindow) -> Self {
        Self {
            pool,
            window,
            candidates: Memo::default(),
            dates: Memo::default(),
            customers: Memo::default(),
        }
    }

    pub fn window(&self) -> FollowUpWindow {
        self.window
    }

    pub async fn follow_ups(&mut self) -> CrmResult<FollowUpView> {
        let (pool, window) = (self.pool, self.window);
        let candidates = self
            .candidates
            .get_or_try_insert_with(window.end(), || db::fetch_follow_up_candidates(pool, window))
            .await?;
        Ok(followups::aggregate(&candidates, window.today))
    }

    pub async fn dashboard(&mut self) -> CrmResult<DashboardStats> {
        let (pool, window) = (self.pool, self.window);
        let counts = db::record_counts(pool).await?;
        let dates = self
            .dates
            .get_or_try_insert_with(window.end(), || db::fetch_follow_up_dates(pool, window))
            .await?;
        let follow_ups = followups::dashboard_counts(&dates, window.today);
        debug!(overdue = follow_ups.overdue, today = follow_ups.today, "dashboard counts");
        Ok(DashboardStats::assemble(counts, follow_ups))
    }

    pub async fn customer(&mut self, id: Uuid) -> CrmResult<Arc<CustomerDetail>> {
        let pool = self.pool;
        self.customers
            .get_or_try_insert_with(id, || db::get_customer(pool, id))
            .await
    }

    pub async fn customer_follow_up(&mut self, id: Uuid) -> CrmResult<Option<(FollowUpDate, Bucket)>> {
        let window = self.window;
        let detail = self.customer(id).await?;
        Ok(followups::customer_follow_up(id, &detail.activities, window))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test]
    async fn fetch_runs_once_per_key() {
        let calls = Cell::new(0);
        let mut memo: Memo<&str, usize> = Memo::default();

        for _ in 0..3 {
            let value = memo
                .get_or_try_insert_with("customers", || async {
                    calls.set(calls.get() + 1);
                    Ok::<_, String>(42)
                })
                .await
                .unwrap();
            assert_eq!(*value, 42);
        }

        assert_eq!(calls.get(), 1);
        assert_eq!(memo.len(), 1);
    }

    #[tokio::test]
    async fn distinct_keys_fetch_separately() {
        let mut memo: Memo<u32, u32> = Memo::default();
        let a = memo.get_or_try_insert_with(1, || async { Ok::<_, ()>(10) }).await.unwrap();
        let b = memo.get_or_try_insert_with(2, || async { Ok::<_, ()>(20) }).await.unwrap();
        assert_eq!((*a, *b), (10, 20));
        assert_eq!(memo.len(), 2);
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let mut memo: Memo<u32, u32> = Memo::default();

        let first = memo
            .get_or_try_insert_with(7, || async { Err::<u32, _>("store unavailable") })
            .await;
        assert!(first.is_err());
        assert!(memo.is_empty());

        let second = memo
            .get_or_try_insert_with(7, || async { Ok::<_, &str>(3) })
            .await
            .unwrap();
        assert_eq!(*second, 3);
    }
}
