use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::fingerprint::QueryFingerprint;
use super::memo::{CacheStats, MemoCache};
use crate::config::Config;
use crate::context::ExecutionContext;
use crate::session::{Lifetime, ResultSet, Scoped, Statement, Value};
use crate::Result;

/// Key for the query cache - operation text plus ordered parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    fingerprint: String,
}

impl QueryKey {
    pub fn new(operation: &str, params: &[Value]) -> Self {
        Self {
            fingerprint: QueryFingerprint::generate(operation, params),
        }
    }

    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

/// One exported cache entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedResult {
    pub fingerprint: String,
    pub result: ResultSet,
}

/// Memoizes read-query results across reruns and users.
///
/// Results are plain values: every hit hands back its own copy, so callers
/// may modify what they receive without affecting other readers.
pub struct QueryCache {
    inner: MemoCache<String, ResultSet>,
    default_ttl: Option<Duration>,
}

impl Scoped for QueryCache {
    const LIFETIME: Lifetime = Lifetime::Process;
}

impl QueryCache {
    pub fn new(capacity: usize, default_ttl: Option<Duration>) -> Self {
        Self {
            inner: MemoCache::new("query_cache", capacity),
            default_ttl,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.query_cache_size, config.query_cache_ttl_duration())
    }

    pub fn default_ttl(&self) -> Option<Duration> {
        self.default_ttl
    }

    pub async fn get_or_compute<F, Fut>(&self, key: &QueryKey, producer: F, ttl: Option<Duration>) -> Result<ResultSet>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ResultSet>>,
    {
        self.inner.get_or_compute(&key.fingerprint, producer, ttl).await
    }

    /// Run `sql` against the context's session unless an unexpired result is cached.
    /// Uses the cache's default TTL.
    pub async fn query(&self, ctx: &ExecutionContext, sql: &str, params: &[Value]) -> Result<ResultSet> {
        self.query_with_ttl(ctx, sql, params, self.default_ttl).await
    }

    pub async fn query_with_ttl(
        &self,
        ctx: &ExecutionContext,
        sql: &str,
        params: &[Value],
        ttl: Option<Duration>,
    ) -> Result<ResultSet> {
        let key = QueryKey::new(sql, params);
        let session = ctx.session();
        self.get_or_compute(
            &key,
            || async move {
                let statement = Statement::new(sql, params.to_vec());
                debug!("Query cache miss, running {} on {}", statement.id, session.describe());
                session.query(&statement).await
            },
            ttl,
        )
        .await
    }

    pub fn peek(&self, key: &QueryKey) -> Option<ResultSet> {
        self.inner.peek(&key.fingerprint)
    }

    pub fn invalidate(&self, key: &QueryKey) -> bool {
        self.inner.invalidate(&key.fingerprint)
    }

    pub fn clear(&self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> Option<usize> {
        self.inner.capacity()
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }

    /// Settled entries in a form that can be written out and reloaded later
    pub fn export(&self) -> Vec<PersistedResult> {
        let mut entries: Vec<PersistedResult> = self
            .inner
            .entries()
            .into_iter()
            .map(|(fingerprint, result)| PersistedResult { fingerprint, result })
            .collect();
        entries.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        entries
    }

    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.export())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DashlinkError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample() -> ResultSet {
        ResultSet::new(vec!["n".to_string()], vec![vec![Value::Integer(1)]])
    }

    #[tokio::test]
    async fn test_hits_return_independent_copies() {
        let cache = QueryCache::new(10, None);
        let key = QueryKey::new("SELECT n FROM t", &[]);

        let mut first = cache.get_or_compute(&key, || async { Ok(sample()) }, None).await.unwrap();
        first.rows.clear();

        let second = cache
            .get_or_compute(&key, || async { Err(DashlinkError::Query("should not run".to_string())) }, None)
            .await
            .unwrap();
        assert_eq!(second, sample());
    }

    #[tokio::test]
    async fn test_equivalent_text_shares_an_entry() {
        let cache = QueryCache::new(10, None);
        let calls = AtomicUsize::new(0);
        for sql in ["select n from t where id = ?", "SELECT n\n  FROM t WHERE id = ?"] {
            cache
                .get_or_compute(&QueryKey::new(sql, &[Value::Integer(3)]), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(sample())
                }, None)
                .await
                .unwrap();
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_export_json() {
        let cache = QueryCache::new(10, Some(Duration::from_secs(60)));
        let key = QueryKey::new("SELECT 1", &[]);
        cache.get_or_compute(&key, || async { Ok(sample()) }, None).await.unwrap();

        let exported = cache.export();
        assert_eq!(exported.len(), 1);
        assert_eq!(exported[0].fingerprint, key.fingerprint());

        let json = cache.export_json().unwrap();
        let back: Vec<PersistedResult> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, exported);
    }

    #[tokio::test]
    async fn test_invalidate_by_key() {
        let cache = QueryCache::new(10, None);
        let key = QueryKey::new("SELECT 1", &[]);
        cache.get_or_compute(&key, || async { Ok(sample()) }, None).await.unwrap();
        assert!(cache.peek(&key).is_some());
        assert!(cache.invalidate(&key));
        assert!(cache.peek(&key).is_none());
    }
}
