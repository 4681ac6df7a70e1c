use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::memo::{CacheStats, MemoCache};
use crate::session::{Lifetime, Scoped};
use crate::{DashlinkError, Result};

type Resource = Arc<dyn Any + Send + Sync>;

/// Process-wide home for expensive, stateful objects such as sessions.
///
/// Entries are handed out as the same `Arc` every time; they are shared,
/// never copied. Keys only need to be stable within the process. There is no
/// capacity bound: a resource lives until invalidated or the process exits.
pub struct ResourceCache {
    inner: MemoCache<String, Resource>,
}

impl Scoped for ResourceCache {
    const LIFETIME: Lifetime = Lifetime::Process;
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl ResourceCache {
    pub fn new() -> Self {
        Self {
            inner: MemoCache::unbounded("resource_cache"),
        }
    }

    pub async fn get_or_compute<T, F, Fut>(&self, key: &str, producer: F, ttl: Option<Duration>) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let resource = self
            .inner
            .get_or_compute(
                &key.to_string(),
                || async move { producer().await.map(|value| Arc::new(value) as Resource) },
                ttl,
            )
            .await?;

        resource
            .downcast::<T>()
            .map_err(|_| DashlinkError::Config(format!("resource '{key}' is registered with a different type")))
    }

    /// Resource that lives until invalidated or the process exits
    pub async fn get_or_init<T, F, Fut>(&self, key: &str, producer: F) -> Result<Arc<T>>
    where
        T: Any + Send + Sync,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.get_or_compute(key, producer, None).await
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner.peek(&key.to_string()).is_some()
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.inner.invalidate(&key.to_string())
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

    pub fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}
