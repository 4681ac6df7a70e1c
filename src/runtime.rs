use std::sync::Arc;

use crate::cache::{CacheStatus, QueryCache, ResourceCache};
use crate::config::Config;
use crate::context::{ContextResolver, ExecutionContext};
use crate::dispatch::AsyncQueryDispatcher;
use crate::session::{Lifetime, ResultSet, Scoped, SessionState, Value};
use crate::writeback::WritebackExecutor;
use crate::Result;

const DISPATCHER_KEY: &str = "dashlink.dispatcher";
const WRITEBACK_KEY: &str = "dashlink.writeback";

/// Everything that outlives a single rerun: the resolved context, both
/// caches and the components built on top of the context.
pub struct Runtime {
    resources: Arc<ResourceCache>,
    resolver: ContextResolver,
    queries: QueryCache,
}

impl Scoped for Runtime {
    const LIFETIME: Lifetime = Lifetime::Process;
}

impl Runtime {
    pub fn new(resolver: ContextResolver, resources: Arc<ResourceCache>, queries: QueryCache) -> Self {
        Self {
            resources,
            resolver,
            queries,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let resources = Arc::new(ResourceCache::new());
        let resolver = ContextResolver::from_config(config, resources.clone());
        Self::new(resolver, resources, QueryCache::from_config(config))
    }

    pub async fn context(&self) -> Result<Arc<ExecutionContext>> {
        self.resolver.resolve().await
    }

    pub fn resolver(&self) -> &ContextResolver {
        &self.resolver
    }

    pub fn query_cache(&self) -> &QueryCache {
        &self.queries
    }

    pub fn resources(&self) -> &Arc<ResourceCache> {
        &self.resources
    }

    pub async fn dispatcher(&self) -> Result<Arc<AsyncQueryDispatcher>> {
        let context = self.context().await?;
        self.resources
            .get_or_init(DISPATCHER_KEY, || async move { Ok(AsyncQueryDispatcher::new(context)) })
            .await
    }

    pub async fn writeback(&self) -> Result<Arc<WritebackExecutor>> {
        let context = self.context().await?;
        self.resources
            .get_or_init(WRITEBACK_KEY, || async move { Ok(WritebackExecutor::new(context)) })
            .await
    }

    /// Cached read against the resolved session
    pub async fn query(&self, sql: &str, params: &[Value]) -> Result<ResultSet> {
        let context = self.context().await?;
        self.queries.query(&context, sql, params).await
    }

    /// Fresh per-user state; the caller keeps it for the user's session
    pub fn new_session(&self) -> SessionState {
        SessionState::new()
    }

    pub fn cache_status(&self) -> Vec<CacheStatus> {
        vec![
            CacheStatus::new("query_cache", &self.queries.stats(), self.queries.len(), self.queries.capacity()),
            CacheStatus::new("resource_cache", &self.resources.stats(), self.resources.len(), None),
        ]
    }
}
