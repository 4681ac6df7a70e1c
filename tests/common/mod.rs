use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use uuid::Uuid;

use dashlink::cache::ResourceCache;
use dashlink::context::{ContextKind, ContextResolver, ExecutionContext};
use dashlink::profile::ProfileStore;
use dashlink::session::{AmbientSessionProvider, NoAmbientSession};
use dashlink::{DashlinkError, ResultSet, SessionInfo, Statement, Value, Warehouse};

/// Warehouse stub that records every statement it receives
pub struct RecordingWarehouse {
    label: String,
    delay: Option<Duration>,
    failure: Option<DashlinkError>,
    result: ResultSet,
    rows_affected: u64,
    info: SessionInfo,
    statements: Mutex<Vec<Statement>>,
    cancels: Mutex<Vec<Uuid>>,
    queries: AtomicUsize,
    executes: AtomicUsize,
}

#[allow(dead_code)]
impl RecordingWarehouse {
    pub fn new(label: &str) -> Self {
        Self {
            label: label.to_string(),
            delay: None,
            failure: None,
            result: ResultSet::new(vec!["n".to_string()], vec![vec![Value::Integer(1)]]),
            rows_affected: 1,
            info: SessionInfo::default(),
            statements: Mutex::new(Vec::new()),
            cancels: Mutex::new(Vec::new()),
            queries: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, error: DashlinkError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn with_result(mut self, result: ResultSet) -> Self {
        self.result = result;
        self
    }

    pub fn with_session_info(mut self, info: SessionInfo) -> Self {
        self.info = info;
        self
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().clone()
    }

    pub fn cancels(&self) -> Vec<Uuid> {
        self.cancels.lock().clone()
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn execute_count(&self) -> usize {
        self.executes.load(Ordering::SeqCst)
    }

    /// Every call that reached the warehouse
    pub fn call_count(&self) -> usize {
        self.query_count() + self.execute_count()
    }

    async fn respond(&self, statement: &Statement) -> Result<(), DashlinkError> {
        self.statements.lock().push(statement.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Warehouse for RecordingWarehouse {
    fn describe(&self) -> String {
        format!("recording:{}", self.label)
    }

    fn session_info(&self) -> SessionInfo {
        self.info.clone()
    }

    async fn query(&self, statement: &Statement) -> dashlink::Result<ResultSet> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        self.respond(statement).await?;
        Ok(self.result.clone())
    }

    async fn execute(&self, statement: &Statement) -> dashlink::Result<u64> {
        self.executes.fetch_add(1, Ordering::SeqCst);
        self.respond(statement).await?;
        Ok(self.rows_affected)
    }

    async fn cancel(&self, statement_id: Uuid) -> dashlink::Result<bool> {
        self.cancels.lock().push(statement_id);
        Ok(false)
    }
}

/// Ambient provider that always hands out the same session
pub struct StaticAmbient {
    session: Arc<dyn Warehouse>,
    lookups: AtomicUsize,
}

#[allow(dead_code)]
impl StaticAmbient {
    pub fn new(session: Arc<dyn Warehouse>) -> Self {
        Self {
            session,
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl AmbientSessionProvider for StaticAmbient {
    fn lookup(&self) -> Option<Arc<dyn Warehouse>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Some(self.session.clone())
    }
}

/// Execution context wrapping the given stub as a local session
#[allow(dead_code)]
pub fn context_with(warehouse: Arc<RecordingWarehouse>) -> Arc<ExecutionContext> {
    Arc::new(ExecutionContext::new(
        ContextKind::Local {
            profile: "test".to_string(),
        },
        warehouse,
    ))
}

/// Write a profile store with one `[name]` table pointing at `database`
#[allow(dead_code)]
pub fn write_profile(dir: &Path, name: &str, database: &str) -> PathBuf {
    let path = dir.join("connections.toml");
    let body = format!("[{name}]\ndatabase = \"{database}\"\naccount = \"acme\"\nuser = \"analyst\"\n");
    std::fs::write(&path, body).unwrap();
    path
}

/// Resolver over `store` with no host session
#[allow(dead_code)]
pub fn local_resolver(name: &str, store: &Path) -> ContextResolver {
    ContextResolver::new(
        name,
        ProfileStore::new(store),
        Arc::new(NoAmbientSession),
        Arc::new(ResourceCache::new()),
    )
}
