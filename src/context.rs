use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::cache::ResourceCache;
use crate::config::Config;
use crate::profile::ProfileStore;
use crate::session::{
    AmbientSessionProvider, HostEnvironment, Lifetime, Scoped, SessionInfo, SqliteWarehouse, Warehouse,
};
use crate::{DashlinkError, Result};

const CONTEXT_RESOURCE_KEY: &str = "dashlink.execution_context";

/// Which session-acquisition strategy produced the context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKind {
    /// Session opened from the named local connection profile
    Local { profile: String },
    /// Session handed over by the hosting platform
    Ambient,
}

impl ContextKind {
    pub fn label(&self) -> &'static str {
        match self {
            ContextKind::Local { .. } => "local",
            ContextKind::Ambient => "ambient",
        }
    }
}

impl fmt::Display for ContextKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKind::Local { profile } => write!(f, "local ({profile})"),
            ContextKind::Ambient => f.write_str("ambient"),
        }
    }
}

/// The process's one warehouse session and how it was obtained.
///
/// Built by [`ContextResolver::resolve`] and shared read-only by every
/// component; nothing else opens sessions.
pub struct ExecutionContext {
    id: Uuid,
    kind: ContextKind,
    session: Arc<dyn Warehouse>,
    info: SessionInfo,
    resolved_at: DateTime<Utc>,
}

impl Scoped for ExecutionContext {
    const LIFETIME: Lifetime = Lifetime::Process;
}

impl ExecutionContext {
    /// Context whose session info is whatever the session reports about itself
    pub fn new(kind: ContextKind, session: Arc<dyn Warehouse>) -> Self {
        let info = session.session_info();
        Self {
            id: Uuid::new_v4(),
            kind,
            session,
            info,
            resolved_at: Utc::now(),
        }
    }

    /// Overlay `info` on what the session reported; parts `info` leaves unset keep the session's value
    pub fn with_info(mut self, info: SessionInfo) -> Self {
        self.info = info.or(self.info);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    pub fn is_ambient(&self) -> bool {
        self.kind == ContextKind::Ambient
    }

    pub fn session(&self) -> &Arc<dyn Warehouse> {
        &self.session
    }

    /// Current account, user, role, warehouse, database and schema
    pub fn session_info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn resolved_at(&self) -> DateTime<Utc> {
        self.resolved_at
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("session", &self.session.describe())
            .field("info", &self.info)
            .field("resolved_at", &self.resolved_at)
            .finish()
    }
}

/// Chooses between the host-provided session and a local profile, once per process
pub struct ContextResolver {
    connection_name: String,
    profiles: ProfileStore,
    ambient: Arc<dyn AmbientSessionProvider>,
    resources: Arc<ResourceCache>,
}

impl ContextResolver {
    pub fn new(
        connection_name: impl Into<String>,
        profiles: ProfileStore,
        ambient: Arc<dyn AmbientSessionProvider>,
        resources: Arc<ResourceCache>,
    ) -> Self {
        Self {
            connection_name: connection_name.into(),
            profiles,
            ambient,
            resources,
        }
    }

    pub fn from_config(config: &Config, resources: Arc<ResourceCache>) -> Self {
        Self::new(
            config.connection_name.clone(),
            ProfileStore::new(config.connections_path()),
            Arc::new(HostEnvironment::new(config.ambient_env.clone())),
            resources,
        )
    }

    pub fn connection_name(&self) -> &str {
        &self.connection_name
    }

    /// Resolve the execution context. Every call after the first successful
    /// one returns the same `Arc`. A failure is not remembered, so fixing the
    /// configuration and calling again works.
    pub async fn resolve(&self) -> Result<Arc<ExecutionContext>> {
        self.resources
            .get_or_init(CONTEXT_RESOURCE_KEY, || async { self.build_context() })
            .await
    }

    fn build_context(&self) -> Result<ExecutionContext> {
        // Ambient takes precedence over any configured profile
        if let Some(session) = self.ambient.lookup() {
            info!("Using ambient session {}", session.describe());
            return Ok(ExecutionContext::new(ContextKind::Ambient, session));
        }
        debug!("No ambient session, falling back to profile '{}'", self.connection_name);

        let hint = format!(
            "add a [{}] table with a `database` entry to {} or set DASHLINK_CONNECTION_NAME to an existing profile",
            self.connection_name,
            self.profiles.path().display()
        );

        let profile = self
            .profiles
            .get(&self.connection_name)
            .map_err(|e| DashlinkError::connection(format!("could not read connection profiles: {e}"), hint.clone()))?
            .ok_or_else(|| {
                DashlinkError::connection(
                    format!(
                        "no ambient session available and no connection profile named '{}'",
                        self.connection_name
                    ),
                    hint.clone(),
                )
            })?;

        let label = format!("local:{}", self.connection_name);
        let session = SqliteWarehouse::open(label, &profile.database, &profile.sqlite_options())
            .map_err(|e| {
                DashlinkError::connection(
                    format!("connection profile '{}' could not be opened: {e}", self.connection_name),
                    hint,
                )
            })?;

        info!("Using local connection profile '{}'", self.connection_name);
        Ok(ExecutionContext::new(
            ContextKind::Local {
                profile: self.connection_name.clone(),
            },
            Arc::new(session),
        )
        .with_info(profile.session_info()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::NoAmbientSession;

    #[tokio::test]
    async fn test_missing_store_is_connection_error_with_hint() {
        let resolver = ContextResolver::new(
            "demo_conn",
            ProfileStore::new("/nonexistent/dashlink/connections.toml"),
            Arc::new(NoAmbientSession),
            Arc::new(ResourceCache::new()),
        );
        let err = resolver.resolve().await.unwrap_err();
        assert!(matches!(err, DashlinkError::Connection { .. }));
        assert!(err.hint().unwrap().contains("[demo_conn]"));
    }

    #[test]
    fn test_kind_labels() {
        let local = ContextKind::Local { profile: "demo_conn".to_string() };
        assert_eq!(local.label(), "local");
        assert_eq!(local.to_string(), "local (demo_conn)");
        assert_eq!(ContextKind::Ambient.label(), "ambient");
    }
}
