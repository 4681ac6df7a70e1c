use std::env;
use std::sync::Arc;

use tracing::{debug, warn};

use super::sqlite::{SqliteOptions, SqliteWarehouse};
use super::warehouse::Warehouse;

/// Zero-argument lookup for a session handed to the process by its host.
///
/// `None` means "not running inside the host"; it is an answer, not an error,
/// so the resolver can fall back to a local profile.
pub trait AmbientSessionProvider: Send + Sync {
    fn lookup(&self) -> Option<Arc<dyn Warehouse>>;
}

/// Reads the session locator the hosting platform exports through an
/// environment variable.
#[derive(Debug, Clone)]
pub struct HostEnvironment {
    var: String,
}

impl HostEnvironment {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl AmbientSessionProvider for HostEnvironment {
    fn lookup(&self) -> Option<Arc<dyn Warehouse>> {
        let locator = env::var(&self.var).ok().filter(|v| !v.trim().is_empty());
        let Some(locator) = locator else {
            debug!("No host session exported through {}", self.var);
            return None;
        };

        match SqliteWarehouse::open("ambient", locator.trim(), &SqliteOptions::default()) {
            Ok(session) => Some(Arc::new(session)),
            Err(e) => {
                warn!("Host session in {} is unusable, ignoring it: {}", self.var, e);
                None
            }
        }
    }
}

/// Provider for processes that never run hosted
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAmbientSession;

impl AmbientSessionProvider for NoAmbientSession {
    fn lookup(&self) -> Option<Arc<dyn Warehouse>> {
        None
    }
}
