use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{File, FileFormat};
use serde::Deserialize;
use tracing::debug;

use crate::session::sqlite::SqliteOptions;
use crate::session::SessionInfo;
use crate::Result;

/// One named entry of the local connection store.
///
/// ```toml
/// [demo_conn]
/// database = "demo.db"
/// account = "acme"
/// user = "analyst"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConnectionProfile {
    /// Database locator: a file path or `:memory:`
    pub database: String,
    #[serde(default)]
    pub account: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub warehouse: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub journal_mode: Option<String>,
    #[serde(default)]
    pub busy_timeout_ms: Option<u64>,
}

impl ConnectionProfile {
    pub fn sqlite_options(&self) -> SqliteOptions {
        SqliteOptions {
            journal_mode: self.journal_mode.clone(),
            busy_timeout: self.busy_timeout_ms.map(Duration::from_millis),
        }
    }

    pub fn session_info(&self) -> SessionInfo {
        SessionInfo {
            account: self.account.clone(),
            user: self.user.clone(),
            role: self.role.clone(),
            warehouse: self.warehouse.clone(),
            database: Some(self.database.clone()),
            schema: self.schema.clone(),
        }
    }
}

/// Local configuration store holding named connection profiles
#[derive(Debug, Clone)]
pub struct ProfileStore {
    path: PathBuf,
}

impl ProfileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every profile. A missing store file holds no profiles.
    pub fn load_all(&self) -> Result<HashMap<String, ConnectionProfile>> {
        if !self.path.exists() {
            debug!("Profile store {} does not exist", self.path.display());
            return Ok(HashMap::new());
        }

        let settings = config::Config::builder()
            .add_source(File::from(self.path.as_path()).format(FileFormat::Toml))
            .build()?;
        let profiles: HashMap<String, ConnectionProfile> = settings.try_deserialize()?;

        debug!("Loaded {} profiles from {}", profiles.len(), self.path.display());
        Ok(profiles)
    }

    pub fn get(&self, name: &str) -> Result<Option<ConnectionProfile>> {
        Ok(self.load_all()?.remove(name))
    }
}
