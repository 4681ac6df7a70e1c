use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::dispatch::AsyncQueryHandle;
use crate::Result;

/// How long a piece of state outlives a single rerun of the page logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifetime {
    /// Shared by every user for the life of the process
    Process,
    /// Private to one user session, kept across its reruns
    Session,
}

pub trait Scoped {
    const LIFETIME: Lifetime;
}

/// Per-user state that survives reruns of the page logic.
///
/// Values are stored as JSON so any serde type can be kept, mirroring a
/// dynamic key/value session store.
pub struct SessionState {
    pub id: uuid::Uuid,
    pub started_at: DateTime<Utc>,
    values: RwLock<HashMap<String, serde_json::Value>>,
    parked_queries: Mutex<HashMap<String, AsyncQueryHandle>>,
    reruns: AtomicU64,
}

impl Scoped for SessionState {
    const LIFETIME: Lifetime = Lifetime::Session;
}

impl SessionState {
    pub fn new() -> Self {
        SessionState {
            id: uuid::Uuid::new_v4(),
            started_at: Utc::now(),
            values: RwLock::new(HashMap::new()),
            parked_queries: Mutex::new(HashMap::new()),
            reruns: AtomicU64::new(0),
        }
    }

    /// Mark the start of a rerun; returns the rerun number starting at 1
    pub fn begin_rerun(&self) -> u64 {
        self.reruns.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn reruns(&self) -> u64 {
        self.reruns.load(Ordering::SeqCst)
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let values = self.values.read();
        match values.get(key) {
            Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
            None => Ok(None),
        }
    }

    pub fn set<T: Serialize>(&self, key: impl Into<String>, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.values.write().insert(key.into(), value);
        Ok(())
    }

    /// Return the stored value, initializing it on first access
    pub fn get_or_insert_with<T, F>(&self, key: &str, init: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let mut values = self.values.write();
        if let Some(existing) = values.get(key) {
            return Ok(serde_json::from_value(existing.clone())?);
        }
        let value = init();
        values.insert(key.to_string(), serde_json::to_value(&value)?);
        Ok(value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.read().contains_key(key)
    }

    pub fn remove(&self, key: &str) -> bool {
        self.values.write().remove(key).is_some()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.values.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn clear(&self) {
        self.values.write().clear();
        self.parked_queries.lock().clear();
    }

    /// Keep an in-flight query so a later rerun can pick it up again
    pub fn park_query(&self, name: impl Into<String>, handle: AsyncQueryHandle) -> Option<AsyncQueryHandle> {
        self.parked_queries.lock().insert(name.into(), handle)
    }

    pub fn take_query(&self, name: &str) -> Option<AsyncQueryHandle> {
        self.parked_queries.lock().remove(name)
    }

    pub fn parked_query_count(&self) -> usize {
        self.parked_queries.lock().len()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
