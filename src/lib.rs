pub mod cache;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod profile;
pub mod runtime;
pub mod session;
pub mod writeback;

use std::time::Duration;
use thiserror::Error;

pub use cache::{QueryCache, QueryKey, ResourceCache};
pub use context::{ContextKind, ContextResolver, ExecutionContext};
pub use dispatch::{AsyncQueryDispatcher, AsyncQueryHandle, FailureReason, QueryStatus};
pub use runtime::Runtime;
pub use session::{ResultSet, SessionInfo, Statement, Value, ValueKind, Warehouse};
pub use writeback::{RecordValidator, TableRef, WriteKind, WritebackExecutor, WritebackRequest};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DashlinkError {
    #[error("Connection error: {message}")]
    Connection { message: String, hint: String },

    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Timed out after {0:?} waiting for query result")]
    Timeout(Duration),

    #[error("Query was cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DashlinkError>;

impl DashlinkError {
    pub fn connection(message: impl Into<String>, hint: impl Into<String>) -> Self {
        DashlinkError::Connection {
            message: message.into(),
            hint: hint.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        DashlinkError::Validation(vec![message.into()])
    }

    /// Stable code for the error class, suitable for logs and UI lookups
    pub fn error_code(&self) -> &str {
        match self {
            DashlinkError::Connection { .. } => "DL001", // no usable session
            DashlinkError::Validation(_) => "DL002",     // rejected before dispatch
            DashlinkError::Query(_) => "DL003",          // warehouse rejected the statement
            DashlinkError::Timeout(_) => "DL004",        // wait abandoned, query still running
            DashlinkError::Cancelled => "DL005",
            DashlinkError::Config(_) => "DL006",
            DashlinkError::Serialization(_) => "DL007",
        }
    }

    /// Remediation guidance for errors the user can fix themselves
    pub fn hint(&self) -> Option<&str> {
        match self {
            DashlinkError::Connection { hint, .. } => Some(hint),
            _ => None,
        }
    }

    /// Fatal errors halt the triggering interaction before any side effect
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DashlinkError::Connection { .. } | DashlinkError::Validation(_) | DashlinkError::Config(_)
        )
    }
}

impl From<rusqlite::Error> for DashlinkError {
    fn from(err: rusqlite::Error) -> Self {
        if err.sqlite_error_code() == Some(rusqlite::ErrorCode::OperationInterrupted) {
            return DashlinkError::Cancelled;
        }
        DashlinkError::Query(err.to_string())
    }
}

// `::config` is the external crate; plain `config` is this crate's module
impl From<::config::ConfigError> for DashlinkError {
    fn from(err: ::config::ConfigError) -> Self {
        DashlinkError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for DashlinkError {
    fn from(err: serde_json::Error) -> Self {
        DashlinkError::Serialization(err.to_string())
    }
}
