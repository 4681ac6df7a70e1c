// Warehouse sessions and per-user state
pub mod ambient;
pub mod sqlite;
pub mod state;
pub mod warehouse;

pub use ambient::{AmbientSessionProvider, HostEnvironment, NoAmbientSession};
pub use sqlite::{SqliteOptions, SqliteWarehouse};
pub use state::{Lifetime, Scoped, SessionState};
pub use warehouse::{ResultSet, SessionInfo, Statement, Value, ValueKind, Warehouse};
