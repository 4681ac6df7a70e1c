pub mod fingerprint;
pub mod memo;
pub mod query_cache;
pub mod resource_cache;
pub mod status;

pub use fingerprint::QueryFingerprint;
pub use memo::{CacheStats, MemoCache};
pub use query_cache::{PersistedResult, QueryCache, QueryKey};
pub use resource_cache::ResourceCache;
pub use status::{format_cache_status_as_table, log_cache_status, CacheStatus};
