use super::memo::CacheStats;
use crate::session::{ResultSet, Value};

/// Cache status information
#[derive(Debug, Clone, PartialEq)]
pub struct CacheStatus {
    pub name: String,
    pub lookups: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
    pub failures: u64,
    pub size: usize,
    /// `None` for caches without a capacity bound
    pub capacity: Option<usize>,
}

impl CacheStatus {
    pub fn new(name: impl Into<String>, stats: &CacheStats, size: usize, capacity: Option<usize>) -> Self {
        CacheStatus {
            name: name.into(),
            lookups: stats.lookups,
            hits: stats.hits,
            misses: stats.misses,
            hit_rate: stats.hit_rate(),
            evictions: stats.evictions,
            expirations: stats.expirations,
            failures: stats.failures,
            size,
            capacity,
        }
    }
}

/// Format cache status as a result set with one row per cache
pub fn format_cache_status_as_table(statuses: &[CacheStatus]) -> ResultSet {
    let columns = ["cache", "lookups", "hits", "misses", "hit_rate_percent", "evictions", "size", "capacity"]
        .iter()
        .map(|c| c.to_string())
        .collect();

    let rows = statuses
        .iter()
        .map(|s| {
            vec![
                Value::from(s.name.as_str()),
                Value::Integer(s.lookups as i64),
                Value::Integer(s.hits as i64),
                Value::Integer(s.misses as i64),
                Value::from(format!("{:.1}", s.hit_rate)),
                Value::Integer(s.evictions as i64),
                Value::Integer(s.size as i64),
                Value::from(s.capacity.map(|c| c as i64)),
            ]
        })
        .collect();

    ResultSet::new(columns, rows)
}

/// Log cache status to tracing
pub fn log_cache_status(statuses: &[CacheStatus]) {
    for status in statuses {
        let capacity = status
            .capacity
            .map_or_else(|| "unbounded".to_string(), |c| c.to_string());
        tracing::info!(
            "{} - Lookups: {}, Hits: {} ({:.1}%), Misses: {}, Expired: {}, Failed: {}, Evictions: {}, Size: {}/{}",
            status.name,
            status.lookups,
            status.hits,
            status.hit_rate,
            status.misses,
            status.expirations,
            status.failures,
            status.evictions,
            status.size,
            capacity
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_table() {
        let stats = CacheStats {
            lookups: 4,
            hits: 3,
            misses: 1,
            computations: 1,
            ..Default::default()
        };
        let status = CacheStatus::new("query_cache", &stats, 1, Some(1000));
        assert_eq!(status.hit_rate, 75.0);

        let table = format_cache_status_as_table(&[status]);
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0, "hit_rate_percent"), Some(&Value::from("75.0")));
        assert_eq!(table.get(0, "capacity"), Some(&Value::Integer(1000)));

        let unbounded = CacheStatus::new("resource_cache", &CacheStats::default(), 3, None);
        let table = format_cache_status_as_table(&[unbounded]);
        assert_eq!(table.get(0, "capacity"), Some(&Value::Null));
    }
}
