//! Database metrics for the import store.
//!
//! Repositories time their statements with [`QueryTimer`]; the pool gauges
//! are sampled by a background job in the API crate.

use metrics::{gauge, histogram};
use sqlx::PgPool;
use std::time::Instant;

/// Times one database statement and records it into
/// `database_query_duration_seconds` labeled by query name.
pub struct QueryTimer {
    query: &'static str,
    start: Instant,
}

impl QueryTimer {
    pub fn new(query: &'static str) -> Self {
        Self {
            query,
            start: Instant::now(),
        }
    }

    /// Record the elapsed duration.
    pub fn record(self) {
        histogram!(
            "database_query_duration_seconds",
            "query" => self.query
        )
        .record(self.start.elapsed().as_secs_f64());
    }
}

/// Record connection pool gauges: total, idle and active connections.
pub fn record_pool_metrics(pool: &PgPool) {
    let size = pool.size() as usize;
    let idle = pool.num_idle();
    let active = size.saturating_sub(idle);

    gauge!("database_connections_active").set(active as f64);
    gauge!("database_connections_idle").set(idle as f64);
    gauge!("database_connections_total").set(size as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_records_without_recorder() {
        // The metrics macros no-op when no recorder is installed, so timing
        // is safe in any environment.
        let timer = QueryTimer::new("test_query");
        assert_eq!(timer.query, "test_query");
        timer.record();
    }
}
