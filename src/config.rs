//! Configuration for tracing behavior.

use std::time::Duration;

/// Configuration options for database tracing.
///
/// # Example
///
/// ```rust
/// use sea_orm_sqltrace::TracingConfig;
/// use std::time::Duration;
///
/// let config = TracingConfig::default()
///     .with_database_name("orders")
///     .with_slow_query_threshold(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Whether to record the reconstructed SQL statement (`db.statement`).
    /// Bound values are embedded literally, so this exposes parameter data.
    /// Default: `true`
    pub record_statements: bool,

    /// Whether to record the number of rows affected/returned (`db.count`).
    /// Default: `true`
    pub record_row_counts: bool,

    /// Operations slower than this emit a WARN event on their span.
    /// Default: 500ms
    pub slow_query_threshold: Duration,

    /// Value recorded as `db.instance`. When unset, each wrapped connection
    /// gets a generated identifier such as `postgresql-1`.
    /// Default: `None`
    pub database_name: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            record_statements: true,
            record_row_counts: true,
            slow_query_threshold: Duration::from_millis(500),
            database_name: None,
        }
    }
}

impl TracingConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable statement reconstruction.
    ///
    /// **Security Warning**: the recorded statement contains every bound value,
    /// which often includes user input.
    pub fn with_statement_recording(mut self, enabled: bool) -> Self {
        self.record_statements = enabled;
        self
    }

    /// Enable or disable row count recording.
    pub fn with_row_count_recording(mut self, enabled: bool) -> Self {
        self.record_row_counts = enabled;
        self
    }

    /// Set the threshold for slow query warnings.
    pub fn with_slow_query_threshold(mut self, threshold: Duration) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Set the database instance name recorded on spans.
    ///
    /// Useful when your application connects to multiple databases.
    pub fn with_database_name(mut self, name: impl Into<String>) -> Self {
        self.database_name = Some(name.into());
        self
    }

    /// Create a development-friendly configuration with a tight slow query threshold.
    pub fn development() -> Self {
        Self {
            slow_query_threshold: Duration::from_millis(100),
            ..Self::default()
        }
    }

    /// Create a production-safe configuration that keeps bound values out of spans.
    pub fn production() -> Self {
        Self {
            record_statements: false,
            slow_query_threshold: Duration::from_secs(1),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = TracingConfig::default()
            .with_statement_recording(false)
            .with_row_count_recording(false)
            .with_database_name("test_db");

        assert!(!config.record_statements);
        assert!(!config.record_row_counts);
        assert_eq!(config.database_name, Some("test_db".to_string()));
    }

    #[test]
    fn test_presets() {
        let dev = TracingConfig::development();
        assert!(dev.record_statements);
        assert_eq!(dev.slow_query_threshold, Duration::from_millis(100));

        let prod = TracingConfig::production();
        assert!(!prod.record_statements);
        assert!(prod.record_row_counts);
    }
}
