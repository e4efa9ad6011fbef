mod config;
mod record;
mod telegraf;

// Re-export public items
pub use self::config::{
    CollectionConfig, CollectionConfigBuilder, EntityKind, MetricFilter, Secret, sdk_url,
    DEFAULT_COLLECT_CONCURRENCY, DEFAULT_DISCOVER_CONCURRENCY, DEFAULT_MAX_QUERY_METRICS,
    DEFAULT_TIMEOUT,
};
pub use record::{FieldValue, MetricRecord, MetricsCollector};
pub use telegraf::{parse_records, TelegrafCollector, PASSWORD_ENV, USERNAME_ENV};
