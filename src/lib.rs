//! A one-shot probe that gathers vSphere metrics and persists a single value

pub mod collector;
pub mod config;
pub mod error;
pub mod extract;
pub mod output;
pub mod probe;
pub mod process;
pub mod util;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::collector::{CollectionConfig, FieldValue, MetricRecord, MetricsCollector};
    pub use crate::config::{Settings, SettingsLoader};
    pub use crate::error::{ProbeError, Result};
    pub use crate::extract::Extraction;
    pub use crate::probe::{run, ProbeReport};
}

pub use util::logging::init as init_logging;

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
