use config::{Environment, File, FileFormat};
use log::debug;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::collector::{
    CollectionConfig, CollectionConfigBuilder, EntityKind, MetricFilter, Secret,
    DEFAULT_COLLECT_CONCURRENCY, DEFAULT_DISCOVER_CONCURRENCY, DEFAULT_MAX_QUERY_METRICS,
    DEFAULT_TIMEOUT,
};
use crate::error::{ProbeError, Result};

/// Variable holding the vCenter login identity
pub const USERNAME_VAR: &str = "QA_VCENTER_USERNAME";
/// Variable holding the vCenter login credential
pub const PASSWORD_VAR: &str = "QA_VCENTER_PASSWORD";
/// Variable holding the vCenter host name
pub const SERVER_VAR: &str = "VCSA_SERVER";

/// Prefix for optional operational overrides
pub const OVERRIDE_PREFIX: &str = "VCPROBE";

pub const DEFAULT_TARGET_METRIC: &str = "cpu.usagemhz.average";
pub const DEFAULT_VALUE_FIELD: &str = "value";
pub const DEFAULT_OUTPUT_FILE: &str = "metrics.txt";
pub const DEFAULT_TELEGRAF_BIN: &str = "telegraf";

/// Environment variables as a plain map, for loading without touching the process environment
pub type EnvVars = config::Map<String, String>;

/// Logging level
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Error level
    Error,
    /// Warning level
    Warn,
    /// Info level
    #[default]
    Info,
    /// Debug level
    Debug,
    /// Trace level
    Trace,
}

/// Required vCenter connection details
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: Secret,
    pub server: String,
}

#[derive(Debug, Deserialize, Default)]
struct RawIdentity {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RawServer {
    #[serde(default)]
    server: Option<String>,
}

/// Operational options; every field has a default
#[derive(Debug, Deserialize, Clone)]
pub struct ProbeOptions {
    /// Measurement name to extract
    #[serde(default = "default_target_metric")]
    pub target_metric: String,
    /// Field holding the number to write
    #[serde(default = "default_value_field")]
    pub value_field: String,
    /// VM metrics to collect; defaults to the target metric alone
    #[serde(default)]
    pub vm_metric_include: Option<Vec<String>>,
    /// File name written in the working directory
    #[serde(default = "default_output_file")]
    pub output_file: String,
    /// Telegraf binary used for collection
    #[serde(default = "default_telegraf_bin")]
    pub telegraf_bin: String,
    /// Logging level
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_target_metric() -> String {
    DEFAULT_TARGET_METRIC.to_string()
}

fn default_value_field() -> String {
    DEFAULT_VALUE_FIELD.to_string()
}

fn default_output_file() -> String {
    DEFAULT_OUTPUT_FILE.to_string()
}

fn default_telegraf_bin() -> String {
    DEFAULT_TELEGRAF_BIN.to_string()
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            target_metric: default_target_metric(),
            value_field: default_value_field(),
            vm_metric_include: None,
            output_file: default_output_file(),
            telegraf_bin: default_telegraf_bin(),
            log_level: LogLevel::default(),
        }
    }
}

/// Everything a probe run needs, loaded once at startup
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub options: ProbeOptions,
}

impl Settings {
    /// The fixed-shape collection configuration for this run
    ///
    /// Only the VM include list is collected; every other entity kind is excluded.
    pub fn collection_config(&self) -> CollectionConfig {
        let vm_metrics = self
            .options
            .vm_metric_include
            .clone()
            .unwrap_or_else(|| vec![self.options.target_metric.clone()]);

        let mut builder = CollectionConfigBuilder::new(&self.credentials.server)
            .credentials(
                self.credentials.username.clone(),
                self.credentials.password.clone(),
            )
            .filter(EntityKind::Vm, MetricFilter::only(vm_metrics))
            .vm_instances(false)
            .concurrency(DEFAULT_COLLECT_CONCURRENCY, DEFAULT_DISCOVER_CONCURRENCY)
            .max_query_metrics(DEFAULT_MAX_QUERY_METRICS)
            .timeout(DEFAULT_TIMEOUT)
            .force_discover_on_init(true);

        for kind in EntityKind::ALL {
            if kind != EntityKind::Vm {
                builder = builder.filter(kind, MetricFilter::exclude_all());
            }
        }

        builder.build()
    }
}

/// Source of operational options
#[derive(Debug, Clone)]
pub enum ConfigSource {
    /// TOML file path
    File(PathBuf),
    /// TOML string
    Toml(String),
}

/// Loads [`Settings`] from the environment plus optional TOML sources
///
/// Sources are layered: TOML sources in the order added, then `VCPROBE_*`
/// variables. The three connection variables are only ever read from the
/// environment.
pub struct SettingsLoader {
    sources: Vec<ConfigSource>,
    vars: Option<EnvVars>,
}

impl SettingsLoader {
    /// Create a loader that reads the process environment
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            vars: None,
        }
    }

    /// Add a TOML file source
    pub fn add_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.sources.push(ConfigSource::File(path.as_ref().to_path_buf()));
        self
    }

    /// Add TOML string
    pub fn add_toml(mut self, toml: impl Into<String>) -> Self {
        self.sources.push(ConfigSource::Toml(toml.into()));
        self
    }

    /// Read variables from the given map instead of the process environment
    pub fn with_vars(mut self, vars: EnvVars) -> Self {
        self.vars = Some(vars);
        self
    }

    /// Load and validate settings
    pub fn load(self) -> Result<Settings> {
        let credentials = self.load_credentials()?;
        let options = self.load_options()?;
        debug!(
            "Settings loaded for {} as {} (target metric {})",
            credentials.server, credentials.username, options.target_metric
        );
        Ok(Settings {
            credentials,
            options,
        })
    }

    fn environment(&self, prefix: &str) -> Environment {
        Environment::with_prefix(prefix).source(self.vars.clone())
    }

    fn load_credentials(&self) -> Result<Credentials> {
        let identity: RawIdentity = config::Config::builder()
            .add_source(self.environment("QA_VCENTER"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ProbeError::Config(format!("Failed to read credentials: {}", e)))?;
        let server: RawServer = config::Config::builder()
            .add_source(self.environment("VCSA"))
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| ProbeError::Config(format!("Failed to read server: {}", e)))?;

        let username = non_empty(identity.username);
        let password = non_empty(identity.password);
        let server = non_empty(server.server);

        match (username, password, server) {
            (Some(username), Some(password), Some(server)) => Ok(Credentials {
                username,
                password: Secret::new(password),
                server,
            }),
            (username, password, server) => {
                let missing: Vec<&str> = [
                    (USERNAME_VAR, username.is_none()),
                    (PASSWORD_VAR, password.is_none()),
                    (SERVER_VAR, server.is_none()),
                ]
                .into_iter()
                .filter(|(_, absent)| *absent)
                .map(|(name, _)| name)
                .collect();
                Err(ProbeError::Config(format!(
                    "{}, {}, and {} environment variables must be set (missing: {})",
                    USERNAME_VAR,
                    PASSWORD_VAR,
                    SERVER_VAR,
                    missing.join(", ")
                )))
            }
        }
    }

    fn load_options(&self) -> Result<ProbeOptions> {
        let mut builder = config::Config::builder();

        for source in &self.sources {
            match source {
                ConfigSource::File(path) => {
                    debug!("Loading TOML configuration from file: {}", path.display());
                    builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
                }
                ConfigSource::Toml(toml_str) => {
                    debug!("Loading configuration from TOML string");
                    builder = builder.add_source(File::from_str(toml_str, FileFormat::Toml));
                }
            }
        }

        // Only overrides are parsed; credentials must stay verbatim strings.
        builder = builder.add_source(
            self.environment(OVERRIDE_PREFIX)
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("vm_metric_include"),
        );

        let config = builder
            .build()
            .map_err(|e| ProbeError::Config(format!("Failed to build configuration: {}", e)))?;

        config
            .try_deserialize()
            .map_err(|e| ProbeError::Config(format!("Failed to deserialize configuration: {}", e)))
    }
}

impl Default for SettingsLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}
