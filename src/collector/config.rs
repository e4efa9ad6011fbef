use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Workers used to query metrics
pub const DEFAULT_COLLECT_CONCURRENCY: usize = 8;
/// Workers used for inventory discovery
pub const DEFAULT_DISCOVER_CONCURRENCY: usize = 4;
/// Per-request timeout handed to the engine
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
/// Negative means "use the server's limit"
pub const DEFAULT_MAX_QUERY_METRICS: i64 = -1;

/// A credential that never shows up in debug output
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Borrow the raw secret
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

/// Inventory object kinds the engine can collect metrics for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Vm,
    Host,
    Cluster,
    Datacenter,
    Datastore,
}

impl EntityKind {
    pub const ALL: [EntityKind; 5] = [
        EntityKind::Vm,
        EntityKind::Host,
        EntityKind::Cluster,
        EntityKind::Datacenter,
        EntityKind::Datastore,
    ];

    /// Key prefix used by the engine's configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Vm => "vm",
            EntityKind::Host => "host",
            EntityKind::Cluster => "cluster",
            EntityKind::Datacenter => "datacenter",
            EntityKind::Datastore => "datastore",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metric name patterns to include and exclude for one entity kind
///
/// An empty include list means "everything not excluded".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetricFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl MetricFilter {
    /// Filter that drops every metric
    pub fn exclude_all() -> Self {
        Self {
            include: Vec::new(),
            exclude: vec!["*".to_string()],
        }
    }

    /// Filter that keeps only the given metrics
    pub fn only<I, S>(metrics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            include: metrics.into_iter().map(Into::into).collect(),
            exclude: Vec::new(),
        }
    }

    /// Whether this filter excludes every metric
    pub fn excludes_everything(&self) -> bool {
        self.exclude.iter().any(|pattern| pattern == "*")
    }
}

/// Configuration for a single collection pass
///
/// Built once through [`CollectionConfigBuilder`] and never mutated.
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// SDK endpoints to collect from
    pub vcenters: Vec<String>,
    /// Login identity
    pub username: String,
    /// Login credential
    pub password: Secret,
    /// Metric filters per entity kind
    pub filters: BTreeMap<EntityKind, MetricFilter>,
    /// Whether per-instance VM metrics are collected
    pub vm_instances: bool,
    /// Concurrent metric queries
    pub collect_concurrency: usize,
    /// Concurrent discovery queries
    pub discover_concurrency: usize,
    /// Query batch size override
    pub max_query_metrics: i64,
    /// Run discovery before the first collection
    pub force_discover_on_init: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

impl CollectionConfig {
    /// Filter for an entity kind; kinds without an explicit filter collect everything
    pub fn filter(&self, kind: EntityKind) -> MetricFilter {
        self.filters.get(&kind).cloned().unwrap_or_default()
    }
}

/// Builder for collection configuration
pub struct CollectionConfigBuilder {
    config: CollectionConfig,
}

impl CollectionConfigBuilder {
    /// Create a builder for a single vCenter host
    pub fn new(host: &str) -> Self {
        Self {
            config: CollectionConfig {
                vcenters: vec![sdk_url(host)],
                username: String::new(),
                password: Secret::new(""),
                filters: BTreeMap::new(),
                vm_instances: false,
                collect_concurrency: DEFAULT_COLLECT_CONCURRENCY,
                discover_concurrency: DEFAULT_DISCOVER_CONCURRENCY,
                max_query_metrics: DEFAULT_MAX_QUERY_METRICS,
                force_discover_on_init: true,
                timeout: DEFAULT_TIMEOUT,
            },
        }
    }

    /// Set the login credentials
    pub fn credentials(mut self, username: impl Into<String>, password: Secret) -> Self {
        self.config.username = username.into();
        self.config.password = password;
        self
    }

    /// Set the metric filter for an entity kind
    pub fn filter(mut self, kind: EntityKind, filter: MetricFilter) -> Self {
        self.config.filters.insert(kind, filter);
        self
    }

    /// Set whether per-instance VM metrics are collected
    pub fn vm_instances(mut self, enabled: bool) -> Self {
        self.config.vm_instances = enabled;
        self
    }

    /// Set collection and discovery concurrency
    pub fn concurrency(mut self, collect: usize, discover: usize) -> Self {
        self.config.collect_concurrency = collect;
        self.config.discover_concurrency = discover;
        self
    }

    /// Set the query batch size override
    pub fn max_query_metrics(mut self, max: i64) -> Self {
        self.config.max_query_metrics = max;
        self
    }

    /// Set whether discovery runs before the first collection
    pub fn force_discover_on_init(mut self, force: bool) -> Self {
        self.config.force_discover_on_init = force;
        self
    }

    /// Set the per-request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Build the configuration
    pub fn build(self) -> CollectionConfig {
        self.config
    }
}

/// SDK endpoint URL for a vCenter host
pub fn sdk_url(host: &str) -> String {
    format!("https://{}/sdk", host)
}
