use calcgate_core::{
    ClusterSet, DEFAULT_CALCULATION_THRESHOLD, DEFAULT_MAX_FILE_SIZE, GateError, Result,
    StateBackend,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Raw settings, read from an optional config file and then the environment.
///
/// Environment variable names are the upper-cased field names, e.g.
/// `CLUSTER_CONFIG`, `STATE_TYPE`, `CALLBACK_URL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// JSON object: cluster name -> {url, max_capacity?, max_file_size?}.
    /// Kept as a string so key order survives.
    #[serde(default = "default_cluster_config")]
    pub cluster_config: String,

    #[serde(default = "default_calculation_threshold")]
    pub default_calculation_threshold: usize,

    #[serde(default = "default_max_file_size")]
    pub default_max_file_size: u64,

    #[serde(default = "default_state_type")]
    pub state_type: String,

    #[serde(default)]
    pub s3_bucket: Option<String>,

    #[serde(default)]
    pub blob_root: Option<PathBuf>,

    #[serde(default)]
    pub callback_url: Option<String>,

    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,

    #[serde(default = "default_state_db_path")]
    pub state_db_path: PathBuf,

    #[serde(default = "default_cluster_table")]
    pub dynamodb_cluster_table: String,

    #[serde(default = "default_request_table")]
    pub dynamodb_request_table: String,

    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,

    #[serde(default = "default_upstream_connect_timeout_secs")]
    pub upstream_connect_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_cluster_config() -> String {
    "{}".to_string()
}

fn default_calculation_threshold() -> usize {
    DEFAULT_CALCULATION_THRESHOLD
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_state_type() -> String {
    "LocalFile".to_string()
}

fn default_state_dir() -> PathBuf {
    PathBuf::from("mnt")
}

fn default_state_db_path() -> PathBuf {
    PathBuf::from("mnt/state.db")
}

fn default_cluster_table() -> String {
    "Cluster_State".to_string()
}

fn default_request_table() -> String {
    "Calculation_Request".to_string()
}

fn default_upstream_timeout_secs() -> u64 {
    30
}

fn default_upstream_connect_timeout_secs() -> u64 {
    5
}

/// Where input file sizes are looked up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlobSource {
    S3 { bucket: String },
    Local { root: PathBuf },
}

/// Validated configuration the server runs with.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub bind_addr: String,
    pub clusters: ClusterSet,
    pub state_backend: StateBackend,
    pub state_dir: PathBuf,
    pub state_db_path: PathBuf,
    pub cluster_table: String,
    pub request_table: String,
    pub blob_source: BlobSource,
    pub callback_base_url: String,
    pub upstream_timeout: Duration,
    pub upstream_connect_timeout: Duration,
}

impl Settings {
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = ::config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(::config::File::with_name(path));
        }

        Self::from_builder(builder.add_source(::config::Environment::default().try_parsing(true)))
    }

    pub fn from_builder(
        builder: ::config::ConfigBuilder<::config::builder::DefaultState>,
    ) -> Result<Self> {
        let settings = builder
            .build()
            .map_err(|e| GateError::Config(e.to_string()))?;

        settings
            .try_deserialize()
            .map_err(|e| GateError::Config(e.to_string()))
    }

    pub fn resolve(&self) -> Result<RuntimeConfig> {
        let clusters = ClusterSet::from_json(
            &self.cluster_config,
            self.default_calculation_threshold,
            self.default_max_file_size,
        )?;

        let state_backend: StateBackend = self.state_type.parse()?;

        let callback_base_url = self
            .callback_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| GateError::Config("CALLBACK_URL is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let blob_source = match (&self.blob_root, self.s3_bucket.as_deref().map(str::trim)) {
            (Some(root), _) => BlobSource::Local { root: root.clone() },
            (None, Some(bucket)) if !bucket.is_empty() => BlobSource::S3 {
                bucket: bucket.to_string(),
            },
            _ => {
                return Err(GateError::Config(
                    "S3_BUCKET (or BLOB_ROOT) is required".to_string(),
                ));
            }
        };

        if self.upstream_timeout_secs == 0 || self.upstream_connect_timeout_secs == 0 {
            return Err(GateError::Config(
                "upstream timeouts must be greater than zero".to_string(),
            ));
        }

        Ok(RuntimeConfig {
            bind_addr: self.bind_addr.clone(),
            clusters,
            state_backend,
            state_dir: self.state_dir.clone(),
            state_db_path: self.state_db_path.clone(),
            cluster_table: self.dynamodb_cluster_table.clone(),
            request_table: self.dynamodb_request_table.clone(),
            blob_source,
            callback_base_url,
            upstream_timeout: Duration::from_secs(self.upstream_timeout_secs),
            upstream_connect_timeout: Duration::from_secs(self.upstream_connect_timeout_secs),
        })
    }
}
