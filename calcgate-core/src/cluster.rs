use crate::state::{DynStateStore, is_valid_key};
use crate::{GateError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Capacity used for clusters that do not set `max_capacity`.
pub const DEFAULT_CALCULATION_THRESHOLD: usize = 10;

/// File size limit (bytes) used for clusters that do not set `max_file_size`.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Static description of one worker cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    pub name: String,
    pub url: String,
    pub max_capacity: usize,
    pub max_file_size: u64,
}

impl ClusterConfig {
    /// Whether a job of `file_size` bytes fits next to `current_load` in-flight jobs.
    pub fn admits(&self, current_load: usize, file_size: u64) -> bool {
        current_load < self.max_capacity && file_size < self.max_file_size
    }
}

/// Shape of one entry in the `CLUSTER_CONFIG` JSON map.
#[derive(Debug, Deserialize)]
struct ClusterEntry {
    url: Option<String>,
    #[serde(default)]
    max_capacity: Option<usize>,
    #[serde(default)]
    max_file_size: Option<u64>,
}

/// Clusters in declaration order. Earlier entries win ties during selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSet {
    clusters: Vec<ClusterConfig>,
}

impl ClusterSet {
    pub fn new(clusters: Vec<ClusterConfig>) -> Result<Self> {
        for (index, cluster) in clusters.iter().enumerate() {
            validate_cluster_name(&cluster.name)?;
            if clusters[..index].iter().any(|c| c.name == cluster.name) {
                return Err(GateError::Config(format!(
                    "duplicate cluster name: {}",
                    cluster.name
                )));
            }
        }

        Ok(Self { clusters })
    }

    /// Parse the JSON object `{name: {url, max_capacity?, max_file_size?}}`,
    /// keeping the key order of the document.
    pub fn from_json(
        raw: &str,
        default_capacity: usize,
        default_max_file_size: u64,
    ) -> Result<Self> {
        let raw = if raw.trim().is_empty() { "{}" } else { raw };

        let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(raw)
            .map_err(|error| GateError::Config(format!("invalid cluster config JSON: {}", error)))?;

        let mut clusters = Vec::with_capacity(map.len());
        for (name, value) in map {
            let entry: ClusterEntry = serde_json::from_value(value).map_err(|error| {
                GateError::Config(format!("invalid config for cluster '{}': {}", name, error))
            })?;

            let url = entry
                .url
                .map(|url| url.trim().trim_end_matches('/').to_string())
                .filter(|url| !url.is_empty())
                .ok_or_else(|| {
                    GateError::Config(format!("cluster '{}' has no url configured", name))
                })?;

            clusters.push(ClusterConfig {
                name,
                url,
                max_capacity: entry.max_capacity.unwrap_or(default_capacity),
                max_file_size: entry.max_file_size.unwrap_or(default_max_file_size),
            });
        }

        Self::new(clusters)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClusterConfig> {
        self.clusters.iter()
    }

    pub fn get(&self, name: &str) -> Option<&ClusterConfig> {
        self.clusters.iter().find(|cluster| cluster.name == name)
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

fn validate_cluster_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(GateError::Config("cluster name cannot be empty".to_string()));
    }

    if !is_valid_key(name) {
        return Err(GateError::Config(format!("invalid cluster name: {}", name)));
    }

    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCluster {
    pub name: String,
    pub url: String,
}

/// First-fit admission over the configured clusters.
///
/// Loads are read from the state store on every call; nothing is cached
/// between requests.
#[derive(Clone)]
pub struct ClusterSelector {
    clusters: Arc<ClusterSet>,
    state: DynStateStore,
}

impl ClusterSelector {
    pub fn new(clusters: Arc<ClusterSet>, state: DynStateStore) -> Self {
        Self { clusters, state }
    }

    pub async fn select(&self, file_size: u64) -> Result<SelectedCluster> {
        for cluster in self.clusters.iter() {
            let load = self.state.get_cluster_load(&cluster.name).await?.len();

            if cluster.admits(load, file_size) {
                tracing::debug!(
                    "cluster {} admits job: load={} capacity={} file_size={} max_file_size={}",
                    cluster.name,
                    load,
                    cluster.max_capacity,
                    file_size,
                    cluster.max_file_size
                );
                return Ok(SelectedCluster {
                    name: cluster.name.clone(),
                    url: cluster.url.clone(),
                });
            }
        }

        Err(GateError::CapacityExceeded)
    }
}
