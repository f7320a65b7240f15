//! State storage for Calcgate
//!
//! Records in-flight load per cluster and metadata per calculation. Two
//! interchangeable backends: one file per entity, or SQLite tables.

pub mod factory;
pub mod file_store;
pub mod table_store;

pub use factory::{StateBackend, StateStoreBuilder};
pub use file_store::FileStateStore;
pub use table_store::TableStateStore;

use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// One job counted against a cluster's capacity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InFlightJob {
    pub calculation_id: String,
    pub file_size: u64,
}

/// Everything needed to route a worker callback back to its caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobState {
    pub calculation_id: String,
    pub file_size: u64,
    pub cluster: String,
    pub callback_url: String,
    #[serde(default)]
    pub query_params: BTreeMap<String, String>,
}

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Backend label used in logs.
    fn name(&self) -> &'static str;

    /// Append one in-flight record. Never rejects, never deduplicates.
    async fn append_cluster_load(
        &self,
        cluster: &str,
        calculation_id: &str,
        file_size: u64,
    ) -> Result<()>;

    /// Write (or overwrite) the record for `state.calculation_id`.
    async fn put_job_state(&self, state: &JobState) -> Result<()>;

    /// In-flight records for a cluster; empty when nothing was recorded yet.
    async fn get_cluster_load(&self, cluster: &str) -> Result<Vec<InFlightJob>>;

    /// `None` when the calculation id is unknown.
    async fn get_job_state(&self, calculation_id: &str) -> Result<Option<JobState>>;
}

pub type DynStateStore = Arc<dyn StateStore>;

/// Whether `key` can name a cluster or calculation in any backend.
///
/// Keys double as file names, so path separators and `..` are refused.
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty() && !key.contains('/') && !key.contains('\\') && !key.contains("..")
}
