use super::table_store::{DEFAULT_CLUSTER_TABLE, DEFAULT_REQUEST_TABLE};
use super::{DynStateStore, FileStateStore, TableStateStore};
use crate::{GateError, Result};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBackend {
    /// One file per cluster and per calculation.
    LocalFile,
    /// SQLite tables keyed by cluster name and calculation id.
    Table,
}

impl FromStr for StateBackend {
    type Err = GateError;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "localfile" | "file" => Ok(Self::LocalFile),
            "dynamodb" | "table" | "sqlite" => Ok(Self::Table),
            "" => Err(GateError::Config(
                "state backend cannot be empty".to_string(),
            )),
            other => Err(GateError::Config(format!(
                "unsupported state backend: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for StateBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LocalFile => write!(f, "LocalFile"),
            Self::Table => write!(f, "Table"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct StateStoreBuilder {
    backend: Option<String>,
    state_dir: Option<PathBuf>,
    db_path: Option<PathBuf>,
    cluster_table: Option<String>,
    request_table: Option<String>,
}

impl StateStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    pub fn state_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.state_dir = Some(dir.into());
        self
    }

    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    pub fn cluster_table(mut self, table: impl Into<String>) -> Self {
        self.cluster_table = Some(table.into());
        self
    }

    pub fn request_table(mut self, table: impl Into<String>) -> Self {
        self.request_table = Some(table.into());
        self
    }

    fn resolve_backend(&self) -> Result<StateBackend> {
        self.backend.as_deref().unwrap_or("LocalFile").parse()
    }

    pub fn build(&self) -> Result<DynStateStore> {
        match self.resolve_backend()? {
            StateBackend::LocalFile => {
                let dir = self
                    .state_dir
                    .clone()
                    .unwrap_or_else(|| PathBuf::from("mnt"));
                tracing::info!("Using file state backend at {:?}", dir);
                Ok(Arc::new(FileStateStore::new(dir)?))
            }
            StateBackend::Table => {
                let db_path = self.db_path.clone().ok_or_else(|| {
                    GateError::Config("db path is required for table backend".to_string())
                })?;
                let cluster_table = self
                    .cluster_table
                    .as_deref()
                    .unwrap_or(DEFAULT_CLUSTER_TABLE);
                let request_table = self
                    .request_table
                    .as_deref()
                    .unwrap_or(DEFAULT_REQUEST_TABLE);

                tracing::info!(
                    "Using table state backend at {:?} (tables {}, {})",
                    db_path,
                    cluster_table,
                    request_table
                );
                Ok(Arc::new(TableStateStore::new(
                    db_path,
                    cluster_table,
                    request_table,
                )?))
            }
        }
    }
}
