use super::{InFlightJob, JobState, StateStore};
use crate::error::{GateError, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension, params};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_CLUSTER_TABLE: &str = "Cluster_State";
pub const DEFAULT_REQUEST_TABLE: &str = "Calculation_Request";

/// Key/value table state backend on SQLite.
///
/// The cluster table holds one row per in-flight entry keyed by cluster
/// name; the request table holds one row per calculation keyed by id.
#[derive(Clone)]
pub struct TableStateStore {
    inner: Arc<TableInner>,
}

struct TableInner {
    db_path: PathBuf,
    cluster_table: String,
    request_table: String,
}

impl TableStateStore {
    pub fn new(db_path: PathBuf, cluster_table: &str, request_table: &str) -> Result<Self> {
        validate_table_name(cluster_table)?;
        validate_table_name(request_table)?;
        if cluster_table == request_table {
            return Err(GateError::Config(
                "cluster and request tables must be different".to_string(),
            ));
        }

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let inner = TableInner {
            db_path,
            cluster_table: cluster_table.to_string(),
            request_table: request_table.to_string(),
        };
        inner.init_schema()?;

        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&TableInner) -> Result<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| GateError::Internal(format!("state table task failed: {}", e)))?
    }
}

impl TableInner {
    fn get_conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    pk INTEGER PRIMARY KEY AUTOINCREMENT,
                    cluster_name TEXT NOT NULL,
                    calculation_id TEXT NOT NULL,
                    file_size INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                )",
                self.cluster_table
            ),
            [],
        )?;

        conn.execute(
            &format!(
                "CREATE INDEX IF NOT EXISTS idx_{0}_cluster ON {0}(cluster_name)",
                self.cluster_table
            ),
            [],
        )?;

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    calculation_id TEXT PRIMARY KEY,
                    file_size INTEGER NOT NULL,
                    cluster TEXT NOT NULL,
                    callback_url TEXT NOT NULL,
                    query_params TEXT NOT NULL,
                    created_at TEXT NOT NULL
                )",
                self.request_table
            ),
            [],
        )?;

        Ok(())
    }

    fn append_cluster_load(&self, cluster: &str, calculation_id: &str, file_size: u64) -> Result<()> {
        let conn = self.get_conn()?;

        conn.execute(
            &format!(
                "INSERT INTO {} (cluster_name, calculation_id, file_size, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                self.cluster_table
            ),
            params![
                cluster,
                calculation_id,
                to_sql_size(file_size)?,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn put_job_state(&self, state: &JobState) -> Result<()> {
        let conn = self.get_conn()?;
        let query_params = serde_json::to_string(&state.query_params)?;

        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} (
                    calculation_id, file_size, cluster, callback_url, query_params, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                self.request_table
            ),
            params![
                state.calculation_id,
                to_sql_size(state.file_size)?,
                state.cluster,
                state.callback_url,
                query_params,
                chrono::Utc::now().to_rfc3339(),
            ],
        )?;

        Ok(())
    }

    fn get_cluster_load(&self, cluster: &str) -> Result<Vec<InFlightJob>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "SELECT calculation_id, file_size FROM {} WHERE cluster_name = ?1 ORDER BY pk",
            self.cluster_table
        ))?;

        let rows = stmt.query_map([cluster], |row| {
            let calculation_id: String = row.get(0)?;
            let file_size: i64 = row.get(1)?;
            Ok(InFlightJob {
                calculation_id,
                file_size: file_size as u64,
            })
        })?;

        let mut load = Vec::new();
        for row in rows {
            load.push(row?);
        }

        Ok(load)
    }

    fn get_job_state(&self, calculation_id: &str) -> Result<Option<JobState>> {
        let conn = self.get_conn()?;

        let row: Option<(i64, String, String, String)> = conn
            .query_row(
                &format!(
                    "SELECT file_size, cluster, callback_url, query_params
                     FROM {} WHERE calculation_id = ?1",
                    self.request_table
                ),
                [calculation_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        match row {
            Some((file_size, cluster, callback_url, query_params_json)) => {
                let query_params: BTreeMap<String, String> =
                    serde_json::from_str(&query_params_json)?;
                Ok(Some(JobState {
                    calculation_id: calculation_id.to_string(),
                    file_size: file_size as u64,
                    cluster,
                    callback_url,
                    query_params,
                }))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl StateStore for TableStateStore {
    fn name(&self) -> &'static str {
        "table"
    }

    async fn append_cluster_load(
        &self,
        cluster: &str,
        calculation_id: &str,
        file_size: u64,
    ) -> Result<()> {
        let cluster = cluster.to_string();
        let calculation_id = calculation_id.to_string();
        self.run_blocking(move |inner| {
            inner.append_cluster_load(&cluster, &calculation_id, file_size)
        })
        .await
    }

    async fn put_job_state(&self, state: &JobState) -> Result<()> {
        let state = state.clone();
        self.run_blocking(move |inner| inner.put_job_state(&state))
            .await
    }

    async fn get_cluster_load(&self, cluster: &str) -> Result<Vec<InFlightJob>> {
        let cluster = cluster.to_string();
        self.run_blocking(move |inner| inner.get_cluster_load(&cluster))
            .await
    }

    async fn get_job_state(&self, calculation_id: &str) -> Result<Option<JobState>> {
        let calculation_id = calculation_id.to_string();
        self.run_blocking(move |inner| inner.get_job_state(&calculation_id))
            .await
    }
}

fn to_sql_size(file_size: u64) -> Result<i64> {
    i64::try_from(file_size)
        .map_err(|_| GateError::Internal(format!("file size out of range: {}", file_size)))
}

fn validate_table_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit());

    if !valid {
        return Err(GateError::Config(format!("invalid state table name: {}", name)));
    }

    Ok(())
}
