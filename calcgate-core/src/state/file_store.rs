use super::{InFlightJob, JobState, StateStore, is_valid_key};
use crate::error::{GateError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

/// File-per-entity state backend.
///
/// Layout under the base path:
/// - `cluster/{cluster_name}.json`: append-only, one JSON object per line
/// - `requests/{calculation_id}.json`: a single JSON object
pub struct FileStateStore {
    base_path: PathBuf,
}

impl FileStateStore {
    pub fn new(base_path: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(base_path.join("cluster"))?;
        std::fs::create_dir_all(base_path.join("requests"))?;
        Ok(Self { base_path })
    }

    fn cluster_path(&self, cluster: &str) -> PathBuf {
        self.base_path.join("cluster").join(format!("{}.json", cluster))
    }

    fn request_path(&self, calculation_id: &str) -> PathBuf {
        self.base_path
            .join("requests")
            .join(format!("{}.json", calculation_id))
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn append_cluster_load(
        &self,
        cluster: &str,
        calculation_id: &str,
        file_size: u64,
    ) -> Result<()> {
        let record = InFlightJob {
            calculation_id: calculation_id.to_string(),
            file_size,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        // Appends are not locked; concurrent writers from other processes may interleave.
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.cluster_path(cluster))
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        tracing::debug!(
            "Appended load record for cluster {} (calculation {})",
            cluster,
            calculation_id
        );
        Ok(())
    }

    async fn put_job_state(&self, state: &JobState) -> Result<()> {
        let path = self.request_path(&state.calculation_id);
        let payload = serde_json::to_vec(state)?;

        // Write to temporary file first, then rename for atomicity
        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&payload).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, &path).await?;
        Ok(())
    }

    async fn get_cluster_load(&self, cluster: &str) -> Result<Vec<InFlightJob>> {
        let raw = match fs::read(self.cluster_path(cluster)).await {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(error) => return Err(error.into()),
        };

        // Accepts JSON Lines as well as objects written back to back with no separator.
        serde_json::Deserializer::from_slice(&raw)
            .into_iter::<InFlightJob>()
            .map(|record| {
                record.map_err(|error| {
                    GateError::Internal(format!(
                        "corrupt load record for cluster {}: {}",
                        cluster, error
                    ))
                })
            })
            .collect()
    }

    async fn get_job_state(&self, calculation_id: &str) -> Result<Option<JobState>> {
        if !is_valid_key(calculation_id) {
            return Ok(None);
        }

        match fs::read(self.request_path(calculation_id)).await {
            Ok(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}
