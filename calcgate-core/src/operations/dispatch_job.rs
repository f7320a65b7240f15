use crate::state::is_valid_key;
use crate::{
    BlobSizeProvider, CalculationBody, ClusterSelector, ClusterSet, DynStateStore, GateError,
    JobState, Result, UpstreamClient,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Query parameter carrying the caller-supplied job identifier.
pub const CALCULATION_ID_PARAM: &str = "calculationId";

#[derive(Clone)]
pub struct DispatchJobOperation {
    selector: ClusterSelector,
    state: DynStateStore,
    blobs: Arc<dyn BlobSizeProvider>,
    upstream: UpstreamClient,
    callback_url: String,
    admission: Arc<Mutex<()>>,
}

#[derive(Debug, Clone)]
pub struct DispatchJobOperationRequest {
    pub query: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Debug, Clone)]
pub struct DispatchJobOperationResult {
    pub calculation_id: String,
    pub cluster: String,
    pub file_size: u64,
}

impl DispatchJobOperation {
    /// `callback_base` is the dispatcher's externally reachable base URL;
    /// workers are told to call `{callback_base}/callback`.
    pub fn new(
        clusters: Arc<ClusterSet>,
        state: DynStateStore,
        blobs: Arc<dyn BlobSizeProvider>,
        upstream: UpstreamClient,
        callback_base: &str,
    ) -> Self {
        Self {
            selector: ClusterSelector::new(clusters, state.clone()),
            state,
            blobs,
            upstream,
            callback_url: format!("{}/callback", callback_base.trim_end_matches('/')),
            admission: Arc::new(Mutex::new(())),
        }
    }

    pub fn callback_url(&self) -> &str {
        &self.callback_url
    }

    pub async fn run(
        &self,
        request: DispatchJobOperationRequest,
    ) -> Result<DispatchJobOperationResult> {
        let DispatchJobOperationRequest { query, body } = request;

        let body = CalculationBody::parse(body)?;
        let calculation_id = resolve_calculation_id(&query)?;

        let file_size = self.blobs.file_size(body.input_file()).await?;

        // Selection and both state writes form one admission step, so two
        // concurrent jobs cannot both take the last free slot of a cluster.
        let selected = {
            let _admission = self.admission.lock().await;

            let selected = self.selector.select(file_size).await?;

            let job = JobState {
                calculation_id: calculation_id.clone(),
                file_size,
                cluster: selected.name.clone(),
                callback_url: body.callback_url().to_string(),
                query_params: query.clone(),
            };
            self.state.put_job_state(&job).await?;
            self.state
                .append_cluster_load(&selected.name, &calculation_id, file_size)
                .await?;

            selected
        };

        tracing::info!(
            "Admitted calculation {} ({} bytes) to cluster {}",
            calculation_id,
            file_size,
            selected.name
        );

        // State stays recorded when the forward fails; callers resubmit.
        let rewritten = body.with_callback(&self.callback_url);
        self.upstream
            .forward_calculation(&selected.name, &selected.url, rewritten, &query)
            .await?;

        Ok(DispatchJobOperationResult {
            calculation_id,
            cluster: selected.name,
            file_size,
        })
    }
}

fn resolve_calculation_id(query: &BTreeMap<String, String>) -> Result<String> {
    let calculation_id = query
        .get(CALCULATION_ID_PARAM)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .ok_or_else(|| {
            GateError::MalformedRequest(format!("{} is missing", CALCULATION_ID_PARAM))
        })?;

    if !is_valid_key(calculation_id) {
        return Err(GateError::MalformedRequest(format!(
            "invalid {}: {}",
            CALCULATION_ID_PARAM, calculation_id
        )));
    }

    Ok(calculation_id.to_string())
}
