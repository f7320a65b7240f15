use crate::state::is_valid_key;
use crate::{DynStateStore, GateError, Result, UpstreamClient};
use bytes::Bytes;
use serde_json::Value;

/// Payload field carrying the job identifier in worker callbacks.
pub const CALLBACK_ID_FIELD: &str = "CalculationId";

#[derive(Clone)]
pub struct RouteCallbackOperation {
    state: DynStateStore,
    upstream: UpstreamClient,
}

#[derive(Debug, Clone)]
pub struct RouteCallbackOperationRequest {
    pub payload: Bytes,
}

#[derive(Debug, Clone)]
pub struct RouteCallbackOperationResult {
    pub calculation_id: String,
    pub original_callback_url: String,
}

impl RouteCallbackOperation {
    pub fn new(state: DynStateStore, upstream: UpstreamClient) -> Self {
        Self { state, upstream }
    }

    pub async fn run(
        &self,
        request: RouteCallbackOperationRequest,
    ) -> Result<RouteCallbackOperationResult> {
        let payload: Value = serde_json::from_slice(&request.payload).map_err(|error| {
            GateError::MalformedRequest(format!("Invalid callback payload: {}", error))
        })?;

        let calculation_id = extract_calculation_id(&payload)?;

        // Ids that could never have been admitted are unknown.
        let job = if is_valid_key(&calculation_id) {
            self.state.get_job_state(&calculation_id).await?
        } else {
            None
        };
        let job = job
            .ok_or_else(|| GateError::NotFound("CalculationId not found in state".to_string()))?;

        self.upstream
            .forward_callback(&job.callback_url, &payload)
            .await?;

        tracing::info!(
            "Forwarded callback for calculation {} (cluster {}) to {}",
            calculation_id,
            job.cluster,
            job.callback_url
        );

        Ok(RouteCallbackOperationResult {
            calculation_id,
            original_callback_url: job.callback_url,
        })
    }
}

fn extract_calculation_id(payload: &Value) -> Result<String> {
    let calculation_id = match payload.get(CALLBACK_ID_FIELD) {
        Some(Value::String(id)) => id.trim().to_string(),
        Some(Value::Number(id)) => id.to_string(),
        _ => String::new(),
    };

    if calculation_id.is_empty() {
        return Err(GateError::MalformedRequest(
            "CalculationId is missing in the callback payload".to_string(),
        ));
    }

    Ok(calculation_id)
}
