use crate::config::{BlobSource, RuntimeConfig};
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use calcgate_core::{
    BlobSizeProvider, DispatchJobOperation, DispatchJobOperationRequest, DynStateStore, GateError,
    ObjectStoreBlobSizes, Result, RouteCallbackOperation, RouteCallbackOperationRequest,
    StateBackend, StateStoreBuilder, UpstreamClient,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub struct ServerState {
    pub dispatch: DispatchJobOperation,
    pub callback: RouteCallbackOperation,
}

impl ServerState {
    /// Wire the operations from already constructed collaborators.
    pub fn new(
        config: &RuntimeConfig,
        state_store: DynStateStore,
        blobs: Arc<dyn BlobSizeProvider>,
    ) -> Result<Self> {
        let upstream =
            UpstreamClient::new(config.upstream_timeout, config.upstream_connect_timeout)?;

        let dispatch = DispatchJobOperation::new(
            Arc::new(config.clusters.clone()),
            state_store.clone(),
            blobs,
            upstream.clone(),
            &config.callback_base_url,
        );
        let callback = RouteCallbackOperation::new(state_store, upstream);

        Ok(Self { dispatch, callback })
    }

    /// Build the state backend and blob store named by the configuration.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self> {
        let state_store = build_state_store(config)?;

        let blobs: Arc<dyn BlobSizeProvider> = match &config.blob_source {
            BlobSource::S3 { bucket } => Arc::new(ObjectStoreBlobSizes::s3(bucket)?),
            BlobSource::Local { root } => Arc::new(ObjectStoreBlobSizes::local(root)?),
        };

        Self::new(config, state_store, blobs)
    }
}

fn build_state_store(config: &RuntimeConfig) -> Result<DynStateStore> {
    let builder = StateStoreBuilder::new().backend(config.state_backend.to_string());

    match config.state_backend {
        StateBackend::LocalFile => builder.state_dir(config.state_dir.clone()).build(),
        StateBackend::Table => builder
            .db_path(config.state_db_path.clone())
            .cluster_table(config.cluster_table.clone())
            .request_table(config.request_table.clone())
            .build(),
    }
}

#[derive(Debug, Serialize)]
struct CalculateResponse {
    status: &'static str,
    cluster: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CallbackResponse {
    status: &'static str,
    original_callback_url: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    detail: String,
}

/// HTTP mapping of [`GateError`].
#[derive(Debug)]
pub struct ApiError(GateError);

impl From<GateError> for ApiError {
    fn from(error: GateError) -> Self {
        Self(error)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            GateError::MalformedRequest(_) => StatusCode::BAD_REQUEST,
            GateError::NotFound(_) => StatusCode::NOT_FOUND,
            GateError::CapacityExceeded => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("request failed with {}: {}", status, self.0);
        } else {
            tracing::warn!("request rejected with {}: {}", status, self.0);
        }

        let body = ErrorResponse {
            detail: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/liveness", get(liveness_handler))
        .route("/calculate", post(calculate_handler))
        .route("/callback", post(callback_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: RuntimeConfig) -> Result<()> {
    if config.clusters.is_empty() {
        tracing::warn!("No clusters configured; every calculation will be rejected");
    }

    for cluster in config.clusters.iter() {
        tracing::info!(
            "Cluster {} at {} (capacity {}, max file size {} bytes)",
            cluster.name,
            cluster.url,
            cluster.max_capacity,
            cluster.max_file_size
        );
    }

    let state = Arc::new(ServerState::from_config(&config)?);
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl-C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, shutting down"),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down"),
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(StatusResponse { status: "healthy" })
}

async fn liveness_handler() -> impl IntoResponse {
    Json(StatusResponse { status: "alive" })
}

async fn calculate_handler(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<BTreeMap<String, String>>,
    body: String,
) -> std::result::Result<Json<CalculateResponse>, ApiError> {
    let result = state
        .dispatch
        .run(DispatchJobOperationRequest { query, body })
        .await?;

    tracing::debug!(
        "calculation {} ({} bytes) started on {}",
        result.calculation_id,
        result.file_size,
        result.cluster
    );

    Ok(Json(CalculateResponse {
        status: "calculation started",
        cluster: result.cluster,
    }))
}

async fn callback_handler(
    State(state): State<Arc<ServerState>>,
    payload: Bytes,
) -> std::result::Result<Json<CallbackResponse>, ApiError> {
    let result = state
        .callback
        .run(RouteCallbackOperationRequest { payload })
        .await?;

    tracing::debug!("callback for calculation {} relayed", result.calculation_id);

    Ok(Json(CallbackResponse {
        status: "callback forwarded",
        original_callback_url: result.original_callback_url,
    }))
}
