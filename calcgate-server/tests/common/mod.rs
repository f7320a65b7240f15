#![allow(dead_code)]

use axum::body::{Body, Bytes};
use axum::extract::{Query, State};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::{Json, Router};
use calcgate_core::{
    ClusterConfig, ClusterSet, DynStateStore, FileStateStore, ObjectStoreBlobSizes, StateBackend,
};
use calcgate_server::{BlobSource, RuntimeConfig, ServerState, router};
use object_store::memory::InMemory;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutPayload};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

pub const CALLBACK_BASE: &str = "http://gate.test";

/// Requests seen by the mock worker cluster and mock original caller.
#[derive(Default)]
pub struct Captured {
    pub calculations: Mutex<Vec<(BTreeMap<String, String>, String)>>,
    pub callbacks: Mutex<Vec<serde_json::Value>>,
}

impl Captured {
    pub fn calculations(&self) -> Vec<(BTreeMap<String, String>, String)> {
        self.calculations.lock().unwrap().clone()
    }

    pub fn callbacks(&self) -> Vec<serde_json::Value> {
        self.callbacks.lock().unwrap().clone()
    }
}

type MockState = (Arc<Captured>, StatusCode);

async fn mock_calculate(
    State((captured, status)): State<MockState>,
    Query(query): Query<BTreeMap<String, String>>,
    body: String,
) -> StatusCode {
    captured.calculations.lock().unwrap().push((query, body));
    status
}

async fn mock_done(
    State((captured, status)): State<MockState>,
    Json(payload): Json<serde_json::Value>,
) -> StatusCode {
    captured.callbacks.lock().unwrap().push(payload);
    status
}

/// Serve a mock that plays both the worker cluster (`/calculate`) and the
/// original caller (`/done`). Every request is answered with `status`.
pub async fn spawn_mock(status: StatusCode) -> (String, Arc<Captured>) {
    let captured = Arc::new(Captured::default());
    let app = Router::new()
        .route("/calculate", post(mock_calculate))
        .route("/done", post(mock_done))
        .with_state((captured.clone(), status));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), captured)
}

pub fn cluster(name: &str, url: &str, max_capacity: usize, max_file_size: u64) -> ClusterConfig {
    ClusterConfig {
        name: name.to_string(),
        url: url.to_string(),
        max_capacity,
        max_file_size,
    }
}

pub fn runtime_config(clusters: Vec<ClusterConfig>, state_dir: &std::path::Path) -> RuntimeConfig {
    RuntimeConfig {
        bind_addr: "127.0.0.1:0".to_string(),
        clusters: ClusterSet::new(clusters).unwrap(),
        state_backend: StateBackend::LocalFile,
        state_dir: state_dir.to_path_buf(),
        state_db_path: state_dir.join("state.db"),
        cluster_table: "Cluster_State".to_string(),
        request_table: "Calculation_Request".to_string(),
        blob_source: BlobSource::Local {
            root: state_dir.join("blobs"),
        },
        callback_base_url: CALLBACK_BASE.to_string(),
        upstream_timeout: Duration::from_secs(5),
        upstream_connect_timeout: Duration::from_secs(1),
    }
}

/// Blob store holding `inputs/job.dat` (500 bytes) and `inputs/big.dat` (5000 bytes).
pub async fn blob_sizes() -> Arc<ObjectStoreBlobSizes> {
    let objects = Arc::new(InMemory::new());
    for (key, size) in [("inputs/job.dat", 500usize), ("inputs/big.dat", 5000)] {
        objects
            .put(&ObjectPath::from(key), PutPayload::from(vec![1u8; size]))
            .await
            .unwrap();
    }
    Arc::new(ObjectStoreBlobSizes::new(objects))
}

pub async fn build_app(config: &RuntimeConfig, state: DynStateStore) -> Router {
    let server_state = ServerState::new(config, state, blob_sizes().await).unwrap();
    router(Arc::new(server_state))
}

pub fn file_state(dir: &tempfile::TempDir) -> DynStateStore {
    Arc::new(FileStateStore::new(dir.path().join("state")).unwrap())
}

pub fn calculation_body(input: &str, callback: &str) -> String {
    format!(
        "--calc\r\nContent-Disposition: form-data; name=\"request\"\r\n\r\ninput={}\r\ncallback={}\r\n--calc--\r\n",
        input, callback
    )
}

pub async fn post_request(app: Router, uri: &str, body: impl Into<Body>) -> Response {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .body(body.into())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn get_request(app: Router, uri: &str) -> Response {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes: Bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
