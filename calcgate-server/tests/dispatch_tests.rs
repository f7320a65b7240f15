//! End-to-end tests for `/calculate` and `/callback` against mock workers.

mod common;

use axum::http::StatusCode;
use calcgate_core::{DynStateStore, TableStateStore};
use common::*;
use serde_json::json;
use std::sync::Arc;

async fn calculate_then_callback(state: DynStateStore, dir: &tempfile::TempDir) {
    let (mock_url, captured) = spawn_mock(StatusCode::OK).await;
    let config = runtime_config(vec![cluster("gp-6-prod", &mock_url, 5, 1000)], dir.path());
    let app = build_app(&config, state.clone()).await;

    let original_callback = format!("{}/done", mock_url);
    let response = post_request(
        app.clone(),
        "/calculate?calculationId=job1&priority=high",
        calculation_body("inputs/job.dat", &original_callback),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "calculation started", "cluster": "gp-6-prod"})
    );

    // The worker sees the dispatcher's callback and the caller's query.
    let calculations = captured.calculations();
    assert_eq!(calculations.len(), 1);
    let (query, body) = &calculations[0];
    assert_eq!(query.get("calculationId").unwrap(), "job1");
    assert_eq!(query.get("priority").unwrap(), "high");
    assert_eq!(
        body,
        &calculation_body("inputs/job.dat", "http://gate.test/callback")
    );

    let job = state.get_job_state("job1").await.unwrap().unwrap();
    assert_eq!(job.callback_url, original_callback);
    assert_eq!(job.file_size, 500);
    assert_eq!(state.get_cluster_load("gp-6-prod").await.unwrap().len(), 1);

    let payload = json!({"CalculationId": "job1", "Status": "Completed", "Results": [1, 2, 3]});
    let response = post_request(app, "/callback", payload.to_string()).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "callback forwarded", "originalCallbackUrl": original_callback})
    );
    assert_eq!(captured.callbacks(), vec![payload]);
}

#[tokio::test]
async fn calculate_then_callback_with_file_state() {
    let dir = tempfile::tempdir().unwrap();
    calculate_then_callback(file_state(&dir), &dir).await;
}

#[tokio::test]
async fn calculate_then_callback_with_table_state() {
    let dir = tempfile::tempdir().unwrap();
    let state = TableStateStore::new(
        dir.path().join("state.db"),
        "Cluster_State",
        "Calculation_Request",
    )
    .unwrap();
    calculate_then_callback(Arc::new(state), &dir).await;
}

#[tokio::test]
async fn full_cluster_spills_to_next() {
    let dir = tempfile::tempdir().unwrap();
    let (mock_url, captured) = spawn_mock(StatusCode::OK).await;
    let state = file_state(&dir);
    state.append_cluster_load("A", "earlier", 100).await.unwrap();

    let config = runtime_config(
        vec![
            cluster("A", &mock_url, 1, 1000),
            cluster("B", &mock_url, 1, 1000),
        ],
        dir.path(),
    );
    let app = build_app(&config, state.clone()).await;

    let response = post_request(
        app,
        "/calculate?calculationId=job2",
        calculation_body("inputs/job.dat", "http://caller/done"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["cluster"], "B");
    assert_eq!(captured.calculations().len(), 1);
    assert_eq!(state.get_cluster_load("B").await.unwrap().len(), 1);
}

#[tokio::test]
async fn no_cluster_available_returns_503() {
    let dir = tempfile::tempdir().unwrap();
    let (mock_url, captured) = spawn_mock(StatusCode::OK).await;
    let state = file_state(&dir);
    let config = runtime_config(vec![cluster("A", &mock_url, 1, 100)], dir.path());
    let app = build_app(&config, state.clone()).await;

    let response = post_request(
        app,
        "/calculate?calculationId=job3",
        calculation_body("inputs/job.dat", "http://caller/done"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(
        body_json(response).await["detail"],
        "All clusters are at capacity or file size exceeds limits"
    );
    assert!(captured.calculations().is_empty());
    assert_eq!(state.get_job_state("job3").await.unwrap(), None);
}

#[tokio::test]
async fn malformed_calculation_returns_400() {
    let dir = tempfile::tempdir().unwrap();
    let (mock_url, captured) = spawn_mock(StatusCode::OK).await;
    let config = runtime_config(vec![cluster("A", &mock_url, 5, 1000)], dir.path());
    let app = build_app(&config, file_state(&dir)).await;

    let response = post_request(
        app.clone(),
        "/calculate?calculationId=job4",
        "input=inputs/job.dat\r\n",
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["detail"],
        "Invalid request body format"
    );

    let response = post_request(
        app,
        "/calculate",
        calculation_body("inputs/job.dat", "http://caller/done"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert!(captured.calculations().is_empty());
}

#[tokio::test]
async fn missing_input_file_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let (mock_url, _captured) = spawn_mock(StatusCode::OK).await;
    let config = runtime_config(vec![cluster("A", &mock_url, 5, 1000)], dir.path());
    let app = build_app(&config, file_state(&dir)).await;

    let response = post_request(
        app,
        "/calculate?calculationId=job5",
        calculation_body("inputs/absent.dat", "http://caller/done"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn worker_failure_returns_500_and_keeps_state() {
    let dir = tempfile::tempdir().unwrap();
    let (mock_url, captured) = spawn_mock(StatusCode::INTERNAL_SERVER_ERROR).await;
    let state = file_state(&dir);
    let config = runtime_config(vec![cluster("A", &mock_url, 5, 1000)], dir.path());
    let app = build_app(&config, state.clone()).await;

    let response = post_request(
        app,
        "/calculate?calculationId=job6",
        calculation_body("inputs/job.dat", "http://caller/done"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body_json(response).await["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Error forwarding request to A"), "{}", detail);

    assert_eq!(captured.calculations().len(), 1);
    assert!(state.get_job_state("job6").await.unwrap().is_some());
    assert_eq!(state.get_cluster_load("A").await.unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_callback_returns_404_without_forwarding() {
    let dir = tempfile::tempdir().unwrap();
    let (mock_url, captured) = spawn_mock(StatusCode::OK).await;
    let config = runtime_config(vec![cluster("A", &mock_url, 5, 1000)], dir.path());
    let app = build_app(&config, file_state(&dir)).await;

    let response = post_request(app, "/callback", json!({"CalculationId": "nobody"}).to_string()).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        body_json(response).await["detail"],
        "CalculationId not found in state"
    );
    assert!(captured.callbacks().is_empty());
}

#[tokio::test]
async fn path_like_callback_id_returns_404() {
    let dir = tempfile::tempdir().unwrap();
    let (mock_url, captured) = spawn_mock(StatusCode::OK).await;
    let state = file_state(&dir);
    state.append_cluster_load("A", "job1", 10).await.unwrap();
    let config = runtime_config(vec![cluster("A", &mock_url, 5, 1000)], dir.path());
    let app = build_app(&config, state).await;

    let response = post_request(
        app,
        "/callback",
        json!({"CalculationId": "../cluster/A"}).to_string(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(captured.callbacks().is_empty());
}

#[tokio::test]
async fn callback_without_id_returns_400() {
    let dir = tempfile::tempdir().unwrap();
    let config = runtime_config(Vec::new(), dir.path());
    let app = build_app(&config, file_state(&dir)).await;

    let response = post_request(app.clone(), "/callback", json!({"Status": "Done"}).to_string()).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        body_json(response).await["detail"],
        "CalculationId is missing in the callback payload"
    );

    let response = post_request(app, "/callback", "not json").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn caller_failure_returns_500() {
    let dir = tempfile::tempdir().unwrap();
    let (mock_url, captured) = spawn_mock(StatusCode::BAD_GATEWAY).await;
    let state = file_state(&dir);
    let config = runtime_config(Vec::new(), dir.path());
    let app = build_app(&config, state.clone()).await;

    state
        .put_job_state(&calcgate_core::JobState {
            calculation_id: "job7".to_string(),
            file_size: 10,
            cluster: "A".to_string(),
            callback_url: format!("{}/done", mock_url),
            query_params: Default::default(),
        })
        .await
        .unwrap();

    let response = post_request(app, "/callback", json!({"CalculationId": "job7"}).to_string()).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(captured.callbacks().len(), 1);
}

#[tokio::test]
async fn health_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let config = runtime_config(Vec::new(), dir.path());
    let app = build_app(&config, file_state(&dir)).await;

    let response = get_request(app.clone(), "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "healthy"}));

    let response = get_request(app, "/liveness").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "alive"}));
}
