//! Integration tests for the bench API endpoints

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use bench_lib::{
    assertions::AssertionFailure,
    health::{Component, HealthRegistry, HealthStatus},
    models::{RunPhase, ScalingResult, ScalingStrategy},
    observability::BenchMetrics,
    progress::RunTracker,
};
use scaling_bench::api::{create_router, AppState};
use std::sync::Arc;
use tower::ServiceExt;

async fn setup_test_app() -> (Router, Arc<AppState>) {
    let health_registry = HealthRegistry::new();
    let metrics = BenchMetrics::new();
    let state = Arc::new(AppState::new(health_registry, metrics, RunTracker::new()));
    let router = create_router(state.clone());

    (router, state)
}

async fn get(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

fn result(target: u32) -> ScalingResult {
    ScalingResult {
        region: "us-east-1".to_string(),
        os: "alinux2".to_string(),
        compute_node: "c5.large".to_string(),
        head_node: "c5.24xlarge".to_string(),
        scaling_target: target,
        scaling_strategy: ScalingStrategy::BestEffort,
        scale_up_time_ec2: 290,
        scale_up_time_scheduler: 410,
        scale_down_time: 180,
    }
}

#[tokio::test]
async fn test_healthz_returns_ok_when_healthy() {
    let (app, _state) = setup_test_app().await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "healthy");
    assert!(health["components"]["head_node"].is_object());
    assert!(health["components"]["collector"].is_object());
    assert!(health["components"]["compute_fleet"]["since"].is_string());
}

#[tokio::test]
async fn test_healthz_returns_ok_when_degraded() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .mark(
            Component::Collector,
            HealthStatus::Degraded,
            Some("3 consecutive samples failed: describe-instances throttled".to_string()),
        )
        .await;

    // Degraded still returns 200 (operational)
    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::OK);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "degraded");
    assert_eq!(health["components"]["collector"]["status"], "degraded");
}

#[tokio::test]
async fn test_healthz_returns_503_when_unhealthy() {
    let (app, state) = setup_test_app().await;

    state
        .health_registry
        .mark(
            Component::HeadNode,
            HealthStatus::Unhealthy,
            Some("ssh: connect to host timed out".to_string()),
        )
        .await;

    let (status, body) = get(app, "/healthz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let health: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(health["status"], "unhealthy");
}

#[tokio::test]
async fn test_readyz_follows_registry() {
    let (app, state) = setup_test_app().await;

    let (status, body) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["ready"], false);

    state.health_registry.set_ready(true).await;
    let (status, _) = get(app.clone(), "/readyz").await;
    assert_eq!(status, StatusCode::OK);

    state
        .health_registry
        .mark(Component::HeadNode, HealthStatus::Unhealthy, None)
        .await;
    let (status, body) = get(app, "/readyz").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    let readiness: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(readiness["reason"], "HeadNode unhealthy");
}

#[tokio::test]
async fn test_metrics_endpoint_returns_prometheus_format() {
    let (app, state) = setup_test_app().await;

    state.metrics.record_sample("api-test", 12, 10, 16);
    state.metrics.observe_scaling_duration("scale_down", 240);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().contains("text/plain"));

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let metrics_text = String::from_utf8(body.to_vec()).unwrap();

    assert!(metrics_text.contains("scaling_bench_ec2_capacity{cluster=\"api-test\"} 12"));
    assert!(metrics_text.contains("scaling_bench_compute_nodes{cluster=\"api-test\"} 10"));
    assert!(metrics_text.contains("scaling_bench_scaling_duration_seconds_bucket"));
    assert!(metrics_text.contains("scaling_bench_scaling_duration_seconds_count"));
}

#[tokio::test]
async fn test_status_reports_current_phase() {
    let (app, state) = setup_test_app().await;

    state
        .tracker
        .set_phase(RunPhase::ScalingUp, Some(2000))
        .await;
    state.tracker.record_result(result(1000)).await;

    let (status, body) = get(app, "/api/v1/status").await;
    assert_eq!(status, StatusCode::OK);

    let run: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(run["phase"], "scaling_up");
    assert_eq!(run["scaling_target"], 2000);
    assert_eq!(run["completed_targets"], serde_json::json!([1000]));
}

#[tokio::test]
async fn test_results_use_report_keys() {
    let (app, state) = setup_test_app().await;

    state.tracker.record_result(result(1000)).await;
    state
        .tracker
        .set_assertion_failures(&[AssertionFailure {
            scaling_target: 1000,
            check: "scale_up_time_scheduler".to_string(),
            expected: "<= 400".to_string(),
            actual: "410".to_string(),
        }])
        .await;

    let (status, body) = get(app, "/api/v1/results").await;
    assert_eq!(status, StatusCode::OK);

    let results: serde_json::Value = serde_json::from_slice(&body).unwrap();
    let first = &results["results"][0];
    assert_eq!(first["ScalingTarget"], 1000);
    assert_eq!(first["ScaleUpTimeEC2"], 290);
    assert_eq!(first["OS"], "alinux2");
    assert_eq!(first["ScalingStrategy"], "best-effort");
    assert_eq!(results["assertion_failures"][0]["actual"], "410");
}
