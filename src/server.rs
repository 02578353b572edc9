//! HTTP API: liveness, pipeline run ingestion and the Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;

use crate::error::MalformedEventError;
use crate::metrics::MetricsRegistry;
use crate::tekton::{PipelineRunEvent, RunStatus};

pub fn router(registry: MetricsRegistry) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/v1/metrics/pipelinerun", post(process_pipelinerun))
        .route("/metrics", get(render_metrics))
        .with_state(registry)
}

async fn ping() -> &'static str {
    "pong"
}

#[derive(Debug, Serialize)]
struct PipelineRunResponse {
    status: RunStatus,
    pipeline: String,
    pipelinerun_name: String,
    duration: f64,
    namespace: String,
}

async fn process_pipelinerun(
    State(registry): State<MetricsRegistry>,
    Json(event): Json<PipelineRunEvent>,
) -> Result<Json<PipelineRunResponse>, ApiError> {
    let run = event.interpret()?;
    registry.record_pipeline_run(&run);
    tracing::debug!(
        pipeline = %run.pipeline_name,
        pipelinerun = %run.run_name,
        namespace = %run.namespace,
        status = run.status.as_str(),
        duration = run.duration_seconds,
        "pipeline run recorded"
    );

    Ok(Json(PipelineRunResponse {
        status: run.status,
        pipeline: run.pipeline_name,
        pipelinerun_name: run.run_name,
        duration: run.duration_seconds,
        namespace: run.namespace,
    }))
}

async fn render_metrics(State(registry): State<MetricsRegistry>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        registry.render(),
    )
}

/// Request failure returned as `{"error": "..."}`.
#[derive(Debug)]
pub struct ApiError(MalformedEventError);

impl From<MalformedEventError> for ApiError {
    fn from(err: MalformedEventError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::warn!(err = %self.0, "rejected pipeline run event");
        let body = serde_json::json!({ "error": self.0.to_string() });
        (StatusCode::BAD_REQUEST, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{sample, PIPELINERUN_COUNTER};
    use axum::body::{self, Body};
    use axum::http::Request;
    use serde_json::{json, Value};
    use tower::ServiceExt; // for `oneshot`

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let resp = app.clone().oneshot(request).await.unwrap();
        let status = resp.status();
        let body = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn post_json(payload: &Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/metrics/pipelinerun")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_ping() {
        let app = router(MetricsRegistry::new().unwrap());

        let (status, body) = send(&app, get_request("/ping")).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"pong");
    }

    #[tokio::test]
    async fn test_completed_pipelinerun_is_recorded() {
        let registry = MetricsRegistry::new().unwrap();
        let app = router(registry.clone());
        let payload = json!({
            "metadata": {
                "name": "build-run-1",
                "namespace": "ci",
                "labels": { "tekton.dev/pipeline": "build" }
            },
            "status": {
                "startTime": "2024-01-01T00:00:00Z",
                "completionTime": "2024-01-01T00:05:00Z",
                "conditions": [{ "status": "True" }]
            }
        });

        let (status, body) = send(&app, post_json(&payload)).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            body,
            json!({
                "status": "success",
                "pipeline": "build",
                "pipelinerun_name": "build-run-1",
                "duration": 300.0,
                "namespace": "ci"
            })
        );

        let (status, body) = send(&app, get_request("/metrics")).await;
        assert_eq!(status, StatusCode::OK);
        let out = String::from_utf8(body).unwrap();
        let labels = [("pipeline", "build"), ("status", "success"), ("namespace", "ci")];
        assert_eq!(sample(&out, PIPELINERUN_COUNTER, &labels), Some(1.0));
        assert_eq!(sample(&out, "isv_pipelinerun_duration_seconds_sum", &labels), Some(300.0));
        assert_eq!(sample(&out, "isv_pipelinerun_duration_seconds_count", &labels), Some(1.0));
    }

    #[tokio::test]
    async fn test_missing_start_time_is_rejected() {
        let registry = MetricsRegistry::new().unwrap();
        let app = router(registry.clone());
        let payload = json!({
            "metadata": {
                "name": "build-run-2",
                "namespace": "ci",
                "labels": { "tekton.dev/pipeline": "build" }
            },
            "status": { "conditions": [] }
        });

        let (status, body) = send(&app, post_json(&payload)).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert!(body["error"].as_str().unwrap().contains("startTime"));
        assert!(!registry.render().contains("isv_pipelinerun_counter{"));
    }

    #[tokio::test]
    async fn test_null_conditions_are_unknown() {
        let registry = MetricsRegistry::new().unwrap();
        let app = router(registry.clone());
        let payload = json!({
            "metadata": {
                "name": "build-run-3",
                "namespace": "ci",
                "labels": { "tekton.dev/pipeline": "build" }
            },
            "status": {
                "startTime": "2024-01-01T00:00:00Z",
                "completionTime": null,
                "conditions": null
            }
        });

        let (status, body) = send(&app, post_json(&payload)).await;

        assert_eq!(status, StatusCode::OK);
        let body: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["status"], "unknown");
        let labels = [("pipeline", "build"), ("status", "unknown"), ("namespace", "ci")];
        assert_eq!(sample(&registry.render(), PIPELINERUN_COUNTER, &labels), Some(1.0));
    }

    #[tokio::test]
    async fn test_non_json_body_is_rejected() {
        let app = router(MetricsRegistry::new().unwrap());
        let request = Request::builder()
            .method("POST")
            .uri("/v1/metrics/pipelinerun")
            .header("content-type", "application/json")
            .body(Body::from("not json"))
            .unwrap();

        let (status, _) = send(&app, request).await;

        assert!(status.is_client_error());
    }
}
