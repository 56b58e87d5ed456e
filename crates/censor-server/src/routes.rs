//! HTTP routes and handlers

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use censor_client::{
    CompletionSource, DecisionInput, QueryResult, SubmitBatchInput, SubmitBatchResult,
    SubmitFieldsInput, SubmitFieldsResult, SubmitInput, SubmitResult,
};
use censor_core::{
    BizContext, BizType, CensorBinding, CensorBindingHistory, Decision, Error, HistorySource,
    Reason, ReplacePolicy, Resource, ViolationSnapshot,
};
use censor_policy::UnifiedScene;
use censor_providers::{ManualResult, ManualTask, Provider};
use censor_store::Store;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, error, warn};

use crate::state::AppState;

const DEFAULT_LIST_LIMIT: usize = 20;

pub fn create_router(state: AppState) -> Router {
    let body_limit = state.body_limit_bytes;

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics))
        .route("/v1/reviews", post(submit_review))
        .route("/v1/reviews/:id", get(query_review))
        .route("/v1/fields", post(submit_fields))
        .route("/v1/batch", post(submit_batch))
        .route("/v1/callbacks/:provider", post(provider_callback))
        .route("/v1/bindings/:biz_type/:biz_id", get(list_bindings))
        .route(
            "/v1/bindings/:biz_type/:biz_id/:field/history",
            get(binding_history),
        )
        .route(
            "/v1/bindings/:biz_type/:biz_id/:field/decision",
            post(apply_decision),
        )
        .route("/v1/violations/:biz_type/:biz_id", get(list_violations))
        .route("/v1/snapshots/:id", get(get_snapshot))
        .route("/v1/manual/tasks", get(manual_tasks))
        .route("/v1/manual/tasks/:id/result", post(manual_result))
        .fallback(fallback)
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn metrics(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

/// Body of `POST /v1/reviews`
#[derive(Debug, Deserialize)]
struct ReviewRequest {
    biz: BizContext,
    resources: Vec<Resource>,
    #[serde(default)]
    scenes: Vec<UnifiedScene>,
    #[serde(default)]
    enable_text_merge: bool,
    #[serde(default)]
    priority: Option<i32>,
}

impl From<ReviewRequest> for SubmitInput {
    fn from(req: ReviewRequest) -> Self {
        let mut input = SubmitInput::new(req.biz, req.resources).with_scenes(req.scenes);
        input.enable_text_merge = req.enable_text_merge;
        input.priority = req.priority;
        input
    }
}

async fn submit_review(
    State(state): State<AppState>,
    Json(req): Json<ReviewRequest>,
) -> Result<Json<SubmitResult>, AppError> {
    let result = state.client.submit(req.into()).await?;
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
struct ReviewQuery {
    resource_review_id: Option<String>,
}

async fn query_review(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<ReviewQuery>,
) -> Result<Json<QueryResult>, AppError> {
    let result = state
        .client
        .query(&id, params.resource_review_id.as_deref())
        .await?;
    Ok(Json(result))
}

async fn submit_fields(
    State(state): State<AppState>,
    Json(input): Json<SubmitFieldsInput>,
) -> Result<Json<SubmitFieldsResult>, AppError> {
    Ok(Json(state.client.submit_fields(input).await?))
}

async fn submit_batch(
    State(state): State<AppState>,
    Json(input): Json<SubmitBatchInput>,
) -> Result<Json<SubmitBatchResult>, AppError> {
    Ok(Json(state.client.submit_batch(input).await?))
}

async fn provider_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, AppError> {
    // Providers sign with mixed-case header names
    let headers: HashMap<String, String> = headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
        })
        .collect();

    match state.client.handle_callback(&provider, &headers, &body).await {
        Ok(()) => {
            metrics::counter!("censor_callbacks_total", "provider" => provider.clone(), "outcome" => "ok")
                .increment(1);
            Ok(Json(json!({ "status": "ok" })))
        }
        Err(e) => {
            metrics::counter!("censor_callbacks_total", "provider" => provider.clone(), "outcome" => "error")
                .increment(1);
            warn!(provider = %provider, error = %e, "Callback rejected");
            Err(e.into())
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<usize>,
}

impl ListQuery {
    fn limit(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT)
    }
}

async fn list_bindings(
    State(state): State<AppState>,
    Path((biz_type, biz_id)): Path<(String, String)>,
) -> Result<Json<Vec<CensorBinding>>, AppError> {
    let bindings = state
        .client
        .get_bindings(&BizType::new(biz_type), &biz_id)
        .await?;
    Ok(Json(bindings))
}

async fn binding_history(
    State(state): State<AppState>,
    Path((biz_type, biz_id, field)): Path<(String, String, String)>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<CensorBindingHistory>>, AppError> {
    let history = state
        .client
        .get_binding_history(&BizType::new(biz_type), &biz_id, &field, params.limit())
        .await?;
    Ok(Json(history))
}

/// Body of `POST /v1/bindings/:biz_type/:biz_id/:field/decision`
#[derive(Debug, Deserialize)]
struct DecisionRequest {
    decision: Decision,
    source: HistorySource,
    #[serde(default)]
    replace_policy: ReplacePolicy,
    #[serde(default)]
    replace_value: String,
    #[serde(default)]
    reviewer_id: String,
    #[serde(default)]
    comment: String,
    #[serde(default)]
    reasons: Vec<Reason>,
}

async fn apply_decision(
    State(state): State<AppState>,
    Path((biz_type, biz_id, field)): Path<(String, String, String)>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<CensorBinding>, AppError> {
    if req.source == HistorySource::Auto {
        return Err(AppError::InvalidRequest(
            "automatic decisions come from the review pipeline".to_string(),
        ));
    }

    let binding = state
        .client
        .apply_decision(DecisionInput {
            biz_type: BizType::new(biz_type),
            biz_id,
            field,
            decision: req.decision,
            replace_policy: req.replace_policy,
            replace_value: req.replace_value,
            source: req.source,
            reviewer_id: req.reviewer_id,
            comment: req.comment,
            reasons: req.reasons,
        })
        .await?;
    Ok(Json(binding))
}

async fn list_violations(
    State(state): State<AppState>,
    Path((biz_type, biz_id)): Path<(String, String)>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<ViolationSnapshot>>, AppError> {
    let violations = state
        .client
        .list_violations(&BizType::new(biz_type), &biz_id, params.limit())
        .await?;
    Ok(Json(violations))
}

async fn get_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ViolationSnapshot>, AppError> {
    state
        .client
        .get_violation_snapshot(&id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("violation snapshot {}", id)))
}

async fn manual_tasks(
    State(state): State<AppState>,
    Query(params): Query<ListQuery>,
) -> Result<Json<Vec<ManualTask>>, AppError> {
    let manual = state.manual.as_ref().ok_or_else(manual_not_configured)?;
    Ok(Json(manual.pending_tasks(params.limit()).await?))
}

/// Record a reviewer's verdict and fold it into the review right away
/// instead of waiting for the next poll.
async fn manual_result(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(result): Json<ManualResult>,
) -> Result<Json<Value>, AppError> {
    let manual = state.manual.as_ref().ok_or_else(manual_not_configured)?;
    manual.submit_result(&task_id, result).await?;

    let response = manual.query(&task_id).await?;
    let completed = match state
        .client
        .store()
        .get_provider_task_by_remote_id(manual.name(), &task_id)
        .await?
    {
        Some(task) => {
            state
                .client
                .complete_provider_task(
                    &task,
                    response.done,
                    response.result,
                    &response.raw,
                    CompletionSource::Callback,
                )
                .await?
        }
        None => false,
    };
    debug!(task_id = %task_id, completed, "Manual result recorded");

    Ok(Json(json!({ "task_id": task_id, "completed": completed })))
}

fn manual_not_configured() -> AppError {
    AppError::NotFound("manual review is not configured".to_string())
}

async fn fallback() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": {
                "message": "Not found",
                "type": "not_found_error",
            }
        })),
    )
}

/// Handler error rendered as `{"error": {"message", "type"}}`
#[derive(Debug)]
pub enum AppError {
    InvalidRequest(String),
    NotFound(String),
    Censor(Error),
}

impl From<Error> for AppError {
    fn from(err: Error) -> Self {
        AppError::Censor(err)
    }
}

fn classify(err: &Error) -> (StatusCode, &'static str) {
    match err {
        Error::NoResources
        | Error::InvalidResource(_)
        | Error::UnsupportedType(_)
        | Error::Validation(_)
        | Error::Serialization(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
        Error::ContentTooLarge => (StatusCode::PAYLOAD_TOO_LARGE, "invalid_request_error"),
        Error::ProviderNotFound(_) | Error::TaskNotFound(_) => {
            (StatusCode::NOT_FOUND, "not_found_error")
        }
        Error::CallbackInvalid(_) | Error::Auth { .. } => {
            (StatusCode::UNAUTHORIZED, "authentication_error")
        }
        Error::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limit_error"),
        Error::Timeout => (StatusCode::GATEWAY_TIMEOUT, "timeout_error"),
        Error::DuplicateSubmit | Error::RevisionConflict => (StatusCode::CONFLICT, "conflict_error"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, "invalid_request_error", msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found_error", msg),
            AppError::Censor(err) => {
                let (status, error_type) = classify(&err);
                if status.is_server_error() {
                    error!(error = %err, "Request failed");
                }
                (status, error_type, err.to_string())
            }
        };

        let body = json!({
            "error": {
                "message": message,
                "type": error_type,
            }
        });

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CensorConfig;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use censor_core::RiskLevel;
    use censor_policy::{Domain, LabelMapping};
    use censor_providers::{KeywordConfig, ManualConfig};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    fn test_config() -> CensorConfig {
        let mut config = CensorConfig::default();
        config.keyword = Some(
            KeywordConfig::default()
                .with_rule("spam", "ads")
                .with_label("ads", LabelMapping::new(Domain::Ads, RiskLevel::High)),
        );
        config.resilience.enabled = false;
        config.apply_defaults();
        config
    }

    fn app_with(config: CensorConfig) -> (Router, AppState) {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let state = AppState::new(config, handle).unwrap();
        (create_router(state.clone()), state)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(v) => {
                builder = builder.header("content-type", "application/json");
                Body::from(v.to_string())
            }
            None => Body::empty(),
        };
        let response = app.clone().oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    fn review_body(biz_id: &str, field: &str, text: &str) -> Value {
        json!({
            "biz": { "biz_type": "comment", "biz_id": biz_id, "field": field },
            "resources": [{ "resource_id": "r1", "type": "text", "content_text": text }]
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (app, _) = app_with(test_config());
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_submit_and_query_review() {
        let (app, _) = app_with(test_config());

        let (status, body) = send(&app, "POST", "/v1/reviews", Some(review_body("c1", "body", "buy spam"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["immediate_results"]["r1"]["decision"], "block");
        assert_eq!(body["pending_async"], false);

        let id = body["biz_review_id"].as_str().unwrap().to_string();
        let (status, body) = send(&app, "GET", &format!("/v1/reviews/{}", id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["all_complete"], true);
        assert_eq!(body["final_outcome"]["decision"], "block");
    }

    #[tokio::test]
    async fn test_empty_submission_is_bad_request() {
        let (app, _) = app_with(test_config());
        let body = json!({ "biz": { "biz_type": "comment", "biz_id": "c1" }, "resources": [] });

        let (status, body) = send(&app, "POST", "/v1/reviews", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["type"], "invalid_request_error");
    }

    #[tokio::test]
    async fn test_unknown_review_is_not_found() {
        let (app, _) = app_with(test_config());
        let (status, body) = send(&app, "GET", "/v1/reviews/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["type"], "not_found_error");
    }

    #[tokio::test]
    async fn test_fields_and_batch() {
        let (app, _) = app_with(test_config());

        let fields = json!({
            "biz_type": "user_bio",
            "biz_id": "u1",
            "fields": [
                { "field": "name", "text": "alice" },
                { "field": "desc", "text": "selling spam here", "on_block": "hide" }
            ]
        });
        let (status, body) = send(&app, "POST", "/v1/fields", Some(fields)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["overall_decision"], "block");
        assert_eq!(body["field_results"][1]["final_value"], "");

        let batch = json!({
            "biz_type": "chat_message",
            "items": [
                { "biz_id": "m1", "text": "hello" },
                { "biz_id": "m2", "text": "spam spam" }
            ]
        });
        let (status, body) = send(&app, "POST", "/v1/batch", Some(batch)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["blocked_count"], 1);
        assert_eq!(body["passed_count"], 1);
    }

    #[tokio::test]
    async fn test_bindings_and_appeal() {
        let (app, _) = app_with(test_config());

        send(&app, "POST", "/v1/reviews", Some(review_body("c9", "body", "spam"))).await;

        let (status, body) = send(&app, "GET", "/v1/bindings/comment/c9", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["decision"], "block");

        let (status, body) = send(&app, "GET", "/v1/violations/comment/c9", None).await;
        assert_eq!(status, StatusCode::OK);
        let snapshot_id = body[0]["id"].as_str().unwrap().to_string();
        let (status, _) = send(&app, "GET", &format!("/v1/snapshots/{}", snapshot_id), None).await;
        assert_eq!(status, StatusCode::OK);

        let appeal = json!({ "decision": "pass", "source": "appeal", "reviewer_id": "ops1" });
        let (status, body) = send(&app, "POST", "/v1/bindings/comment/c9/body/decision", Some(appeal)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["decision"], "pass");

        let (status, body) = send(&app, "GET", "/v1/bindings/comment/c9/body/history?limit=10", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["source"], "appeal");
    }

    #[tokio::test]
    async fn test_auto_decision_rejected() {
        let (app, _) = app_with(test_config());
        let body = json!({ "decision": "pass", "source": "auto" });
        let (status, _) = send(&app, "POST", "/v1/bindings/comment/c1/body/decision", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_callback_for_unknown_provider() {
        let (app, _) = app_with(test_config());
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/callbacks/nobody")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_manual_review_round_trip() {
        let mut config = test_config();
        config.manual = Some(ManualConfig::default());
        config.client.pipeline.primary = censor_providers::manual::PROVIDER_NAME.to_string();
        let (app, state) = app_with(config);

        let (status, body) = send(&app, "POST", "/v1/reviews", Some(review_body("c5", "body", "anything"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pending_async"], true);
        let review_id = body["biz_review_id"].as_str().unwrap().to_string();

        let (status, tasks) = send(&app, "GET", "/v1/manual/tasks", None).await;
        assert_eq!(status, StatusCode::OK);
        let task_id = tasks[0]["task_id"].as_str().unwrap().to_string();

        let verdict = json!({ "decision": "block", "reviewer_id": "r1" });
        let (status, body) = send(&app, "POST", &format!("/v1/manual/tasks/{}/result", task_id), Some(verdict)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["completed"], true);

        let (_, body) = send(&app, "GET", &format!("/v1/reviews/{}", review_id), None).await;
        assert_eq!(body["all_complete"], true);
        assert_eq!(body["final_outcome"]["decision"], "block");

        // Already complete; the poller finds nothing new
        let stats = state.poller.poll_now().await.unwrap();
        assert_eq!(stats.completed, 0);
    }

    #[tokio::test]
    async fn test_manual_routes_without_manual_provider() {
        let (app, _) = app_with(test_config());
        let (status, _) = send(&app, "GET", "/v1/manual/tasks", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_fallback() {
        let (app, _) = app_with(test_config());
        let (status, body) = send(&app, "GET", "/nowhere", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["message"], "Not found");
    }

    #[test]
    fn test_error_classification() {
        assert_eq!(classify(&Error::NoResources).0, StatusCode::BAD_REQUEST);
        assert_eq!(classify(&Error::task_not_found("x")).0, StatusCode::NOT_FOUND);
        assert_eq!(classify(&Error::RateLimited).0, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(classify(&Error::RevisionConflict).0, StatusCode::CONFLICT);
        assert_eq!(classify(&Error::internal("boom")).0, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
