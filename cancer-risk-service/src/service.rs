use axum::{
    Router,
    extract::{State, rejection::JsonRejection},
    http::{Method, StatusCode, header},
    response::Json,
    routing::{get, post},
};
use evidence_rag::{AnalysisReport, PipelineConfig, PipelineError, RiskPipeline, RiskProfile};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{AnalyzeRequest, ErrorResponse};

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn error_response(status: StatusCode, message: &str, invocation_id: Option<&str>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.to_string(),
            invocation_id: invocation_id.map(str::to_string),
        }),
    )
}

fn bad_request_error(message: &str) -> ApiError {
    error_response(StatusCode::BAD_REQUEST, message, None)
}

/// Maps each pipeline failure to its own status so clients can tell
/// "not enough literature" apart from an inference outage or a bad model reply.
fn pipeline_error(err: &PipelineError, invocation_id: &str) -> ApiError {
    match err {
        PipelineError::InsufficientEvidence => error_response(
            StatusCode::BAD_GATEWAY,
            "No abstracts could be retrieved from PubMed",
            Some(invocation_id),
        ),
        PipelineError::SynthesisService(_) => error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "Inference service is unavailable",
            Some(invocation_id),
        ),
        PipelineError::SynthesisFormat { .. } => error_response(
            StatusCode::BAD_GATEWAY,
            "Inference service returned an invalid report",
            Some(invocation_id),
        ),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<RiskPipeline>,
}

pub fn create_app(config: &PipelineConfig) -> Router {
    let app_state = AppState {
        pipeline: Arc::new(RiskPipeline::from_config(config)),
    };
    build_router(app_state)
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/analyze", post(analyze))
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Cancer Risk Analysis Service",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Evidence-grounded cancer risk correlations from PubMed abstracts",
        "endpoints": {
            "POST /analyze": "Analyze a risk profile sent as {\"userData\": {...}}",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn analyze(
    State(state): State<AppState>,
    payload: Result<Json<AnalyzeRequest>, JsonRejection>,
) -> ApiResult<AnalysisReport> {
    let Json(request) = payload.map_err(|e| {
        warn!("Rejected analysis request body: {}", e);
        bad_request_error(&format!("Invalid request body: {}", e.body_text()))
    })?;

    let profile = parse_profile(request.user_data)?;
    let invocation_id = Uuid::new_v4().to_string();
    info!(invocation_id = %invocation_id, "Received analysis request");

    match state.pipeline.run(&profile, &invocation_id).await {
        Ok(report) => {
            info!(
                invocation_id = %invocation_id,
                insights = report.insights.len(),
                "Analysis completed"
            );
            Ok(Json(report))
        }
        Err(e) => {
            error!(invocation_id = %invocation_id, "Analysis failed: {}", e);
            Err(pipeline_error(&e, &invocation_id))
        }
    }
}

fn parse_profile(user_data: Option<Value>) -> Result<RiskProfile, ApiError> {
    match user_data {
        Some(Value::Object(fields)) if !fields.is_empty() => {
            serde_json::from_value(Value::Object(fields))
                .map_err(|e| bad_request_error(&format!("Invalid userData: {}", e)))
        }
        Some(Value::Object(_)) | Some(Value::Null) | None => {
            Err(bad_request_error("userData is required"))
        }
        Some(_) => Err(bad_request_error("userData must be an object")),
    }
}
