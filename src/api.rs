use std::path::PathBuf;
use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::{Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::aggregate::{Aggregator, DEFAULT_THRESHOLD};
use crate::config::ServiceConfig;
use crate::dataset;
use crate::error::AppError;
use crate::interventions::{
    InterventionLog, InterventionRequest, StudentContext, DEFAULT_LIST_LIMIT,
};
use crate::models::{AtRiskStudent, DistrictStats, Intervention, StudentRisk};

#[derive(Clone)]
pub struct AppState {
    pub aggregator: Arc<RwLock<Aggregator>>,
    pub interventions: Arc<Mutex<InterventionLog>>,
    pub metrics_path: Arc<PathBuf>,
}

impl AppState {
    pub fn new(aggregator: Aggregator, metrics_path: PathBuf) -> Self {
        Self {
            aggregator: Arc::new(RwLock::new(aggregator)),
            interventions: Arc::new(Mutex::new(InterventionLog::new())),
            metrics_path: Arc::new(metrics_path),
        }
    }

    /// Loads the dataset and derives every assessment once.
    pub fn bootstrap(config: &ServiceConfig) -> Self {
        let records = dataset::load_or_fallback(&config.dataset_path);
        let aggregator = Aggregator::derive(records, &mut rand::thread_rng());
        let distribution = aggregator.risk_distribution();
        info!(
            students = aggregator.len(),
            high = distribution.high_risk,
            moderate = distribution.moderate_risk,
            low = distribution.low_risk,
            "risk assessments derived"
        );
        Self::new(aggregator, config.metrics_path.clone())
    }
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/students/:id/risk", get(student_risk))
        .route("/students/at-risk/all", get(at_risk_students))
        .route("/districts", get(list_districts))
        .route("/districts/:name/stats", get(district_stats))
        .route("/interventions", get(list_interventions).post(log_intervention))
        .route("/leap/field-update", post(leap_field_update))
        .route("/model/metrics", get(model_metrics))
        .route("/admin/rederive", post(rederive))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadInput(_) => StatusCode::BAD_REQUEST,
            AppError::UpstreamUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    students: usize,
    timestamp: DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let students = state.aggregator.read().await.len();
    Json(HealthResponse {
        status: "healthy",
        students,
        timestamp: Utc::now(),
    })
}

async fn student_risk(
    State(state): State<AppState>,
    Path(student_id): Path<String>,
) -> Result<Json<StudentRisk>, AppError> {
    let aggregator = state.aggregator.read().await;
    let risk = aggregator.student_risk(&student_id).map_err(|err| {
        warn!(student_id = %student_id, "risk lookup for unknown student");
        err
    })?;
    info!(
        student_id = %student_id,
        risk = %risk.risk,
        probability = risk.probability,
        "risk check"
    );
    Ok(Json(risk))
}

#[derive(Debug, Deserialize)]
struct AtRiskQuery {
    threshold: Option<String>,
}

#[derive(Debug, Serialize)]
struct AtRiskResponse {
    count: usize,
    total: usize,
    threshold: i64,
    students: Vec<AtRiskStudent>,
}

/// Reads the leading integer of `raw` (`"60.5"` and `"60abc"` give 60).
/// Anything without one gives the default.
fn parse_threshold(raw: Option<&str>) -> i64 {
    raw.and_then(|value| {
        let value = value.trim_start();
        let (sign, rest) = match value.strip_prefix('-') {
            Some(rest) => (-1, rest),
            None => (1, value.strip_prefix('+').unwrap_or(value)),
        };
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        rest[..digits_end].parse::<i64>().ok().map(|number| sign * number)
    })
    .unwrap_or(DEFAULT_THRESHOLD)
}

fn query_error(rejection: QueryRejection) -> AppError {
    AppError::bad_input(rejection.body_text())
}

async fn at_risk_students(
    State(state): State<AppState>,
    query: Result<Query<AtRiskQuery>, QueryRejection>,
) -> Result<Json<AtRiskResponse>, AppError> {
    let Query(query) = query.map_err(query_error)?;
    let threshold = parse_threshold(query.threshold.as_deref());
    let students = state.aggregator.read().await.list_at_risk(threshold);
    Ok(Json(AtRiskResponse {
        count: students.len(),
        total: students.len(),
        threshold,
        students,
    }))
}

async fn list_districts(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.aggregator.read().await.districts())
}

async fn district_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<DistrictStats>, AppError> {
    let stats = state.aggregator.read().await.district_stats(&name)?;
    Ok(Json(stats))
}

#[derive(Debug, Serialize)]
struct InterventionLogged {
    status: &'static str,
    intervention: Intervention,
    message: &'static str,
}

async fn log_intervention(
    State(state): State<AppState>,
    payload: Result<Json<InterventionRequest>, JsonRejection>,
) -> Result<Json<InterventionLogged>, AppError> {
    let Json(request) = payload.map_err(|rejection| AppError::bad_input(rejection.body_text()))?;

    let context = match request.student_id.as_deref() {
        Some(student_id) => {
            let aggregator = state.aggregator.read().await;
            aggregator
                .student_risk(student_id.trim())
                .map(|risk| StudentContext {
                    district: Some(risk.district),
                    probability: Some(risk.probability),
                })
                .unwrap_or_default()
        }
        None => StudentContext::default(),
    };

    let intervention = state.interventions.lock().await.append(request, context)?;
    info!(
        student_id = %intervention.student_id,
        action = %intervention.action,
        actioned_by = %intervention.actioned_by,
        "intervention logged"
    );

    Ok(Json(InterventionLogged {
        status: "success",
        intervention,
        message: "Intervention recorded successfully. Community and parents will be notified.",
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InterventionsQuery {
    student_id: Option<String>,
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct InterventionsResponse {
    total: usize,
    showing: usize,
    interventions: Vec<Intervention>,
}

async fn list_interventions(
    State(state): State<AppState>,
    query: Result<Query<InterventionsQuery>, QueryRejection>,
) -> Result<Json<InterventionsResponse>, AppError> {
    let Query(query) = query.map_err(query_error)?;
    let limit = match query.limit {
        None => DEFAULT_LIST_LIMIT,
        Some(0) => usize::MAX,
        Some(limit) => limit,
    };
    let log = state.interventions.lock().await;
    let interventions = log.recent(
        query.student_id.as_deref().filter(|id| !id.is_empty()),
        limit,
    );

    Ok(Json(InterventionsResponse {
        total: log.len(),
        showing: interventions.len(),
        interventions,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldUpdateRequest {
    student_id: Option<String>,
    field_data: Option<Value>,
    location: Option<Value>,
    officer_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FieldUpdateResponse {
    status: &'static str,
    message: &'static str,
    student_id: String,
    sync_timestamp: DateTime<Utc>,
}

async fn leap_field_update(
    payload: Result<Json<FieldUpdateRequest>, JsonRejection>,
) -> Result<Json<FieldUpdateResponse>, AppError> {
    let Json(update) = payload.map_err(|rejection| AppError::bad_input(rejection.body_text()))?;
    let student_id = update
        .student_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| AppError::bad_input("studentId is required"))?;

    info!(
        student_id = %student_id,
        officer_id = update.officer_id.as_deref().unwrap_or("unknown"),
        has_field_data = update.field_data.is_some(),
        has_location = update.location.is_some(),
        "field update received"
    );

    Ok(Json(FieldUpdateResponse {
        status: "success",
        message: "Field data synchronized with early warning system",
        student_id,
        sync_timestamp: Utc::now(),
    }))
}

async fn model_metrics(State(state): State<AppState>) -> Json<Value> {
    let (total, distribution) = {
        let aggregator = state.aggregator.read().await;
        (aggregator.len(), aggregator.risk_distribution())
    };
    Json(dataset::load_metrics(&state.metrics_path, total, distribution).await)
}

#[derive(Debug, Serialize)]
struct RederiveResponse {
    status: &'static str,
    students: usize,
}

async fn rederive(State(state): State<AppState>) -> Json<RederiveResponse> {
    let mut aggregator = state.aggregator.write().await;
    aggregator.rederive(&mut rand::thread_rng());
    info!(students = aggregator.len(), "risk probabilities re-derived");
    Json(RederiveResponse {
        status: "rederived",
        students: aggregator.len(),
    })
}
