use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::caller::CallerContext;
use crate::error::RoadmapError;
use crate::models::*;
use crate::service::RoadmapService;

// ============================================================
// Error Handling
// ============================================================

/// JSON body of every failed request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// Snake_case error tag, e.g. `not_ready`.
    pub error: String,
    pub message: String,
}

type ApiError = (StatusCode, Json<ErrorBody>);

/// Map an engine error to a status code and tagged body.
///
/// Storage failures are logged in full server-side; clients only see a
/// generic message so internal details do not leak.
fn api_error(e: RoadmapError) -> ApiError {
    let status = match &e {
        RoadmapError::NotReady(_) | RoadmapError::SessionClosed(_) => StatusCode::CONFLICT,
        RoadmapError::IncompleteAnswers(_) => StatusCode::UNPROCESSABLE_ENTITY,
        RoadmapError::NotFound { .. } => StatusCode::NOT_FOUND,
        RoadmapError::Generation(_) | RoadmapError::EvidenceUnavailable(_) => {
            StatusCode::BAD_GATEWAY
        }
        RoadmapError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let message = match &e {
        RoadmapError::Storage(inner) => {
            tracing::error!("Internal error: {:#}", inner);
            "Internal server error".to_string()
        }
        other => {
            tracing::warn!(error = other.tag(), "Request failed: {}", other);
            other.to_string()
        }
    };

    (
        status,
        Json(ErrorBody {
            error: e.tag().to_string(),
            message,
        }),
    )
}

// ============================================================
// Health
// ============================================================

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ============================================================
// Ideas & Projects
// ============================================================

pub async fn suggest_idea(
    State(service): State<RoadmapService>,
    Json(input): Json<SuggestIdeaInput>,
) -> Result<Json<ProjectIdea>, ApiError> {
    service
        .suggest_idea(input.level)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn list_projects(
    State(service): State<RoadmapService>,
) -> Result<Json<Vec<Project>>, ApiError> {
    service.list_projects().map(Json).map_err(api_error)
}

pub async fn create_project(
    State(service): State<RoadmapService>,
    Json(input): Json<CreateProjectInput>,
) -> Result<(StatusCode, Json<Project>), ApiError> {
    service
        .create_project(input)
        .map(|p| (StatusCode::CREATED, Json(p)))
        .map_err(api_error)
}

pub async fn get_project(
    State(service): State<RoadmapService>,
    Path(id): Path<Uuid>,
) -> Result<Json<Project>, ApiError> {
    service.get_project(id).map(Json).map_err(api_error)
}

pub async fn link_repository(
    State(service): State<RoadmapService>,
    Path(id): Path<Uuid>,
    Json(input): Json<LinkRepositoryInput>,
) -> Result<Json<Project>, ApiError> {
    service
        .link_repository(id, input.repository)
        .map(Json)
        .map_err(api_error)
}

// ============================================================
// Refinement
// ============================================================

pub async fn start_refinement(
    State(service): State<RoadmapService>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<RefinementSession>, ApiError> {
    service
        .start_refinement(project_id)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn get_refinement(
    State(service): State<RoadmapService>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<RefinementSession>, ApiError> {
    service
        .get_refinement(project_id)
        .map(Json)
        .map_err(api_error)
}

pub async fn submit_answers(
    State(service): State<RoadmapService>,
    Path(project_id): Path<Uuid>,
    Json(input): Json<SubmitAnswersInput>,
) -> Result<Json<RefinementSession>, ApiError> {
    service
        .submit_answers(project_id, input.answers)
        .map(Json)
        .map_err(api_error)
}

// ============================================================
// Roadmap
// ============================================================

pub async fn generate_roadmap(
    State(service): State<RoadmapService>,
    Path(project_id): Path<Uuid>,
    Json(input): Json<GenerateRoadmapInput>,
) -> Result<(StatusCode, Json<RoadmapStatus>), ApiError> {
    service
        .generate_roadmap(project_id, input.regenerate)
        .await
        .map(|status| (StatusCode::CREATED, Json(status)))
        .map_err(api_error)
}

pub async fn get_status(
    State(service): State<RoadmapService>,
    Path(project_id): Path<Uuid>,
) -> Result<Json<RoadmapStatus>, ApiError> {
    service.get_status(project_id).map(Json).map_err(api_error)
}

// ============================================================
// Tasks
// ============================================================

pub async fn complete_task(
    State(service): State<RoadmapService>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskCompletion>, ApiError> {
    service.complete_task(task_id).map(Json).map_err(api_error)
}

pub async fn check_progress(
    State(service): State<RoadmapService>,
    Path(task_id): Path<Uuid>,
    caller: CallerContext,
) -> Result<Json<ProgressReport>, ApiError> {
    service
        .check_progress(task_id, &caller)
        .await
        .map(Json)
        .map_err(api_error)
}

pub async fn get_help(
    State(service): State<RoadmapService>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<TaskHelp>, ApiError> {
    service.get_help(task_id).await.map(Json).map_err(api_error)
}
