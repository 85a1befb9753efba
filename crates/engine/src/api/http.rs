//! HTTP routes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use studio_domain::{
    score_consistency, CharacterDna, ConsistencyReport, DomainError, GenerationRequest, PanelSide,
    PanelSlots, ProjectId, PromptId, SlotPosition,
};
use studio_shared::{
    ActivateProjectRequest, BatchSubmitted, ConsistencyRequest, ErrorCode, ErrorResponse,
    GenerationView, HydratePanelsRequest, PanelsView, SaveToPanelRequest, SaveToPanelResponse,
    SavedImageView, SubmitBatchRequest,
};

use crate::app::App;
use crate::infrastructure::persisted_store::Observed;
use crate::use_cases::generation::{GenerationError, PromptSubmission};
use crate::use_cases::panels::{AllocationRejection, PanelError};

/// Create all HTTP routes.
pub fn routes() -> Router<Arc<App>> {
    Router::new()
        .route("/", get(health))
        .route("/api/health", get(health))
        .route(
            "/api/generations",
            get(list_generations)
                .post(submit_generations)
                .delete(clear_generations),
        )
        .route("/api/panels", get(get_panels).put(hydrate_panels))
        .route("/api/panels/save", post(save_to_panel))
        .route("/api/panels/{side}/{index}", delete(remove_from_panel))
        .route("/api/projects/{id}/activate", post(activate_project))
        .route("/api/characters/consistency", post(score_character))
}

#[derive(serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthStatus {
    status: &'static str,
    provider: &'static str,
}

async fn health(State(app): State<Arc<App>>) -> Json<HealthStatus> {
    let provider = match app.image_gen.check_health().await {
        Ok(true) => "up",
        Ok(false) => "down",
        Err(e) => {
            tracing::debug!(error = %e, "Provider health check failed");
            "down"
        }
    };
    Json(HealthStatus {
        status: "ok",
        provider,
    })
}

// =============================================================================
// Generations
// =============================================================================

async fn submit_generations(
    State(app): State<Arc<App>>,
    Json(body): Json<SubmitBatchRequest>,
) -> Result<Json<BatchSubmitted>, ApiError> {
    if let Some(blank) = body.prompts.iter().find(|p| p.id.trim().is_empty()) {
        return Err(ApiError::BadRequest(format!(
            "Prompt '{}' has an empty id",
            blank.text
        )));
    }

    let prompts = body
        .prompts
        .into_iter()
        .map(|p| PromptSubmission::new(p.id, p.text))
        .collect();
    let batch_id = app.use_cases.generation.registry.submit(prompts).await?;

    let generations = generation_views(&app, app.use_cases.generation.registry.list().await).await;
    Ok(Json(BatchSubmitted {
        batch_id: batch_id.to_uuid(),
        generations,
    }))
}

async fn list_generations(State(app): State<Arc<App>>) -> Json<Vec<GenerationView>> {
    let entries = app.use_cases.generation.registry.list().await;
    Json(generation_views(&app, entries).await)
}

async fn clear_generations(State(app): State<Arc<App>>) -> StatusCode {
    let registry = &app.use_cases.generation.registry;
    if let Some(batch_id) = registry.current_batch().await {
        tracing::info!(batch_id = %batch_id, "Clearing generation batch");
    }
    registry.clear().await;
    StatusCode::NO_CONTENT
}

async fn generation_views(app: &App, entries: Vec<GenerationRequest>) -> Vec<GenerationView> {
    let mut views = Vec::with_capacity(entries.len());
    for entry in &entries {
        let saved = match entry.url() {
            Some(url) => {
                app.use_cases
                    .panels
                    .allocator
                    .is_saved(&entry.prompt_id, url)
                    .await
            }
            None => false,
        };
        views.push(GenerationView::from_request(entry, saved));
    }
    views
}

// =============================================================================
// Panels
// =============================================================================

async fn get_panels(State(app): State<Arc<App>>) -> Json<PanelsView> {
    let observed = app.use_cases.panels.snapshot();
    Json(panels_view(&app, &observed).await)
}

async fn save_to_panel(
    State(app): State<Arc<App>>,
    Json(body): Json<SaveToPanelRequest>,
) -> Result<Json<SaveToPanelResponse>, ApiError> {
    let placement = app
        .use_cases
        .panels
        .save(PromptId::new(body.prompt_id), body.prompt_text)
        .await?;
    Ok(Json(SaveToPanelResponse {
        position: placement.position,
        image: SavedImageView::from(&placement.image),
    }))
}

async fn hydrate_panels(
    State(app): State<Arc<App>>,
    Json(body): Json<HydratePanelsRequest>,
) -> Result<Json<PanelsView>, ApiError> {
    let observed = app.use_cases.panels.hydrate(body.panels).await?;
    Ok(Json(panels_view(&app, &observed).await))
}

async fn remove_from_panel(
    State(app): State<Arc<App>>,
    Path((side, index)): Path<(String, usize)>,
) -> Result<Json<SavedImageView>, ApiError> {
    let side: PanelSide = side.parse()?;
    let removed = app
        .use_cases
        .panels
        .remove(SlotPosition::new(side, index))
        .await?;
    Ok(Json(SavedImageView::from(&removed)))
}

async fn activate_project(
    State(app): State<Arc<App>>,
    Path(id): Path<Uuid>,
    Json(body): Json<ActivateProjectRequest>,
) -> Result<Json<PanelsView>, ApiError> {
    let observed = app
        .use_cases
        .panels
        .switch_project(ProjectId::from_uuid(id), body.carry_over)
        .await?;
    Ok(Json(panels_view(&app, &observed).await))
}

async fn panels_view(app: &App, observed: &Observed<PanelSlots>) -> PanelsView {
    let side = |side: PanelSide| -> Vec<Option<SavedImageView>> {
        observed
            .data
            .slots(side)
            .iter()
            .map(|slot| slot.as_ref().map(SavedImageView::from))
            .collect()
    };
    PanelsView {
        project_id: app.use_cases.panels.allocator.project_id().await.to_string(),
        loaded: observed.loaded,
        left: side(PanelSide::Left),
        right: side(PanelSide::Right),
    }
}

// =============================================================================
// Character consistency
// =============================================================================

async fn score_character(
    Json(body): Json<ConsistencyRequest>,
) -> Result<Json<ConsistencyReport>, ApiError> {
    let dna = CharacterDna::derive(body.character_name, &body.references, body.trait_weights)?;
    let report = score_consistency(&dna, &body.candidate, &body.observations)?;
    Ok(Json(report))
}

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict { code: ErrorCode, message: String },
    Internal(String),
}

impl axum::response::IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new(ErrorCode::NotFound, msg),
            ),
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::new(ErrorCode::BadRequest, msg),
            ),
            ApiError::Conflict { code, message } => {
                (StatusCode::CONFLICT, ErrorResponse::new(code, message))
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new(ErrorCode::InternalError, "Internal error"),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(e: DomainError) -> Self {
        let message = e.to_string();
        match e {
            DomainError::NotFound { .. } => ApiError::NotFound(message),
            _ => ApiError::BadRequest(message),
        }
    }
}

impl From<GenerationError> for ApiError {
    fn from(e: GenerationError) -> Self {
        match e {
            GenerationError::EmptyBatch => ApiError::BadRequest(e.to_string()),
        }
    }
}

impl From<AllocationRejection> for ApiError {
    fn from(e: AllocationRejection) -> Self {
        let code = match e {
            AllocationRejection::NotLoaded => ErrorCode::NotReady,
            AllocationRejection::NotFound(_) => ErrorCode::NotFound,
            AllocationRejection::NotComplete(_)
            | AllocationRejection::AlreadySaved { .. }
            | AllocationRejection::NoEmptySlots => ErrorCode::Conflict,
        };
        ApiError::Conflict {
            code,
            message: e.to_string(),
        }
    }
}

impl From<PanelError> for ApiError {
    fn from(e: PanelError) -> Self {
        let message = e.to_string();
        match e {
            PanelError::NotLoaded => ApiError::Conflict {
                code: ErrorCode::NotReady,
                message,
            },
            PanelError::SlotEmpty(_) => ApiError::NotFound(message),
            PanelError::Validation(domain) => domain.into(),
            PanelError::Repo(repo) => ApiError::Internal(repo.to_string()),
        }
    }
}
