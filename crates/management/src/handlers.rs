//! Axum REST handlers for the funnel builder API.

use crate::models::*;
use crate::store::ManagementStore;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use funnel_core::types::{AbTest, Funnel, FunnelTemplate, Lead};
use funnel_core::FunnelError;
use funnel_editor::experiment::TestEvaluation;
use funnel_editor::validation::ValidationIssue;
use funnel_editor::NextPage;
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

/// Shared management state.
#[derive(Clone)]
pub struct ManagementState {
    pub store: Arc<ManagementStore>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);
pub type ApiResult<T> = Result<Json<T>, ApiError>;

/// No authentication layer; every write is attributed to the editor user.
const EDITOR_USER: &str = "editor";

fn api_error(err: FunnelError) -> ApiError {
    let (status, code) = match &err {
        FunnelError::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
        FunnelError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed"),
        FunnelError::InvalidTransition { .. } => (StatusCode::CONFLICT, "invalid_transition"),
        _ => {
            error!(error = %err, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal")
        }
    };
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message: err.to_string(),
        }),
    )
}

// ─── Funnels ───────────────────────────────────────────────────────────────

pub async fn list_funnels(State(state): State<ManagementState>) -> Json<Vec<FunnelSummary>> {
    Json(state.store.list_funnels())
}

pub async fn get_funnel(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Funnel> {
    state.store.get_funnel(id).map(Json).map_err(api_error)
}

pub async fn create_funnel(
    State(state): State<ManagementState>,
    Json(req): Json<CreateFunnelRequest>,
) -> (StatusCode, Json<Funnel>) {
    let funnel = state.store.create_funnel(req, EDITOR_USER);
    metrics::counter!("funnel.funnels.created").increment(1);
    (StatusCode::CREATED, Json(funnel))
}

pub async fn update_funnel(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateFunnelRequest>,
) -> ApiResult<Funnel> {
    let funnel = state.store.update_funnel(id, req, EDITOR_USER).map_err(api_error)?;
    metrics::counter!("funnel.funnels.saved").increment(1);
    Ok(Json(funnel))
}

pub async fn delete_funnel(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete_funnel(id, EDITOR_USER).map_err(api_error)?;
    metrics::counter!("funnel.funnels.deleted").increment(1);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn publish_funnel(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Funnel> {
    let funnel = state.store.publish_funnel(id, EDITOR_USER).map_err(api_error)?;
    metrics::counter!("funnel.funnels.published").increment(1);
    Ok(Json(funnel))
}

pub async fn archive_funnel(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Funnel> {
    let funnel = state.store.archive_funnel(id, EDITOR_USER).map_err(api_error)?;
    metrics::counter!("funnel.funnels.archived").increment(1);
    Ok(Json(funnel))
}

pub async fn validate_funnel(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<ValidationIssue>> {
    state.store.validate_funnel(id).map(Json).map_err(api_error)
}

pub async fn apply_actions(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EditFunnelRequest>,
) -> ApiResult<EditFunnelResponse> {
    let count = req.actions.len() as u64;
    let session = state.store.apply_edits(id, req, EDITOR_USER).map_err(api_error)?;
    metrics::counter!("funnel.editor.actions").increment(count);
    Ok(Json(EditFunnelResponse {
        funnel: session.funnel,
        current_page_id: session.current_page_id,
        selected_element_id: session.selected_element_id,
    }))
}

// ─── Runtime ───────────────────────────────────────────────────────────────

pub async fn next_page(
    State(state): State<ManagementState>,
    Path((id, page_id)): Path<(Uuid, String)>,
    Json(req): Json<RouteRequest>,
) -> ApiResult<NextPage> {
    state.store.route(id, &page_id, &req).map(Json).map_err(api_error)
}

pub async fn quiz_result(
    State(state): State<ManagementState>,
    Path((id, page_id, element_id)): Path<(Uuid, String, String)>,
    Json(req): Json<QuizResultRequest>,
) -> ApiResult<QuizResultResponse> {
    let resp = state
        .store
        .quiz_result(id, &page_id, &element_id, &req)
        .map_err(api_error)?;
    metrics::counter!("funnel.quiz.evaluated").increment(1);
    Ok(Json(resp))
}

pub async fn record_view(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PageViewRequest>,
) -> ApiResult<PageViewResponse> {
    let resp = state.store.record_page_view(id, &req).map_err(api_error)?;
    metrics::counter!("funnel.page.views").increment(1);
    Ok(Json(resp))
}

// ─── A/B Tests ─────────────────────────────────────────────────────────────

pub async fn create_ab_test(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateAbTestRequest>,
) -> Result<(StatusCode, Json<AbTest>), ApiError> {
    let test = state.store.create_ab_test(id, req).map_err(api_error)?;
    metrics::counter!("funnel.ab_tests.created").increment(1);
    Ok((StatusCode::CREATED, Json(test)))
}

pub async fn add_variant(
    State(state): State<ManagementState>,
    Path((id, test_id)): Path<(Uuid, String)>,
) -> ApiResult<AbTest> {
    state.store.add_variant(id, &test_id).map(Json).map_err(api_error)
}

pub async fn delete_variant(
    State(state): State<ManagementState>,
    Path((id, test_id, variant_id)): Path<(Uuid, String, String)>,
) -> ApiResult<AbTest> {
    state
        .store
        .delete_variant(id, &test_id, &variant_id)
        .map(Json)
        .map_err(api_error)
}

pub async fn set_allocation(
    State(state): State<ManagementState>,
    Path((id, test_id, variant_id)): Path<(Uuid, String, String)>,
    Json(req): Json<SetAllocationRequest>,
) -> ApiResult<AbTest> {
    state
        .store
        .set_allocation(id, &test_id, &variant_id, req.value)
        .map(Json)
        .map_err(api_error)
}

async fn transition(state: ManagementState, id: Uuid, test_id: String, command: TestCommand) -> ApiResult<AbTest> {
    state
        .store
        .transition_test(id, &test_id, command, EDITOR_USER)
        .map(Json)
        .map_err(api_error)
}

pub async fn start_ab_test(
    State(state): State<ManagementState>,
    Path((id, test_id)): Path<(Uuid, String)>,
) -> ApiResult<AbTest> {
    let test = transition(state, id, test_id, TestCommand::Start).await?;
    metrics::counter!("funnel.ab_tests.started").increment(1);
    Ok(test)
}

pub async fn pause_ab_test(
    State(state): State<ManagementState>,
    Path((id, test_id)): Path<(Uuid, String)>,
) -> ApiResult<AbTest> {
    transition(state, id, test_id, TestCommand::Pause).await
}

pub async fn resume_ab_test(
    State(state): State<ManagementState>,
    Path((id, test_id)): Path<(Uuid, String)>,
) -> ApiResult<AbTest> {
    transition(state, id, test_id, TestCommand::Resume).await
}

pub async fn complete_ab_test(
    State(state): State<ManagementState>,
    Path((id, test_id)): Path<(Uuid, String)>,
    Json(req): Json<CompleteTestRequest>,
) -> ApiResult<AbTest> {
    let test = transition(state, id, test_id, TestCommand::Complete { winner_id: req.winner_id }).await?;
    metrics::counter!("funnel.ab_tests.completed").increment(1);
    Ok(test)
}

pub async fn evaluate_ab_test(
    State(state): State<ManagementState>,
    Path((id, test_id)): Path<(Uuid, String)>,
) -> ApiResult<TestEvaluation> {
    state.store.evaluate_test(id, &test_id).map(Json).map_err(api_error)
}

// ─── Leads & Analytics ─────────────────────────────────────────────────────

pub async fn list_leads(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Lead>> {
    state.store.list_leads(id).map(Json).map_err(api_error)
}

pub async fn capture_lead(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<Lead>), ApiError> {
    let lead = state.store.capture_lead(id, req).map_err(api_error)?;
    metrics::counter!("funnel.leads.captured").increment(1);
    Ok((StatusCode::CREATED, Json(lead)))
}

pub async fn funnel_stats(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
) -> ApiResult<FunnelStats> {
    state.store.funnel_stats(id).map(Json).map_err(api_error)
}

// ─── Templates ─────────────────────────────────────────────────────────────

pub async fn list_templates(State(state): State<ManagementState>) -> Json<Vec<FunnelTemplate>> {
    Json(state.store.list_templates())
}

pub async fn create_template(
    State(state): State<ManagementState>,
    Json(req): Json<CreateTemplateRequest>,
) -> (StatusCode, Json<FunnelTemplate>) {
    let template = state.store.create_template(req, EDITOR_USER);
    metrics::counter!("funnel.templates.created").increment(1);
    (StatusCode::CREATED, Json(template))
}

pub async fn instantiate_template(
    State(state): State<ManagementState>,
    Path(id): Path<Uuid>,
    Json(req): Json<InstantiateTemplateRequest>,
) -> Result<(StatusCode, Json<Funnel>), ApiError> {
    let funnel = state
        .store
        .instantiate_template(id, req, EDITOR_USER)
        .map_err(api_error)?;
    metrics::counter!("funnel.funnels.created").increment(1);
    Ok((StatusCode::CREATED, Json(funnel)))
}

// ─── Admin ─────────────────────────────────────────────────────────────────

pub async fn admin_overview(State(state): State<ManagementState>) -> Json<AdminOverview> {
    Json(state.store.admin_overview())
}

pub async fn audit_log(State(state): State<ManagementState>) -> Json<Vec<AuditLogEntry>> {
    Json(state.store.get_audit_log())
}

#[cfg(test)]
mod tests {
    use super::*;
    use funnel_core::config::EditorConfig;
    use funnel_core::types::{FunnelPage, PageType};
    use std::collections::HashMap;

    fn state() -> ManagementState {
        ManagementState {
            store: Arc::new(ManagementStore::new(EditorConfig::default())),
        }
    }

    async fn two_page_funnel(state: &ManagementState) -> Funnel {
        let (status, Json(funnel)) = create_funnel(
            State(state.clone()),
            Json(CreateFunnelRequest {
                name: "Webinar".into(),
                description: None,
                pages: vec![
                    FunnelPage::new("p1", PageType::Welcome, "Hi"),
                    FunnelPage::new("p2", PageType::Thankyou, "Bye"),
                ],
                theme: None,
            }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        funnel
    }

    #[tokio::test]
    async fn test_missing_funnel_is_404() {
        let err = get_funnel(State(state()), Path(Uuid::new_v4())).await.unwrap_err();
        assert_eq!(err.0, StatusCode::NOT_FOUND);
        assert_eq!(err.1 .0.error, "not_found");
    }

    #[tokio::test]
    async fn test_route_and_publish() {
        let state = state();
        let funnel = two_page_funnel(&state).await;

        let Json(next) = next_page(
            State(state.clone()),
            Path((funnel.id, "p1".to_string())),
            Json(RouteRequest { values: HashMap::new() }),
        )
        .await
        .unwrap();
        assert_eq!(next, NextPage::Page { page_id: "p2".into() });

        let Json(published) = publish_funnel(State(state.clone()), Path(funnel.id)).await.unwrap();
        assert_eq!(published.status, funnel_core::types::FunnelStatus::Published);

        let Json(archived) = archive_funnel(State(state.clone()), Path(funnel.id)).await.unwrap();
        assert_eq!(archived.status, funnel_core::types::FunnelStatus::Archived);
    }

    #[tokio::test]
    async fn test_ab_test_errors_map_to_status_codes() {
        let state = state();
        let funnel = two_page_funnel(&state).await;

        let (status, Json(test)) = create_ab_test(
            State(state.clone()),
            Path(funnel.id),
            Json(CreateAbTestRequest { page_id: "p1".into(), name: "Hero".into(), config: None }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let variant_id = test.variants[0].id.clone();
        let err = delete_variant(State(state.clone()), Path((funnel.id, test.id.clone(), variant_id)))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::UNPROCESSABLE_ENTITY);

        let err = resume_ab_test(State(state.clone()), Path((funnel.id, test.id.clone())))
            .await
            .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);

        let Json(running) = start_ab_test(State(state.clone()), Path((funnel.id, test.id.clone())))
            .await
            .unwrap();
        assert_eq!(running.status, funnel_core::types::AbTestStatus::Running);

        let mut completed = running.clone();
        completed.status = funnel_core::types::AbTestStatus::Completed;
        completed.winner_id = Some(completed.variants[1].id.clone());
        let err = update_funnel(
            State(state.clone()),
            Path(funnel.id),
            Json(UpdateFunnelRequest { ab_tests: Some(vec![completed]), ..Default::default() }),
        )
        .await
        .unwrap_err();
        assert_eq!(err.0, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_actions_endpoint_returns_session_state() {
        let state = state();
        let funnel = two_page_funnel(&state).await;

        let Json(resp) = apply_actions(
            State(state.clone()),
            Path(funnel.id),
            Json(EditFunnelRequest {
                page_id: None,
                actions: vec![funnel_editor::EditorAction::AddPage {
                    page_type: PageType::Contact,
                    title: "Contact".into(),
                    index: Some(1),
                }],
            }),
        )
        .await
        .unwrap();
        assert_eq!(resp.funnel.pages.len(), 3);
        assert_eq!(resp.funnel.pages[1].title, "Contact");

        let Json(overview) = admin_overview(State(state.clone())).await;
        assert_eq!(overview.total_funnels, 1);
        let Json(log) = audit_log(State(state)).await;
        assert_eq!(log.len(), 2);
    }
}
