use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Requisition, RequisitionId, UserId};
use super::repository::{Directory, NotificationPublisher, RepositoryError, RequisitionStore};
use super::service::{ProcurementService, ProcurementServiceError, TransitionRequest};
use super::transition::TransitionError;

/// Transition envelope: who is acting plus the tagged request.
#[derive(Debug, Deserialize)]
pub struct TransitionEnvelope {
    pub actor_id: UserId,
    #[serde(flatten)]
    pub request: TransitionRequest,
}

/// Router builder exposing draft creation, status, ranking and transition endpoints.
pub fn procurement_router<S, D, N>(service: Arc<ProcurementService<S, D, N>>) -> Router
where
    S: RequisitionStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    Router::new()
        .route("/api/v1/requisitions", post(create_handler::<S, D, N>))
        .route(
            "/api/v1/requisitions/:requisition_id",
            get(status_handler::<S, D, N>),
        )
        .route(
            "/api/v1/requisitions/:requisition_id/ranking",
            get(ranking_handler::<S, D, N>),
        )
        .route(
            "/api/v1/requisitions/:requisition_id/transitions",
            post(transition_handler::<S, D, N>),
        )
        .with_state(service)
}

pub(crate) async fn create_handler<S, D, N>(
    State(service): State<Arc<ProcurementService<S, D, N>>>,
    axum::Json(requisition): axum::Json<Requisition>,
) -> Response
where
    S: RequisitionStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = requisition.id.clone();
    match service.create(requisition) {
        Ok(aggregate) => (StatusCode::CREATED, axum::Json(aggregate.status_view())).into_response(),
        Err(error) => error_response(&id, error),
    }
}

pub(crate) async fn status_handler<S, D, N>(
    State(service): State<Arc<ProcurementService<S, D, N>>>,
    Path(requisition_id): Path<String>,
) -> Response
where
    S: RequisitionStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = RequisitionId(requisition_id);
    match service.get(&id) {
        Ok(aggregate) => (StatusCode::OK, axum::Json(aggregate.status_view())).into_response(),
        Err(error) => error_response(&id, error),
    }
}

pub(crate) async fn ranking_handler<S, D, N>(
    State(service): State<Arc<ProcurementService<S, D, N>>>,
    Path(requisition_id): Path<String>,
) -> Response
where
    S: RequisitionStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = RequisitionId(requisition_id);
    match service.ranking(&id) {
        Ok(determination) => (StatusCode::OK, axum::Json(determination)).into_response(),
        Err(error) => error_response(&id, error),
    }
}

pub(crate) async fn transition_handler<S, D, N>(
    State(service): State<Arc<ProcurementService<S, D, N>>>,
    Path(requisition_id): Path<String>,
    axum::Json(envelope): axum::Json<TransitionEnvelope>,
) -> Response
where
    S: RequisitionStore + 'static,
    D: Directory + 'static,
    N: NotificationPublisher + 'static,
{
    let id = RequisitionId(requisition_id);
    match service.apply(&id, &envelope.actor_id, envelope.request) {
        Ok(receipt) => (StatusCode::OK, axum::Json(receipt)).into_response(),
        Err(error) => error_response(&id, error),
    }
}

fn error_response(id: &RequisitionId, error: ProcurementServiceError) -> Response {
    let message = error.to_string();
    let (status, current_status, required_status, required_role) = match error {
        ProcurementServiceError::Transition(TransitionError::InvalidTransition {
            current,
            required,
            ..
        }) => (StatusCode::CONFLICT, Some(current), required, None),
        ProcurementServiceError::Transition(TransitionError::Unauthorized {
            current,
            required_role,
            ..
        }) => (StatusCode::FORBIDDEN, Some(current), Vec::new(), required_role),
        ProcurementServiceError::Transition(
            TransitionError::IncompleteEvaluationData(_)
            | TransitionError::NoEligibleBids
            | TransitionError::DeadlinePassed { .. }
            | TransitionError::DeadlineNotReached { .. },
        ) => (StatusCode::UNPROCESSABLE_ENTITY, None, Vec::new(), None),
        ProcurementServiceError::Transition(TransitionError::DuplicateQuotation(_))
        | ProcurementServiceError::Repository(
            RepositoryError::Conflict { .. } | RepositoryError::AlreadyExists(_),
        ) => (StatusCode::CONFLICT, None, Vec::new(), None),
        ProcurementServiceError::Transition(TransitionError::UnknownEntity { .. })
        | ProcurementServiceError::Repository(RepositoryError::NotFound) => {
            (StatusCode::NOT_FOUND, None, Vec::new(), None)
        }
        _ => (StatusCode::INTERNAL_SERVER_ERROR, None, Vec::new(), None),
    };

    let payload = json!({
        "requisition_id": id.0,
        "error": message,
        "current_status": current_status,
        "required_status": required_status,
        "required_role": required_role,
    });
    (status, axum::Json(payload)).into_response()
}
