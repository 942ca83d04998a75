use super::common::*;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::workflows::procurement::domain::RequisitionStatus;
use crate::workflows::procurement::procurement_router;
use crate::workflows::procurement::router::{ranking_handler, status_handler};

fn post_transition(body: Value) -> axum::http::Request<axum::body::Body> {
    axum::http::Request::post(format!("/api/v1/requisitions/{REQUISITION}/transitions"))
        .header(axum::http::header::CONTENT_TYPE, "application/json")
        .body(axum::body::Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn transition_route_applies_requests() {
    let (service, store, _notifications, _clock) = build_service(&["Committee"]);
    service.create(requisition(&["item-1"])).expect("draft created");
    let router = procurement_router(Arc::new(service));

    let response = router
        .oneshot(post_transition(json!({
            "actor_id": "requester-1",
            "action": "submit",
        })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["action"], "submit");
    assert_eq!(payload["from"], "Draft");
    assert_eq!(payload["to"], "Pending_Approval");
    assert_eq!(payload["current_approver_id"], "head-1");
    assert!(payload["transaction_id"].as_str().is_some());
    assert_eq!(
        store.stored(&requisition_id()).requisition.status,
        RequisitionStatus::PendingApproval
    );
}

#[tokio::test]
async fn invalid_transition_reports_current_and_required_status() {
    let (service, _store, _notifications, _clock) = build_service(&["Committee"]);
    service.create(requisition(&["item-1"])).expect("draft created");
    let router = procurement_router(Arc::new(service));

    let response = router
        .oneshot(post_transition(json!({
            "actor_id": "officer-1",
            "action": "release_award",
        })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CONFLICT);
    let payload = read_json_body(response).await;
    assert_eq!(payload["requisition_id"], REQUISITION);
    assert_eq!(payload["current_status"], "Draft");
    assert_eq!(payload["required_status"], json!(["PostApproved"]));
}

#[tokio::test]
async fn unauthorized_reviewer_is_forbidden_with_required_role() {
    let (service, store, _notifications, _clock) = build_service(&["Committee", "Director"]);
    let mut aggregate = four_way_aggregate();
    aggregate.requisition.status = RequisitionStatus::PendingReview {
        step: 1,
        role: role("Director"),
    };
    store.seed(aggregate);
    let router = procurement_router(Arc::new(service));

    let response = router
        .oneshot(post_transition(json!({
            "actor_id": "committee-1",
            "action": "approve",
            "comment": "looks fine",
        })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let payload = read_json_body(response).await;
    assert_eq!(payload["current_status"], "Pending_Director");
    assert_eq!(payload["required_role"], "Director");
}

#[tokio::test]
async fn finalize_without_bids_is_unprocessable() {
    let (service, store, _notifications, _clock) = build_service(&[]);
    let mut aggregate = four_way_aggregate();
    aggregate.quotations.clear();
    store.seed(aggregate);
    let router = procurement_router(Arc::new(service));

    let response = router
        .oneshot(post_transition(json!({
            "actor_id": "officer-1",
            "action": "finalize",
            "strategy": "per-item",
        })))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn status_handler_returns_status_view() {
    let (service, store, _notifications, _clock) = build_service(&[]);
    store.seed(four_way_aggregate());

    let response = status_handler::<MemoryStore, StaticDirectory, MemoryNotifications>(
        State(Arc::new(service)),
        Path(REQUISITION.to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "Scoring_Complete");
    assert_eq!(payload["quotation_count"], 4);
    assert_eq!(payload["version"], 7);
}

#[tokio::test]
async fn status_handler_returns_not_found_for_unknown_requisition() {
    let (service, _store, _notifications, _clock) = build_service(&[]);

    let response = status_handler::<MemoryStore, StaticDirectory, MemoryNotifications>(
        State(Arc::new(service)),
        Path("req-unknown".to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert_eq!(payload["requisition_id"], "req-unknown");
}

#[tokio::test]
async fn ranking_handler_returns_both_views() {
    let (service, store, _notifications, _clock) = build_service(&[]);
    store.seed(four_way_aggregate());

    let response = ranking_handler::<MemoryStore, StaticDirectory, MemoryNotifications>(
        State(Arc::new(service)),
        Path(REQUISITION.to_string()),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["determination"], "ranked");
    let standings = payload["outcome"]["single_vendor"]["standings"]
        .as_array()
        .expect("standings array");
    assert_eq!(standings.len(), 4);
    assert_eq!(standings[0]["vendor_id"], "vendor-a");
    let items = payload["outcome"]["per_item"]["items"]
        .as_array()
        .expect("items array");
    assert_eq!(items[0]["outcome"], "ranked");
}

#[tokio::test]
async fn create_route_registers_drafts_once() {
    let (service, store, _notifications, _clock) = build_service(&[]);
    let router = procurement_router(Arc::new(service));
    let body = serde_json::to_vec(&requisition(&["item-1", "item-2"])).expect("serializes");
    let create = || {
        axum::http::Request::post("/api/v1/requisitions")
            .header(axum::http::header::CONTENT_TYPE, "application/json")
            .body(axum::body::Body::from(body.clone()))
            .unwrap()
    };

    let response = router.clone().oneshot(create()).await.expect("route executes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["status"], "Draft");
    assert_eq!(payload["version"], 0);
    assert_eq!(store.stored(&requisition_id()).requisition.items.len(), 2);

    let duplicate = router.oneshot(create()).await.expect("route executes");
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);
}
