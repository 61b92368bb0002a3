use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;
use crate::qa::domain::UserId;
use crate::qa::router::{get_handler, submit_handler};

#[tokio::test]
async fn submitting_over_http_returns_the_receipt() {
    let (service, _store, _gateway, _notifier) = build_service();
    let router = qa_router_with_service(service);
    let payload = json!({
        "asker": "ava-diy",
        "body": "My kitchen sink drain keeps backing up even after I snake it",
        "category": "plumbing",
        "payment_method": "pm-card-visa",
    });

    let response = router
        .oneshot(
            Request::post("/api/v1/questions")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = read_json_body(response).await;
    assert_eq!(body["question"]["status"], "open");
    assert_eq!(body["question"]["price_cents"], 2_900);
    assert_eq!(body["quote"]["strategy"], "flat");
    assert_eq!(body["quote"]["expert_payout_cents"], 2_175);
}

#[tokio::test]
async fn submitting_an_empty_body_is_unprocessable() {
    let (service, _store, _gateway, _notifier) = build_service();
    let router = qa_router_with_service(service);
    let payload = json!({
        "asker": "ava-diy",
        "body": "   ",
        "category": "plumbing",
    });

    let response = router
        .oneshot(
            Request::post("/api/v1/questions")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = read_json_body(response).await;
    assert!(body["error"]
        .as_str()
        .expect("error string")
        .contains("empty"));
}

#[tokio::test]
async fn fetching_a_question_over_http() {
    let (service, _store, _gateway, _notifier) = build_service();
    let question = open_question(&service, "ava-diy");
    let router = qa_router_with_service(service);

    let response = router
        .clone()
        .oneshot(
            Request::get(format!("/api/v1/questions/{}", question.id.0))
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["id"], question.id.0);
    assert_eq!(body["status"], "open");

    let response = router
        .oneshot(
            Request::get("/api/v1/questions/q-does-not-exist")
                .body(Body::empty())
                .expect("request builds"),
        )
        .await
        .expect("router responds");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn claim_route_marks_the_question_claimed() {
    let (service, _store, _gateway, _notifier) = build_service();
    let question = open_question(&service, "ava-diy");
    let router = qa_router_with_service(service);

    let response = router
        .oneshot(
            Request::post(format!("/api/v1/questions/{}/claim", question.id.0))
                .header("content-type", "application/json")
                .body(Body::from(json!({"caller": "dana-pro"}).to_string()))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "claimed");
    assert_eq!(body["expert"], "ex-plumb");
}

#[tokio::test]
async fn transition_route_settles_the_question() {
    let (service, _store, _gateway, _notifier) = build_service();
    let question = answered_question(&service, "ava-diy");
    let router = qa_router_with_service(service);

    let response = router
        .oneshot(
            Request::post(format!("/api/v1/questions/{}/transition", question.id.0))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"caller": "ava-diy", "action": "accept"}).to_string(),
                ))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "accepted");
    assert_eq!(body["payout_status"], "released");
    assert_eq!(body["payment_failures"], 0);
}

#[tokio::test]
async fn stranger_transitions_are_forbidden_over_http() {
    let (service, _store, _gateway, _notifier) = build_service();
    let question = answered_question(&service, "ava-diy");
    let router = qa_router_with_service(service);

    let response = router
        .oneshot(
            Request::post(format!("/api/v1/questions/{}/transition", question.id.0))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"caller": "randy-diy", "action": "accept"}).to_string(),
                ))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn gated_messages_come_back_as_payment_required() {
    let (service, _store, _gateway, _notifier) = build_service();
    let question = claimed_question(&service, "ava-diy");
    let asker = UserId("ava-diy".to_string());
    for n in 0..5 {
        service
            .send_message(&question.id, &asker, format!("detail {n}"), now())
            .expect("message accepted");
    }
    let router = qa_router_with_service(service);

    let response = router
        .oneshot(
            Request::post(format!("/api/v1/questions/{}/messages", question.id.0))
                .header("content-type", "application/json")
                .body(Body::from(
                    json!({"caller": "ava-diy", "body": "one more thing"}).to_string(),
                ))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let body = read_json_body(response).await;
    assert_eq!(body["upgrade_required"], true);
    assert_eq!(body["upgrade"]["next_tier"], 2);
    assert_eq!(body["upgrade"]["upgrade_cost_cents"], 1_450);
}

#[tokio::test]
async fn cancel_route_returns_the_row_state() {
    let (service, _store, _gateway, _notifier) = build_service();
    let question = open_question(&service, "ava-diy");
    let router = qa_router_with_service(service);

    let response = router
        .oneshot(
            Request::post(format!("/api/v1/questions/{}/cancel", question.id.0))
                .header("content-type", "application/json")
                .body(Body::from(json!({"caller": "ava-diy"}).to_string()))
                .expect("request builds"),
        )
        .await
        .expect("router responds");

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json_body(response).await;
    assert_eq!(body["status"], "cancelled");
}

#[tokio::test]
async fn handlers_reply_without_http_plumbing() {
    let (service, _store, _gateway, _notifier) = build_service();
    let service = Arc::new(service);

    let response = submit_handler::<MemoryStore, RecordingGateway, RecordingNotifier>(
        State(service.clone()),
        axum::Json(pool_request("ava-diy")),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = get_handler::<MemoryStore, RecordingGateway, RecordingNotifier>(
        State(service),
        Path("q-missing".to_string()),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
