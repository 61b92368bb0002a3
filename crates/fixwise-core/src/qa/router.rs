use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::domain::{QuestionId, UserId};
use super::messaging::MessageOutcome;
use super::notify::Notifier;
use super::payments::PaymentGateway;
use super::resolution::ResolutionAction;
use super::service::{EngineError, QaService, SubmitQuestionRequest};
use super::store::MarketplaceStore;

/// Router builder exposing the transaction engine over HTTP. Identity
/// arrives pre-resolved from the (out-of-scope) session layer as a caller
/// id in each mutating request.
pub fn qa_router<S, P, N>(service: Arc<QaService<S, P, N>>) -> Router
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/questions", post(submit_handler::<S, P, N>))
        .route(
            "/api/v1/questions/:question_id",
            get(get_handler::<S, P, N>),
        )
        .route(
            "/api/v1/questions/:question_id/payment-method",
            post(attach_payment_handler::<S, P, N>),
        )
        .route(
            "/api/v1/questions/:question_id/cancel",
            post(cancel_handler::<S, P, N>),
        )
        .route(
            "/api/v1/questions/:question_id/claim",
            post(claim_handler::<S, P, N>),
        )
        .route(
            "/api/v1/questions/:question_id/answer",
            post(answer_handler::<S, P, N>),
        )
        .route(
            "/api/v1/questions/:question_id/transition",
            post(transition_handler::<S, P, N>),
        )
        .route(
            "/api/v1/questions/:question_id/messages",
            get(list_messages_handler::<S, P, N>).post(send_message_handler::<S, P, N>),
        )
        .route(
            "/api/v1/questions/:question_id/tier-upgrade",
            post(tier_upgrade_handler::<S, P, N>),
        )
        .with_state(service)
}

#[derive(Debug, Deserialize)]
struct CallerBody {
    caller: UserId,
}

#[derive(Debug, Deserialize)]
struct AttachPaymentBody {
    caller: UserId,
    payment_method: String,
}

#[derive(Debug, Deserialize)]
struct AnswerBody {
    caller: UserId,
    body: String,
}

#[derive(Debug, Deserialize)]
struct TransitionBody {
    caller: UserId,
    action: ResolutionAction,
}

#[derive(Debug, Deserialize)]
struct MessageBody {
    caller: UserId,
    body: String,
}

fn error_response(error: EngineError) -> Response {
    let status = match &error {
        EngineError::PreconditionViolation { .. } => StatusCode::CONFLICT,
        EngineError::Unauthorized => StatusCode::FORBIDDEN,
        EngineError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
        EngineError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::NotFound => StatusCode::NOT_FOUND,
        EngineError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let payload = json!({
        "error": error.to_string(),
    });
    (status, axum::Json(payload)).into_response()
}

pub(crate) async fn submit_handler<S, P, N>(
    State(service): State<Arc<QaService<S, P, N>>>,
    axum::Json(request): axum::Json<SubmitQuestionRequest>,
) -> Response
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    match service.submit_question(request, Utc::now()) {
        Ok(receipt) => {
            let payload = json!({
                "question": receipt.question.status_view(),
                "quote": receipt.quote,
            });
            (StatusCode::CREATED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn get_handler<S, P, N>(
    State(service): State<Arc<QaService<S, P, N>>>,
    Path(question_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let id = QuestionId(question_id);
    match service.get_question(&id, Utc::now()) {
        Ok(question) => (StatusCode::OK, axum::Json(question)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn attach_payment_handler<S, P, N>(
    State(service): State<Arc<QaService<S, P, N>>>,
    Path(question_id): Path<String>,
    axum::Json(body): axum::Json<AttachPaymentBody>,
) -> Response
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let id = QuestionId(question_id);
    match service.attach_payment_method(&id, &body.caller, body.payment_method) {
        Ok(question) => (StatusCode::OK, axum::Json(question.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn cancel_handler<S, P, N>(
    State(service): State<Arc<QaService<S, P, N>>>,
    Path(question_id): Path<String>,
    axum::Json(body): axum::Json<CallerBody>,
) -> Response
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let id = QuestionId(question_id);
    match service.cancel_question(&id, &body.caller, Utc::now()) {
        Ok(question) => (StatusCode::OK, axum::Json(question.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn claim_handler<S, P, N>(
    State(service): State<Arc<QaService<S, P, N>>>,
    Path(question_id): Path<String>,
    axum::Json(body): axum::Json<CallerBody>,
) -> Response
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let id = QuestionId(question_id);
    match service.claim_question(&id, &body.caller, Utc::now()) {
        Ok(question) => (StatusCode::OK, axum::Json(question.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn answer_handler<S, P, N>(
    State(service): State<Arc<QaService<S, P, N>>>,
    Path(question_id): Path<String>,
    axum::Json(body): axum::Json<AnswerBody>,
) -> Response
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let id = QuestionId(question_id);
    match service.answer_question(&id, &body.caller, body.body, Utc::now()) {
        Ok(question) => (StatusCode::OK, axum::Json(question.status_view())).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn transition_handler<S, P, N>(
    State(service): State<Arc<QaService<S, P, N>>>,
    Path(question_id): Path<String>,
    axum::Json(body): axum::Json<TransitionBody>,
) -> Response
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let id = QuestionId(question_id);
    match service.transition(&id, &body.caller, body.action, Utc::now()) {
        Ok(outcome) => {
            let payload = json!({
                "question_id": outcome.question.id,
                "status": outcome.question.status.label(),
                "payout_status": outcome.question.payout_status.label(),
                "payment_failures": outcome.payment_failures,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn list_messages_handler<S, P, N>(
    State(service): State<Arc<QaService<S, P, N>>>,
    Path(question_id): Path<String>,
) -> Response
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let id = QuestionId(question_id);
    match service.conversation(&id) {
        Ok(messages) => (StatusCode::OK, axum::Json(messages)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn send_message_handler<S, P, N>(
    State(service): State<Arc<QaService<S, P, N>>>,
    Path(question_id): Path<String>,
    axum::Json(body): axum::Json<MessageBody>,
) -> Response
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let id = QuestionId(question_id);
    match service.send_message(&id, &body.caller, body.body, Utc::now()) {
        Ok(MessageOutcome::Posted(message)) => {
            (StatusCode::CREATED, axum::Json(message)).into_response()
        }
        Ok(MessageOutcome::UpgradeRequired(upgrade)) => {
            let payload = json!({
                "upgrade_required": true,
                "upgrade": upgrade,
            });
            (StatusCode::PAYMENT_REQUIRED, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn tier_upgrade_handler<S, P, N>(
    State(service): State<Arc<QaService<S, P, N>>>,
    Path(question_id): Path<String>,
    axum::Json(body): axum::Json<CallerBody>,
) -> Response
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let id = QuestionId(question_id);
    match service.upgrade_tier(&id, &body.caller, Utc::now()) {
        Ok(question) => {
            let payload = json!({
                "question_id": question.id,
                "current_tier": question.current_tier,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}
