use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;

use crate::qa::domain::{
    ActivityEntry, ActivityKind, Category, CreditTransaction, ExpertId, ExpertProfile, Message,
    PayoutStatus, Question, QuestionId, QuestionMode, QuestionStatus, SubscriptionTier,
    TierPayment, UserId,
};
use crate::qa::notify::{Notification, NotificationKind, Notifier, NotifyError};
use crate::qa::payments::{
    ChargeRequest, PaymentError, PaymentGateway, RefundRequest, TransferRequest,
};
use crate::qa::pricing::PricingConfig;
use crate::qa::router::qa_router;
use crate::qa::service::{EngineConfig, QaService, SubmitQuestionRequest};
use crate::qa::store::{
    ActivityLog, CreditStore, ExpertDirectory, QuestionChange, QuestionStore, StoreError,
};

pub(super) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0)
        .single()
        .expect("valid timestamp")
}

/// Flat pricing for everyone and no free first question, so money paths are
/// deterministic unless a test opts into something else.
pub(super) fn engine_config() -> EngineConfig {
    EngineConfig {
        first_question_free: false,
        pricing: PricingConfig {
            dynamic_rollout_percent: 0,
            ..PricingConfig::default()
        },
        ..EngineConfig::default()
    }
}

pub(super) fn plumbing_expert() -> ExpertProfile {
    ExpertProfile {
        id: ExpertId("ex-plumb".to_string()),
        owner: UserId("dana-pro".to_string()),
        payout_account_id: "acct-plumb".to_string(),
        specialties: vec![Category::Plumbing],
        subscription: SubscriptionTier::Free,
        active: true,
        available: true,
        accepted_count: 0,
        disputed_count: 0,
        acceptance_rate: 0.0,
    }
}

pub(super) fn electrical_expert() -> ExpertProfile {
    ExpertProfile {
        id: ExpertId("ex-electric".to_string()),
        owner: UserId("elliot-pro".to_string()),
        payout_account_id: "acct-electric".to_string(),
        specialties: vec![Category::Electrical],
        subscription: SubscriptionTier::Pro,
        active: true,
        available: true,
        accepted_count: 0,
        disputed_count: 0,
        acceptance_rate: 0.0,
    }
}

/// Covers every category via the General specialty.
pub(super) fn handyman_expert() -> ExpertProfile {
    ExpertProfile {
        id: ExpertId("ex-handy".to_string()),
        owner: UserId("harper-pro".to_string()),
        payout_account_id: "acct-handy".to_string(),
        specialties: vec![Category::General],
        subscription: SubscriptionTier::Free,
        active: true,
        available: true,
        accepted_count: 0,
        disputed_count: 0,
        acceptance_rate: 0.0,
    }
}

pub(super) fn pool_request(asker: &str) -> SubmitQuestionRequest {
    SubmitQuestionRequest {
        asker: UserId(asker.to_string()),
        body: "My kitchen sink drain keeps backing up even after I snake it".to_string(),
        category: Category::Plumbing,
        photo_count: 0,
        ai_context: None,
        target_expert: None,
        payment_method: Some("pm-card-visa".to_string()),
        parent_question_id: None,
    }
}

pub(super) fn direct_request(asker: &str, expert: &ExpertProfile) -> SubmitQuestionRequest {
    SubmitQuestionRequest {
        target_expert: Some(expert.id.clone()),
        ..pool_request(asker)
    }
}

/// A question row with plausible defaults for tests that need to place a row
/// directly into storage instead of driving the submission flow.
pub(super) fn bare_question(id: &str, asker: &str, status: QuestionStatus) -> Question {
    Question {
        id: QuestionId(id.to_string()),
        asker: UserId(asker.to_string()),
        expert: None,
        body: "Water hammer every time the washing machine valve closes".to_string(),
        category: Category::Plumbing,
        ai_context: None,
        photo_count: 0,
        price_cents: 2_900,
        platform_fee_cents: 725,
        expert_payout_cents: 2_175,
        status,
        mode: QuestionMode::Pool,
        target_expert: None,
        claimed_at: None,
        claim_expires_at: None,
        answer: None,
        answered_at: None,
        payout_status: PayoutStatus::Pending,
        payment_intent_id: None,
        payment_method: None,
        refund_id: None,
        refunded_at: None,
        credit_applied_cents: 0,
        current_tier: 1,
        resolve_proposed_at: None,
        resolved_at: None,
        marked_not_helpful: false,
        parent_question_id: None,
        created_at: now(),
    }
}

#[derive(Default)]
struct MemoryState {
    questions: HashMap<QuestionId, Question>,
    messages: Vec<Message>,
    tier_payments: Vec<TierPayment>,
    balances: HashMap<UserId, i64>,
    credit_log: Vec<CreditTransaction>,
    activity: Vec<ActivityEntry>,
    experts: HashMap<ExpertId, ExpertProfile>,
    resolutions: Vec<(ExpertId, bool)>,
}

/// Single-mutex in-memory marketplace. The conditional update inspects and
/// mutates under one lock, which is exactly the atomicity the engine's
/// concurrency tests rely on.
#[derive(Default)]
pub(super) struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub(super) fn put_expert(&self, profile: ExpertProfile) {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.experts.insert(profile.id.clone(), profile);
    }

    pub(super) fn set_balance(&self, user: &UserId, cents: i64) {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.balances.insert(user.clone(), cents);
    }

    pub(super) fn balance_of(&self, user: &UserId) -> i64 {
        let state = self.state.lock().expect("store mutex poisoned");
        state.balances.get(user).copied().unwrap_or(0)
    }

    pub(super) fn question_row(&self, id: &QuestionId) -> Question {
        let state = self.state.lock().expect("store mutex poisoned");
        state.questions.get(id).cloned().expect("question present")
    }

    pub(super) fn credit_log(&self) -> Vec<CreditTransaction> {
        let state = self.state.lock().expect("store mutex poisoned");
        state.credit_log.clone()
    }

    pub(super) fn activity(&self) -> Vec<ActivityEntry> {
        let state = self.state.lock().expect("store mutex poisoned");
        state.activity.clone()
    }

    pub(super) fn resolutions(&self) -> Vec<(ExpertId, bool)> {
        let state = self.state.lock().expect("store mutex poisoned");
        state.resolutions.clone()
    }
}

impl QuestionStore for MemoryStore {
    fn insert_question(&self, question: &Question) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        if state.questions.contains_key(&question.id) {
            return Err(StoreError::Unavailable("duplicate question id".to_string()));
        }
        state.questions.insert(question.id.clone(), question.clone());
        Ok(())
    }

    fn question(&self, id: &QuestionId) -> Result<Question, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        state.questions.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn update_question(
        &self,
        id: &QuestionId,
        expected: &[QuestionStatus],
        change: &QuestionChange,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let question = state.questions.get_mut(id).ok_or(StoreError::NotFound)?;
        if !expected.contains(&question.status) {
            return Ok(false);
        }
        change.apply(question);
        Ok(true)
    }

    fn claimed_expiring_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Question>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .questions
            .values()
            .filter(|question| {
                question.status == QuestionStatus::Claimed
                    && question
                        .claim_expires_at
                        .is_some_and(|deadline| deadline < cutoff)
            })
            .cloned()
            .collect())
    }

    fn answered_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Question>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .questions
            .values()
            .filter(|question| {
                question.status == QuestionStatus::Answered
                    && question.answered_at.is_some_and(|at| at < cutoff)
            })
            .cloned()
            .collect())
    }

    fn question_count_for_asker(&self, user: &UserId) -> Result<u64, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .questions
            .values()
            .filter(|question| question.asker == *user)
            .count() as u64)
    }

    fn append_tier_payment(&self, payment: &TierPayment) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.tier_payments.push(payment.clone());
        Ok(())
    }

    fn tier_payments(&self, id: &QuestionId) -> Result<Vec<TierPayment>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .tier_payments
            .iter()
            .filter(|payment| payment.question_id == *id)
            .cloned()
            .collect())
    }

    fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.messages.push(message.clone());
        Ok(())
    }

    fn messages(&self, id: &QuestionId) -> Result<Vec<Message>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .messages
            .iter()
            .filter(|message| message.question_id == *id)
            .cloned()
            .collect())
    }
}

impl CreditStore for MemoryStore {
    fn credit_balance(&self, user: &UserId) -> Result<i64, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state.balances.get(user).copied().unwrap_or(0))
    }

    fn apply_credit_change(&self, movement: &CreditTransaction) -> Result<i64, StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        let balance = state.balances.entry(movement.user_id.clone()).or_insert(0);
        let updated = *balance + movement.amount_cents;
        if updated < 0 {
            return Err(StoreError::Overdraw);
        }
        *balance = updated;
        state.credit_log.push(movement.clone());
        Ok(updated)
    }
}

impl ActivityLog for MemoryStore {
    fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.activity.push(entry.clone());
        Ok(())
    }

    fn activity_count_since(
        &self,
        user: &UserId,
        kind: ActivityKind,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .activity
            .iter()
            .filter(|entry| {
                entry.kind == kind && entry.user_id == *user && entry.created_at >= since
            })
            .count() as u64)
    }

    fn pair_count_since(
        &self,
        kind: ActivityKind,
        user: &UserId,
        counterparty: &UserId,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .activity
            .iter()
            .filter(|entry| {
                entry.kind == kind
                    && entry.created_at >= since
                    && ((entry.user_id == *user && entry.counterparty.as_ref() == Some(counterparty))
                        || (entry.user_id == *counterparty
                            && entry.counterparty.as_ref() == Some(user)))
            })
            .count() as u64)
    }
}

impl ExpertDirectory for MemoryStore {
    fn expert(&self, id: &ExpertId) -> Result<ExpertProfile, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        state.experts.get(id).cloned().ok_or(StoreError::NotFound)
    }

    fn expert_owned_by(&self, user: &UserId) -> Result<Option<ExpertProfile>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .experts
            .values()
            .find(|profile| profile.owner == *user)
            .cloned())
    }

    fn experts_for_category(&self, category: Category) -> Result<Vec<ExpertProfile>, StoreError> {
        let state = self.state.lock().expect("store mutex poisoned");
        Ok(state
            .experts
            .values()
            .filter(|profile| profile.active && profile.available && profile.covers(category))
            .cloned()
            .collect())
    }

    fn record_resolution(&self, expert: &ExpertId, accepted: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock().expect("store mutex poisoned");
        state.resolutions.push((expert.clone(), accepted));
        let profile = state.experts.get_mut(expert).ok_or(StoreError::NotFound)?;
        if accepted {
            profile.accepted_count += 1;
        } else {
            profile.disputed_count += 1;
        }
        let total = profile.accepted_count + profile.disputed_count;
        profile.acceptance_rate = profile.accepted_count as f32 / total as f32;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct RecordedCharge {
    pub(super) amount_cents: i64,
    pub(super) customer: UserId,
    pub(super) payment_method: String,
    pub(super) idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct RecordedRefund {
    pub(super) payment_intent_id: String,
    pub(super) reason: String,
    pub(super) idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub(super) struct RecordedTransfer {
    pub(super) amount_cents: i64,
    pub(super) destination_account: String,
    pub(super) transfer_group: String,
    pub(super) idempotency_key: String,
}

/// Always-succeeding gateway that records every call.
#[derive(Default)]
pub(super) struct RecordingGateway {
    seq: AtomicU64,
    charges: Mutex<Vec<RecordedCharge>>,
    refunds: Mutex<Vec<RecordedRefund>>,
    transfers: Mutex<Vec<RecordedTransfer>>,
}

impl RecordingGateway {
    pub(super) fn charges(&self) -> Vec<RecordedCharge> {
        self.charges.lock().expect("gateway mutex poisoned").clone()
    }

    pub(super) fn refunds(&self) -> Vec<RecordedRefund> {
        self.refunds.lock().expect("gateway mutex poisoned").clone()
    }

    pub(super) fn transfers(&self) -> Vec<RecordedTransfer> {
        self.transfers
            .lock()
            .expect("gateway mutex poisoned")
            .clone()
    }

    fn next(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.seq.fetch_add(1, Ordering::Relaxed))
    }
}

impl PaymentGateway for RecordingGateway {
    fn charge(&self, request: &ChargeRequest<'_>) -> Result<String, PaymentError> {
        self.charges
            .lock()
            .expect("gateway mutex poisoned")
            .push(RecordedCharge {
                amount_cents: request.amount_cents,
                customer: request.customer.clone(),
                payment_method: request.payment_method.to_string(),
                idempotency_key: request.idempotency_key.clone(),
            });
        Ok(self.next("pi"))
    }

    fn refund(&self, request: &RefundRequest<'_>) -> Result<String, PaymentError> {
        self.refunds
            .lock()
            .expect("gateway mutex poisoned")
            .push(RecordedRefund {
                payment_intent_id: request.payment_intent_id.to_string(),
                reason: request.reason.to_string(),
                idempotency_key: request.idempotency_key.clone(),
            });
        Ok(self.next("re"))
    }

    fn transfer(&self, request: &TransferRequest<'_>) -> Result<String, PaymentError> {
        self.transfers
            .lock()
            .expect("gateway mutex poisoned")
            .push(RecordedTransfer {
                amount_cents: request.amount_cents,
                destination_account: request.destination_account.to_string(),
                transfer_group: request.transfer_group.clone(),
                idempotency_key: request.idempotency_key.clone(),
            });
        Ok(self.next("tr"))
    }
}

/// Declines every charge; refunds and transfers still succeed.
pub(super) struct DecliningGateway;

impl PaymentGateway for DecliningGateway {
    fn charge(&self, _request: &ChargeRequest<'_>) -> Result<String, PaymentError> {
        Err(PaymentError::Declined("card declined".to_string()))
    }

    fn refund(&self, _request: &RefundRequest<'_>) -> Result<String, PaymentError> {
        Ok("re-decline-fake".to_string())
    }

    fn transfer(&self, _request: &TransferRequest<'_>) -> Result<String, PaymentError> {
        Ok("tr-decline-fake".to_string())
    }
}

/// Every call fails as if the processor were down.
pub(super) struct OutageGateway;

impl PaymentGateway for OutageGateway {
    fn charge(&self, _request: &ChargeRequest<'_>) -> Result<String, PaymentError> {
        Err(PaymentError::Unavailable("processor offline".to_string()))
    }

    fn refund(&self, _request: &RefundRequest<'_>) -> Result<String, PaymentError> {
        Err(PaymentError::Unavailable("processor offline".to_string()))
    }

    fn transfer(&self, _request: &TransferRequest<'_>) -> Result<String, PaymentError> {
        Err(PaymentError::Unavailable("processor offline".to_string()))
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn kinds_for(&self, user: &UserId) -> Vec<NotificationKind> {
        self.sent()
            .into_iter()
            .filter(|notification| notification.user == *user)
            .map(|notification| notification.kind)
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification.clone());
        Ok(())
    }
}

pub(super) fn build_service_with(
    config: EngineConfig,
) -> (
    QaService<MemoryStore, RecordingGateway, RecordingNotifier>,
    Arc<MemoryStore>,
    Arc<RecordingGateway>,
    Arc<RecordingNotifier>,
) {
    let store = Arc::new(MemoryStore::default());
    store.put_expert(plumbing_expert());
    store.put_expert(electrical_expert());
    store.put_expert(handyman_expert());
    let gateway = Arc::new(RecordingGateway::default());
    let notifier = Arc::new(RecordingNotifier::default());
    let service = QaService::new(store.clone(), gateway.clone(), notifier.clone(), config);
    (service, store, gateway, notifier)
}

pub(super) fn build_service() -> (
    QaService<MemoryStore, RecordingGateway, RecordingNotifier>,
    Arc<MemoryStore>,
    Arc<RecordingGateway>,
    Arc<RecordingNotifier>,
) {
    build_service_with(engine_config())
}

pub(super) fn open_question(
    service: &QaService<MemoryStore, RecordingGateway, RecordingNotifier>,
    asker: &str,
) -> Question {
    service
        .submit_question(pool_request(asker), now())
        .expect("submission succeeds")
        .question
}

pub(super) fn claimed_question(
    service: &QaService<MemoryStore, RecordingGateway, RecordingNotifier>,
    asker: &str,
) -> Question {
    let question = open_question(service, asker);
    service
        .claim_question(&question.id, &plumbing_expert().owner, now())
        .expect("claim succeeds")
}

pub(super) fn answered_question(
    service: &QaService<MemoryStore, RecordingGateway, RecordingNotifier>,
    asker: &str,
) -> Question {
    let question = claimed_question(service, asker);
    service
        .answer_question(
            &question.id,
            &plumbing_expert().owner,
            "Replace the trap arm and check the vent stack for a blockage".to_string(),
            now(),
        )
        .expect("answer succeeds")
}

pub(super) fn qa_router_with_service(
    service: QaService<MemoryStore, RecordingGateway, RecordingNotifier>,
) -> axum::Router {
    qa_router(Arc::new(service))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
