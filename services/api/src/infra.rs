use chrono::{DateTime, Utc};
use fixwise_core::config::EngineEnv;
use fixwise_core::qa::{
    ActivityEntry, ActivityKind, ActivityLog, Category, ChargeRequest, CreditStore,
    CreditTransaction, EngineConfig, ExpertDirectory, ExpertId, ExpertProfile, Message,
    Notification, Notifier, NotifyError, PaymentError, PaymentGateway, PricingConfig, Question,
    QuestionChange, QuestionId, QuestionStatus, QuestionStore, RefundRequest, StoreError,
    SubscriptionTier, TierPayment, TransferRequest, UserId,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
struct MarketplaceState {
    questions: HashMap<String, Question>,
    messages: Vec<Message>,
    tier_payments: Vec<TierPayment>,
    balances: HashMap<String, i64>,
    credit_log: Vec<CreditTransaction>,
    activity: Vec<ActivityEntry>,
    experts: HashMap<String, ExpertProfile>,
}

/// Single-process marketplace store backing the sandbox server and the CLI
/// demo. One mutex over the whole state keeps the conditional question
/// update and the credit overdraw check atomic without row locks.
#[derive(Default, Clone)]
pub(crate) struct InMemoryMarketplace {
    state: Arc<Mutex<MarketplaceState>>,
}

impl InMemoryMarketplace {
    fn lock(&self) -> MutexGuard<'_, MarketplaceState> {
        self.state.lock().expect("marketplace mutex poisoned")
    }

    pub(crate) fn register_expert(&self, profile: ExpertProfile) {
        self.lock().experts.insert(profile.id.0.clone(), profile);
    }

    pub(crate) fn expert_snapshot(&self, id: &ExpertId) -> Option<ExpertProfile> {
        self.lock().experts.get(&id.0).cloned()
    }
}

impl QuestionStore for InMemoryMarketplace {
    fn insert_question(&self, question: &Question) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.questions.contains_key(&question.id.0) {
            return Err(StoreError::Unavailable(format!(
                "duplicate question id {}",
                question.id.0
            )));
        }
        state
            .questions
            .insert(question.id.0.clone(), question.clone());
        Ok(())
    }

    fn question(&self, id: &QuestionId) -> Result<Question, StoreError> {
        self.lock()
            .questions
            .get(&id.0)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn update_question(
        &self,
        id: &QuestionId,
        expected: &[QuestionStatus],
        change: &QuestionChange,
    ) -> Result<bool, StoreError> {
        let mut state = self.lock();
        let question = state.questions.get_mut(&id.0).ok_or(StoreError::NotFound)?;
        if !expected.contains(&question.status) {
            return Ok(false);
        }
        change.apply(question);
        Ok(true)
    }

    fn claimed_expiring_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Question>, StoreError> {
        Ok(self
            .lock()
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
        Ok(self
            .lock()
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
        Ok(self
            .lock()
            .questions
            .values()
            .filter(|question| question.asker == *user)
            .count() as u64)
    }

    fn append_tier_payment(&self, payment: &TierPayment) -> Result<(), StoreError> {
        self.lock().tier_payments.push(payment.clone());
        Ok(())
    }

    fn tier_payments(&self, id: &QuestionId) -> Result<Vec<TierPayment>, StoreError> {
        Ok(self
            .lock()
            .tier_payments
            .iter()
            .filter(|payment| payment.question_id == *id)
            .cloned()
            .collect())
    }

    fn append_message(&self, message: &Message) -> Result<(), StoreError> {
        self.lock().messages.push(message.clone());
        Ok(())
    }

    fn messages(&self, id: &QuestionId) -> Result<Vec<Message>, StoreError> {
        Ok(self
            .lock()
            .messages
            .iter()
            .filter(|message| message.question_id == *id)
            .cloned()
            .collect())
    }
}

impl CreditStore for InMemoryMarketplace {
    fn credit_balance(&self, user: &UserId) -> Result<i64, StoreError> {
        Ok(self.lock().balances.get(&user.0).copied().unwrap_or(0))
    }

    fn apply_credit_change(&self, movement: &CreditTransaction) -> Result<i64, StoreError> {
        let mut state = self.lock();
        let balance = state
            .balances
            .get(&movement.user_id.0)
            .copied()
            .unwrap_or(0);
        let next = balance + movement.amount_cents;
        if next < 0 {
            return Err(StoreError::Overdraw);
        }
        state.balances.insert(movement.user_id.0.clone(), next);
        state.credit_log.push(movement.clone());
        Ok(next)
    }
}

impl ActivityLog for InMemoryMarketplace {
    fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError> {
        self.lock().activity.push(entry.clone());
        Ok(())
    }

    fn activity_count_since(
        &self,
        user: &UserId,
        kind: ActivityKind,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        Ok(self
            .lock()
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
        Ok(self
            .lock()
            .activity
            .iter()
            .filter(|entry| {
                entry.kind == kind
                    && entry.created_at >= since
                    && ((entry.user_id == *user
                        && entry.counterparty.as_ref() == Some(counterparty))
                        || (entry.user_id == *counterparty
                            && entry.counterparty.as_ref() == Some(user)))
            })
            .count() as u64)
    }
}

impl ExpertDirectory for InMemoryMarketplace {
    fn expert(&self, id: &ExpertId) -> Result<ExpertProfile, StoreError> {
        self.lock()
            .experts
            .get(&id.0)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    fn expert_owned_by(&self, user: &UserId) -> Result<Option<ExpertProfile>, StoreError> {
        Ok(self
            .lock()
            .experts
            .values()
            .find(|profile| profile.owner == *user)
            .cloned())
    }

    fn experts_for_category(&self, category: Category) -> Result<Vec<ExpertProfile>, StoreError> {
        Ok(self
            .lock()
            .experts
            .values()
            .filter(|profile| profile.active && profile.available && profile.covers(category))
            .cloned()
            .collect())
    }

    fn record_resolution(&self, expert: &ExpertId, accepted: bool) -> Result<(), StoreError> {
        let mut state = self.lock();
        let profile = state.experts.get_mut(&expert.0).ok_or(StoreError::NotFound)?;
        if accepted {
            profile.accepted_count += 1;
        } else {
            profile.disputed_count += 1;
        }
        let total = profile.accepted_count + profile.disputed_count;
        profile.acceptance_rate = if total == 0 {
            0.0
        } else {
            profile.accepted_count as f32 / total as f32
        };
        Ok(())
    }
}

/// Payment processor stand-in that approves every call and hands back
/// sequential sandbox references. Deployments swap in a Stripe-backed
/// implementation behind the same trait.
#[derive(Default)]
pub(crate) struct SandboxGateway {
    sequence: AtomicU64,
}

impl SandboxGateway {
    fn next(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl PaymentGateway for SandboxGateway {
    fn charge(&self, request: &ChargeRequest<'_>) -> Result<String, PaymentError> {
        let reference = format!("pi_sandbox_{}", self.next());
        debug!(
            amount_cents = request.amount_cents,
            question = %request.question.0,
            idempotency_key = %request.idempotency_key,
            %reference,
            "sandbox charge approved"
        );
        Ok(reference)
    }

    fn refund(&self, request: &RefundRequest<'_>) -> Result<String, PaymentError> {
        let reference = format!("re_sandbox_{}", self.next());
        debug!(
            payment_intent = %request.payment_intent_id,
            question = %request.question.0,
            idempotency_key = %request.idempotency_key,
            %reference,
            "sandbox refund issued"
        );
        Ok(reference)
    }

    fn transfer(&self, request: &TransferRequest<'_>) -> Result<String, PaymentError> {
        let reference = format!("tr_sandbox_{}", self.next());
        debug!(
            amount_cents = request.amount_cents,
            destination = %request.destination_account,
            question = %request.question.0,
            idempotency_key = %request.idempotency_key,
            %reference,
            "sandbox transfer issued"
        );
        Ok(reference)
    }
}

/// Delivers notifications to the log stream. Stands in for push and email
/// channels until one exists.
pub(crate) struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        info!(
            user = %notification.user.0,
            kind = notification.kind.label(),
            title = %notification.title,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Builds the engine configuration from the environment-backed knobs while
/// keeping the compiled-in pricing tables, tier schedule, and fraud windows.
pub(crate) fn engine_config(env: &EngineEnv) -> EngineConfig {
    EngineConfig {
        claim_expiry_hours: env.claim_expiry_hours,
        auto_accept_hours: env.auto_accept_hours,
        first_question_free: env.first_question_free,
        pricing: PricingConfig {
            dynamic_rollout_percent: env.dynamic_pricing_percent,
            ..PricingConfig::default()
        },
        ..EngineConfig::default()
    }
}

/// Sandbox expert directory. The service exposes no expert onboarding
/// surface, so the server and the CLI demo seed these profiles at startup.
pub(crate) fn demo_experts() -> Vec<ExpertProfile> {
    let profile = |id: &str, owner: &str, account: &str, trade, subscription| ExpertProfile {
        id: ExpertId(id.to_owned()),
        owner: UserId(owner.to_owned()),
        payout_account_id: account.to_owned(),
        specialties: vec![trade],
        subscription,
        active: true,
        available: true,
        accepted_count: 0,
        disputed_count: 0,
        acceptance_rate: 0.0,
    };

    vec![
        profile(
            "ex-demo-plumber",
            "demo-plumber",
            "acct_demo_plumber",
            Category::Plumbing,
            SubscriptionTier::Free,
        ),
        profile(
            "ex-demo-electrician",
            "demo-electrician",
            "acct_demo_electrician",
            Category::Electrical,
            SubscriptionTier::Pro,
        ),
        profile(
            "ex-demo-handyman",
            "demo-handyman",
            "acct_demo_handyman",
            Category::General,
            SubscriptionTier::Free,
        ),
    ]
}
