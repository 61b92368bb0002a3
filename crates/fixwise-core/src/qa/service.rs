//! Engine entry points shared by every workflow: construction, submission,
//! payment-method attachment, cancellation, and the fire-and-forget side
//! effect runner. Claim, messaging, and resolution operations live in their
//! own modules as further impls on [`QaService`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::credits::{apply_credits, restore_credits, CreditApplication};
use super::domain::{
    AiContext, Category, CreditReason, ExpertId, MessageId, PayoutStatus, Question, QuestionId,
    QuestionMode, QuestionStatus, Role, UserId,
};
use super::fraud::{FraudConfig, FraudDetector};
use super::notify::{Notification, NotificationKind, Notifier};
use super::payments::PaymentGateway;
use super::pricing::{quote_question, PricingConfig, QuestionQuote, QuoteRequest};
use super::sanitizer::ContactSanitizer;
use super::store::{MarketplaceStore, QuestionChange, StoreError};
use super::tiers::TierSchedule;

static QUESTION_SEQ: AtomicU64 = AtomicU64::new(1);
static MESSAGE_SEQ: AtomicU64 = AtomicU64::new(1);

pub(super) fn next_question_id() -> QuestionId {
    QuestionId(format!("q-{:06}", QUESTION_SEQ.fetch_add(1, Ordering::Relaxed)))
}

pub(super) fn next_message_id() -> MessageId {
    MessageId(format!("m-{:06}", MESSAGE_SEQ.fetch_add(1, Ordering::Relaxed)))
}

/// Tunables injected at construction. Nothing in the engine reads ambient
/// environment state.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub claim_expiry_hours: i64,
    pub auto_accept_hours: i64,
    /// Whether a user's first-ever question skips payment entirely.
    pub first_question_free: bool,
    pub pricing: PricingConfig,
    pub tiers: TierSchedule,
    pub fraud: FraudConfig,
}

impl EngineConfig {
    pub fn claim_expiry(&self) -> Duration {
        Duration::hours(self.claim_expiry_hours)
    }

    pub fn auto_accept_window(&self) -> Duration {
        Duration::hours(self.auto_accept_hours)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            claim_expiry_hours: 24,
            auto_accept_hours: 72,
            first_question_free: true,
            pricing: PricingConfig::default(),
            tiers: TierSchedule::default(),
            fraud: FraudConfig::default(),
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// The row's status no longer matches what the operation expects. The
    /// caller must re-fetch; the operation is never retried automatically.
    #[error("cannot perform this action in the current state ({status})")]
    PreconditionViolation { status: &'static str },
    #[error("caller is not a recognized participant in this question")]
    Unauthorized,
    #[error("payment declined: {0}")]
    PaymentDeclined(String),
    #[error("invalid request: {0}")]
    Validation(String),
    #[error("question not found")]
    NotFound,
    #[error("storage failure: {0}")]
    Store(StoreError),
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::NotFound,
            other => Self::Store(other),
        }
    }
}

/// Best-effort job produced alongside a primary state transition. Failures
/// are logged, never rolled back into the transition.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    Notify(Notification),
    RecordResolution { expert: ExpertId, accepted: bool },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitQuestionRequest {
    pub asker: UserId,
    pub body: String,
    pub category: Category,
    #[serde(default)]
    pub photo_count: u32,
    #[serde(default)]
    pub ai_context: Option<AiContext>,
    #[serde(default)]
    pub target_expert: Option<ExpertId>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub parent_question_id: Option<QuestionId>,
}

/// What submission hands back: the stored question plus the quote that
/// priced it, including difficulty factors for display.
#[derive(Debug, Clone)]
pub struct QuestionReceipt {
    pub question: Question,
    pub quote: QuestionQuote,
}

pub struct QaService<S, P, N> {
    pub(super) store: Arc<S>,
    pub(super) payments: Arc<P>,
    pub(super) notifier: Arc<N>,
    pub(super) config: EngineConfig,
    pub(super) sanitizer: ContactSanitizer,
    pub(super) fraud: FraudDetector,
}

impl<S, P, N> QaService<S, P, N>
where
    S: MarketplaceStore,
    P: PaymentGateway,
    N: Notifier,
{
    pub fn new(store: Arc<S>, payments: Arc<P>, notifier: Arc<N>, config: EngineConfig) -> Self {
        let fraud = FraudDetector::new(config.fraud.clone());
        Self {
            store,
            payments,
            notifier,
            config,
            sanitizer: ContactSanitizer::new(),
            fraud,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Prices a question, applies prepaid credit, and stores it. The
    /// question opens immediately when nothing remains to collect up front;
    /// otherwise it waits in `pending_payment` for a payment method.
    pub fn submit_question(
        &self,
        request: SubmitQuestionRequest,
        now: DateTime<Utc>,
    ) -> Result<QuestionReceipt, EngineError> {
        if request.body.trim().is_empty() {
            return Err(EngineError::Validation("question body is empty".into()));
        }

        let target = match &request.target_expert {
            Some(id) => {
                let profile = match self.store.expert(id) {
                    Ok(profile) => profile,
                    Err(StoreError::NotFound) => {
                        return Err(EngineError::Validation("unknown expert".into()))
                    }
                    Err(err) => return Err(err.into()),
                };
                if !profile.active {
                    return Err(EngineError::Validation(
                        "expert is not accepting questions".into(),
                    ));
                }
                if profile.owner == request.asker {
                    return Err(EngineError::Validation(
                        "cannot direct a question at your own profile".into(),
                    ));
                }
                Some(profile)
            }
            None => None,
        };

        if let Some(parent_id) = &request.parent_question_id {
            let parent = match self.store.question(parent_id) {
                Ok(parent) => parent,
                Err(StoreError::NotFound) => {
                    return Err(EngineError::Validation("unknown parent question".into()))
                }
                Err(err) => return Err(err.into()),
            };
            if let (Some(profile), Some(parent_expert)) = (&target, &parent.expert) {
                if profile.id == *parent_expert {
                    return Err(EngineError::Validation(
                        "a second opinion must go to a different expert".into(),
                    ));
                }
            }
        }

        let quote = quote_question(
            &self.config.pricing,
            QuoteRequest {
                asker: &request.asker,
                body: &request.body,
                category: request.category,
                photo_count: request.photo_count,
                context: request.ai_context.as_ref(),
                expert_subscription: target.as_ref().map(|profile| profile.subscription),
            },
        );

        let first_free = self.config.first_question_free
            && self.store.question_count_for_asker(&request.asker)? == 0;

        let id = next_question_id();
        let credit = if first_free {
            CreditApplication::none(quote.price_cents)
        } else {
            apply_credits(
                self.store.as_ref(),
                &request.asker,
                &id,
                quote.price_cents,
                now,
            )?
        };

        let status = if first_free
            || credit.remaining_charge_cents == 0
            || request.payment_method.is_some()
        {
            QuestionStatus::Open
        } else {
            QuestionStatus::PendingPayment
        };

        let mode = if request.target_expert.is_some() {
            QuestionMode::Direct
        } else {
            QuestionMode::Pool
        };

        let question = Question {
            id: id.clone(),
            asker: request.asker.clone(),
            expert: None,
            body: request.body,
            category: request.category,
            ai_context: request.ai_context,
            photo_count: request.photo_count,
            price_cents: quote.price_cents,
            platform_fee_cents: quote.platform_fee_cents,
            expert_payout_cents: quote.expert_payout_cents,
            status,
            mode,
            target_expert: request.target_expert,
            claimed_at: None,
            claim_expires_at: None,
            answer: None,
            answered_at: None,
            payout_status: if first_free {
                PayoutStatus::Free
            } else {
                PayoutStatus::Pending
            },
            payment_intent_id: None,
            payment_method: request.payment_method,
            refund_id: None,
            refunded_at: None,
            credit_applied_cents: credit.applied_cents,
            current_tier: 1,
            resolve_proposed_at: None,
            resolved_at: None,
            marked_not_helpful: false,
            parent_question_id: request.parent_question_id,
            created_at: now,
        };

        if let Err(err) = self.store.insert_question(&question) {
            // Compensate the deduction so a failed insert cannot eat credit.
            if credit.applied_cents > 0 {
                if let Err(restore_err) = restore_credits(
                    self.store.as_ref(),
                    &question.asker,
                    &id,
                    credit.applied_cents,
                    CreditReason::Adjustment,
                    now,
                ) {
                    warn!(question = %id.0, error = %restore_err, "failed to restore credit after insert failure");
                }
            }
            return Err(err.into());
        }

        if question.status == QuestionStatus::Open {
            self.run_effects(self.availability_effects(&question));
        }

        Ok(QuestionReceipt { question, quote })
    }

    /// Puts a payment method on file. Allowed while waiting for payment and
    /// on an open question, so a declined card can be swapped out.
    pub fn attach_payment_method(
        &self,
        id: &QuestionId,
        caller: &UserId,
        method: String,
    ) -> Result<Question, EngineError> {
        let question = self.store.question(id)?;
        if question.asker != *caller {
            return Err(EngineError::Unauthorized);
        }
        let was_pending = question.status == QuestionStatus::PendingPayment;
        let matched = self.store.update_question(
            id,
            &[QuestionStatus::PendingPayment, QuestionStatus::Open],
            &QuestionChange::AttachPaymentMethod { method },
        )?;
        if !matched {
            return Err(self.precondition_violation(id)?);
        }
        let question = self.store.question(id)?;
        if was_pending {
            self.run_effects(self.availability_effects(&question));
        }
        Ok(question)
    }

    /// Asker withdraws a question nobody has committed to yet. Applied
    /// credit goes back to the balance; no external charge exists in these
    /// states.
    pub fn cancel_question(
        &self,
        id: &QuestionId,
        caller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Question, EngineError> {
        let question = self.store.question(id)?;
        if question.asker != *caller {
            return Err(EngineError::Unauthorized);
        }
        let matched = self.store.update_question(
            id,
            &[QuestionStatus::PendingPayment, QuestionStatus::Open],
            &QuestionChange::Cancel { at: now },
        )?;
        if !matched {
            return Err(self.precondition_violation(id)?);
        }
        if question.credit_applied_cents > 0 {
            if let Err(err) = restore_credits(
                self.store.as_ref(),
                &question.asker,
                id,
                question.credit_applied_cents,
                CreditReason::QuestionCancelled,
                now,
            ) {
                warn!(question = %id.0, error = %err, "failed to restore credit on cancel");
            }
        }
        Ok(self.store.question(id)?)
    }

    /// Fetches a question, first settling an overdue implicit acceptance if
    /// the answer sat unchallenged past the auto-accept window.
    pub fn get_question(
        &self,
        id: &QuestionId,
        now: DateTime<Utc>,
    ) -> Result<Question, EngineError> {
        let question = self.store.question(id)?;
        if question.status == QuestionStatus::Answered {
            return self.check_auto_accept(question, now);
        }
        Ok(question)
    }

    /// Derives the caller's role for a question from stored ownership,
    /// never from client input.
    pub fn role_of(&self, question: &Question, caller: &UserId) -> Result<Role, EngineError> {
        if question.asker == *caller {
            return Ok(Role::Diyer);
        }
        if let Some(profile) = self.store.expert_owned_by(caller)? {
            if question.expert.as_ref() == Some(&profile.id) {
                return Ok(Role::Expert);
            }
        }
        Err(EngineError::Unauthorized)
    }

    /// Executes fire-and-forget jobs. Each failure is logged and swallowed;
    /// the primary transition already committed.
    pub fn run_effects(&self, effects: Vec<SideEffect>) {
        for effect in effects {
            match effect {
                SideEffect::Notify(notification) => {
                    if let Err(err) = self.notifier.notify(&notification) {
                        warn!(
                            user = %notification.user.0,
                            kind = notification.kind.label(),
                            error = %err,
                            "notification delivery failed"
                        );
                    }
                }
                SideEffect::RecordResolution { expert, accepted } => {
                    if let Err(err) = self.store.record_resolution(&expert, accepted) {
                        warn!(expert = %expert.0, error = %err, "reputation recalculation failed");
                    }
                }
            }
        }
    }

    /// Builds the "question is available" notifications for a freshly
    /// opened question: the targeted expert for direct mode, every active
    /// and available expert covering the category for pool mode. An expert
    /// is never told about their own question.
    pub(super) fn availability_effects(&self, question: &Question) -> Vec<SideEffect> {
        match question.mode {
            QuestionMode::Direct => {
                let Some(target) = &question.target_expert else {
                    return Vec::new();
                };
                match self.store.expert(target) {
                    Ok(profile) => vec![SideEffect::Notify(Notification {
                        user: profile.owner,
                        kind: NotificationKind::QuestionAvailable,
                        title: "A question was sent to you".to_string(),
                        body: format!("New {} question waiting for you", question.category.label()),
                        link: Some(format!("/questions/{}", question.id.0)),
                    })],
                    Err(err) => {
                        warn!(expert = %target.0, error = %err, "failed to load direct target for notification");
                        Vec::new()
                    }
                }
            }
            QuestionMode::Pool => match self.store.experts_for_category(question.category) {
                Ok(profiles) => profiles
                    .into_iter()
                    .filter(|profile| profile.owner != question.asker)
                    .map(|profile| {
                        SideEffect::Notify(Notification {
                            user: profile.owner,
                            kind: NotificationKind::QuestionAvailable,
                            title: "New question in your specialty".to_string(),
                            body: format!(
                                "A {} question is open for claims",
                                question.category.label()
                            ),
                            link: Some(format!("/questions/{}", question.id.0)),
                        })
                    })
                    .collect(),
                Err(err) => {
                    warn!(error = %err, "failed to load experts for availability notifications");
                    Vec::new()
                }
            },
        }
    }

    /// Builds the error for a failed conditional update by re-reading the
    /// row's current status.
    pub(super) fn precondition_violation(
        &self,
        id: &QuestionId,
    ) -> Result<EngineError, EngineError> {
        let current = self.store.question(id)?;
        Ok(EngineError::PreconditionViolation {
            status: current.status.label(),
        })
    }

    /// Looks up the user account behind the expert assigned to a question.
    pub(super) fn expert_owner(&self, expert: &ExpertId) -> Option<UserId> {
        match self.store.expert(expert) {
            Ok(profile) => Some(profile.owner),
            Err(err) => {
                warn!(expert = %expert.0, error = %err, "failed to load expert profile");
                None
            }
        }
    }
}
