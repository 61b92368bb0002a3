//! Resolution state machine: propose, accept, continue, dispute.
//!
//! Planning is pure: [`plan_transition`] turns a question, the caller's
//! role, and an action into the expected prior statuses, the row change,
//! the money operations, and the fire-and-forget effects, without touching
//! storage. The executor then runs money (logged, never blocking), applies
//! the change conditionally, and only on a matched precondition runs the
//! effects. Payment failures are flagged for reconciliation; the status
//! transition is the source of truth for what should have happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::domain::{
    CreditReason, ExpertProfile, PayoutStatus, Question, QuestionId, QuestionStatus, Role,
    TierPayment, UserId,
};
use super::credits::restore_credits;
use super::notify::{Notification, NotificationKind, Notifier};
use super::payments::{
    base_refund_key, payout_key, tier_refund_key, transfer_group, PaymentGateway, RefundRequest,
    TransferRequest,
};
use super::service::{EngineError, QaService, SideEffect};
use super::store::{MarketplaceStore, QuestionChange, RefundRecord};

const PROPOSE_EXPECTED: &[QuestionStatus] = &[
    QuestionStatus::Claimed,
    QuestionStatus::Answered,
    QuestionStatus::InConversation,
];
const ACCEPT_EXPECTED: &[QuestionStatus] = &[
    QuestionStatus::Answered,
    QuestionStatus::InConversation,
    QuestionStatus::ResolveProposed,
];
const CONTINUE_EXPECTED: &[QuestionStatus] = &[QuestionStatus::ResolveProposed];
const DISPUTE_EXPECTED: &[QuestionStatus] = &[
    QuestionStatus::Claimed,
    QuestionStatus::Answered,
    QuestionStatus::InConversation,
    QuestionStatus::ResolveProposed,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionAction {
    ProposeResolve,
    Accept,
    Continue,
    NotHelpful,
}

impl ResolutionAction {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ProposeResolve => "propose_resolve",
            Self::Accept => "accept",
            Self::Continue => "continue",
            Self::NotHelpful => "not_helpful",
        }
    }

    const fn actor(self) -> Role {
        match self {
            Self::ProposeResolve => Role::Expert,
            Self::Accept | Self::Continue | Self::NotHelpful => Role::Diyer,
        }
    }

    const fn expected(self) -> &'static [QuestionStatus] {
        match self {
            Self::ProposeResolve => PROPOSE_EXPECTED,
            Self::Accept => ACCEPT_EXPECTED,
            Self::Continue => CONTINUE_EXPECTED,
            Self::NotHelpful => DISPUTE_EXPECTED,
        }
    }
}

/// External payment call the executor must attempt for a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum MoneyOp {
    TransferPayout {
        amount_cents: i64,
        destination: String,
    },
    RefundCharge {
        payment_intent_id: String,
    },
    RefundTier {
        payment_intent_id: String,
        tier: u8,
    },
}

/// Everything a transition will do, computed before anything happens.
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionPlan {
    pub expected: &'static [QuestionStatus],
    pub change: QuestionChange,
    pub money: Vec<MoneyOp>,
    pub effects: Vec<SideEffect>,
}

/// Result of an executed transition. `payment_failures` counts money ops
/// that failed and were left to reconciliation.
#[derive(Debug, Clone)]
pub struct ResolutionOutcome {
    pub question: Question,
    pub payment_failures: u64,
}

/// Pure planner for the resolution state machine. Validates the actor and
/// the current status, then lays out the change, money movement, and
/// effects. The executor re-checks the status precondition at write time;
/// this check just fails fast.
pub fn plan_transition(
    question: &Question,
    role: Role,
    action: ResolutionAction,
    now: DateTime<Utc>,
    expert: Option<&ExpertProfile>,
    tier_payments: &[TierPayment],
) -> Result<TransitionPlan, EngineError> {
    if role != action.actor() {
        return Err(EngineError::Unauthorized);
    }
    let expected = action.expected();
    if !expected.contains(&question.status) {
        return Err(EngineError::PreconditionViolation {
            status: question.status.label(),
        });
    }

    let plan = match action {
        ResolutionAction::ProposeResolve => TransitionPlan {
            expected,
            change: QuestionChange::ProposeResolve { at: now },
            money: Vec::new(),
            effects: vec![SideEffect::Notify(Notification {
                user: question.asker.clone(),
                kind: NotificationKind::ResolveProposed,
                title: "Ready to close out?".to_string(),
                body: "Your expert believes this question is resolved".to_string(),
                link: Some(format!("/questions/{}", question.id.0)),
            })],
        },
        ResolutionAction::Accept => TransitionPlan {
            expected,
            change: QuestionChange::Accept { resolved_at: now },
            money: acceptance_money(question, expert),
            effects: acceptance_effects(question, expert),
        },
        ResolutionAction::Continue => TransitionPlan {
            expected,
            change: QuestionChange::EnterConversation,
            money: Vec::new(),
            effects: expert
                .map(|profile| {
                    vec![SideEffect::Notify(Notification {
                        user: profile.owner.clone(),
                        kind: NotificationKind::ConversationContinued,
                        title: "The conversation continues".to_string(),
                        body: "The asker has more questions before closing out".to_string(),
                        link: Some(format!("/questions/{}", question.id.0)),
                    })]
                })
                .unwrap_or_default(),
        },
        ResolutionAction::NotHelpful => {
            let mut money = Vec::new();
            if question.payout_status != PayoutStatus::Free {
                if let Some(intent) = &question.payment_intent_id {
                    money.push(MoneyOp::RefundCharge {
                        payment_intent_id: intent.clone(),
                    });
                }
            }
            for payment in tier_payments {
                money.push(MoneyOp::RefundTier {
                    payment_intent_id: payment.payment_intent_id.clone(),
                    tier: payment.tier,
                });
            }
            TransitionPlan {
                expected,
                change: QuestionChange::Dispute {
                    refund: None,
                    resolved_at: now,
                },
                money,
                effects: expert
                    .map(|profile| {
                        vec![SideEffect::Notify(Notification {
                            user: profile.owner.clone(),
                            kind: NotificationKind::QuestionDisputed,
                            title: "An answer was marked not helpful".to_string(),
                            body: "The asker disputed this question; payment was returned"
                                .to_string(),
                            link: Some(format!("/questions/{}", question.id.0)),
                        })]
                    })
                    .unwrap_or_default(),
            }
        }
    };
    Ok(plan)
}

/// Payout transfer for an acceptance, shared with the auto-accept sweep.
/// Free questions move no money.
pub(super) fn acceptance_money(
    question: &Question,
    expert: Option<&ExpertProfile>,
) -> Vec<MoneyOp> {
    if question.payout_status == PayoutStatus::Free {
        return Vec::new();
    }
    match expert {
        Some(profile) => vec![MoneyOp::TransferPayout {
            amount_cents: question.expert_payout_cents,
            destination: profile.payout_account_id.clone(),
        }],
        None => Vec::new(),
    }
}

/// Reputation write-back and notifications for an acceptance, shared with
/// the auto-accept sweep.
pub(super) fn acceptance_effects(
    question: &Question,
    expert: Option<&ExpertProfile>,
) -> Vec<SideEffect> {
    let mut effects = Vec::new();
    if let Some(profile) = expert {
        effects.push(SideEffect::RecordResolution {
            expert: profile.id.clone(),
            accepted: true,
        });
        effects.push(SideEffect::Notify(Notification {
            user: profile.owner.clone(),
            kind: NotificationKind::QuestionAccepted,
            title: "Your answer was accepted".to_string(),
            body: "Your payout is on the way".to_string(),
            link: Some(format!("/questions/{}", question.id.0)),
        }));
    }
    effects
}

fn inject_refund(change: QuestionChange, refund: Option<RefundRecord>) -> QuestionChange {
    match change {
        QuestionChange::Dispute { resolved_at, .. } => QuestionChange::Dispute {
            refund,
            resolved_at,
        },
        other => other,
    }
}

impl<S, P, N> QaService<S, P, N>
where
    S: MarketplaceStore,
    P: PaymentGateway,
    N: Notifier,
{
    /// Drives one resolution action end to end: plan, money, conditional
    /// write, effects, fraud scan on settlement.
    pub fn transition(
        &self,
        id: &QuestionId,
        caller: &UserId,
        action: ResolutionAction,
        now: DateTime<Utc>,
    ) -> Result<ResolutionOutcome, EngineError> {
        let question = self.store.question(id)?;
        let role = self.role_of(&question, caller)?;
        let expert = match &question.expert {
            Some(expert_id) => self.store.expert(expert_id).ok(),
            None => None,
        };
        let tier_payments = self.store.tier_payments(id)?;
        let plan = plan_transition(&question, role, action, now, expert.as_ref(), &tier_payments)?;

        let (base_refund, payment_failures) = self.execute_money(id, &plan.money, now);
        let change = inject_refund(plan.change, base_refund);

        let matched = self.store.update_question(id, plan.expected, &change)?;
        if !matched {
            return Err(self.precondition_violation(id)?);
        }
        let updated = self.store.question(id)?;

        if action == ResolutionAction::NotHelpful && updated.credit_applied_cents > 0 {
            if let Err(err) = restore_credits(
                self.store.as_ref(),
                &updated.asker,
                id,
                updated.credit_applied_cents,
                CreditReason::DisputeRefund,
                now,
            ) {
                warn!(question = %id.0, error = %err, "failed to restore credit on dispute");
            }
        }

        self.run_effects(plan.effects);

        if matches!(
            action,
            ResolutionAction::Accept | ResolutionAction::NotHelpful
        ) {
            self.fraud
                .scan_resolution_event(self.store.as_ref(), &updated, now);
        }

        Ok(ResolutionOutcome {
            question: updated,
            payment_failures,
        })
    }

    /// Attempts every money op, independently, so one failed refund does
    /// not block the rest. Returns the base-charge refund record if one was
    /// issued, plus the failure count.
    pub(super) fn execute_money(
        &self,
        id: &QuestionId,
        ops: &[MoneyOp],
        now: DateTime<Utc>,
    ) -> (Option<RefundRecord>, u64) {
        let mut base_refund = None;
        let mut failures = 0;
        for op in ops {
            match op {
                MoneyOp::TransferPayout {
                    amount_cents,
                    destination,
                } => {
                    let request = TransferRequest {
                        amount_cents: *amount_cents,
                        destination_account: destination,
                        question: id,
                        transfer_group: transfer_group(id),
                        idempotency_key: payout_key(id),
                    };
                    match self.payments.transfer(&request) {
                        Ok(transfer_id) => {
                            debug!(question = %id.0, transfer = %transfer_id, "payout released")
                        }
                        Err(err) => {
                            failures += 1;
                            warn!(question = %id.0, error = %err, "payout transfer failed, needs reconciliation");
                        }
                    }
                }
                MoneyOp::RefundCharge { payment_intent_id } => {
                    let request = RefundRequest {
                        payment_intent_id,
                        reason: "marked_not_helpful",
                        question: id,
                        idempotency_key: base_refund_key(id),
                    };
                    match self.payments.refund(&request) {
                        Ok(refund_id) => {
                            base_refund = Some(RefundRecord {
                                refund_id,
                                refunded_at: now,
                            });
                        }
                        Err(err) => {
                            failures += 1;
                            warn!(question = %id.0, error = %err, "base charge refund failed, needs reconciliation");
                        }
                    }
                }
                MoneyOp::RefundTier {
                    payment_intent_id,
                    tier,
                } => {
                    let request = RefundRequest {
                        payment_intent_id,
                        reason: "marked_not_helpful",
                        question: id,
                        idempotency_key: tier_refund_key(id, *tier),
                    };
                    match self.payments.refund(&request) {
                        Ok(refund_id) => {
                            debug!(question = %id.0, tier, refund = %refund_id, "tier charge refunded")
                        }
                        Err(err) => {
                            failures += 1;
                            warn!(question = %id.0, tier, error = %err, "tier refund failed, needs reconciliation");
                        }
                    }
                }
            }
        }
        (base_refund, failures)
    }
}
