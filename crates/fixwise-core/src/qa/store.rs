//! Storage contract for the transaction engine.
//!
//! The engine keeps no state between requests; everything durable lives
//! behind these traits. The one concurrency primitive is
//! [`QuestionStore::update_question`]: a conditional update that applies a
//! [`QuestionChange`] only while the row's status is still one of the
//! expected values, and reports whether it matched. Every state transition
//! in the engine, including the background sweeps, goes through it. There
//! are no in-process locks.

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::domain::{
    ActivityEntry, ActivityKind, Category, CreditTransaction, ExpertId, ExpertProfile, Message,
    PayoutStatus, Question, QuestionId, QuestionStatus, TierPayment, UserId,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("credit balance would go negative")]
    Overdraw,
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Refund reference written back onto a question row.
#[derive(Debug, Clone, PartialEq)]
pub struct RefundRecord {
    pub refund_id: String,
    pub refunded_at: DateTime<Utc>,
}

/// A single-row mutation, always applied under a status precondition.
/// `apply` is the full row effect, so the in-memory store and a SQL store
/// agree on what each change means.
#[derive(Debug, Clone, PartialEq)]
pub enum QuestionChange {
    /// Asker put a payment method on file; the question becomes claimable.
    AttachPaymentMethod { method: String },
    /// Expert takes the time-boxed exclusive right to answer.
    Claim {
        expert: ExpertId,
        claimed_at: DateTime<Utc>,
        claim_expires_at: DateTime<Utc>,
    },
    /// Charge succeeded for the effective price; keep the intent reference.
    RecordCharge { payment_intent_id: String },
    /// Claim is undone and the question returns to circulation. Used both
    /// for charge-decline rollback (no refund) and the pool-mode expiry
    /// sweep (refund recorded).
    ReleaseClaim { refund: Option<RefundRecord> },
    /// Direct-mode claim lapsed; the question is dead.
    ExpireClaim {
        refund: Option<RefundRecord>,
        at: DateTime<Utc>,
    },
    /// Expert posted the formal answer.
    Answer {
        body: String,
        answered_at: DateTime<Utc>,
    },
    /// Threaded conversation is live; clears any standing resolve proposal.
    EnterConversation,
    /// Expert asked the asker to close out.
    ProposeResolve { at: DateTime<Utc> },
    /// Asker accepted; payout releases unless the question was free.
    Accept { resolved_at: DateTime<Utc> },
    /// Asker marked the answer not helpful; money comes back.
    Dispute {
        refund: Option<RefundRecord>,
        resolved_at: DateTime<Utc>,
    },
    /// Upsell payment landed; conversation may continue at the new tier.
    AdvanceTier { tier: u8 },
    /// Asker withdrew the question before anyone committed to it.
    Cancel { at: DateTime<Utc> },
}

impl QuestionChange {
    /// Status the row moves to when this change lands, if it moves at all.
    pub fn next_status(&self) -> Option<QuestionStatus> {
        match self {
            Self::AttachPaymentMethod { .. } => Some(QuestionStatus::Open),
            Self::Claim { .. } => Some(QuestionStatus::Claimed),
            Self::RecordCharge { .. } | Self::AdvanceTier { .. } => None,
            Self::ReleaseClaim { .. } => Some(QuestionStatus::Open),
            Self::ExpireClaim { .. } => Some(QuestionStatus::Expired),
            Self::Answer { .. } => Some(QuestionStatus::Answered),
            Self::EnterConversation => Some(QuestionStatus::InConversation),
            Self::ProposeResolve { .. } => Some(QuestionStatus::ResolveProposed),
            Self::Accept { .. } => Some(QuestionStatus::Accepted),
            Self::Dispute { .. } => Some(QuestionStatus::Disputed),
            Self::Cancel { .. } => Some(QuestionStatus::Cancelled),
        }
    }

    pub fn apply(&self, question: &mut Question) {
        if let Some(status) = self.next_status() {
            question.status = status;
        }
        match self {
            Self::AttachPaymentMethod { method } => {
                question.payment_method = Some(method.clone());
            }
            Self::Claim {
                expert,
                claimed_at,
                claim_expires_at,
            } => {
                question.expert = Some(expert.clone());
                question.claimed_at = Some(*claimed_at);
                question.claim_expires_at = Some(*claim_expires_at);
            }
            Self::RecordCharge { payment_intent_id } => {
                question.payment_intent_id = Some(payment_intent_id.clone());
            }
            Self::ReleaseClaim { refund } => {
                question.expert = None;
                question.claimed_at = None;
                question.claim_expires_at = None;
                question.payment_intent_id = None;
                if let Some(record) = refund {
                    question.refund_id = Some(record.refund_id.clone());
                    question.refunded_at = Some(record.refunded_at);
                }
            }
            Self::ExpireClaim { refund, at } => {
                question.expert = None;
                question.claimed_at = None;
                question.claim_expires_at = None;
                question.payment_intent_id = None;
                question.resolved_at = Some(*at);
                if question.payout_status != PayoutStatus::Free {
                    question.payout_status = PayoutStatus::Refunded;
                }
                if let Some(record) = refund {
                    question.refund_id = Some(record.refund_id.clone());
                    question.refunded_at = Some(record.refunded_at);
                }
            }
            Self::Answer { body, answered_at } => {
                question.answer = Some(body.clone());
                question.answered_at = Some(*answered_at);
            }
            Self::EnterConversation => {
                question.resolve_proposed_at = None;
            }
            Self::ProposeResolve { at } => {
                question.resolve_proposed_at = Some(*at);
            }
            Self::Accept { resolved_at } => {
                question.resolved_at = Some(*resolved_at);
                if question.payout_status != PayoutStatus::Free {
                    question.payout_status = PayoutStatus::Released;
                }
            }
            Self::Dispute {
                refund,
                resolved_at,
            } => {
                question.marked_not_helpful = true;
                question.resolved_at = Some(*resolved_at);
                if question.payout_status != PayoutStatus::Free {
                    question.payout_status = PayoutStatus::Refunded;
                }
                if let Some(record) = refund {
                    question.refund_id = Some(record.refund_id.clone());
                    question.refunded_at = Some(record.refunded_at);
                }
            }
            Self::AdvanceTier { tier } => {
                question.current_tier = *tier;
            }
            Self::Cancel { at } => {
                question.resolved_at = Some(*at);
            }
        }
    }
}

/// Durable question rows plus their owned message and tier-payment records.
pub trait QuestionStore: Send + Sync {
    fn insert_question(&self, question: &Question) -> Result<(), StoreError>;

    fn question(&self, id: &QuestionId) -> Result<Question, StoreError>;

    /// Applies `change` only if the row's status is currently one of
    /// `expected`. Returns whether the precondition matched; a `false` means
    /// another actor moved the row first and the caller must not assume
    /// anything happened.
    fn update_question(
        &self,
        id: &QuestionId,
        expected: &[QuestionStatus],
        change: &QuestionChange,
    ) -> Result<bool, StoreError>;

    /// Claimed rows whose claim deadline passed before `cutoff`.
    fn claimed_expiring_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Question>, StoreError>;

    /// Answered rows whose answer landed before `cutoff`.
    fn answered_before(&self, cutoff: DateTime<Utc>) -> Result<Vec<Question>, StoreError>;

    /// How many questions this user has ever submitted, for the
    /// first-question-free check.
    fn question_count_for_asker(&self, user: &UserId) -> Result<u64, StoreError>;

    fn append_tier_payment(&self, payment: &TierPayment) -> Result<(), StoreError>;

    fn tier_payments(&self, id: &QuestionId) -> Result<Vec<TierPayment>, StoreError>;

    fn append_message(&self, message: &Message) -> Result<(), StoreError>;

    /// All messages on a question, oldest first.
    fn messages(&self, id: &QuestionId) -> Result<Vec<Message>, StoreError>;
}

/// Per-user prepaid balance with an append-only movement log.
pub trait CreditStore: Send + Sync {
    fn credit_balance(&self, user: &UserId) -> Result<i64, StoreError>;

    /// Applies one signed movement and returns the new balance. Must reject
    /// a movement that would take the balance negative with
    /// [`StoreError::Overdraw`], atomically with the balance check.
    fn apply_credit_change(&self, movement: &CreditTransaction) -> Result<i64, StoreError>;
}

/// Append-only abuse signal log with the trailing-window counts the fraud
/// heuristics need.
pub trait ActivityLog: Send + Sync {
    fn append_activity(&self, entry: &ActivityEntry) -> Result<(), StoreError>;

    fn activity_count_since(
        &self,
        user: &UserId,
        kind: ActivityKind,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;

    /// Entries of `kind` where `user` is the actor and `counterparty` the
    /// other side, regardless of which of the two wrote the entry.
    fn pair_count_since(
        &self,
        kind: ActivityKind,
        user: &UserId,
        counterparty: &UserId,
        since: DateTime<Utc>,
    ) -> Result<u64, StoreError>;
}

/// Read side of the expert directory plus the reputation write-back.
pub trait ExpertDirectory: Send + Sync {
    fn expert(&self, id: &ExpertId) -> Result<ExpertProfile, StoreError>;

    /// The expert profile owned by this user account, if any. Callers use it
    /// to derive the expert role; clients never supply a role.
    fn expert_owned_by(&self, user: &UserId) -> Result<Option<ExpertProfile>, StoreError>;

    /// Active, available experts covering the category.
    fn experts_for_category(&self, category: Category) -> Result<Vec<ExpertProfile>, StoreError>;

    /// Folds one resolution into the expert's acceptance counters.
    fn record_resolution(&self, expert: &ExpertId, accepted: bool) -> Result<(), StoreError>;
}

/// Everything the engine needs from storage, in one bound.
pub trait MarketplaceStore: QuestionStore + CreditStore + ActivityLog + ExpertDirectory {}

impl<T> MarketplaceStore for T where
    T: QuestionStore + CreditStore + ActivityLog + ExpertDirectory
{
}
