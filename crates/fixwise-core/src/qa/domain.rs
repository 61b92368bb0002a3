use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for questions, the central transactional entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QuestionId(pub String);

/// Identifier for any account on the platform (asker or expert owner).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Identifier for an expert profile, owned by exactly one user account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpertId(pub String);

/// Identifier for a threaded conversation message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Trade category a question is filed under. Drives expert matching and the
/// code-regulated pricing/difficulty bumps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Electrical,
    Plumbing,
    Hvac,
    Roofing,
    Concrete,
    Painting,
    Carpentry,
    Landscaping,
    General,
}

impl Category {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Electrical => "Electrical",
            Self::Plumbing => "Plumbing",
            Self::Hvac => "HVAC",
            Self::Roofing => "Roofing",
            Self::Concrete => "Concrete",
            Self::Painting => "Painting",
            Self::Carpentry => "Carpentry",
            Self::Landscaping => "Landscaping",
            Self::General => "General",
        }
    }

    /// Trades subject to building-code oversight. These carry a difficulty
    /// bump and the higher legacy flat price.
    pub const fn code_regulated(self) -> bool {
        matches!(
            self,
            Self::Electrical | Self::Plumbing | Self::Hvac | Self::Roofing | Self::Concrete
        )
    }
}

/// Self-reported skill level carried in the AI intake context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkillLevel {
    Beginner,
    Intermediate,
    Advanced,
}

/// Expert subscription plan; higher plans carry a platform-fee discount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Premium,
}

/// Structured intake context produced by the (out-of-scope) AI triage step.
/// Consumed only as pricing and difficulty input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiContext {
    pub project_summary: String,
    #[serde(default)]
    pub safety_warnings: Vec<String>,
    #[serde(default)]
    pub pro_recommended: bool,
    #[serde(default)]
    pub skill_level: Option<SkillLevel>,
    #[serde(default)]
    pub estimated_cost_cents: Option<i64>,
}

/// Whether a question is open to any matching expert or targeted at one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionMode {
    Pool,
    Direct,
}

/// Lifecycle status of a question. Terminal states are permanent audit
/// records; a question is never deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    PendingPayment,
    Open,
    Claimed,
    Answered,
    InConversation,
    ResolveProposed,
    Accepted,
    Disputed,
    Expired,
    Cancelled,
}

impl QuestionStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PendingPayment => "pending_payment",
            Self::Open => "open",
            Self::Claimed => "claimed",
            Self::Answered => "answered",
            Self::InConversation => "in_conversation",
            Self::ResolveProposed => "resolve_proposed",
            Self::Accepted => "accepted",
            Self::Disputed => "disputed",
            Self::Expired => "expired",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Accepted | Self::Disputed | Self::Expired | Self::Cancelled
        )
    }

    /// Statuses in which the claim has been taken and the conversation is
    /// still live. These are the states a dispute can be raised from and the
    /// states that accept threaded messages.
    pub const fn post_claim_active(self) -> bool {
        matches!(
            self,
            Self::Claimed | Self::Answered | Self::InConversation | Self::ResolveProposed
        )
    }
}

/// Where the money for a question currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Free,
    Released,
    Refunded,
}

impl PayoutStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Free => "free",
            Self::Released => "released",
            Self::Refunded => "refunded",
        }
    }
}

/// Role of a caller with respect to one question, derived server-side from
/// the question's asker id and expert-profile ownership. Never supplied by
/// the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Diyer,
    Expert,
}

/// The central transactional entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: QuestionId,
    pub asker: UserId,
    pub expert: Option<ExpertId>,
    pub body: String,
    pub category: Category,
    pub ai_context: Option<AiContext>,
    pub photo_count: u32,
    pub price_cents: i64,
    pub platform_fee_cents: i64,
    pub expert_payout_cents: i64,
    pub status: QuestionStatus,
    pub mode: QuestionMode,
    pub target_expert: Option<ExpertId>,
    pub claimed_at: Option<DateTime<Utc>>,
    pub claim_expires_at: Option<DateTime<Utc>>,
    pub answer: Option<String>,
    pub answered_at: Option<DateTime<Utc>>,
    pub payout_status: PayoutStatus,
    pub payment_intent_id: Option<String>,
    pub payment_method: Option<String>,
    pub refund_id: Option<String>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub credit_applied_cents: i64,
    pub current_tier: u8,
    pub resolve_proposed_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub marked_not_helpful: bool,
    pub parent_question_id: Option<QuestionId>,
    pub created_at: DateTime<Utc>,
}

impl Question {
    /// Remaining amount to collect externally after prepaid credits.
    pub fn effective_charge_cents(&self) -> i64 {
        (self.price_cents - self.credit_applied_cents).max(0)
    }

    pub fn status_view(&self) -> QuestionStatusView {
        QuestionStatusView {
            question_id: self.id.clone(),
            status: self.status.label(),
            payout_status: self.payout_status.label(),
            price_cents: self.price_cents,
            credit_applied_cents: self.credit_applied_cents,
            current_tier: self.current_tier,
            expert: self.expert.clone(),
        }
    }
}

/// Compact representation of a question's exposed state for API responses.
#[derive(Debug, Clone, Serialize)]
pub struct QuestionStatusView {
    pub question_id: QuestionId,
    pub status: &'static str,
    pub payout_status: &'static str,
    pub price_cents: i64,
    pub credit_applied_cents: i64,
    pub current_tier: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expert: Option<ExpertId>,
}

/// A threaded conversation message. The body is stored already redacted; the
/// unredacted original, when redaction fired, lives only in the activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub question_id: QuestionId,
    pub sender: UserId,
    pub role: Role,
    pub body: String,
    pub redaction_count: u32,
    pub created_at: DateTime<Utc>,
}

/// Append-only record of a mid-conversation upsell charge. Never mutated;
/// read back in full on dispute so every tier charge is reversed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierPayment {
    pub question_id: QuestionId,
    pub tier: u8,
    pub amount_cents: i64,
    pub payment_intent_id: String,
    pub created_at: DateTime<Utc>,
}

/// Why a credit balance moved. Kept coarse; the ledger log is for audit, not
/// replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreditReason {
    QuestionPayment,
    DisputeRefund,
    ClaimExpired,
    QuestionCancelled,
    Adjustment,
}

impl CreditReason {
    pub const fn label(self) -> &'static str {
        match self {
            Self::QuestionPayment => "question_payment",
            Self::DisputeRefund => "dispute_refund",
            Self::ClaimExpired => "claim_expired",
            Self::QuestionCancelled => "question_cancelled",
            Self::Adjustment => "adjustment",
        }
    }
}

/// One immutable credit-ledger movement. Negative amounts consume credit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreditTransaction {
    pub user_id: UserId,
    pub amount_cents: i64,
    pub reason: CreditReason,
    pub question_id: Option<QuestionId>,
    pub created_at: DateTime<Utc>,
}

/// Kind of abuse signal recorded in the activity log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    ContactShareAttempt,
    RapidMessages,
    ShortConversation,
    RepeatedSanitization,
    RepeatedShortPair,
}

impl ActivityKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ContactShareAttempt => "contact_share_attempt",
            Self::RapidMessages => "rapid_messages",
            Self::ShortConversation => "short_conversation",
            Self::RepeatedSanitization => "repeated_sanitization",
            Self::RepeatedShortPair => "repeated_short_pair",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Append-only abuse/fraud record. Written by the engine, read only by the
/// fraud heuristics' trailing-window counts and out-of-scope moderation
/// tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub kind: ActivityKind,
    pub severity: Severity,
    pub user_id: UserId,
    pub question_id: Option<QuestionId>,
    pub counterparty: Option<UserId>,
    pub description: String,
    /// Original unredacted content, retained for moderation review only.
    pub original_content: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Directory entry for an expert. `owner` ties the profile to the user
/// account that may act for it; reputation counters feed ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpertProfile {
    pub id: ExpertId,
    pub owner: UserId,
    pub payout_account_id: String,
    pub specialties: Vec<Category>,
    pub subscription: SubscriptionTier,
    pub active: bool,
    pub available: bool,
    pub accepted_count: u64,
    pub disputed_count: u64,
    pub acceptance_rate: f32,
}

impl ExpertProfile {
    pub fn covers(&self, category: Category) -> bool {
        self.specialties.contains(&category) || self.specialties.contains(&Category::General)
    }
}
