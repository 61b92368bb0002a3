//! Q&A marketplace transaction engine.
//!
//! Everything with money or state-machine semantics lives here: pricing a
//! question, applying prepaid credit, the time-boxed claim (where the
//! charge happens), the tier-gated conversation, resolution with payout or
//! refund, the expiry/auto-accept sweeps, and the abuse heuristics. The
//! engine is stateless between requests; all coordination goes through the
//! conditional updates defined in [`store`].

pub mod claims;
pub mod credits;
pub mod difficulty;
pub mod domain;
pub mod fraud;
pub mod messaging;
pub mod notify;
pub mod payments;
pub mod pricing;
pub mod resolution;
pub mod router;
pub mod sanitizer;
pub mod service;
pub mod store;
pub mod tiers;

#[cfg(test)]
mod tests;

pub use claims::{AutoAcceptReport, SweepReport};
pub use credits::{apply_credits, restore_credits, CreditApplication};
pub use difficulty::{score_question, DifficultyRating, DifficultyTier};
pub use domain::{
    ActivityEntry, ActivityKind, AiContext, Category, CreditReason, CreditTransaction, ExpertId,
    ExpertProfile, Message, MessageId, PayoutStatus, Question, QuestionId, QuestionMode,
    QuestionStatus, QuestionStatusView, Role, Severity, SkillLevel, SubscriptionTier, TierPayment,
    UserId,
};
pub use fraud::{FraudConfig, FraudDetector, FraudSignal};
pub use messaging::MessageOutcome;
pub use notify::{Notification, NotificationKind, Notifier, NotifyError};
pub use payments::{
    ChargeRequest, PaymentError, PaymentGateway, RefundRequest, TransferRequest,
};
pub use pricing::{quote_question, PricingConfig, PricingStrategy, QuestionQuote, QuoteRequest};
pub use resolution::{
    plan_transition, MoneyOp, ResolutionAction, ResolutionOutcome, TransitionPlan,
};
pub use router::qa_router;
pub use sanitizer::{ContactSanitizer, SanitizedText, SanitizerFlag, SanitizerRuleKind};
pub use service::{
    EngineConfig, EngineError, QaService, QuestionReceipt, SideEffect, SubmitQuestionRequest,
};
pub use store::{
    ActivityLog, CreditStore, ExpertDirectory, MarketplaceStore, QuestionChange, QuestionStore,
    RefundRecord, StoreError,
};
pub use tiers::{TierGateOutcome, TierSchedule, TierUpgrade};
