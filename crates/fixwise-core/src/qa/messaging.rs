//! Threaded conversation flow: tier gate, contact filter, persistence,
//! fraud scan, in that order. A gated message is not an error; the caller
//! gets back the upgrade payload to render a payment prompt.

use chrono::{DateTime, Utc};
use tracing::warn;

use super::domain::{Message, Question, QuestionId, QuestionStatus, Role, TierPayment, UserId};
use super::notify::{Notification, NotificationKind, Notifier};
use super::payments::{tier_charge_key, ChargeRequest, PaymentGateway};
use super::service::{next_message_id, EngineError, QaService, SideEffect};
use super::store::{MarketplaceStore, QuestionChange};
use super::tiers::{TierGateOutcome, TierUpgrade};

/// Result of a message attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageOutcome {
    Posted(Message),
    UpgradeRequired(TierUpgrade),
}

const CONVERSATION_STATUSES: &[QuestionStatus] = &[
    QuestionStatus::Claimed,
    QuestionStatus::Answered,
    QuestionStatus::InConversation,
    QuestionStatus::ResolveProposed,
];

impl<S, P, N> QaService<S, P, N>
where
    S: MarketplaceStore,
    P: PaymentGateway,
    N: Notifier,
{
    /// Posts a message to a live conversation. Asker messages pass the tier
    /// gate first; every body passes the contact filter before storage, and
    /// the fraud heuristics run after.
    pub fn send_message(
        &self,
        id: &QuestionId,
        caller: &UserId,
        body: String,
        now: DateTime<Utc>,
    ) -> Result<MessageOutcome, EngineError> {
        if body.trim().is_empty() {
            return Err(EngineError::Validation("message body is empty".into()));
        }
        let question = self.store.question(id)?;
        let role = self.role_of(&question, caller)?;
        if !question.status.post_claim_active() {
            return Err(EngineError::PreconditionViolation {
                status: question.status.label(),
            });
        }

        if role == Role::Diyer {
            let count = self.asker_message_count(id)?;
            if let TierGateOutcome::UpgradeRequired(upgrade) =
                self.config
                    .tiers
                    .evaluate(question.current_tier, count, question.price_cents)
            {
                return Ok(MessageOutcome::UpgradeRequired(upgrade));
            }
        }

        let sanitized = self.sanitizer.sanitize(&body);
        if sanitized.was_redacted() {
            self.log_contact_attempt(&question, caller, &body, &sanitized.flags, now);
        }

        let message = Message {
            id: next_message_id(),
            question_id: id.clone(),
            sender: caller.clone(),
            role,
            body: sanitized.text,
            redaction_count: sanitized.flags.len() as u32,
            created_at: now,
        };
        self.store.append_message(&message)?;

        if matches!(
            question.status,
            QuestionStatus::Claimed | QuestionStatus::Answered
        ) {
            // Best effort; a racing transition is fine since both sides of
            // the race leave the row in a live conversational state.
            let _ = self.store.update_question(
                id,
                &[QuestionStatus::Claimed, QuestionStatus::Answered],
                &QuestionChange::EnterConversation,
            )?;
        }

        self.fraud
            .scan_message_event(self.store.as_ref(), &question, caller, now);

        self.run_effects(self.message_effects(&question, role));

        Ok(MessageOutcome::Posted(message))
    }

    /// Charges the upsell for the next tier and advances the question. The
    /// gate is re-evaluated on the next message rather than assumed passed.
    pub fn upgrade_tier(
        &self,
        id: &QuestionId,
        caller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Question, EngineError> {
        let question = self.store.question(id)?;
        if self.role_of(&question, caller)? != Role::Diyer {
            return Err(EngineError::Unauthorized);
        }
        if !question.status.post_claim_active() {
            return Err(EngineError::PreconditionViolation {
                status: question.status.label(),
            });
        }
        let count = self.asker_message_count(id)?;
        let upgrade = match self
            .config
            .tiers
            .evaluate(question.current_tier, count, question.price_cents)
        {
            TierGateOutcome::UpgradeRequired(upgrade) => upgrade,
            TierGateOutcome::Open => {
                return Err(EngineError::Validation("no upgrade is due yet".into()))
            }
        };
        let Some(method) = question.payment_method.as_deref() else {
            return Err(EngineError::Validation(
                "question has no payment method on file".into(),
            ));
        };

        let request = ChargeRequest {
            amount_cents: upgrade.upgrade_cost_cents,
            customer: &question.asker,
            payment_method: method,
            question: id,
            idempotency_key: tier_charge_key(id, upgrade.next_tier),
        };
        let payment_intent_id = self
            .payments
            .charge(&request)
            .map_err(|err| EngineError::PaymentDeclined(err.to_string()))?;

        self.store.append_tier_payment(&TierPayment {
            question_id: id.clone(),
            tier: upgrade.next_tier,
            amount_cents: upgrade.upgrade_cost_cents,
            payment_intent_id,
            created_at: now,
        })?;

        let matched = self.store.update_question(
            id,
            CONVERSATION_STATUSES,
            &QuestionChange::AdvanceTier {
                tier: upgrade.next_tier,
            },
        )?;
        if !matched {
            warn!(question = %id.0, tier = upgrade.next_tier, "tier charge landed but question left the conversation, refund via dispute path");
            return Err(self.precondition_violation(id)?);
        }
        Ok(self.store.question(id)?)
    }

    /// Full thread for a question, oldest first. Bodies come back already
    /// redacted; originals only exist in the activity log.
    pub fn conversation(&self, id: &QuestionId) -> Result<Vec<Message>, EngineError> {
        self.store.question(id)?;
        Ok(self.store.messages(id)?)
    }

    /// Messages the asker has sent on this question. Tier allowances count
    /// only the asker's side of the thread.
    fn asker_message_count(&self, id: &QuestionId) -> Result<u64, EngineError> {
        let count = self
            .store
            .messages(id)?
            .iter()
            .filter(|message| message.role == Role::Diyer)
            .count() as u64;
        Ok(count)
    }

    fn message_effects(&self, question: &Question, sender_role: Role) -> Vec<SideEffect> {
        let recipient = match sender_role {
            Role::Diyer => question
                .expert
                .as_ref()
                .and_then(|expert| self.expert_owner(expert)),
            Role::Expert => Some(question.asker.clone()),
        };
        let Some(user) = recipient else {
            return Vec::new();
        };
        vec![SideEffect::Notify(Notification {
            user,
            kind: NotificationKind::NewMessage,
            title: "New message".to_string(),
            body: "There is a new message on your question".to_string(),
            link: Some(format!("/questions/{}", question.id.0)),
        })]
    }
}
