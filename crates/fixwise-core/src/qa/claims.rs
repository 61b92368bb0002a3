//! Claim lifecycle: taking a claim (and charging for it), answering, and
//! the background sweeps that clean up after inaction.
//!
//! Both sweeps are safe to run from overlapping scheduler ticks or multiple
//! process instances: every row mutation is conditioned on the status the
//! sweep expects, so a question another actor already moved on is silently
//! skipped rather than double-processed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::credits::restore_credits;
use super::domain::{
    ActivityEntry, ActivityKind, CreditReason, PayoutStatus, Question, QuestionId, QuestionMode,
    QuestionStatus, Role, Severity, UserId,
};
use super::notify::{Notification, NotificationKind, Notifier};
use super::payments::{
    base_refund_key, claim_charge_key, ChargeRequest, PaymentGateway, RefundRequest,
};
use super::resolution::{acceptance_effects, acceptance_money};
use super::sanitizer::SanitizerFlag;
use super::service::{EngineError, QaService, SideEffect};
use super::store::{MarketplaceStore, QuestionChange, RefundRecord};

/// Outcome counts for one expiry sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub released: u64,
    pub refunded: u64,
    pub expired: u64,
    pub failures: u64,
}

/// Outcome counts for one auto-accept pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AutoAcceptReport {
    pub accepted: u64,
    pub failures: u64,
}

enum ExpiryOutcome {
    Released,
    Expired,
    Skipped,
}

impl<S, P, N> QaService<S, P, N>
where
    S: MarketplaceStore,
    P: PaymentGateway,
    N: Notifier,
{
    /// Expert takes the exclusive, time-boxed right to answer. The claim is
    /// the moment money moves: the effective (credit-reduced) price is
    /// charged, and a declined charge rolls the claim back so the question
    /// returns to circulation.
    pub fn claim_question(
        &self,
        id: &QuestionId,
        caller: &UserId,
        now: DateTime<Utc>,
    ) -> Result<Question, EngineError> {
        let question = self.store.question(id)?;
        let Some(profile) = self.store.expert_owned_by(caller)? else {
            return Err(EngineError::Unauthorized);
        };
        if !profile.active {
            return Err(EngineError::Validation("expert profile is inactive".into()));
        }
        if question.asker == profile.owner {
            return Err(EngineError::Validation(
                "cannot claim your own question".into(),
            ));
        }
        match question.mode {
            QuestionMode::Direct => {
                if question.target_expert.as_ref() != Some(&profile.id) {
                    return Err(EngineError::Unauthorized);
                }
            }
            QuestionMode::Pool => {
                if !profile.covers(question.category) {
                    return Err(EngineError::Validation(
                        "question is outside your specialties".into(),
                    ));
                }
            }
        }
        if let Some(parent_id) = &question.parent_question_id {
            let parent = self.store.question(parent_id)?;
            if parent.expert.as_ref() == Some(&profile.id) {
                return Err(EngineError::Validation(
                    "a second opinion needs a different expert".into(),
                ));
            }
        }

        let matched = self.store.update_question(
            id,
            &[QuestionStatus::Open],
            &QuestionChange::Claim {
                expert: profile.id.clone(),
                claimed_at: now,
                claim_expires_at: now + self.config.claim_expiry(),
            },
        )?;
        if !matched {
            return Err(self.precondition_violation(id)?);
        }

        let effective = question.effective_charge_cents();
        if question.payout_status != PayoutStatus::Free && effective > 0 {
            let Some(method) = question.payment_method.as_deref() else {
                self.rollback_claim(id);
                return Err(EngineError::Validation(
                    "question has no payment method on file".into(),
                ));
            };
            let request = ChargeRequest {
                amount_cents: effective,
                customer: &question.asker,
                payment_method: method,
                question: id,
                idempotency_key: claim_charge_key(id),
            };
            match self.payments.charge(&request) {
                Ok(payment_intent_id) => {
                    let recorded = self.store.update_question(
                        id,
                        &[QuestionStatus::Claimed],
                        &QuestionChange::RecordCharge { payment_intent_id },
                    )?;
                    if !recorded {
                        warn!(question = %id.0, "charge landed but claim already released");
                    }
                }
                Err(err) => {
                    self.rollback_claim(id);
                    return Err(EngineError::PaymentDeclined(err.to_string()));
                }
            }
        }

        self.run_effects(vec![SideEffect::Notify(Notification {
            user: question.asker.clone(),
            kind: NotificationKind::QuestionClaimed,
            title: "An expert is on it".to_string(),
            body: "Your question was claimed and will be answered soon".to_string(),
            link: Some(format!("/questions/{}", id.0)),
        })]);

        Ok(self.store.question(id)?)
    }

    /// Expert posts the formal answer. The body passes through the contact
    /// filter like any other free text.
    pub fn answer_question(
        &self,
        id: &QuestionId,
        caller: &UserId,
        body: String,
        now: DateTime<Utc>,
    ) -> Result<Question, EngineError> {
        if body.trim().is_empty() {
            return Err(EngineError::Validation("answer body is empty".into()));
        }
        let question = self.store.question(id)?;
        if self.role_of(&question, caller)? != Role::Expert {
            return Err(EngineError::Unauthorized);
        }
        let sanitized = self.sanitizer.sanitize(&body);
        if sanitized.was_redacted() {
            self.log_contact_attempt(&question, caller, &body, &sanitized.flags, now);
        }
        let matched = self.store.update_question(
            id,
            &[QuestionStatus::Claimed, QuestionStatus::InConversation],
            &QuestionChange::Answer {
                body: sanitized.text,
                answered_at: now,
            },
        )?;
        if !matched {
            return Err(self.precondition_violation(id)?);
        }

        self.run_effects(vec![SideEffect::Notify(Notification {
            user: question.asker.clone(),
            kind: NotificationKind::QuestionAnswered,
            title: "Your question has an answer".to_string(),
            body: "Read it and accept, or keep the conversation going".to_string(),
            link: Some(format!("/questions/{}", id.0)),
        })]);

        Ok(self.store.question(id)?)
    }

    /// Reclaims every lapsed claim. Refund first (idempotent key, so a
    /// concurrent sweep issuing the same refund is harmless), then a single
    /// conditional update per row: direct questions die, pool questions go
    /// back into circulation. A row whose refund fails is left claimed and
    /// picked up again next tick.
    pub fn release_expired_claims(&self, now: DateTime<Utc>) -> Result<SweepReport, EngineError> {
        let rows = self.store.claimed_expiring_before(now)?;
        let mut report = SweepReport::default();
        for question in rows {
            match self.release_one(&question, now) {
                Ok((outcome, refunded)) => {
                    if refunded {
                        report.refunded += 1;
                    }
                    match outcome {
                        ExpiryOutcome::Released => report.released += 1,
                        ExpiryOutcome::Expired => report.expired += 1,
                        ExpiryOutcome::Skipped => {}
                    }
                }
                Err(err) => {
                    report.failures += 1;
                    warn!(question = %question.id.0, error = %err, "expiry sweep row failed");
                }
            }
        }
        info!(
            released = report.released,
            refunded = report.refunded,
            expired = report.expired,
            failures = report.failures,
            "claim expiry sweep finished"
        );
        Ok(report)
    }

    fn release_one(
        &self,
        question: &Question,
        now: DateTime<Utc>,
    ) -> Result<(ExpiryOutcome, bool), EngineError> {
        let mut refund = None;
        if question.payout_status != PayoutStatus::Free {
            if let Some(intent) = &question.payment_intent_id {
                let request = RefundRequest {
                    payment_intent_id: intent,
                    reason: "claim_expired",
                    question: &question.id,
                    idempotency_key: base_refund_key(&question.id),
                };
                let refund_id = self
                    .payments
                    .refund(&request)
                    .map_err(|err| EngineError::PaymentDeclined(err.to_string()))?;
                refund = Some(RefundRecord {
                    refund_id,
                    refunded_at: now,
                });
            }
        }
        let refunded = refund.is_some();

        match question.mode {
            QuestionMode::Direct => {
                let matched = self.store.update_question(
                    &question.id,
                    &[QuestionStatus::Claimed],
                    &QuestionChange::ExpireClaim { refund, at: now },
                )?;
                if !matched {
                    debug!(question = %question.id.0, "row moved on before expiry, skipping");
                    return Ok((ExpiryOutcome::Skipped, refunded));
                }
                if question.credit_applied_cents > 0 {
                    if let Err(err) = restore_credits(
                        self.store.as_ref(),
                        &question.asker,
                        &question.id,
                        question.credit_applied_cents,
                        CreditReason::ClaimExpired,
                        now,
                    ) {
                        warn!(question = %question.id.0, error = %err, "failed to restore credit on expiry");
                    }
                }
                self.run_effects(vec![SideEffect::Notify(Notification {
                    user: question.asker.clone(),
                    kind: NotificationKind::ClaimExpired,
                    title: "Your question expired".to_string(),
                    body: "The expert did not answer in time; you were not charged".to_string(),
                    link: Some(format!("/questions/{}", question.id.0)),
                })]);
                Ok((ExpiryOutcome::Expired, refunded))
            }
            QuestionMode::Pool => {
                let matched = self.store.update_question(
                    &question.id,
                    &[QuestionStatus::Claimed],
                    &QuestionChange::ReleaseClaim { refund },
                )?;
                if !matched {
                    debug!(question = %question.id.0, "row moved on before release, skipping");
                    return Ok((ExpiryOutcome::Skipped, refunded));
                }
                let reopened = self.store.question(&question.id)?;
                let mut effects = self.availability_effects(&reopened);
                effects.push(SideEffect::Notify(Notification {
                    user: question.asker.clone(),
                    kind: NotificationKind::QuestionReopened,
                    title: "Your question is back in the pool".to_string(),
                    body: "The expert did not answer in time; other experts were notified"
                        .to_string(),
                    link: Some(format!("/questions/{}", question.id.0)),
                }));
                self.run_effects(effects);
                Ok((ExpiryOutcome::Released, refunded))
            }
        }
    }

    /// Settles answers that sat unchallenged past the auto-accept window:
    /// no objection is acceptance. Each row is conditioned on still being
    /// `answered`.
    pub fn auto_accept_answered(&self, now: DateTime<Utc>) -> Result<AutoAcceptReport, EngineError> {
        let cutoff = now - self.config.auto_accept_window();
        let rows = self.store.answered_before(cutoff)?;
        let mut report = AutoAcceptReport::default();
        for question in rows {
            match self.auto_accept_one(&question, now) {
                Ok(true) => report.accepted += 1,
                Ok(false) => {}
                Err(err) => {
                    report.failures += 1;
                    warn!(question = %question.id.0, error = %err, "auto-accept row failed");
                }
            }
        }
        info!(
            accepted = report.accepted,
            failures = report.failures,
            "auto-accept sweep finished"
        );
        Ok(report)
    }

    /// Synchronous single-question variant used on read paths, so a stale
    /// `answered` row settles the moment anyone looks at it.
    pub(super) fn check_auto_accept(
        &self,
        question: Question,
        now: DateTime<Utc>,
    ) -> Result<Question, EngineError> {
        let Some(answered_at) = question.answered_at else {
            return Ok(question);
        };
        if now - answered_at < self.config.auto_accept_window() {
            return Ok(question);
        }
        self.auto_accept_one(&question, now)?;
        Ok(self.store.question(&question.id)?)
    }

    fn auto_accept_one(
        &self,
        question: &Question,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let expert = match &question.expert {
            Some(expert_id) => self.store.expert(expert_id).ok(),
            None => None,
        };
        let money = acceptance_money(question, expert.as_ref());
        let (_, failures) = self.execute_money(&question.id, &money, now);
        if failures > 0 {
            warn!(question = %question.id.0, failures, "auto-accept payout left to reconciliation");
        }
        let matched = self.store.update_question(
            &question.id,
            &[QuestionStatus::Answered],
            &QuestionChange::Accept { resolved_at: now },
        )?;
        if !matched {
            debug!(question = %question.id.0, "row moved on before auto-accept, skipping");
            return Ok(false);
        }
        let mut effects = acceptance_effects(question, expert.as_ref());
        effects.push(SideEffect::Notify(Notification {
            user: question.asker.clone(),
            kind: NotificationKind::QuestionAccepted,
            title: "Your question closed automatically".to_string(),
            body: "The answer went unchallenged and was accepted".to_string(),
            link: Some(format!("/questions/{}", question.id.0)),
        }));
        self.run_effects(effects);
        Ok(true)
    }

    /// Records one contact-share attempt with the unredacted original for
    /// moderation review.
    pub(super) fn log_contact_attempt(
        &self,
        question: &Question,
        user: &UserId,
        original: &str,
        flags: &[SanitizerFlag],
        now: DateTime<Utc>,
    ) {
        let mut kinds: Vec<&'static str> = flags.iter().map(|flag| flag.kind.label()).collect();
        kinds.dedup();
        let entry = ActivityEntry {
            kind: ActivityKind::ContactShareAttempt,
            severity: Severity::Low,
            user_id: user.clone(),
            question_id: Some(question.id.clone()),
            counterparty: None,
            description: format!("contact details redacted: {}", kinds.join(", ")),
            original_content: Some(original.to_string()),
            created_at: now,
        };
        if let Err(err) = self.store.append_activity(&entry) {
            warn!(question = %question.id.0, error = %err, "failed to log contact-share attempt");
        }
    }

    pub(super) fn rollback_claim(&self, id: &QuestionId) {
        match self.store.update_question(
            id,
            &[QuestionStatus::Claimed],
            &QuestionChange::ReleaseClaim { refund: None },
        ) {
            Ok(true) => {}
            Ok(false) => warn!(question = %id.0, "claim rollback found row already moved"),
            Err(err) => warn!(question = %id.0, error = %err, "claim rollback failed"),
        }
    }
}
