//! External payment processor boundary.
//!
//! The sweep and retried requests can invoke the same logical payment more
//! than once, so every call carries an idempotency key derived from the
//! question id. Transfers additionally carry a transfer group so repeated
//! payout attempts trace back to one logical payout.

use thiserror::Error;

use super::domain::{QuestionId, UserId};

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("payment declined: {0}")]
    Declined(String),
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone)]
pub struct ChargeRequest<'a> {
    pub amount_cents: i64,
    pub customer: &'a UserId,
    pub payment_method: &'a str,
    pub question: &'a QuestionId,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct RefundRequest<'a> {
    pub payment_intent_id: &'a str,
    pub reason: &'a str,
    pub question: &'a QuestionId,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct TransferRequest<'a> {
    pub amount_cents: i64,
    pub destination_account: &'a str,
    pub question: &'a QuestionId,
    pub transfer_group: String,
    pub idempotency_key: String,
}

/// Opaque external processor. Implementations return the processor-side
/// reference id for each successful call.
pub trait PaymentGateway: Send + Sync {
    fn charge(&self, request: &ChargeRequest<'_>) -> Result<String, PaymentError>;
    fn refund(&self, request: &RefundRequest<'_>) -> Result<String, PaymentError>;
    fn transfer(&self, request: &TransferRequest<'_>) -> Result<String, PaymentError>;
}

pub fn claim_charge_key(question: &QuestionId) -> String {
    format!("charge-{}", question.0)
}

pub fn tier_charge_key(question: &QuestionId, tier: u8) -> String {
    format!("tier{tier}-charge-{}", question.0)
}

pub fn base_refund_key(question: &QuestionId) -> String {
    format!("refund-{}", question.0)
}

pub fn tier_refund_key(question: &QuestionId, tier: u8) -> String {
    format!("tier{tier}-refund-{}", question.0)
}

pub fn payout_key(question: &QuestionId) -> String {
    format!("payout-{}", question.0)
}

pub fn transfer_group(question: &QuestionId) -> String {
    format!("question-{}", question.0)
}
