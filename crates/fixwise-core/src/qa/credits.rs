//! Prepaid credit application.
//!
//! Credits are deducted at submission time, before any external payment call,
//! and the deducted amount rides on the question row (`credit_applied_cents`)
//! for the rest of its life. Restoring credit on dispute, expiry, or
//! cancellation reads that field back, so a deduction is never silently lost
//! between submission and charge.

use chrono::{DateTime, Utc};
use tracing::warn;

use super::domain::{CreditReason, CreditTransaction, QuestionId, UserId};
use super::store::{CreditStore, StoreError};

/// Retries for the deduct loop when a concurrent submission drains the
/// balance between read and write.
const APPLY_ATTEMPTS: usize = 3;

/// Outcome of applying a user's balance against a price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreditApplication {
    pub applied_cents: i64,
    pub remaining_charge_cents: i64,
}

impl CreditApplication {
    pub const fn none(price_cents: i64) -> Self {
        Self {
            applied_cents: 0,
            remaining_charge_cents: price_cents,
        }
    }
}

/// Deducts up to `price_cents` from the user's balance and records the
/// movement against the question. The store rejects overdraws atomically;
/// on contention the balance is re-read and the deduction retried. If the
/// balance cannot be settled after a few attempts the question proceeds
/// with no credit rather than failing submission.
pub fn apply_credits<S>(
    store: &S,
    user: &UserId,
    question: &QuestionId,
    price_cents: i64,
    now: DateTime<Utc>,
) -> Result<CreditApplication, StoreError>
where
    S: CreditStore + ?Sized,
{
    for _ in 0..APPLY_ATTEMPTS {
        let balance = store.credit_balance(user)?;
        let applied = balance.min(price_cents).max(0);
        if applied == 0 {
            return Ok(CreditApplication::none(price_cents));
        }
        let movement = CreditTransaction {
            user_id: user.clone(),
            amount_cents: -applied,
            reason: CreditReason::QuestionPayment,
            question_id: Some(question.clone()),
            created_at: now,
        };
        match store.apply_credit_change(&movement) {
            Ok(_) => {
                return Ok(CreditApplication {
                    applied_cents: applied,
                    remaining_charge_cents: price_cents - applied,
                })
            }
            Err(StoreError::Overdraw) => continue,
            Err(err) => return Err(err),
        }
    }
    warn!(user = %user.0, question = %question.0, "credit deduction contended, proceeding without credit");
    Ok(CreditApplication::none(price_cents))
}

/// Returns a previously applied credit amount to the user's balance.
/// No-op for non-positive amounts.
pub fn restore_credits<S>(
    store: &S,
    user: &UserId,
    question: &QuestionId,
    amount_cents: i64,
    reason: CreditReason,
    now: DateTime<Utc>,
) -> Result<i64, StoreError>
where
    S: CreditStore + ?Sized,
{
    if amount_cents <= 0 {
        return store.credit_balance(user);
    }
    let movement = CreditTransaction {
        user_id: user.clone(),
        amount_cents,
        reason,
        question_id: Some(question.clone()),
        created_at: now,
    };
    store.apply_credit_change(&movement)
}
