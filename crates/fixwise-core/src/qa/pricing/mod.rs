//! Quote construction for new questions.
//!
//! Two strategies coexist while difficulty-based pricing rolls out: the
//! legacy flat-by-category table and the difficulty-band table. Which one an
//! asker sees is decided by a stable hash of their id, so repeat visits are
//! consistent. Every quote splits the price into a platform fee and an
//! expert payout that always sum back to the price.

mod config;
mod rollout;

pub use config::{DynamicPricing, FlatPricing, PricingConfig};
pub use rollout::{bucket, enrolled};

use serde::{Deserialize, Serialize};

use super::difficulty::{score_question, DifficultyRating};
use super::domain::{AiContext, Category, SubscriptionTier, UserId};

/// Feature name fed into the rollout hash. Changing it reshuffles buckets,
/// so treat it as frozen.
pub const DYNAMIC_PRICING_FEATURE: &str = "dynamic-pricing";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricingStrategy {
    Flat,
    Dynamic,
}

impl PricingStrategy {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Dynamic => "dynamic",
        }
    }
}

/// Priced breakdown for one question. `difficulty` is present only under the
/// dynamic strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionQuote {
    pub strategy: PricingStrategy,
    pub price_cents: i64,
    pub platform_fee_cents: i64,
    pub expert_payout_cents: i64,
    pub difficulty: Option<DifficultyRating>,
}

/// Everything quoting needs to know about the incoming question.
#[derive(Debug, Clone, Copy)]
pub struct QuoteRequest<'a> {
    pub asker: &'a UserId,
    pub body: &'a str,
    pub category: Category,
    pub photo_count: u32,
    pub context: Option<&'a AiContext>,
    /// Subscription of the targeted expert, when the asker picked one. Pool
    /// questions have no expert yet and get no discount.
    pub expert_subscription: Option<SubscriptionTier>,
}

/// Produces the quote for a question. Deterministic for a given config and
/// request.
pub fn quote_question(config: &PricingConfig, request: QuoteRequest<'_>) -> QuestionQuote {
    let dynamic = enrolled(
        request.asker,
        DYNAMIC_PRICING_FEATURE,
        config.dynamic_rollout_percent,
    );
    if dynamic {
        let rating = score_question(
            request.body,
            request.category,
            request.photo_count,
            request.context,
        );
        let price = config.dynamic.band_price(rating.tier);
        let rate = config.discounted_rate(config.dynamic.fee_rate, request.expert_subscription);
        let (fee, payout) = split_price(price, rate);
        QuestionQuote {
            strategy: PricingStrategy::Dynamic,
            price_cents: price,
            platform_fee_cents: fee,
            expert_payout_cents: payout,
            difficulty: Some(rating),
        }
    } else {
        let price = config.flat.price_for(request.category);
        let rate = config.discounted_rate(config.flat.fee_rate, request.expert_subscription);
        let (fee, payout) = split_price(price, rate);
        QuestionQuote {
            strategy: PricingStrategy::Flat,
            price_cents: price,
            platform_fee_cents: fee,
            expert_payout_cents: payout,
            difficulty: None,
        }
    }
}

/// Splits a price into (fee, payout). The fee is rounded to the nearest
/// cent and the payout is the exact remainder, so the two always sum to the
/// price.
fn split_price(price_cents: i64, fee_rate: f64) -> (i64, i64) {
    let fee = ((price_cents as f64) * fee_rate).round() as i64;
    let fee = fee.clamp(0, price_cents);
    (fee, price_cents - fee)
}
