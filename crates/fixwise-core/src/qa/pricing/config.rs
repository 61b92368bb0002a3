use serde::{Deserialize, Serialize};

use crate::qa::difficulty::DifficultyTier;
use crate::qa::domain::{Category, SubscriptionTier};

/// Price bands and fee rate for difficulty-based pricing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicPricing {
    pub standard_cents: i64,
    pub complex_cents: i64,
    pub specialist_cents: i64,
    pub fee_rate: f64,
}

impl DynamicPricing {
    pub fn band_price(&self, tier: DifficultyTier) -> i64 {
        match tier {
            DifficultyTier::Standard => self.standard_cents,
            DifficultyTier::Complex => self.complex_cents,
            DifficultyTier::Specialist => self.specialist_cents,
        }
    }
}

impl Default for DynamicPricing {
    fn default() -> Self {
        Self {
            standard_cents: 1_500,
            complex_cents: 2_500,
            specialist_cents: 4_500,
            fee_rate: 0.20,
        }
    }
}

/// Legacy category-based pricing, still served to askers outside the
/// difficulty-pricing rollout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlatPricing {
    pub regulated_cents: i64,
    pub general_cents: i64,
    pub fee_rate: f64,
}

impl FlatPricing {
    pub fn price_for(&self, category: Category) -> i64 {
        if category.code_regulated() {
            self.regulated_cents
        } else {
            self.general_cents
        }
    }
}

impl Default for FlatPricing {
    fn default() -> Self {
        Self {
            regulated_cents: 2_900,
            general_cents: 1_900,
            fee_rate: 0.25,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Share of askers (0..=100) bucketed into difficulty-based pricing.
    pub dynamic_rollout_percent: u8,
    pub dynamic: DynamicPricing,
    pub flat: FlatPricing,
    /// Percentage points taken off the platform fee rate per plan.
    pub pro_fee_discount: f64,
    pub premium_fee_discount: f64,
}

impl PricingConfig {
    /// Fee rate after the expert's subscription discount, never below zero.
    pub fn discounted_rate(&self, base: f64, subscription: Option<SubscriptionTier>) -> f64 {
        let discount = match subscription {
            Some(SubscriptionTier::Pro) => self.pro_fee_discount,
            Some(SubscriptionTier::Premium) => self.premium_fee_discount,
            Some(SubscriptionTier::Free) | None => 0.0,
        };
        (base - discount).max(0.0)
    }
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            dynamic_rollout_percent: 50,
            dynamic: DynamicPricing::default(),
            flat: FlatPricing::default(),
            pro_fee_discount: 0.05,
            premium_fee_discount: 0.10,
        }
    }
}
