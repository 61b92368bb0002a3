use serde::{Deserialize, Serialize};

/// Message allowances and upgrade costs per conversation tier. Costs are
/// percentages of the question's base price.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierSchedule {
    pub tier_one_messages: u64,
    pub tier_two_messages: u64,
    pub tier_two_cost_pct: u32,
    pub tier_three_cost_pct: u32,
}

impl Default for TierSchedule {
    fn default() -> Self {
        Self {
            tier_one_messages: 5,
            tier_two_messages: 15,
            tier_two_cost_pct: 50,
            tier_three_cost_pct: 100,
        }
    }
}

/// Payload returned when the next message needs an upsell payment first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TierUpgrade {
    pub current_tier: u8,
    pub next_tier: u8,
    pub upgrade_cost_cents: i64,
    pub description: String,
    pub message_count: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TierGateOutcome {
    Open,
    UpgradeRequired(TierUpgrade),
}

impl TierSchedule {
    /// Asker messages allowed at a tier; `None` means unlimited.
    pub fn allowance(&self, tier: u8) -> Option<u64> {
        match tier {
            0 | 1 => Some(self.tier_one_messages),
            2 => Some(self.tier_two_messages),
            _ => None,
        }
    }

    pub fn upgrade_cost_cents(&self, next_tier: u8, price_cents: i64) -> i64 {
        let pct = match next_tier {
            2 => self.tier_two_cost_pct,
            _ => self.tier_three_cost_pct,
        };
        price_cents * i64::from(pct) / 100
    }

    /// Decides whether the asker's next message is accepted or blocked
    /// behind an upgrade. Pure in (tier, message count, price); callers
    /// re-run it after an upgrade payment rather than assuming it passes.
    pub fn evaluate(
        &self,
        current_tier: u8,
        asker_message_count: u64,
        price_cents: i64,
    ) -> TierGateOutcome {
        match self.allowance(current_tier) {
            None => TierGateOutcome::Open,
            Some(allowed) if asker_message_count < allowed => TierGateOutcome::Open,
            Some(_) => {
                let next_tier = current_tier.max(1) + 1;
                let description = if next_tier == 2 {
                    format!(
                        "Tier 2 extends this conversation to {} of your messages",
                        self.tier_two_messages
                    )
                } else {
                    format!("Tier {next_tier} removes the message limit for this conversation")
                };
                TierGateOutcome::UpgradeRequired(TierUpgrade {
                    current_tier,
                    next_tier,
                    upgrade_cost_cents: self.upgrade_cost_cents(next_tier, price_cents),
                    description,
                    message_count: asker_message_count,
                })
            }
        }
    }
}
