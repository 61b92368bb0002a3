use serde::{Deserialize, Serialize};

use super::domain::{AiContext, Category, SkillLevel};

/// Question body length above which the long-form bump applies.
pub const LONG_TEXT_THRESHOLD: usize = 200;
/// Estimated project cost (cents) above which the high-cost bump applies.
pub const HIGH_COST_THRESHOLD_CENTS: i64 = 100_000;

const SAFETY_WARNING_CAP: u8 = 3;
const EXTRA_PHOTO_CAP: u8 = 2;
const BASELINE_PHOTOS: u32 = 2;
const MIN_SCORE: u8 = 1;
const MAX_SCORE: u8 = 10;

/// Human-facing band derived from the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    Standard,
    Complex,
    Specialist,
}

impl DifficultyTier {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Complex => "complex",
            Self::Specialist => "specialist",
        }
    }

    const fn for_score(score: u8) -> Self {
        match score {
            0..=3 => Self::Standard,
            4..=6 => Self::Complex,
            _ => Self::Specialist,
        }
    }
}

/// Result of scoring a question. `factors` names every bump that fired, in
/// scoring order, for display and audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DifficultyRating {
    pub score: u8,
    pub tier: DifficultyTier,
    pub factors: Vec<String>,
}

/// Scores a question from its intake signals. Additive from a base of 1,
/// clamped to 1..=10. Deterministic: equal inputs always produce equal
/// ratings.
pub fn score_question(
    body: &str,
    category: Category,
    photo_count: u32,
    context: Option<&AiContext>,
) -> DifficultyRating {
    let mut score: u8 = MIN_SCORE;
    let mut factors = Vec::new();

    if let Some(ctx) = context {
        if ctx.pro_recommended {
            score = score.saturating_add(3);
            factors.push("professional help recommended".to_string());
        }
        let warning_points = (ctx.safety_warnings.len() as u8).min(SAFETY_WARNING_CAP);
        if warning_points > 0 {
            score = score.saturating_add(warning_points);
            factors.push(format!(
                "{} safety warning(s)",
                ctx.safety_warnings.len()
            ));
        }
    }

    let extra_photos = photo_count.saturating_sub(BASELINE_PHOTOS);
    let photo_points = (extra_photos.min(u32::from(EXTRA_PHOTO_CAP))) as u8;
    if photo_points > 0 {
        score = score.saturating_add(photo_points);
        factors.push(format!("{extra_photos} photo(s) beyond baseline"));
    }

    if category.code_regulated() {
        score = score.saturating_add(1);
        factors.push(format!("{} is a code-regulated trade", category.label()));
    }

    if let Some(ctx) = context {
        match ctx.skill_level {
            Some(SkillLevel::Advanced) => {
                score = score.saturating_add(2);
                factors.push("advanced skill level reported".to_string());
            }
            Some(SkillLevel::Intermediate) => {
                score = score.saturating_add(1);
                factors.push("intermediate skill level reported".to_string());
            }
            Some(SkillLevel::Beginner) | None => {}
        }
        if ctx
            .estimated_cost_cents
            .is_some_and(|cost| cost > HIGH_COST_THRESHOLD_CENTS)
        {
            score = score.saturating_add(1);
            factors.push("high estimated project cost".to_string());
        }
    }

    if body.chars().count() > LONG_TEXT_THRESHOLD {
        score = score.saturating_add(1);
        factors.push("long-form question text".to_string());
    }

    let score = score.clamp(MIN_SCORE, MAX_SCORE);
    DifficultyRating {
        score,
        tier: DifficultyTier::for_score(score),
        factors,
    }
}
