use crate::qa::difficulty::{score_question, DifficultyTier};
use crate::qa::domain::{AiContext, Category, SkillLevel};

fn context() -> AiContext {
    AiContext {
        project_summary: "Replace a leaking shutoff valve".to_string(),
        safety_warnings: Vec::new(),
        pro_recommended: false,
        skill_level: None,
        estimated_cost_cents: None,
    }
}

#[test]
fn plain_question_scores_the_base() {
    let rating = score_question("Why does my faucet drip?", Category::Landscaping, 0, None);
    assert_eq!(rating.score, 1);
    assert_eq!(rating.tier, DifficultyTier::Standard);
    assert!(rating.factors.is_empty());
}

#[test]
fn pro_recommendation_is_the_heaviest_factor() {
    let ctx = AiContext {
        pro_recommended: true,
        ..context()
    };
    let rating = score_question("Panel upgrade?", Category::Landscaping, 0, Some(&ctx));
    assert_eq!(rating.score, 4);
    assert_eq!(rating.tier, DifficultyTier::Complex);
    assert!(rating
        .factors
        .iter()
        .any(|factor| factor.contains("professional help")));
}

#[test]
fn safety_warnings_cap_at_three_points() {
    let ctx = AiContext {
        safety_warnings: vec![
            "gas line nearby".to_string(),
            "live wiring".to_string(),
            "asbestos possible".to_string(),
            "load-bearing wall".to_string(),
            "lead paint era".to_string(),
        ],
        ..context()
    };
    let rating = score_question("Open this wall?", Category::Landscaping, 0, Some(&ctx));
    assert_eq!(rating.score, 4);
}

#[test]
fn extra_photos_cap_at_two_points() {
    let baseline = score_question("See photos", Category::Landscaping, 2, None);
    assert_eq!(baseline.score, 1);
    let many = score_question("See photos", Category::Landscaping, 9, None);
    assert_eq!(many.score, 3);
}

#[test]
fn code_regulated_trades_score_higher() {
    let general = score_question("Swap this fixture?", Category::Painting, 0, None);
    let regulated = score_question("Swap this fixture?", Category::Electrical, 0, None);
    assert_eq!(regulated.score, general.score + 1);
    assert!(regulated
        .factors
        .iter()
        .any(|factor| factor.contains("code-regulated")));
}

#[test]
fn skill_level_scales_with_ambition() {
    let advanced = AiContext {
        skill_level: Some(SkillLevel::Advanced),
        ..context()
    };
    let intermediate = AiContext {
        skill_level: Some(SkillLevel::Intermediate),
        ..context()
    };
    let beginner = AiContext {
        skill_level: Some(SkillLevel::Beginner),
        ..context()
    };
    assert_eq!(
        score_question("Re-pipe?", Category::Landscaping, 0, Some(&advanced)).score,
        3
    );
    assert_eq!(
        score_question("Re-pipe?", Category::Landscaping, 0, Some(&intermediate)).score,
        2
    );
    assert_eq!(
        score_question("Re-pipe?", Category::Landscaping, 0, Some(&beginner)).score,
        1
    );
}

#[test]
fn high_cost_bump_requires_strictly_more_than_threshold() {
    let at_threshold = AiContext {
        estimated_cost_cents: Some(100_000),
        ..context()
    };
    let above = AiContext {
        estimated_cost_cents: Some(100_001),
        ..context()
    };
    assert_eq!(
        score_question("Full redo", Category::Landscaping, 0, Some(&at_threshold)).score,
        1
    );
    assert_eq!(
        score_question("Full redo", Category::Landscaping, 0, Some(&above)).score,
        2
    );
}

#[test]
fn long_form_text_bumps_once() {
    let short = "a".repeat(200);
    let long = "a".repeat(201);
    assert_eq!(score_question(&short, Category::Landscaping, 0, None).score, 1);
    assert_eq!(score_question(&long, Category::Landscaping, 0, None).score, 2);
}

#[test]
fn score_clamps_at_ten() {
    let ctx = AiContext {
        project_summary: "Gut renovation".to_string(),
        safety_warnings: vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()],
        pro_recommended: true,
        skill_level: Some(SkillLevel::Advanced),
        estimated_cost_cents: Some(5_000_000),
    };
    let body = "x".repeat(500);
    let rating = score_question(&body, Category::Electrical, 10, Some(&ctx));
    assert_eq!(rating.score, 10);
    assert_eq!(rating.tier, DifficultyTier::Specialist);
}

#[test]
fn tier_boundaries_follow_the_band_table() {
    // Base 1 plus two warnings lands exactly on the standard/complex edge.
    let warnings_two = AiContext {
        safety_warnings: vec!["a".to_string(), "b".to_string()],
        ..context()
    };
    let three = score_question("q", Category::Landscaping, 0, Some(&warnings_two));
    assert_eq!((three.score, three.tier), (3, DifficultyTier::Standard));

    let pro = AiContext {
        pro_recommended: true,
        ..context()
    };
    let four = score_question("q", Category::Landscaping, 0, Some(&pro));
    assert_eq!((four.score, four.tier), (4, DifficultyTier::Complex));

    let pro_advanced = AiContext {
        pro_recommended: true,
        skill_level: Some(SkillLevel::Advanced),
        ..context()
    };
    let six = score_question("q", Category::Landscaping, 0, Some(&pro_advanced));
    assert_eq!((six.score, six.tier), (6, DifficultyTier::Complex));

    let pro_warnings = AiContext {
        pro_recommended: true,
        safety_warnings: vec!["a".to_string(), "b".to_string(), "c".to_string()],
        ..context()
    };
    let seven = score_question("q", Category::Landscaping, 0, Some(&pro_warnings));
    assert_eq!((seven.score, seven.tier), (7, DifficultyTier::Specialist));
}

#[test]
fn scoring_is_deterministic() {
    let ctx = AiContext {
        pro_recommended: true,
        skill_level: Some(SkillLevel::Intermediate),
        ..context()
    };
    let first = score_question("Same inputs", Category::Hvac, 4, Some(&ctx));
    let second = score_question("Same inputs", Category::Hvac, 4, Some(&ctx));
    assert_eq!(first, second);
}
