use crate::infra::{demo_experts, InMemoryMarketplace, SandboxGateway, TracingNotifier};
use chrono::Utc;
use clap::Args;
use fixwise_core::error::AppError;
use fixwise_core::qa::{
    AiContext, Category, EngineConfig, ExpertId, MessageOutcome, PricingConfig, QaService,
    QuestionQuote, ResolutionAction, SubmitQuestionRequest, UserId,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Price with difficulty bands instead of the flat table.
    #[arg(long)]
    pub(crate) dynamic_pricing: bool,
    /// Stop after the accepted plumbing question and skip the dispute leg.
    #[arg(long)]
    pub(crate) skip_dispute: bool,
}

type DemoService = QaService<InMemoryMarketplace, SandboxGateway, TracingNotifier>;

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        dynamic_pricing,
        skip_dispute,
    } = args;

    let marketplace = Arc::new(InMemoryMarketplace::default());
    for profile in demo_experts() {
        marketplace.register_expert(profile);
    }

    let config = EngineConfig {
        first_question_free: false,
        pricing: PricingConfig {
            dynamic_rollout_percent: if dynamic_pricing { 100 } else { 0 },
            ..PricingConfig::default()
        },
        ..EngineConfig::default()
    };
    let service = QaService::new(
        marketplace.clone(),
        Arc::new(SandboxGateway::default()),
        Arc::new(TracingNotifier),
        config,
    );

    println!("Fixwise marketplace demo");
    println!(
        "Pricing: {}",
        if dynamic_pricing {
            "dynamic difficulty bands"
        } else {
            "flat table"
        }
    );

    let asker = UserId("demo-diy".to_owned());
    accepted_question_walkthrough(&service, &marketplace, &asker)?;

    if skip_dispute {
        return Ok(());
    }

    dispute_walkthrough(&service, &marketplace, &asker)?;
    Ok(())
}

fn accepted_question_walkthrough(
    service: &DemoService,
    marketplace: &InMemoryMarketplace,
    asker: &UserId,
) -> Result<(), AppError> {
    let plumber = UserId("demo-plumber".to_owned());
    let now = Utc::now();

    let receipt = service.submit_question(
        SubmitQuestionRequest {
            asker: asker.clone(),
            body: "Kitchen sink gurgles and drains slowly even after snaking the trap".to_owned(),
            category: Category::Plumbing,
            photo_count: 2,
            ai_context: None,
            target_expert: None,
            payment_method: Some("pm_demo_visa".to_owned()),
            parent_question_id: None,
        },
        now,
    )?;
    let question_id = receipt.question.id.clone();
    println!("\nSubmitted plumbing question {}", question_id.0);
    print_quote(&receipt.quote);

    let claimed = service.claim_question(&question_id, &plumber, now)?;
    println!(
        "- claimed by {} | charge {} | claim expires {}",
        claimed
            .expert
            .as_ref()
            .map(|expert| expert.0.as_str())
            .unwrap_or("?"),
        claimed.payment_intent_id.as_deref().unwrap_or("none"),
        claimed
            .claim_expires_at
            .map(|at| at.to_string())
            .unwrap_or_default()
    );

    service.answer_question(
        &question_id,
        &plumber,
        "The vent is likely clogged; the gurgle is the trap siphoning. Check the roof vent before opening the wall.".to_owned(),
        now,
    )?;
    println!("- answered");

    match service.send_message(
        &question_id,
        asker,
        "Thanks! Can you call me at 555-201-7788 to walk through it?".to_owned(),
        now,
    )? {
        MessageOutcome::Posted(message) => {
            println!(
                "- asker reply stored as: \"{}\" ({} redactions)",
                message.body, message.redaction_count
            );
        }
        MessageOutcome::UpgradeRequired(upgrade) => {
            println!(
                "- conversation gated: tier {} costs {}",
                upgrade.next_tier,
                cents(upgrade.upgrade_cost_cents)
            );
        }
    }

    service.transition(&question_id, &plumber, ResolutionAction::ProposeResolve, now)?;
    let outcome = service.transition(&question_id, asker, ResolutionAction::Accept, now)?;
    println!(
        "- accepted | payout {} | {} released to the expert",
        outcome.question.payout_status.label(),
        cents(outcome.question.expert_payout_cents)
    );

    if let Some(profile) = marketplace.expert_snapshot(&ExpertId("ex-demo-plumber".to_owned())) {
        println!(
            "- plumber record: {} accepted / {} disputed ({:.0}% acceptance)",
            profile.accepted_count,
            profile.disputed_count,
            profile.acceptance_rate * 100.0
        );
    }

    match serde_json::to_string_pretty(&outcome.question.status_view()) {
        Ok(json) => println!("  Public status payload:\n{json}"),
        Err(err) => println!("  Public status payload unavailable: {err}"),
    }

    Ok(())
}

fn dispute_walkthrough(
    service: &DemoService,
    marketplace: &InMemoryMarketplace,
    asker: &UserId,
) -> Result<(), AppError> {
    let electrician = UserId("demo-electrician".to_owned());
    let now = Utc::now();

    println!("\nDispute walkthrough");
    let receipt = service.submit_question(
        SubmitQuestionRequest {
            asker: asker.clone(),
            body: "Subpanel breaker trips whenever the dryer and the EV charger run together"
                .to_owned(),
            category: Category::Electrical,
            photo_count: 3,
            ai_context: Some(AiContext {
                project_summary: "100A subpanel overloads under combined appliance load".to_owned(),
                safety_warnings: vec![
                    "Load calculation required before adding circuits".to_owned()
                ],
                pro_recommended: true,
                skill_level: None,
                estimated_cost_cents: None,
            }),
            target_expert: None,
            payment_method: Some("pm_demo_visa".to_owned()),
            parent_question_id: None,
        },
        now,
    )?;
    let question_id = receipt.question.id.clone();
    println!("Submitted electrical question {}", question_id.0);
    print_quote(&receipt.quote);

    let claimed = service.claim_question(&question_id, &electrician, now)?;
    println!(
        "- claimed by {} | charge {}",
        claimed
            .expert
            .as_ref()
            .map(|expert| expert.0.as_str())
            .unwrap_or("?"),
        claimed.payment_intent_id.as_deref().unwrap_or("none")
    );

    service.answer_question(
        &question_id,
        &electrician,
        "The combined draw exceeds the subpanel's continuous rating. You need a load calculation and likely a feeder upgrade.".to_owned(),
        now,
    )?;
    println!("- answered");

    let outcome = service.transition(&question_id, asker, ResolutionAction::NotHelpful, now)?;
    let question = outcome.question;
    println!(
        "- marked not helpful | status {} | payout {}",
        question.status.label(),
        question.payout_status.label()
    );
    match &question.refund_id {
        Some(refund) => println!(
            "- charge {} refunded as {}",
            question.payment_intent_id.as_deref().unwrap_or("?"),
            refund
        ),
        None => println!("- no external charge to refund"),
    }
    if outcome.payment_failures > 0 {
        println!(
            "- {} payment operations need manual review",
            outcome.payment_failures
        );
    }

    if let Some(profile) =
        marketplace.expert_snapshot(&ExpertId("ex-demo-electrician".to_owned()))
    {
        println!(
            "- electrician record unchanged: {} accepted / {} disputed",
            profile.accepted_count, profile.disputed_count
        );
    }

    Ok(())
}

fn print_quote(quote: &QuestionQuote) {
    println!(
        "- quoted {} via {} pricing | fee {} | expert payout {}",
        cents(quote.price_cents),
        quote.strategy.label(),
        cents(quote.platform_fee_cents),
        cents(quote.expert_payout_cents)
    );
    if let Some(rating) = &quote.difficulty {
        println!(
            "- difficulty {} (score {})",
            rating.tier.label(),
            rating.score
        );
        for factor in &rating.factors {
            println!("    - {factor}");
        }
    }
}

fn cents(value: i64) -> String {
    format!("${}.{:02}", value / 100, value % 100)
}
