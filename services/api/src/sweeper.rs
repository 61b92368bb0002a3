use chrono::Utc;
use fixwise_core::qa::{MarketplaceStore, Notifier, PaymentGateway, QaService};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

/// Periodic maintenance loop: releases lapsed claims and auto-accepts
/// answers the asker never acted on. Runs until the process exits; a failed
/// pass is logged and retried on the next tick.
pub(crate) async fn run<S, P, N>(service: Arc<QaService<S, P, N>>, every: Duration)
where
    S: MarketplaceStore + 'static,
    P: PaymentGateway + 'static,
    N: Notifier + 'static,
{
    let mut ticks = tokio::time::interval(every);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; skip it so startup stays quiet.
    ticks.tick().await;

    loop {
        ticks.tick().await;
        let now = Utc::now();

        match service.release_expired_claims(now) {
            Ok(report) if report.released + report.expired + report.failures > 0 => {
                info!(
                    released = report.released,
                    refunded = report.refunded,
                    expired = report.expired,
                    failures = report.failures,
                    "claim expiry sweep finished"
                );
            }
            Ok(_) => {}
            Err(error) => warn!(%error, "claim expiry sweep failed"),
        }

        match service.auto_accept_answered(now) {
            Ok(report) if report.accepted + report.failures > 0 => {
                info!(
                    accepted = report.accepted,
                    failures = report.failures,
                    "auto-accept sweep finished"
                );
            }
            Ok(_) => {}
            Err(error) => warn!(%error, "auto-accept sweep failed"),
        }
    }
}
