use crate::cli::ServeArgs;
use crate::infra::{
    demo_experts, engine_config, AppState, InMemoryMarketplace, SandboxGateway, TracingNotifier,
};
use crate::routes::with_marketplace_routes;
use crate::sweeper;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use fixwise_core::config::AppConfig;
use fixwise_core::error::AppError;
use fixwise_core::qa::QaService;
use fixwise_core::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let marketplace = Arc::new(InMemoryMarketplace::default());
    for profile in demo_experts() {
        marketplace.register_expert(profile);
    }
    let gateway = Arc::new(SandboxGateway::default());
    let notifier = Arc::new(TracingNotifier);
    let service = Arc::new(QaService::new(
        marketplace,
        gateway,
        notifier,
        engine_config(&config.engine),
    ));

    let app = with_marketplace_routes(service.clone())
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    tokio::spawn(sweeper::run(
        service,
        Duration::from_secs(config.engine.sweep_interval_secs),
    ));

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "fixwise transaction engine ready");

    axum::serve(listener, app).await?;
    Ok(())
}
