use crate::cli::ServeArgs;
use crate::infra::{seeded_store, AppState};
use crate::routes::with_operational_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use rentwise::config::AppConfig;
use rentwise::error::AppError;
use rentwise::marketplace::{Marketplace, MarketplaceError, MarketplaceState, SimulatedGateway};
use rentwise::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
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

    let store = Arc::new(seeded_store().map_err(MarketplaceError::from)?);
    let gateway = Arc::new(SimulatedGateway::new(
        config.marketplace.settlement_success_rate,
    ));
    let marketplace = Arc::new(Marketplace::new(store, gateway));
    let state = MarketplaceState::new(marketplace, config.marketplace.store_timeout);

    let app = with_operational_routes(state)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        success_rate = config.marketplace.settlement_success_rate,
        "rental marketplace ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
