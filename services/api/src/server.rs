use crate::cli::ServeArgs;
use crate::infra::{seed_catalog, AppState, LoggingMailer};
use crate::routes::with_marketplace_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use order_desk::config::AppConfig;
use order_desk::error::AppError;
use order_desk::marketplace::{
    spawn_dispatch_worker, MemoryMarketplace, NotificationQueue, OrderEngine,
};
use order_desk::telemetry;
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

    let store = Arc::new(MemoryMarketplace::new());
    let catalog = seed_catalog(&store)?;
    info!(services = catalog.len(), "service catalog seeded");

    let (notifications, notices) = NotificationQueue::channel();
    let mailer = Arc::new(LoggingMailer::new(config.notifications.clone()));
    let _dispatcher = spawn_dispatch_worker(notices, mailer);

    let engine = Arc::new(OrderEngine::new(
        store.clone(),
        store.clone(),
        store,
        notifications,
        config.marketplace,
    ));

    let app = with_marketplace_routes(engine)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "order desk ready");

    axum::serve(listener, app).await?;
    Ok(())
}
