use crate::cli::ServeArgs;
use crate::infra::{
    sample_directory, ApiService, AppState, InMemoryNotificationPublisher,
    InMemoryRequisitionStore, StaticDirectory,
};
use crate::routes::with_procurement_routes;
use award_engine::config::AppConfig;
use award_engine::error::AppError;
use award_engine::telemetry;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
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

    let directory = match args.directory.take() {
        Some(path) => StaticDirectory::from_path(&path)?,
        None => sample_directory(),
    };
    let procurement_service = Arc::new(ApiService::new(
        Arc::new(InMemoryRequisitionStore::default()),
        Arc::new(directory),
        Arc::new(InMemoryNotificationPublisher::default()),
        &config.procurement,
    ));

    let app = with_procurement_routes(procurement_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        review_chain = ?config.procurement.review_chain,
        "award engine ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
