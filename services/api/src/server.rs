use crate::cli::ServeArgs;
use crate::infra::{build_service, AppState, STATUS_FEED_CAPACITY};
use crate::routes::with_operational_routes;
use aid_dispatch::config::AppConfig;
use aid_dispatch::error::AppError;
use aid_dispatch::telemetry;
use aid_dispatch::workflows::distribution::{spawn_status_feed, SystemClock};
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let service = build_service(&config.distribution, Arc::new(SystemClock))?;

    let shutdown = CancellationToken::new();
    let (status_sender, status_receiver) = mpsc::channel(STATUS_FEED_CAPACITY);
    let feed = spawn_status_feed(service.clone(), status_receiver, shutdown.child_token());

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
        status_feed: status_sender,
    };

    let app = with_operational_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        agents = config.distribution.agents.len(),
        "aid distribution service ready"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    readiness_flag.store(false, Ordering::Release);
    shutdown.cancel();
    match feed.await {
        Ok(summary) => info!(
            applied = summary.applied,
            rejected = summary.rejected,
            "status feed drained"
        ),
        Err(err) => warn!(error = %err, "status feed task ended abnormally"),
    }

    Ok(())
}

async fn shutdown_signal(shutdown: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(err) = result {
                warn!(error = %err, "failed to listen for ctrl-c");
            }
            info!("shutdown requested");
        }
        _ = shutdown.cancelled() => {}
    }
}
