//! Cliniq HTTP server.
//!
//! Clinic queue ticketing with live topic updates and best-effort push.

use cliniq_core::{Clock, QueueService, SystemClock};
use cliniq_postgres::{connect_pool, PostgresRecordStore, PostgresSubscriptionStore};
use cliniq_push::{HttpPushGateway, PushDispatcher, SubscriptionStore};
use cliniq_server::{build_router, AppState, Config};
use cliniq_web::TopicBroadcaster;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cliniq=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Cliniq HTTP server");

    // Load configuration
    let config = Config::from_env();
    info!(
        database_url = %config.database.url,
        host = %config.server.host,
        port = config.server.port,
        "Configuration loaded"
    );

    // Metrics exporter
    let metrics_addr: SocketAddr =
        format!("{}:{}", config.server.metrics_host, config.server.metrics_port).parse()?;
    PrometheusBuilder::new()
        .with_http_listener(metrics_addr)
        .install()?;
    cliniq_server::metrics::register_business_metrics();
    info!(%metrics_addr, "Prometheus exporter listening");

    // Storage
    info!("Connecting to database...");
    let pool = connect_pool(&config.database.url, config.database.max_connections).await?;
    let record_store = Arc::new(PostgresRecordStore::new(pool.clone()));
    record_store.ensure_schema().await?;
    let subscription_store = Arc::new(PostgresSubscriptionStore::new(pool));
    subscription_store.ensure_schema().await?;
    let subscription_store: Arc<dyn SubscriptionStore> = subscription_store;
    info!("Database connected, schema ensured");

    // Push dispatch
    let delivery_timeout = Duration::from_secs(config.push.delivery_timeout);
    let gateway = Arc::new(HttpPushGateway::new(delivery_timeout)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let dispatcher = Arc::new(
        PushDispatcher::new(
            Arc::clone(&subscription_store),
            gateway,
            Arc::clone(&clock),
        )
        .with_delivery_timeout(delivery_timeout),
    );

    // Live updates + engine
    let broadcaster = TopicBroadcaster::new();
    let service = Arc::new(
        QueueService::new(
            record_store,
            Arc::new(broadcaster.clone()),
            dispatcher,
            Arc::clone(&clock),
        )
        .with_lookahead(config.push.lookahead),
    );

    let state = AppState::new(
        service,
        broadcaster,
        subscription_store,
        clock,
    );
    let app = build_router(state);

    // Serve
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

/// Resolve on ctrl-c or SIGTERM so in-flight requests can drain.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install ctrl-c handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("ctrl-c received, shutting down"),
        () = terminate => info!("SIGTERM received, shutting down"),
    }
}
