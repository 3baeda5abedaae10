use anyhow::{Context, Result};
use booking::api::{create_router, AppState};
use booking::bus::{EventBus, LocalEventBus, NatsClient};
use booking::config::{BookingConfig, BusBackend, StoreBackend};
use booking::dispatch::DispatchHandler;
use booking::notify::{NatsTopicPublisher, NotificationHandler};
use booking::rule::RuleRunner;
use booking::store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booking=info".into()),
        )
        .init();

    info!("Booking service starting...");

    let config_path = std::env::var("BOOKING_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("booking.toml"));
    let config = BookingConfig::load(&config_path)
        .with_context(|| format!("Invalid configuration ({})", config_path.display()))?;

    let store: Arc<dyn RecordStore> = match config.store.backend {
        StoreBackend::Sqlite => {
            info!(
                path = %config.store.db_path.display(),
                table = %config.table_name(),
                "Opening SQLite record store"
            );
            Arc::new(SqliteRecordStore::open(&config.store.db_path, config.table_name())?)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory record store; records are lost on restart");
            Arc::new(MemoryRecordStore::new())
        }
    };

    match config.bus.backend {
        BusBackend::Nats => {
            let nats = NatsClient::connect(config.bus.nats.clone()).await?;
            let notifier = build_notifier(&config, Some(nats.client().clone())).await?;
            let handler = DispatchHandler::new(store, notifier);
            let runner = Arc::new(RuleRunner::new(config.rule.clone(), handler));

            let jetstream = nats.jetstream().clone();
            let nats_config = nats.config().clone();
            tokio::spawn(async move {
                if let Err(e) = runner.run_jetstream(jetstream, &nats_config).await {
                    error!(error = %e, "Rule runner stopped");
                }
            });

            serve(&config, Arc::new(nats.event_bus())).await
        }
        BusBackend::Local => {
            let bus = LocalEventBus::new(config.bus.local_capacity);
            let notifier = build_notifier(&config, None).await?;
            let handler = DispatchHandler::new(store, notifier);
            let runner = Arc::new(RuleRunner::new(config.rule.clone(), handler));
            tokio::spawn(runner.run_local(bus.subscribe()));

            serve(&config, Arc::new(bus)).await
        }
    }
}

/// Builds the notification handler; connects to NATS for the topic when no
/// client is shared with the event bus.
async fn build_notifier(
    config: &BookingConfig,
    client: Option<async_nats::Client>,
) -> Result<NotificationHandler> {
    let Some(topic) = config.topic_address() else {
        warn!("Notifications disabled, fan-out publishing will be skipped");
        return Ok(NotificationHandler::disabled());
    };

    let client = match client {
        Some(client) => client,
        None => async_nats::connect(&config.bus.nats.url)
            .await
            .context("Failed to connect to NATS for notifications")?,
    };

    info!(topic = %topic, "Notifications enabled");
    Ok(
        NotificationHandler::new(Arc::new(NatsTopicPublisher::new(client)), topic)
            .with_publish_timeout(Duration::from_millis(config.notifications.publish_timeout_ms)),
    )
}

async fn serve(config: &BookingConfig, event_bus: Arc<dyn EventBus>) -> Result<()> {
    let state = AppState::new(event_bus, config.server.body_limit_bytes);
    let app = create_router(state).layer(CorsLayer::permissive());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind_addr))?;
    info!(addr = %config.server.bind_addr, "HTTP server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    Ok(())
}
