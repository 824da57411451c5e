use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use conduit_bus::{EventConsumer, EventProducer, HandlerRegistry};
use conduit_context::ContextManager;
use conduit_core::config::ConductorConfig;
use conduit_intent::IntentClassifier;
use conduit_mcp::McpClient;
use conduit_sessions::{RedisSessionStore, SessionStore};
use conduit_state::StateTracker;
use conduit_workflow::WorkflowDriver;
use conduit_ws::Hub;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod app;
mod coordinator;
mod error;
mod handlers;
mod http;
mod response;
mod ws;

use app::AppState;
use coordinator::Coordinator;
use response::TemplatedResponder;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var("CONDUIT_CONFIG").ok();
    let config = ConductorConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        eprintln!("config load failed ({e}), using defaults");
        ConductorConfig::default()
    });

    init_tracing(&config.app.log_level, &config.app.log_format);

    // Store → Context → Classifier/State → MCP → Bus consumer → Bus
    // producer → Hub → Coordinator, per the startup ordering.
    let redis_client = redis::Client::open(config.redis.url())?;
    let redis_conn = redis_client.get_connection_manager().await?;
    let store = Arc::new(RedisSessionStore::new(redis_conn));

    let context = Arc::new(ContextManager::new(store.clone()));
    let classifier = Arc::new(IntentClassifier::new(store.clone(), context.clone()));
    let state = Arc::new(StateTracker::new(store.clone(), context.clone()));

    let mcp = Arc::new(McpClient::new(
        config.mcp.server_url.clone(),
        Duration::from_secs(config.mcp.server_timeout),
    ));

    let registry = Arc::new(HandlerRegistry::new());
    let hub = Arc::new(Hub::new());
    handlers::register_handlers(&registry, context.clone(), hub.clone());

    let bus_consumer = EventConsumer::new(
        &config.kafka.bootstrap_servers,
        &config.kafka.consumer_group,
        &config.kafka.topics,
        registry.clone(),
    )?;
    let bus_producer = Arc::new(EventProducer::new(&config.kafka.bootstrap_servers, "conduit-gateway")?);

    let workflow = Arc::new(WorkflowDriver::new(context.clone(), state.clone(), mcp, bus_producer.clone()));
    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        context,
        classifier,
        state,
        workflow,
        bus_producer,
        Arc::new(TemplatedResponder),
    ));

    let app_state = Arc::new(AppState { coordinator, hub });
    let router = app::build_router(app_state, &config.cors.origins);

    let shutdown = CancellationToken::new();
    let consumer_shutdown = shutdown.clone();
    tokio::spawn(async move { bus_consumer.run(consumer_shutdown).await });

    let cleanup_store = store;
    let cleanup_shutdown = shutdown.clone();
    tokio::spawn(async move { run_cleanup_sweep(cleanup_store, cleanup_shutdown).await });

    let addr: SocketAddr = format!("0.0.0.0:{}", config.app.port).parse()?;
    info!("conduit-gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(wait_for_shutdown_signal(shutdown))
        .await?;

    Ok(())
}

/// Sweeps sessions idle past the TTL out of the active set (§4.A). A
/// best-effort companion to Redis's own key expiry, not a replacement
/// for it.
async fn run_cleanup_sweep(store: Arc<RedisSessionStore>, shutdown: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {
                let cutoff = chrono::Utc::now() - chrono::Duration::seconds(conduit_core::config::DEFAULT_SESSION_TTL_SECS);
                match store.cleanup(cutoff).await {
                    Ok(removed) if removed > 0 => info!(removed, "swept idle sessions"),
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "session cleanup sweep failed"),
                }
            }
        }
    }
}

async fn wait_for_shutdown_signal(token: CancellationToken) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
    token.cancel();
}

fn init_tracing(log_level: &str, log_format: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("conduit_gateway={log_level},tower_http=info")));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
