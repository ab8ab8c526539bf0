//! Process entry point: wires the store, the broker, the consumer
//! loop, and the HTTP server.

use std::sync::Arc;

use api::config::Config;
use api::routes::orders::AppState;
use history_store::PostgresHistoryStore;
use sqlx::postgres::PgPoolOptions;
use stream_consumer::{ConsumerConfig, RedisStreamBroker, StreamConsumer, TransitionProcessor};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() {
    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let prometheus_builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    let metrics_handle = prometheus_builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Connect the history store and run migrations
    let config = Config::from_env();
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");
    let store = PostgresHistoryStore::new(pool);
    store.run_migrations().await.expect("migrations failed");

    // 4. Connect the broker and start the consumer loop
    let consumer_config = ConsumerConfig::from_env();
    let broker = RedisStreamBroker::connect(&consumer_config.redis_url)
        .await
        .expect("failed to connect to redis");
    let processor =
        TransitionProcessor::new(store.clone(), consumer_config.origin_services.clone());
    let consumer = StreamConsumer::new(broker, processor, consumer_config);
    let consumer_task = tokio::spawn(consumer.run());

    // 5. Serve the query surface
    let state = Arc::new(AppState { store });
    let app = api::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // In-flight records are safe to abandon: the broker redelivers
    // them to another instance in the group.
    consumer_task.abort();
    tracing::info!("server shut down gracefully");
}
