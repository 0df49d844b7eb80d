use anyhow::Result;
use tracing::info;

use onco_registry_api::{app, config, jobs, middleware, services};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let config = config::Config::load()?;

    // Initialize logging
    middleware::logging::init_logging(&config.logging);

    info!("Starting Onco Registry API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize Prometheus metrics recorder
    middleware::metrics::init_metrics();

    // Create database pool
    let db_config = persistence::db::DatabaseConfig {
        url: config.database.url.clone(),
        max_connections: config.database.max_connections,
        min_connections: config.database.min_connections,
        connect_timeout_secs: config.database.connect_timeout_secs,
        idle_timeout_secs: config.database.idle_timeout_secs,
    };
    let pool = persistence::db::create_pool(&db_config).await?;

    // Run migrations
    info!("Running database migrations...");
    sqlx::migrate!("../persistence/src/migrations")
        .run(&pool)
        .await?;
    info!("Migrations completed");

    // Cancellation flags shared between the HTTP layer and the import runner
    let cancel_registry = services::CancelRegistry::new();

    // Start background jobs
    let mut scheduler = jobs::JobScheduler::new();
    scheduler.register(jobs::ImportProcessingJob::new(
        pool.clone(),
        config.imports.poll_batch_size,
        config.imports.poll_interval_secs,
        cancel_registry.clone(),
        services::ImportRunnerConfig::from(&config.imports),
    ));
    scheduler.register(jobs::PoolMetricsJob::new(pool.clone()));
    scheduler.start();

    // Build application
    let app = app::create_app(config.clone(), pool, cancel_registry);

    // Start server
    let addr = config.socket_addr();
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain background jobs before exiting
    scheduler.shutdown();
    scheduler
        .wait_for_shutdown(std::time::Duration::from_secs(30))
        .await;

    info!("Onco Registry API exited");
    Ok(())
}

async fn shutdown_signal() {
    use tokio::signal;

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = signal::ctrl_c() => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
