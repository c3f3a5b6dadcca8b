use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tokio::signal;

use email_template_service::config::Settings;
use email_template_service::dispatch::ReqwestTransport;
use email_template_service::postgres::PostgresPool;
use email_template_service::server::{create_app, AppState};
use email_template_service::store::{create_storage_backend, PostgresStorageBackend};
use email_template_service::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let settings = Settings::new()?;

    // Initialize tracing
    let _telemetry = init_telemetry(&settings.logging, &settings.otel)?;
    tracing::info!(
        storage = %settings.storage.backend,
        provider = %settings.provider.send_url(),
        "Configuration loaded"
    );

    // PostgreSQL pool, only when the postgres backend is selected
    let postgres_pool = if settings.storage.backend == "postgres" {
        let pool = Arc::new(PostgresPool::new(&settings.database).await?);
        if settings.database.run_migrations {
            PostgresStorageBackend::new(pool.pool().clone())
                .ensure_schema()
                .await?;
        }
        Some(pool)
    } else {
        None
    };

    let backend = create_storage_backend(&settings.storage, postgres_pool.clone());
    let transport = Arc::new(ReqwestTransport::from_config(&settings.provider)?);

    // Create application state
    let state = AppState::new(settings.clone(), backend, transport, postgres_pool.clone());
    tracing::info!("Application state initialized");

    // Create Axum app
    let app = create_app(state);

    // Start server
    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler())
        .await?;

    if let Some(pool) = postgres_pool {
        pool.close().await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
