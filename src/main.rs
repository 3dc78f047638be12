//! Service entry point: wires the poller, housekeeping sweep and query
//! endpoint together from environment configuration.

use inbox_relay::store::CredentialStore;
use inbox_relay::{http, scheduler, AppConfig, Pipeline, RedisStore, SessionManager};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration, refusing to start");
            return ExitCode::FAILURE;
        }
    };

    info!(
        user = %config.mail.user(),
        imap_host = %config.mail.host,
        http_listen = %config.http_listen,
        "Starting inbox-relay"
    );

    let store: Arc<dyn CredentialStore> = match RedisStore::connect(&config.redis_url).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!(error = %e, "Store connection failed, refusing to start");
            return ExitCode::FAILURE;
        }
    };

    let manager = SessionManager::new(config.mail.clone());
    let pipeline = Arc::new(Pipeline::new(
        Arc::new(manager.clone()),
        Arc::clone(&store),
        config.retry.clone(),
        config.entry_ttl,
    ));

    let lease: scheduler::SessionLease = Arc::new(Mutex::new(()));
    scheduler::spawn_poller(pipeline, Arc::clone(&lease), &config.schedule);
    scheduler::spawn_housekeeping(manager, lease, &config.schedule);

    let listener = match tokio::net::TcpListener::bind(&config.http_listen).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(listen = %config.http_listen, error = %e, "Failed to bind query endpoint");
            return ExitCode::FAILURE;
        }
    };

    info!(listen = %config.http_listen, "Query endpoint listening");

    if let Err(e) = axum::serve(listener, http::router(store)).await {
        error!(error = %e, "Query endpoint terminated");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
