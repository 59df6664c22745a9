use axum::Router;
use dotenvy::dotenv;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use eventvote_server::config::Config;
use eventvote_server::routes::create_routes;
use eventvote_server::state::AppState;
use eventvote_server::store::{connect_pool, EventStore};

const DEFAULT_LOG_FILTER: &str = "eventvote_server=info,tower_http=info";

#[tokio::main]
async fn main() {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let config = Config::from_env();

    let pool = connect_pool(&config)
        .await
        .expect("Failed to connect to database");

    tracing::info!(url = %config.database_url, "Successfully connected to database");

    let store = EventStore::new(pool, config.passwordless_delete);
    store.migrate().await.expect("Failed to run migrations");

    tracing::info!(
        passwordless_delete = ?config.passwordless_delete,
        "Migrations run successfully"
    );

    if let Some(path) = &config.legacy_json_path {
        if path.exists() {
            match store.import_legacy_file(path).await {
                Ok(report) => {
                    tracing::info!(?report, path = %path.display(), "Imported legacy events")
                }
                Err(e) => {
                    tracing::error!(error = %e, path = %path.display(), "Legacy import failed")
                }
            }
        } else {
            tracing::warn!(path = %path.display(), "Legacy events file not found, skipping import");
        }
    }

    let app: Router = create_routes(AppState::new(store), &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server running at http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .expect("Failed to bind address");

    axum::serve(listener, app).await.expect("Server failed");
}
