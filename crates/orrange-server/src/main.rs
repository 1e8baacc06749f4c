mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use orrange_api::auth::{AppState, AppStateInner};
use orrange_api::ledger::Ledger;
use orrange_api::services::ExternalServices;
use orrange_gateway::dispatcher::Dispatcher;

use crate::config::{Config, DEFAULT_JWT_SECRET};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "orrange=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;
    if config.jwt_secret == DEFAULT_JWT_SECRET {
        warn!("ORRANGE_JWT_SECRET is not set, using the development secret");
    }

    let db = orrange_db::Database::open(&PathBuf::from(&config.db_path))?;

    let state: AppState = Arc::new(AppStateInner {
        db: Arc::new(db),
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: Dispatcher::new(),
        ledger: Ledger::new(),
        services: ExternalServices::new(
            config.recommender_url.clone(),
            config.moderation_url.clone(),
            config.service_timeout,
        ),
        starting_coins: config.starting_coins,
    });

    let app = orrange_api::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Orrange server listening on {}", addr);
    info!("Recommender at {}, moderation at {}", config.recommender_url, config.moderation_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
