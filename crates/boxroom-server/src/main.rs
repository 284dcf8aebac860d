mod config;
mod live;
mod routes;
mod seed;

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

use boxroom_db::Database;
use boxroom_gateway::{Dispatcher, LocalStore};

use crate::config::Config;
use crate::routes::AppStateInner;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxroom=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Database::open(&config.db_path)?;
    let store = Arc::new(LocalStore::new(db, Dispatcher::new()));

    if config.seed {
        seed::demo_box(&store).await?;
    }

    let app = routes::router(Arc::new(AppStateInner { store }));

    let addr: SocketAddr = config.addr().parse()?;
    info!("Boxroom server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
