use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::AppConfig;
use crate::routes;
use crate::state::AppState;

pub async fn run(config: AppConfig) -> Result<()> {
    let data_path = config.server.data_path();
    let state = AppState::load(&data_path, &config.engine)?;
    info!(
        events = state.store.event_count(),
        data = %data_path.display(),
        "loaded calendar data"
    );

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::events::router())
        .merge(routes::status::router())
        .with_state(state)
        .layer(cors);

    let addr: SocketAddr = config
        .server
        .address
        .parse()
        .with_context(|| format!("Invalid server address: {}", config.server.address))?;
    info!("evcal listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
