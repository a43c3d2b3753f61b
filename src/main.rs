use actix_web::{App, HttpServer, web};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod app;
mod model;
mod service;

use app::AppState;
use model::Config;

/// Comment batches can be far larger than actix's 32 KiB JSON default
const JSON_BODY_LIMIT: usize = 16 * 1024 * 1024;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Load .env file if present (ignore if missing)
    let _ = dotenvy::dotenv();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let bind_addr = config.bind_addr();

    let state = match AppState::new(config) {
        Ok(state) => state,
        Err(e) => {
            tracing::error!(error = %e, "Failed to initialize application");
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    let orchestrator = web::Data::from(state.orchestrator);

    tracing::info!("Starting T3C pipeline server on {}", bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(orchestrator.clone())
            .app_data(web::JsonConfig::default().limit(JSON_BODY_LIMIT))
            .configure(api::report::configure)
            .configure(api::health::configure)
            .configure(api::openapi::configure)
    })
    .bind(&bind_addr)?
    .run()
    .await
}
