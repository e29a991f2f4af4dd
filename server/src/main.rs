mod engine;
mod generator;
mod routes;
mod state;
mod worker;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use narrator_common::config::Config;
use tracing::{error, info};

use generator::CaptionGenerator;
use state::AppState;

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    info!(
        host = config.server.host,
        model = %config.engine.model_path.display(),
        projector = %config.engine.projector_path.display(),
        interval_secs = config.captions.interval_secs,
        "starting narrator"
    );

    let state = Arc::new(AppState::new(config.captions.prompt.clone()));

    #[cfg(feature = "llama")]
    let load = {
        let engine_config = config.engine.clone();
        move || engine::llama::LlamaEngine::load(&engine_config)
    };
    #[cfg(not(feature = "llama"))]
    let load = engine::Unavailable::load;

    if let Err(e) = worker::start(
        load,
        CaptionGenerator::new(config.captions.prompt.clone()),
        Arc::clone(&state),
        Duration::from_secs(config.captions.interval_secs),
        config.server.host.clone(),
    )
    .await
    {
        error!(error = %e, "failed to start caption engine");
        std::process::exit(1);
    }

    let app = routes::router(
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr = config.server.host;
    let listener = tokio::net::TcpListener::bind(&addr).await.unwrap_or_else(|e| {
        eprintln!("Failed to bind to {addr}: {e}");
        std::process::exit(1);
    });
    info!(addr, "capturing; point your browser to http://{addr}");
    if let Err(e) = axum::serve(listener, app).await {
        error!(error = %e, "server error");
        std::process::exit(1);
    }
}
