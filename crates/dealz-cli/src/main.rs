#![forbid(unsafe_code)]

mod config;
mod server;

use std::process;

use anyhow::Context;
use clap::Parser;
use dealz_server::handler::api_routes;
use dealz_server::service::ServiceState;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::Cli;

// Tracing target constants
pub const TRACING_TARGET_SERVER_STARTUP: &str = "dealz_cli::server::startup";
pub const TRACING_TARGET_SERVER_SHUTDOWN: &str = "dealz_cli::server::shutdown";

#[tokio::main]
async fn main() {
    let Err(error) = run().await else {
        tracing::info!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            "application terminated successfully"
        );
        process::exit(0);
    };

    if tracing::enabled!(tracing::Level::ERROR) {
        tracing::error!(
            target: TRACING_TARGET_SERVER_SHUTDOWN,
            error = %error,
            "application terminated with error"
        );
    } else {
        eprintln!("Error: {error:#}");
    }

    process::exit(1);
}

/// Main application entry point.
async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_tracing();

    let service_config = cli
        .service
        .into_service_config()
        .context("invalid service configuration")?;

    // Fails fast on unreachable backing services or a weak signing secret.
    let state = ServiceState::from_config(&service_config)
        .await
        .context("failed to initialize service state")?;

    let router = api_routes(state.clone()).with_state(state);
    let (app, _api) = router.split_for_parts();
    let app = app.layer(TraceLayer::new_for_http());

    server::serve(app, cli.server_address).await
}

/// Initializes the tracing subscriber from `RUST_LOG`.
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dealz_server=debug"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}
