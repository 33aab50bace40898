// Copyright 2025 Cadence Labs
// SPDX-License-Identifier: Apache-2.0

use cadence_core::{AppConfig, AppState};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initializes the tracing subscriber with structured logging.
///
/// In debug mode, uses pretty console output.
/// In release mode, uses JSON format for machine parsing.
/// Controlled via RUST_LOG environment variable (default: info).
fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("cadence_core=info,warn"));

    #[cfg(not(debug_assertions))]
    {
        let json_layer = fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(json_layer)
            .init();
    }

    #[cfg(debug_assertions)]
    {
        let fmt_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .pretty();

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env();
    tracing::info!(db_path = %config.db_path, "Configuration resolved");

    let state = AppState::new(config).await?;
    state.start().await;
    tracing::info!("Cadence core running; orphan processor started");

    // The HTTP layer mounts on top of AppState in the gateway binary; this
    // process only hosts the background pipeline.
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown signal received");

    state.shutdown().await;
    Ok(())
}
