// Copyright 2026 The Rill Project
// SPDX-License-Identifier: Apache-2.0

use clap::Parser;
use rill::config;
use rill::generate::CannedGenerator;
use rill::server;

use std::net::SocketAddr;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "rill", about = "Streaming chat message pipeline server")]
struct Cli {
    /// Path to the rill.yaml config file; defaults apply when omitted
    #[arg(long, env = "RILL_CONFIG")]
    config: Option<String>,

    /// Port to listen on (overrides the config file)
    #[arg(long, env = "RILL_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => {
            let source = config::FileSource {
                path: std::path::PathBuf::from(path),
            };
            match config::load_config(&source) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("failed to load config: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => config::Config::default(),
    };

    let port = cli.port.unwrap_or(config.server.port);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));

    tracing::info!(
        %addr,
        chat_limit = config.limits.chat.max_requests,
        chat_window_ms = config.limits.chat.window_ms,
        pacing_ms = config.producer.pacing_ms,
        "rill starting"
    );

    let state = server::AppState::new(Arc::new(CannedGenerator::new()), &config);
    let app = server::build_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "rill listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
