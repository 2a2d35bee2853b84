mod api;
mod config;
mod error;
mod pretty;
mod relay;
mod robot;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::AppState;
use crate::pretty::Pretty;
use crate::relay::Relay;
use crate::robot::Board;
use crate::robot::client::RemoteRobot;

#[tokio::main]
async fn main() {
    let dotenv = config::load_dotenv();
    let config = config::Config::from_env();
    let profile = config
        .as_ref()
        .map(|c| c.profile)
        .unwrap_or(config::Profile::Production);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(profile.default_log_filter())),
        )
        .init();

    match dotenv {
        Ok(true) => debug!("Loaded .env file"),
        Ok(false) => debug!("No .env file found, using the process environment"),
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    }

    let config = match config {
        Ok(c) => c,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!(
        "Starting rdk-relay (robot={}, board={}, credentials={}, port={})",
        config.robot.host,
        config.robot.board_name,
        config.robot.credentials.scheme(),
        config.http.port,
    );

    let robot = match RemoteRobot::connect(&config.robot).await {
        Ok(r) => r,
        Err(e) => {
            error!("Error creating robot client: {}", e);
            std::process::exit(1);
        }
    };
    debug!("Robot resources: {}", Pretty(robot.resource_names()));

    let board = match robot.board(&config.robot.board_name) {
        Ok(b) => b,
        Err(e) => {
            error!("Error resolving board: {}", e);
            robot.close().await;
            std::process::exit(1);
        }
    };
    if let Some(dir) = config.http.static_dir.as_ref().filter(|_| config.http.serve_static) {
        if !dir.is_dir() {
            warn!("Static directory {} not found; only the API will answer", dir.display());
        }
    }

    let state = Arc::new(AppState::new(Relay::new(board, config.http.pin_call_timeout)));
    info!("Relaying pins of board {}", state.relay.board().name());
    let app = api::create_router(state, &config.http);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut server = tokio::spawn(api::run_server(config.http.port, app, shutdown_rx));
    info!("Relay server running...");

    let exit_code = tokio::select! {
        result = &mut server => {
            match result {
                Ok(Ok(())) => error!("Http server stopped unexpectedly"),
                Ok(Err(e)) => error!("Error running http server: {}", e),
                Err(e) => error!("Http server task failed: {}", e),
            }
            1
        }
        _ = shutdown_signal() => {
            info!("Termination signal received. Stopping server...");
            if let Err(e) = shutdown_tx.send(true) {
                debug!("Http server already gone: {}", e);
            }
            match server.await {
                Ok(Ok(())) => 0,
                Ok(Err(e)) => {
                    error!("Error stopping http server: {}", e);
                    1
                }
                Err(e) => {
                    error!("Http server task failed: {}", e);
                    1
                }
            }
        }
    };

    robot.close().await;
    info!("rdk-relay stopped");
    std::process::exit(exit_code);
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for SIGINT: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to register SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
