//! Axum server setup and startup

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{info, warn};

/// How long in-flight requests may run after the shutdown signal.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Bind on all interfaces and serve `app` until the shutdown signal fires.
pub async fn run_server(
    port: u16,
    app: Router,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<(), std::io::Error> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("Starting http server on {}...", addr);
    serve(listener, app, shutdown_rx, SHUTDOWN_GRACE).await
}

/// Serve on an already bound listener. Stops accepting connections once the
/// shutdown signal fires (or its sender is dropped), then gives in-flight
/// requests `grace` to finish before abandoning them.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    mut shutdown_rx: watch::Receiver<bool>,
    grace: Duration,
) -> Result<(), std::io::Error> {
    let mut signal = shutdown_rx.clone();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = signal.changed().await;
            info!("Http server shutting down");
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result?;
            info!("Stopped http server");
            return Ok(());
        }
        _ = shutdown_rx.changed() => {}
    }

    match tokio::time::timeout(grace, &mut server).await {
        Ok(result) => result?,
        Err(_) => warn!("Requests still running after {:?}, abandoning them", grace),
    }
    info!("Stopped http server");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AppState, create_router, routes::RELAY_PATH};
    use crate::config::HttpConfig;
    use crate::relay::Relay;
    use crate::robot::mock::MockBoard;
    use crate::api::routes::RELAY_STATE_PATH;
    use std::sync::Arc;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    #[tokio::test]
    async fn serves_until_shutdown() {
        let board = MockBoard::new("board-1").with_pin("37", false);
        let state = Arc::new(AppState::new(Relay::new(board, None)));
        let http = HttpConfig {
            port: 0,
            serve_static: false,
            static_dir: None,
            pin_call_timeout: None,
        };
        let app = create_router(Arc::clone(&state), &http);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, app, shutdown_rx, SHUTDOWN_GRACE));

        let body = r#"{"pin_num":37,"pin_state":"high"}"#;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST {RELAY_PATH} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with(r#"{"pin_num":37,"pin_state":"high"}"#), "{response}");
        assert!(state.relay.board().pin("37").is_high());

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server stops after shutdown signal")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_abandons_hung_pin_call() {
        let board = MockBoard::new("board-1").with_slow_pin("9", Duration::from_secs(3600));
        let state = Arc::new(AppState::new(Relay::new(board, None)));
        let http = HttpConfig {
            port: 0,
            serve_static: false,
            static_dir: None,
            pin_call_timeout: None,
        };
        let app = create_router(state, &http);

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = tokio::spawn(serve(listener, app, shutdown_rx, Duration::from_millis(200)));

        let body = r#"{"pin_num":9}"#;
        let mut stream = TcpStream::connect(addr).await.unwrap();
        let request = format!(
            "POST {RELAY_STATE_PATH} HTTP/1.1\r\nHost: localhost\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        shutdown_tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server stops despite the hung request")
            .unwrap()
            .unwrap();
    }
}
