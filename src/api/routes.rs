//! API route definitions

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{any, get},
};
use thiserror::Error;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use super::AppState;
use crate::config::HttpConfig;
use crate::error::RelayError;
use crate::relay::{RelayRequest, RelayResponse};
use crate::robot::Board;

pub const RELAY_PATH: &str = "/api/relay";
pub const RELAY_STATE_PATH: &str = "/api/relay/state";

/// Front-end bundled into the binary.
const INDEX_HTML: &str = include_str!("../../public/index.html");

/// Relay endpoints accept any method. With static assets enabled the bundled
/// page answers `/`, or everything else falls through to the configured
/// directory when one is set.
pub fn create_router<B: Board>(state: Arc<AppState<B>>, http: &HttpConfig) -> Router {
    let router = Router::new()
        .route(RELAY_PATH, any(set_pin_state::<B>))
        .route(RELAY_STATE_PATH, any(get_pin_state::<B>))
        .with_state(state);

    let router = match (http.serve_static, &http.static_dir) {
        (false, _) => router,
        (true, Some(dir)) => router.fallback_service(ServeDir::new(dir)),
        (true, None) => router
            .route("/", get(index))
            .route("/index.html", get(index)),
    };

    router.layer(TraceLayer::new_for_http())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

#[derive(Debug, Error)]
enum ApiError {
    #[error("{0}")]
    BadRequest(#[from] serde_json::Error),
    #[error("{0}")]
    Relay(#[from] RelayError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Relay(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}

/// Decode the body regardless of its content type.
fn decode(body: &Bytes) -> Result<RelayRequest, ApiError> {
    let req: RelayRequest = serde_json::from_slice(body).map_err(|e| {
        warn!("Rejected relay request: {}", e);
        ApiError::BadRequest(e)
    })?;
    debug!("Relay request: action={:?} pin={}", req.action, req.pin_num);
    Ok(req)
}

async fn get_pin_state<B: Board>(
    State(state): State<Arc<AppState<B>>>,
    body: Bytes,
) -> Result<Json<RelayResponse>, ApiError> {
    let req = decode(&body)?;
    let extra = req.extra.unwrap_or_default();

    match state.relay.get_pin_state(req.pin_num, &extra).await {
        Ok(pin_state) => {
            debug!("Pin {} is {}", req.pin_num, pin_state);
            Ok(Json(RelayResponse {
                pin_num: req.pin_num,
                pin_state,
            }))
        }
        Err(e) => {
            error!("Error getting pin {} state: {}", req.pin_num, e);
            Err(e.into())
        }
    }
}

async fn set_pin_state<B: Board>(
    State(state): State<Arc<AppState<B>>>,
    body: Bytes,
) -> Result<Json<RelayResponse>, ApiError> {
    let req = decode(&body)?;
    let extra = req.extra.unwrap_or_default();
    let requested = req.pin_state.as_deref().unwrap_or_default();

    match state.relay.set_pin_state(req.pin_num, requested, &extra).await {
        Ok(pin_state) => {
            info!("Set pin {} {}", req.pin_num, pin_state);
            Ok(Json(RelayResponse {
                pin_num: req.pin_num,
                pin_state,
            }))
        }
        Err(e) => {
            error!("Error setting pin {} state: {}", req.pin_num, e);
            Err(e.into())
        }
    }
}
