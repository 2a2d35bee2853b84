//! HTTP surface of the relay: JSON pin endpoints plus the static front-end.

pub mod routes;
pub mod server;

use crate::relay::Relay;

pub use routes::create_router;
pub use server::run_server;

/// State shared by every request handler, built once at startup.
pub struct AppState<B> {
    pub relay: Relay<B>,
}

impl<B> AppState<B> {
    pub fn new(relay: Relay<B>) -> Self {
        Self { relay }
    }
}
