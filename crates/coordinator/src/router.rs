use axum::routing::get;
use axum::Router;
use secrecy::SecretString;

use crate::state_machine::SessionMachine;

/// Shared state handed to every axum handler. Cheap to clone: `machine`
/// carries only `Arc`-backed fields and `SecretString` clones its backing
/// allocation rather than exposing it.
#[derive(Clone)]
pub struct AppState {
    pub machine: SessionMachine,
    pub jwt_secret: SecretString,
}

/// Builds the Coordinator's HTTP surface: the websocket upgrade endpoint
/// plus the ambient liveness check.
pub fn build(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/ws", get(crate::ws::upgrade))
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
