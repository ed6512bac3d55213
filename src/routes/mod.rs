//! Router assembly.
//!
//! SYSTEM CONTEXT
//! ==============
//! One Axum router binds the session directory (REST), the deck passthrough,
//! and the realtime websocket endpoint. All session mutation flows through
//! the websocket; REST only creates, probes, and closes directory records.

pub mod sessions;
pub mod ws;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/session", post(sessions::create_session))
        .route(
            "/api/session/{hash_id}",
            get(sessions::get_session).delete(sessions::close_session),
        )
        .route("/api/decks/{deck_id}", get(sessions::get_deck))
        .route("/api/ws", get(ws::handle_ws))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}
