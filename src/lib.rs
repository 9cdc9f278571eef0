pub mod auth;
pub mod codec;
pub mod config;
pub mod error;
pub mod hub;
pub mod models;
pub mod routes;
pub mod state;
pub mod store;
pub mod validation;
pub mod ws;

use axum::{routing::get, Router};

use crate::state::AppState;

/// Assemble the full application router around shared state.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api", routes::api_router())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
