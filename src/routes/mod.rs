pub mod auth;
pub mod invites;
pub mod messages;
pub mod users;

use axum::{routing::get, Router};

use crate::state::AppState;
use crate::ws;

pub fn api_router() -> Router<AppState> {
    Router::new()
        .merge(auth::router())
        .merge(invites::router())
        .nest("/users", users::router())
        .nest("/messages", messages::router())
        .route("/ws", get(ws::ws_handler))
}
