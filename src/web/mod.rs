pub mod admin;
pub mod events;
pub mod questions;
pub mod slots;
pub mod users;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/slots", slots::router(state.clone()))
        .nest("/questions", questions::router(state.clone()))
        .nest("/users", users::router(state.clone()))
        .nest("/admin", admin::router(state.clone()))
        .nest("/events", events::router(state))
}
