pub mod admin;
pub mod auth;
pub mod provinces;
pub mod session;
pub mod stats;
pub mod surveys;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/surveys", surveys::router(state.clone()))
        .nest("/provinces", provinces::router(state.clone()))
        .nest("/admin", admin::router(state.clone()))
        .nest("/stats", stats::router(state))
}
