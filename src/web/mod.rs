pub mod analysis;
pub mod graph;
pub mod organizations;

use crate::state::SharedState;
use axum::{routing::get, Router};

async fn health() -> &'static str {
    "OK"
}

pub fn routes(state: SharedState) -> Router {
    Router::new().route("/health", get(health)).nest(
        "/api",
        Router::new()
            .merge(graph::router(state.clone()))
            .merge(analysis::router(state.clone()))
            .merge(organizations::router(state)),
    )
}
