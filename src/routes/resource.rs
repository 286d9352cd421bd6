//! Resource routes under `/res`.

use crate::handlers::resource::{create, list_resources, read, remove, update};
use crate::state::AppState;
use axum::{routing::get, Router};
use tower_http::limit::RequestBodyLimitLayer;

pub fn resource_routes(state: AppState) -> Router {
    let body_limit = state.settings.body_limit_bytes;
    Router::new()
        .route("/res", get(list_resources))
        .route(
            "/res/:resource",
            get(read).post(create).put(update).delete(remove),
        )
        .route(
            "/res/:resource/*ids",
            get(read).post(create).put(update).delete(remove),
        )
        .layer(RequestBodyLimitLayer::new(body_limit))
        .with_state(state)
}
