//! Router assembly.

pub mod common;
pub mod resource;

pub use common::common_routes;
pub use resource::resource_routes;

use crate::state::AppState;
use axum::Router;

/// Full application router.
pub fn app(state: AppState) -> Router {
    common_routes().merge(resource_routes(state))
}
