pub mod handlers;
pub mod xml;

use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::root_handler))
        .route("/description.xml", get(handlers::description_handler))
        .route("/ContentDirectory.xml", get(handlers::content_directory_scpd))
        .route("/control/ContentDirectory", post(handlers::content_directory_control))
        .route("/content", get(handlers::serve_content))
        .route("/api/nodes/{id}", get(handlers::api_get_node))
        .route("/api/nodes/{id}/children", get(handlers::api_child_nodes))
        .route("/api/scan", post(handlers::api_scan))
        .with_state(state)
}
