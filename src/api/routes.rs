use axum::{
    http::{header, Method},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use super::handlers::{health_check, open_app, AppState};

/// Router for the open endpoint (`GET` and `POST /`) and `/health`.
///
/// Handlers read the peer address, so serve it with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/", get(open_app).post(open_app))
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}
