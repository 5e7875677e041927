//! HTTP router assembly.

use std::sync::Arc;

use axum::{Router, middleware, routing::get};
use tower_http::trace::TraceLayer;

use crate::auth::{self, AppState, CALLBACK_PATH};

/// Builds the application router over `state`.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route(CALLBACK_PATH, get(auth::callback))
        .route("/stan-easy-connect/login", get(auth::login))
        .route("/stan-easy-connect/logout", get(auth::logout))
        .route("/stan-easy-connect/session", get(auth::session_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::verify_token_validity,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
