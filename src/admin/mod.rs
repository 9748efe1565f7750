//! Operator endpoints.
//!
//! All routes require `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use axum::{middleware, routing::get, Router};

use self::auth::admin_auth_middleware;
use self::handlers::*;
use crate::http::server::AppState;

pub fn setup_admin_router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/processors", get(get_processors))
        .route("/admin/dead-letters", get(get_dead_letters))
        .route_layer(middleware::from_fn_with_state(state, admin_auth_middleware))
}
