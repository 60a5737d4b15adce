//! API route definitions
//!
//! Author: hephaex@gmail.com

use crate::auth::middleware::{auth_middleware, optional_auth_middleware};
use crate::handlers::{accounts, auth, entities, health};
use crate::state::AppState;
use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

/// Operational endpoints, outside request metrics
pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::prometheus_metrics))
}

/// Account and entity routes
pub fn api_routes(state: Arc<AppState>) -> Router<Arc<AppState>> {
    // Public routes (no authentication required)
    let public_routes = Router::new()
        .route("/login/", post(auth::login_handler))
        .route("/login/refresh/", post(auth::refresh_handler))
        .route("/register/", post(auth::register_handler))
        .route(
            "/activate-account/:uidb64/:token/",
            get(auth::activate_handler),
        )
        .route("/forgot-password/", post(auth::forgot_password_handler))
        .route(
            "/reset-password/:uidb64/:token/",
            post(auth::reset_password_handler),
        );

    // Anonymous callers allowed, with a reduced view
    let optional_routes = Router::new()
        .route("/entities/", get(entities::list_entities))
        .route("/entities/:id/", get(entities::get_entity))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            optional_auth_middleware,
        ));

    // Protected routes (authentication required)
    let protected_routes = Router::new()
        .route("/logout/", post(auth::logout_handler))
        .route("/change-password/:id/", put(auth::change_password_handler))
        .route("/update-profile/:id/", put(auth::update_profile_handler))
        .route("/users/", get(accounts::list_accounts))
        .route("/users/:id/", get(accounts::get_account))
        .route("/entities/", post(entities::create_entity))
        .route(
            "/entities/:id/",
            put(entities::update_entity).delete(entities::delete_entity),
        )
        .route_layer(middleware::from_fn_with_state(state, auth_middleware));

    Router::new()
        .merge(public_routes)
        .merge(optional_routes)
        .merge(protected_routes)
}
