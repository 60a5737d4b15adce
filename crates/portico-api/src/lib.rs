//! Portico API - REST server for accounts and entities
//!
//! Provides registration with email activation, JWT sessions, password
//! change and reset, profile updates, and entity CRUD.
//!
//! Author: hephaex@gmail.com

pub mod audit;
pub mod auth;
pub mod email;
pub mod entities;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::{
    http::{header, HeaderValue, Method},
    middleware as axum_middleware, Router,
};
use portico_core::config::{LoggingConfig, ServerConfig};
use state::AppState;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Build the application router with all endpoints and middleware
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = create_cors_layer(&state.config.server);

    Router::new()
        .merge(routes::api_routes(state.clone()))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::metrics_middleware,
        ))
        .merge(routes::health_routes())
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi::ApiDoc::openapi()))
        .layer(axum_middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// CORS layer allowing the configured origins
///
/// Origins that are not valid header values are skipped with a warning.
fn create_cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(origin = %origin, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_tracing(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!(
            "portico_api={level},portico_core={level},audit={level},tower_http=debug",
            level = config.level
        )
        .into()
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.json_format {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Router wiring used by integration tests
#[cfg(feature = "test-utils")]
pub mod testing {
    use super::*;
    use crate::auth::password::PasswordConfig;
    use crate::email::MemoryMailer;
    use crate::state::Stores;
    use portico_core::config::AppConfig;

    /// Router plus handles on its state and outbox
    pub struct TestContext {
        pub router: Router,
        pub state: Arc<AppState>,
        pub mailer: Arc<MemoryMailer>,
    }

    impl TestContext {
        pub fn new() -> Self {
            Self::with_config(AppConfig::default())
        }

        /// In-memory stores, recording mailer and cheap password hashing
        pub fn with_config(config: AppConfig) -> Self {
            let mailer = Arc::new(MemoryMailer::new());
            let state = AppState::new(config, Stores::memory(), mailer.clone())
                .map(|state| state.with_password_config(PasswordConfig::minimal()))
                .unwrap_or_else(|e| panic!("test state: {e}"));
            let state = Arc::new(state);

            Self {
                router: create_router(state.clone()),
                state,
                mailer,
            }
        }
    }

    impl Default for TestContext {
        fn default() -> Self {
            Self::new()
        }
    }
}

/// Router over in-memory stores, for tests that need no state handles
#[cfg(feature = "test-utils")]
pub fn create_router_for_testing() -> Router {
    testing::TestContext::new().router
}
