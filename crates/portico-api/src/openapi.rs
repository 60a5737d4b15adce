//! OpenAPI document

use crate::auth::models::{
    AccessResponse, AccountPublic, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    MessageResponse, RefreshRequest, RegisterRequest, RegisterResponse, ResetPasswordRequest,
    TokenPairResponse, UpdateProfileRequest,
};
use crate::entities::{
    CreateEntityRequest, EntityDetail, EntitySummary, EntityView, UpdateEntityRequest,
};
use crate::error::{ApiError, FieldErrorBody};
use crate::handlers::{accounts, auth, entities, health};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

/// Bearer JWT scheme referenced by protected paths
struct BearerAuthAddon;

impl Modify for BearerAuthAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::register_handler,
        auth::activate_handler,
        auth::login_handler,
        auth::refresh_handler,
        auth::change_password_handler,
        auth::update_profile_handler,
        auth::forgot_password_handler,
        auth::reset_password_handler,
        auth::logout_handler,
        accounts::list_accounts,
        accounts::get_account,
        entities::list_entities,
        entities::get_entity,
        entities::create_entity,
        entities::update_entity,
        entities::delete_entity,
        health::health_check,
        health::readiness_check,
        health::prometheus_metrics,
    ),
    components(schemas(
        ApiError,
        FieldErrorBody,
        RegisterRequest,
        RegisterResponse,
        LoginRequest,
        TokenPairResponse,
        RefreshRequest,
        AccessResponse,
        ChangePasswordRequest,
        UpdateProfileRequest,
        ForgotPasswordRequest,
        ResetPasswordRequest,
        MessageResponse,
        AccountPublic,
        CreateEntityRequest,
        UpdateEntityRequest,
        EntityDetail,
        EntitySummary,
        EntityView,
        health::HealthResponse,
        health::ReadinessResponse,
        health::ReadinessChecks,
    )),
    modifiers(&BearerAuthAddon),
    tags(
        (name = "auth", description = "Registration, activation, sessions and passwords"),
        (name = "accounts", description = "Read-only account directory"),
        (name = "entities", description = "Entities ordered by view count"),
        (name = "health", description = "Liveness, readiness and metrics"),
    )
)]
pub struct ApiDoc;
