//! Account lifecycle API handlers
//!
//! Registration, activation, login, token refresh, password change and
//! reset, profile update and logout.
//!
//! Author: hephaex@gmail.com

use crate::audit::extract_ip_address;
use crate::auth::{
    AccessResponse, AccountService, AuthenticatedUser, ChangePasswordRequest,
    ForgotPasswordRequest, LoginRequest, MessageResponse, RefreshRequest, RegisterRequest,
    RegisterResponse, ResetPasswordRequest, TokenPairResponse, UpdateProfileRequest,
};
use crate::error::AppError;
use crate::handlers::ValidatedJson;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use portico_core::AccountId;
use std::sync::Arc;

fn service(state: Arc<AppState>, headers: &HeaderMap) -> AccountService {
    AccountService::new(state).with_client_ip(extract_ip_address(headers))
}

/// Register a new account
///
/// Creates an inactive account and emails a single activation link.
#[utoipa::path(
    post,
    path = "/register/",
    tag = "auth",
    request_body = RegisterRequest,
    responses(
        (status = 202, description = "Account created, activation email sent", body = RegisterResponse),
        (status = 400, description = "Invalid or conflicting fields", body = crate::error::ApiError),
        (status = 502, description = "Activation email could not be sent", body = crate::error::ApiError),
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let account = service(state, &headers).register(request).await?;

    Ok((StatusCode::ACCEPTED, Json(RegisterResponse::from(&account))))
}

/// Activate an account from its emailed link
#[utoipa::path(
    get,
    path = "/activate-account/{uidb64}/{token}/",
    tag = "auth",
    params(
        ("uidb64" = String, Path, description = "Base64url-encoded account ID"),
        ("token" = String, Path, description = "Activation token"),
    ),
    responses(
        (status = 202, description = "Account activated", body = TokenPairResponse),
        (status = 400, description = "Link is invalid or has expired", body = crate::error::ApiError),
        (status = 404, description = "Account not found", body = crate::error::ApiError),
    )
)]
pub async fn activate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((uidb64, token)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let pair = service(state, &headers).activate(&uidb64, &token).await?;

    Ok((StatusCode::ACCEPTED, Json(pair)))
}

/// Login with username and password
#[utoipa::path(
    post,
    path = "/login/",
    tag = "auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenPairResponse),
        (status = 401, description = "No active account with these credentials", body = crate::error::ApiError),
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<Json<TokenPairResponse>, AppError> {
    Ok(Json(service(state, &headers).login(request).await?))
}

/// Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/login/refresh/",
    tag = "auth",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Access token issued", body = AccessResponse),
        (status = 401, description = "Refresh token invalid, expired or blacklisted", body = crate::error::ApiError),
    )
)]
pub async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<RefreshRequest>,
) -> Result<Json<AccessResponse>, AppError> {
    Ok(Json(service(state, &headers).refresh(request).await?))
}

/// Change the caller's password
#[utoipa::path(
    put,
    path = "/change-password/{id}/",
    tag = "auth",
    params(("id" = i64, Path, description = "Account ID, must be the caller")),
    request_body = ChangePasswordRequest,
    responses(
        (status = 202, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Invalid new password or incorrect old password", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Caller is not this account", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Path(id): Path<AccountId>,
    ValidatedJson(request): ValidatedJson<ChangePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    service(state, &headers)
        .change_password(&user, id, request)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Password updated successfully")),
    ))
}

/// Replace the caller's username, email and alias
#[utoipa::path(
    put,
    path = "/update-profile/{id}/",
    tag = "auth",
    params(("id" = i64, Path, description = "Account ID, must be the caller")),
    request_body = UpdateProfileRequest,
    responses(
        (status = 202, description = "Profile updated", body = MessageResponse),
        (status = 400, description = "Invalid or conflicting fields", body = crate::error::ApiError),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 403, description = "Caller is not this account", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
    Path(id): Path<AccountId>,
    ValidatedJson(request): ValidatedJson<UpdateProfileRequest>,
) -> Result<impl IntoResponse, AppError> {
    service(state, &headers)
        .update_profile(&user, id, request)
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse::new("Profile updated successfully")),
    ))
}

/// Email a password reset link
#[utoipa::path(
    post,
    path = "/forgot-password/",
    tag = "auth",
    request_body = ForgotPasswordRequest,
    responses(
        (status = 200, description = "Reset email sent", body = MessageResponse),
        (status = 400, description = "No account with this email", body = crate::error::ApiError),
        (status = 502, description = "Reset email could not be sent", body = crate::error::ApiError),
    )
)]
pub async fn forgot_password_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    ValidatedJson(request): ValidatedJson<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    service(state, &headers).forgot_password(request).await?;

    Ok(Json(MessageResponse::new(
        "We have sent you a link to reset your password",
    )))
}

/// Set a new password from an emailed reset link
#[utoipa::path(
    post,
    path = "/reset-password/{uidb64}/{token}/",
    tag = "auth",
    params(
        ("uidb64" = String, Path, description = "Base64url-encoded account ID"),
        ("token" = String, Path, description = "Reset token"),
    ),
    request_body = ResetPasswordRequest,
    responses(
        (status = 202, description = "Password reset", body = TokenPairResponse),
        (status = 400, description = "Link invalid or password rejected", body = crate::error::ApiError),
    )
)]
pub async fn reset_password_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path((uidb64, token)): Path<(String, String)>,
    ValidatedJson(request): ValidatedJson<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let pair = service(state, &headers)
        .reset_password(&uidb64, &token, request)
        .await?;

    Ok((StatusCode::ACCEPTED, Json(pair)))
}

/// Logout everywhere
///
/// Blacklists every outstanding token of the caller.
#[utoipa::path(
    post,
    path = "/logout/",
    tag = "auth",
    responses(
        (status = 205, description = "All tokens revoked"),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthenticatedUser>,
    headers: HeaderMap,
) -> Result<StatusCode, AppError> {
    service(state, &headers).logout(&user).await?;

    Ok(StatusCode::RESET_CONTENT)
}
