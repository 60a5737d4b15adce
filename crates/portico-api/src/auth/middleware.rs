/// Authentication middleware for protecting routes
///
/// Extracts the bearer access token, validates it against the signing
/// configuration in [`AppState`], rejects blacklisted tokens and inactive
/// accounts, and adds the caller's identity to request extensions.
use super::jwt::{validate_token, JwtError};
use crate::audit::{audit_log, extract_ip_address, extract_user_agent, AuditEvent};
use crate::error::ApiError;
use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use portico_core::{AccountId, TokenKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Caller identity established by [`auth_middleware`]
///
/// Extract in handlers with `Extension<AuthenticatedUser>`, or
/// `Option<Extension<AuthenticatedUser>>` behind [`optional_auth_middleware`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthenticatedUser {
    pub account_id: AccountId,
    pub username: String,
    /// JWT ID of the presented access token
    pub jti: String,
}

impl AuthenticatedUser {
    /// Whether the caller is the given account
    pub fn is(&self, account_id: AccountId) -> bool {
        self.account_id == account_id
    }
}

/// Authentication middleware errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    #[error("Invalid Authorization header format")]
    InvalidAuthHeader,

    #[error("Invalid token: {0}")]
    InvalidToken(#[from] JwtError),

    #[error("Token has been revoked")]
    TokenRevoked,

    #[error("Account is missing or inactive")]
    InactiveAccount,

    #[error("Token store unavailable: {0}")]
    StoreUnavailable(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, details) = match &self {
            AuthError::MissingAuthHeader => {
                (StatusCode::UNAUTHORIZED, "Missing Authorization header")
            }
            AuthError::InvalidAuthHeader => (
                StatusCode::UNAUTHORIZED,
                "Invalid Authorization header format",
            ),
            AuthError::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "Invalid or expired token"),
            AuthError::TokenRevoked => (StatusCode::UNAUTHORIZED, "Token has been revoked"),
            AuthError::InactiveAccount => {
                (StatusCode::UNAUTHORIZED, "Account is missing or inactive")
            }
            AuthError::StoreUnavailable(cause) => {
                tracing::error!(cause = %cause, "Token check failed");
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ApiError::internal_error()),
                )
                    .into_response();
            }
        };

        (status, Json(ApiError::unauthorized().with_details(details))).into_response()
    }
}

/// Resolve the caller from the request headers
async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthenticatedUser, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingAuthHeader)?
        .to_str()
        .map_err(|_| AuthError::InvalidAuthHeader)?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or(AuthError::InvalidAuthHeader)?;

    let claims = validate_token(&state.jwt, token, TokenKind::Access)?;

    if state
        .tokens
        .is_blacklisted(&claims.jti)
        .await
        .map_err(|e| AuthError::StoreUnavailable(e.to_string()))?
    {
        return Err(AuthError::TokenRevoked);
    }

    let account = state
        .accounts
        .get_account(claims.account_id()?)
        .await
        .map_err(|e| AuthError::StoreUnavailable(e.to_string()))?
        .filter(|account| account.is_active)
        .ok_or(AuthError::InactiveAccount)?;

    Ok(AuthenticatedUser {
        account_id: account.id,
        username: account.username,
        jti: claims.jti,
    })
}

/// Authentication middleware that requires a valid access token
///
/// # Usage
///
/// ```ignore
/// use axum::{middleware, routing::post, Router};
/// use portico_api::auth::middleware::auth_middleware;
///
/// let app = Router::new()
///     .route("/logout/", post(logout_handler))
///     .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));
/// ```
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AuthError> {
    match authenticate(&state, request.headers()).await {
        Ok(user) => {
            request.extensions_mut().insert(user);
            Ok(next.run(request).await)
        }
        Err(e) => {
            if matches!(
                e,
                AuthError::InvalidToken(_) | AuthError::TokenRevoked | AuthError::InactiveAccount
            ) {
                audit_log(&AuditEvent::InvalidToken {
                    ip_address: extract_ip_address(request.headers()),
                    user_agent: extract_user_agent(request.headers()),
                    reason: e.to_string(),
                });
            }
            Err(e)
        }
    }
}

/// Optional authentication middleware
///
/// Never rejects the request. The caller is added to extensions only when
/// a valid, non-revoked access token for an active account is present.
pub async fn optional_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    if request.headers().contains_key(header::AUTHORIZATION) {
        match authenticate(&state, request.headers()).await {
            Ok(user) => {
                request.extensions_mut().insert(user);
            }
            Err(e) => tracing::debug!(error = %e, "Ignoring credentials on optional route"),
        }
    }

    next.run(request).await
}
