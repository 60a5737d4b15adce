//! Read-only account directory

use crate::auth::{AccountPublic, AccountService};
use crate::error::AppError;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    Json,
};
use portico_core::AccountId;
use std::sync::Arc;

/// List accounts, newest first
#[utoipa::path(
    get,
    path = "/users/",
    tag = "accounts",
    responses(
        (status = 200, description = "All accounts", body = [AccountPublic]),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AccountPublic>>, AppError> {
    let accounts = AccountService::new(state).list_accounts().await?;

    Ok(Json(accounts.into_iter().map(AccountPublic::from).collect()))
}

#[utoipa::path(
    get,
    path = "/users/{id}/",
    tag = "accounts",
    params(("id" = i64, Path, description = "Account ID")),
    responses(
        (status = 200, description = "Account", body = AccountPublic),
        (status = 401, description = "Unauthorized", body = crate::error::ApiError),
        (status = 404, description = "Account not found", body = crate::error::ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    Path(id): Path<AccountId>,
) -> Result<Json<AccountPublic>, AppError> {
    let account = AccountService::new(state).get_account(id).await?;

    Ok(Json(account.into()))
}
