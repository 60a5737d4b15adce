//! Account lifecycle service
//!
//! Business logic for registration, activation, login, token refresh,
//! password change and reset, profile update and logout. Every operation
//! that acts on an existing account takes the caller's identity explicitly
//! and checks it against the target account.

use super::action_token::{decode_uid, encode_uid};
use super::jwt::{issue_token, validate_token, IssuedToken};
use super::middleware::AuthenticatedUser;
use super::models::{
    AccessResponse, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, RefreshRequest,
    RegisterRequest, ResetPasswordRequest, TokenPairResponse, UpdateProfileRequest,
};
use super::password::{check_new_password, hash_password_with_config, verify_password};
use crate::audit::{audit_log, AuditEvent};
use crate::email::{activation_email, password_reset_email};
use crate::error::AppError;
use crate::state::AppState;
use chrono::Utc;
use portico_core::validation::{validate_email, validate_profile};
use portico_core::{
    Account, AccountId, NewAccount, OutstandingToken, PorticoError, ProfileUpdate, TokenKind,
    UniqueField,
};
use std::sync::Arc;

const BAD_CREDENTIALS: &str = "No active account found with the given credentials";
const NOT_TARGET_ACCOUNT: &str = "You don't have permission for this user.";

/// Account lifecycle service
#[derive(Clone)]
pub struct AccountService {
    state: Arc<AppState>,
    ip_address: Option<String>,
}

impl AccountService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            ip_address: None,
        }
    }

    /// Attach the client address recorded in audit events
    pub fn with_client_ip(mut self, ip_address: Option<String>) -> Self {
        self.ip_address = ip_address;
        self
    }

    /// Register a new, inactive account and email its activation link
    ///
    /// All field problems are collected into one validation error.
    /// Uniqueness of username, email and folded alias is checked before the
    /// insert and enforced again by the store.
    pub async fn register(&self, request: RegisterRequest) -> Result<Account, AppError> {
        let mut errors = validate_profile(&request.username, &request.email, &request.alt_name);
        errors.extend(check_new_password(&request.password, &request.password2));

        if errors.is_empty() {
            let conflicts = self
                .state
                .accounts
                .find_conflicts(&request.username, &request.email, &request.alt_name, None)
                .await?;
            errors.extend(conflicts.into_iter().map(UniqueField::to_field_error));
        }

        if !errors.is_empty() {
            audit_log(&AuditEvent::RegistrationFailure {
                username: request.username.clone(),
                reason: field_names(&errors),
                ip_address: self.ip_address.clone(),
            });
            return Err(AppError::Validation(errors));
        }

        let password_hash = self.hash(request.password).await?;

        let account = self
            .state
            .accounts
            .create_account(NewAccount {
                username: request.username,
                alt_name: request.alt_name,
                email: request.email,
                password_hash,
                is_staff: false,
            })
            .await
            .map_err(|e| match e {
                PorticoError::Conflict { field } => AppError::Validation(vec![field.to_field_error()]),
                other => AppError::Creation(other.to_string()),
            })?;

        audit_log(&AuditEvent::Registration {
            account_id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            ip_address: self.ip_address.clone(),
        });

        let token = self.state.action_tokens.make_token(&account);
        let link = self.state.activation_link(&encode_uid(account.id), &token);
        self.send(activation_email(&account, &link)).await?;

        tracing::info!(account_id = account.id, "Account registered, activation email sent");
        Ok(account)
    }

    /// Activate an account from its emailed link and start a session
    pub async fn activate(&self, uidb64: &str, token: &str) -> Result<TokenPairResponse, AppError> {
        let id = decode_uid(uidb64).ok_or(AppError::InvalidToken)?;

        let account = self
            .state
            .accounts
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account".to_string()))?;

        if !self.state.action_tokens.check_token(&account, token) {
            self.invalid_link("activation token rejected");
            return Err(AppError::InvalidToken);
        }

        let Some(account) = self.state.accounts.activate_account(account.id).await? else {
            self.invalid_link("activation already used");
            return Err(AppError::InvalidToken);
        };

        audit_log(&AuditEvent::Activation {
            account_id: account.id,
            username: account.username.clone(),
            ip_address: self.ip_address.clone(),
        });

        self.issue_session_pair(account.id).await
    }

    /// Exchange credentials of an active account for a session pair
    pub async fn login(&self, request: LoginRequest) -> Result<TokenPairResponse, AppError> {
        let account = self
            .state
            .accounts
            .find_by_username(&request.username)
            .await?;

        let account = match account {
            Some(account) if account.is_active => account,
            Some(_) => return Err(self.login_failed(&request.username, "account inactive")),
            None => return Err(self.login_failed(&request.username, "unknown username")),
        };

        if !self.verify(request.password, account.password_hash.clone()).await? {
            return Err(self.login_failed(&request.username, "invalid password"));
        }

        self.state.accounts.record_login(account.id, Utc::now()).await?;

        audit_log(&AuditEvent::LoginSuccess {
            account_id: account.id,
            username: account.username.clone(),
            ip_address: self.ip_address.clone(),
        });

        self.issue_session_pair(account.id).await
    }

    /// Issue a new access token from a live refresh token
    pub async fn refresh(&self, request: RefreshRequest) -> Result<AccessResponse, AppError> {
        let claims = validate_token(&self.state.jwt, &request.refresh, TokenKind::Refresh)
            .map_err(|e| {
                self.invalid_link(&e.to_string());
                AppError::Unauthorized("Token is invalid or expired".to_string())
            })?;

        if self.state.tokens.is_blacklisted(&claims.jti).await? {
            self.invalid_link("refresh token blacklisted");
            return Err(AppError::Unauthorized("Token is blacklisted".to_string()));
        }

        let account_id = claims
            .account_id()
            .map_err(|_| AppError::Unauthorized("Token is invalid or expired".to_string()))?;

        let active = self
            .state
            .accounts
            .get_account(account_id)
            .await?
            .is_some_and(|account| account.is_active);
        if !active {
            return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
        }

        let access = self.issue(account_id, TokenKind::Access).await?;

        audit_log(&AuditEvent::TokenRefresh {
            account_id,
            ip_address: self.ip_address.clone(),
        });

        Ok(AccessResponse {
            access: access.token,
        })
    }

    /// Change the caller's own password
    pub async fn change_password(
        &self,
        caller: &AuthenticatedUser,
        account_id: AccountId,
        request: ChangePasswordRequest,
    ) -> Result<(), AppError> {
        self.require_target(caller, account_id, "change-password")?;

        if let Some(error) = check_new_password(&request.password, &request.password2) {
            return Err(AppError::Validation(vec![error]));
        }

        let account = self.load(account_id).await?;

        if !self
            .verify(request.old_password, account.password_hash.clone())
            .await?
        {
            return Err(AppError::IncorrectCredential);
        }

        let password_hash = self.hash(request.password).await?;
        self.state
            .accounts
            .set_password(account.id, &password_hash, false)
            .await?;

        audit_log(&AuditEvent::PasswordChange {
            account_id: account.id,
            ip_address: self.ip_address.clone(),
        });

        Ok(())
    }

    /// Replace the caller's username, email and alias together
    pub async fn update_profile(
        &self,
        caller: &AuthenticatedUser,
        account_id: AccountId,
        request: UpdateProfileRequest,
    ) -> Result<Account, AppError> {
        self.require_target(caller, account_id, "update-profile")?;

        let errors = validate_profile(&request.username, &request.email, &request.alt_name);
        if !errors.is_empty() {
            return Err(AppError::Validation(errors));
        }

        self.load(account_id).await?;

        let conflicts = self
            .state
            .accounts
            .find_conflicts(
                &request.username,
                &request.email,
                &request.alt_name,
                Some(account_id),
            )
            .await?;
        if !conflicts.is_empty() {
            return Err(AppError::Validation(
                conflicts.into_iter().map(UniqueField::to_field_error).collect(),
            ));
        }

        let account = self
            .state
            .accounts
            .update_profile(
                account_id,
                &ProfileUpdate {
                    username: request.username,
                    email: request.email,
                    alt_name: request.alt_name,
                },
            )
            .await?;

        audit_log(&AuditEvent::ProfileUpdate {
            account_id: account.id,
            username: account.username.clone(),
            ip_address: self.ip_address.clone(),
        });

        Ok(account)
    }

    /// Email a password reset link to the account holding this address
    pub async fn forgot_password(&self, request: ForgotPasswordRequest) -> Result<(), AppError> {
        if let Some(error) = validate_email(&request.email) {
            return Err(AppError::Validation(vec![error]));
        }

        let account = self
            .state
            .accounts
            .find_by_email(&request.email)
            .await?
            .ok_or_else(|| {
                AppError::field("email", "There is no user registered with this email address.")
            })?;

        let token = self.state.action_tokens.make_token(&account);
        let link = self.state.reset_link(&encode_uid(account.id), &token);
        self.send(password_reset_email(&account, &link)).await?;

        audit_log(&AuditEvent::PasswordResetRequested {
            account_id: account.id,
            email: account.email.clone(),
            ip_address: self.ip_address.clone(),
        });

        Ok(())
    }

    /// Set a new password from an emailed reset link and start a session
    ///
    /// The account is marked active, so a reset also recovers an account
    /// whose activation email was lost.
    pub async fn reset_password(
        &self,
        uidb64: &str,
        token: &str,
        request: ResetPasswordRequest,
    ) -> Result<TokenPairResponse, AppError> {
        let account = match decode_uid(uidb64) {
            Some(id) => self.state.accounts.get_account(id).await?,
            None => None,
        };

        let account = match account {
            Some(account) if self.state.action_tokens.check_token(&account, token) => account,
            _ => {
                self.invalid_link("reset token rejected");
                return Err(AppError::InvalidToken);
            }
        };

        if let Some(error) = check_new_password(&request.password, &request.password2) {
            return Err(AppError::Validation(vec![error]));
        }

        let password_hash = self.hash(request.password).await?;
        let account = self
            .state
            .accounts
            .set_password(account.id, &password_hash, true)
            .await?;

        audit_log(&AuditEvent::PasswordResetCompleted {
            account_id: account.id,
            ip_address: self.ip_address.clone(),
        });

        self.issue_session_pair(account.id).await
    }

    /// Blacklist every outstanding token of the caller
    ///
    /// Returns how many tokens were newly blacklisted. Tokens already on the
    /// blacklist are skipped without error.
    pub async fn logout(&self, caller: &AuthenticatedUser) -> Result<usize, AppError> {
        let purged = self
            .state
            .tokens
            .purge_expired(caller.account_id, Utc::now())
            .await?;
        if purged > 0 {
            tracing::debug!(account_id = caller.account_id, purged, "Purged expired tokens");
        }

        let outstanding = self
            .state
            .tokens
            .list_outstanding(caller.account_id)
            .await?;

        let mut blacklisted = 0;
        for token in &outstanding {
            if self.state.tokens.blacklist(&token.jti).await? {
                blacklisted += 1;
            }
        }

        audit_log(&AuditEvent::Logout {
            account_id: caller.account_id,
            tokens_blacklisted: blacklisted,
            ip_address: self.ip_address.clone(),
        });

        Ok(blacklisted)
    }

    /// All accounts, newest first
    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.state.accounts.list_accounts().await?)
    }

    pub async fn get_account(&self, account_id: AccountId) -> Result<Account, AppError> {
        self.load(account_id).await
    }

    /// Sign a refresh and an access token and record both as outstanding
    pub async fn issue_session_pair(
        &self,
        account_id: AccountId,
    ) -> Result<TokenPairResponse, AppError> {
        let refresh = self.issue(account_id, TokenKind::Refresh).await?;
        let access = self.issue(account_id, TokenKind::Access).await?;

        Ok(TokenPairResponse {
            refresh: refresh.token,
            access: access.token,
        })
    }

    async fn issue(&self, account_id: AccountId, kind: TokenKind) -> Result<IssuedToken, AppError> {
        let issued = issue_token(&self.state.jwt, account_id, kind)
            .map_err(|e| AppError::Internal(format!("Failed to sign {} token: {e}", kind.as_str())))?;

        self.state
            .tokens
            .record_outstanding(OutstandingToken {
                jti: issued.jti.clone(),
                account_id,
                kind,
                expires_at: issued.expires_at,
                created_at: issued.issued_at,
            })
            .await?;

        Ok(issued)
    }

    async fn load(&self, account_id: AccountId) -> Result<Account, AppError> {
        self.state
            .accounts
            .get_account(account_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Account".to_string()))
    }

    fn require_target(
        &self,
        caller: &AuthenticatedUser,
        account_id: AccountId,
        resource: &str,
    ) -> Result<(), AppError> {
        if caller.is(account_id) {
            return Ok(());
        }

        audit_log(&AuditEvent::AccessDenied {
            account_id: caller.account_id,
            resource: format!("{resource}/{account_id}"),
            ip_address: self.ip_address.clone(),
        });
        Err(AppError::Authorization(NOT_TARGET_ACCOUNT.to_string()))
    }

    fn login_failed(&self, username: &str, reason: &str) -> AppError {
        audit_log(&AuditEvent::LoginFailure {
            username: username.to_string(),
            reason: reason.to_string(),
            ip_address: self.ip_address.clone(),
            user_agent: None,
        });
        AppError::Unauthorized(BAD_CREDENTIALS.to_string())
    }

    fn invalid_link(&self, reason: &str) {
        audit_log(&AuditEvent::InvalidToken {
            ip_address: self.ip_address.clone(),
            user_agent: None,
            reason: reason.to_string(),
        });
    }

    async fn send(&self, email: crate::email::OutgoingEmail) -> Result<(), AppError> {
        self.state
            .mailer
            .send(email)
            .await
            .map_err(|e| AppError::Delivery(e.to_string()))
    }

    /// Argon2 is CPU-bound, so hashing runs on the blocking pool
    async fn hash(&self, password: String) -> Result<String, AppError> {
        let config = self.state.password.clone();
        tokio::task::spawn_blocking(move || hash_password_with_config(&password, &config))
            .await
            .map_err(|e| AppError::Internal(format!("Hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, AppError> {
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Verification task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }
}

fn field_names(errors: &[portico_core::FieldError]) -> String {
    errors
        .iter()
        .map(|e| e.field.as_str())
        .collect::<Vec<_>>()
        .join(",")
}
