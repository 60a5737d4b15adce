//! Authentication and account lifecycle
//!
//! - Session tokens (JWT access/refresh pairs)
//! - Action tokens for activation and password reset links
//! - Password hashing with Argon2id
//! - Middleware establishing the caller's identity
//! - Account service implementing the lifecycle operations

pub mod action_token;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod service;

pub use action_token::{decode_uid, encode_uid, ActionTokenGenerator};
pub use jwt::{issue_token, validate_token, Claims, JwtConfig, JwtError};
pub use middleware::{auth_middleware, optional_auth_middleware, AuthError, AuthenticatedUser};
pub use models::{
    AccessResponse, AccountPublic, ChangePasswordRequest, ForgotPasswordRequest, LoginRequest,
    MessageResponse, RefreshRequest, RegisterRequest, RegisterResponse, ResetPasswordRequest,
    TokenPairResponse, UpdateProfileRequest,
};
pub use password::{hash_password, validate_password_strength, verify_password, PasswordConfig};
pub use service::AccountService;
