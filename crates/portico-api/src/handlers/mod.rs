//! API handlers
//!
//! Author: hephaex@gmail.com

pub mod accounts;
pub mod auth;
pub mod entities;
pub mod health;

use crate::error::AppError;
use axum::extract::FromRequest;

/// JSON body extractor whose rejections answer as `VALIDATION_ERROR`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ValidatedJson<T>(pub T);
