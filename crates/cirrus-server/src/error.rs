// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for cirrus-server.
//!
//! [`Error`] covers startup (configuration, connecting, migrating).
//! [`ApiError`] is what request handlers return; it renders the
//! `{"error", "error_msg"}` body with the status matching the failure class.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use cirrus_core::{ControlError, ErrorData};

/// Startup errors.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Configuration loading failed.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Database connection failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Schema migration failed.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type using the startup Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Result type for request handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Request handler errors.
#[derive(Debug)]
pub enum ApiError {
    /// Lifecycle failure.
    Control(ControlError),
    /// The request carries no usable organization scope.
    Unauthorized(String),
    /// Mutations are disabled in demo mode.
    DemoUnavailable,
}

impl ApiError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Control(ControlError::Validation { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Control(ControlError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::Control(ControlError::ReferenceInvalid { .. }) => {
                StatusCode::METHOD_NOT_ALLOWED
            }
            ApiError::Control(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::DemoUnavailable => StatusCode::BAD_REQUEST,
        }
    }

    /// Client-facing payload.
    pub fn to_error_data(&self) -> ErrorData {
        match self {
            ApiError::Control(e) => e.to_error_data(),
            ApiError::Unauthorized(msg) => ErrorData {
                error: "unauthorized".to_string(),
                error_msg: msg.clone(),
            },
            ApiError::DemoUnavailable => ErrorData {
                error: "demo_unavailable".to_string(),
                error_msg: "Not available in demo mode".to_string(),
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error()
            && let ApiError::Control(e) = &self
        {
            error!(error = %e, "Request failed");
        }

        (status, Json(self.to_error_data())).into_response()
    }
}

impl From<ControlError> for ApiError {
    fn from(err: ControlError) -> Self {
        ApiError::Control(err)
    }
}
