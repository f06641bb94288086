// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types shared across the auth, fetch and alert layers.

/// Application error type.
///
/// Token-layer errors (`NotAuthenticated`, `TokenRefreshFailed`,
/// `TokenRevoked`) propagate up through the fetch clients so the refresh
/// orchestrators can surface them as the cycle error and wait for the next
/// scheduled tick or an explicit re-authentication.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not authenticated. Please sign in.")]
    NotAuthenticated,

    #[error("Failed to exchange authorization code for tokens")]
    TokenExchangeFailed,

    #[error("Session expired. Please sign in again.")]
    TokenRefreshFailed,

    #[error("Access was revoked. Please sign in again.")]
    TokenRevoked,

    #[error("{0}")]
    Api(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("No data available")]
    NoData,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Token store error: {0}")]
    Store(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// True for errors that mean the user must sign in again before any
    /// further API call can succeed.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            AppError::NotAuthenticated | AppError::TokenRefreshFailed | AppError::TokenRevoked
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Network(err.to_string())
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AppError>;
