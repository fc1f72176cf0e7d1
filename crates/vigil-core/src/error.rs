// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Vigil invalidation coordinator.

use thiserror::Error;

/// The primary error type returned by every collaborator trait and core operation.
///
/// The coordinator never lets one of these escape into the host application;
/// each variant maps onto a degradation policy (retry, in-memory fallback,
/// fail-safe decision, or isolated purge step).
#[derive(Debug, Error)]
pub enum VigilError {
    /// Configuration errors (invalid TOML, out-of-range windows, bad table names).
    #[error("configuration error: {0}")]
    Config(String),

    /// Broadcast transport errors (subscribe failed, channel closed, query failed).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Local key/value persistence errors (quota exceeded, database failure).
    #[error("persistence error: {source}")]
    Persistence {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The decision presenter could not reach the operator.
    #[error("presentation unavailable: {0}")]
    Presentation(String),

    /// One purge sub-step failed.
    #[error("side effect `{step}` failed: {message}")]
    SideEffect { step: String, message: String },

    /// Identity provider errors (session lookup or sign-out failed).
    #[error("auth error: {message}")]
    Auth {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl VigilError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a persistence error from any displayable cause.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            source: message.into().into(),
        }
    }
}
