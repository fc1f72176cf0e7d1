// SPDX-FileCopyrightText: 2026 Vigil Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identity provider boundary.

use async_trait::async_trait;

use crate::error::VigilError;
use crate::types::Identity;

#[async_trait]
pub trait AuthProvider: Send + Sync + 'static {
    /// Returns the currently authenticated identity, if any.
    async fn current_session(&self) -> Result<Option<Identity>, VigilError>;

    /// Revokes the local session with the identity provider.
    async fn sign_out(&self) -> Result<(), VigilError>;
}
