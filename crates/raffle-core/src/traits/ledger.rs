// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait for the external user-registry / purchase-ledger service.

use async_trait::async_trait;

use crate::error::RaffleError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{Registration, RegistrationRequest, UserValidation, ValidationRequest};

/// Client of the external service that knows registered users and assigns
/// raffle numbers to approved purchases.
#[async_trait]
pub trait UserLedger: PluginAdapter {
    /// Checks whether a user may interact with the bot.
    ///
    /// Never returns `Err`: transport failures become an invalid validation.
    async fn validate_user(&self, request: ValidationRequest) -> UserValidation;

    /// Registers an approved purchase and returns the assigned numbers.
    ///
    /// An unknown buyer is reported as [`RaffleError::UserNotRegistered`].
    async fn register_purchase(
        &self,
        request: RegistrationRequest,
    ) -> Result<Registration, RaffleError>;
}
