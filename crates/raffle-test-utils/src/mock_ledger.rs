// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock user ledger with scripted answers and recorded calls.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use raffle_core::RaffleError;
use raffle_core::traits::{PluginAdapter, UserLedger};
use raffle_core::types::{
    AdapterType, HealthStatus, Registration, RegistrationRequest, UserValidation,
    ValidationRequest,
};

#[derive(Debug, Clone)]
enum RegistrationScript {
    Succeed(Registration),
    UserNotFound(String),
    Fail(String),
}

/// A mock ledger for testing.
///
/// By default every user validates with purchases allowed, and every
/// registration succeeds with no numbers assigned.
pub struct MockLedger {
    validation: Mutex<UserValidation>,
    registration: Mutex<RegistrationScript>,
    validation_calls: Mutex<Vec<ValidationRequest>>,
    registration_calls: Mutex<Vec<RegistrationRequest>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            validation: Mutex::new(UserValidation::confirmed(None, true)),
            registration: Mutex::new(RegistrationScript::Succeed(Registration::default())),
            validation_calls: Mutex::new(Vec::new()),
            registration_calls: Mutex::new(Vec::new()),
        }
    }

    /// Answer every following validation with `validation`.
    pub fn set_validation(&self, validation: UserValidation) {
        *guard(&self.validation) = validation;
    }

    pub fn set_registration(&self, registration: Registration) {
        *guard(&self.registration) = RegistrationScript::Succeed(registration);
    }

    /// Fail registrations with [`RaffleError::UserNotRegistered`].
    pub fn set_user_not_found(&self, message: &str) {
        *guard(&self.registration) = RegistrationScript::UserNotFound(message.to_string());
    }

    /// Fail registrations with a generic ledger error.
    pub fn set_registration_error(&self, message: &str) {
        *guard(&self.registration) = RegistrationScript::Fail(message.to_string());
    }

    pub fn validation_calls(&self) -> usize {
        guard(&self.validation_calls).len()
    }

    pub fn validation_requests(&self) -> Vec<ValidationRequest> {
        guard(&self.validation_calls).clone()
    }

    pub fn registration_calls(&self) -> Vec<RegistrationRequest> {
        guard(&self.registration_calls).clone()
    }
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockLedger {
    fn name(&self) -> &str {
        "mock-ledger"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Ledger
    }

    async fn health_check(&self) -> Result<HealthStatus, RaffleError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RaffleError> {
        Ok(())
    }
}

#[async_trait]
impl UserLedger for MockLedger {
    async fn validate_user(&self, request: ValidationRequest) -> UserValidation {
        guard(&self.validation_calls).push(request);
        guard(&self.validation).clone()
    }

    async fn register_purchase(
        &self,
        request: RegistrationRequest,
    ) -> Result<Registration, RaffleError> {
        guard(&self.registration_calls).push(request);
        let script = guard(&self.registration).clone();
        match script {
            RegistrationScript::Succeed(registration) => Ok(registration),
            RegistrationScript::UserNotFound(message) => {
                Err(RaffleError::UserNotRegistered { message })
            }
            RegistrationScript::Fail(message) => Err(RaffleError::Ledger {
                message,
                source: None,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration_request() -> RegistrationRequest {
        RegistrationRequest {
            number: "3001234567".into(),
            raffle_id: 1,
            quantity: 1,
            amount: 1_000,
            purchase_id: "purchase_1_a".into(),
        }
    }

    #[tokio::test]
    async fn validates_by_default_and_records_calls() {
        let ledger = MockLedger::new();
        let validation = ledger
            .validate_user(ValidationRequest {
                number: "3001234567".into(),
                raffle_id: 1,
                text: "hi".into(),
                is_purchase: false,
                purchase_data: None,
            })
            .await;
        assert!(validation.valid);
        assert!(validation.purchase_allowed);
        assert_eq!(ledger.validation_calls(), 1);
    }

    #[tokio::test]
    async fn scripted_registration_failures() {
        let ledger = MockLedger::new();
        ledger.set_user_not_found("user not found");
        assert!(matches!(
            ledger.register_purchase(registration_request()).await,
            Err(RaffleError::UserNotRegistered { .. })
        ));

        ledger.set_registration_error("boom");
        assert!(matches!(
            ledger.register_purchase(registration_request()).await,
            Err(RaffleError::Ledger { .. })
        ));
        assert_eq!(ledger.registration_calls().len(), 2);
    }
}
