// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the ledger API.
//!
//! Provides [`LedgerClient`] which handles request construction,
//! authentication headers, per-call timeouts, and error classification.
//! No call is retried: the user's next message re-drives the flow.

use std::time::Duration;

use rand::RngCore;
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::debug;

use raffle_config::model::LedgerConfig;
use raffle_core::RaffleError;
use raffle_core::types::{Registration, RegistrationRequest, ValidationRequest};

use crate::types::{
    ErrorBody, RegisterPayload, RegisterResponse, ValidateResponse, scalar_to_string,
};

/// Error texts the ledger uses for an unknown buyer, lowercased.
const USER_NOT_FOUND_MARKERS: &[&str] = &["user not found", "usuario no encontrado"];

/// Result of a validation call that reached the ledger.
#[derive(Debug, Clone)]
pub enum ValidationReply {
    /// The ledger answered with a body.
    Answered(ValidateResponse),
    /// The ledger answered 403 Forbidden.
    Forbidden,
}

/// HTTP client for ledger communication.
#[derive(Debug, Clone)]
pub struct LedgerClient {
    client: reqwest::Client,
    base_url: String,
    validate_path: String,
    register_path: String,
    validate_timeout: Duration,
    register_timeout: Duration,
}

impl LedgerClient {
    /// Creates a client from the `[ledger]` config section.
    ///
    /// Fails with a config error when `base_url` is unset or a credential is
    /// not a valid header value.
    pub fn new(config: &LedgerConfig) -> Result<Self, RaffleError> {
        let base_url = config
            .base_url
            .as_deref()
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| RaffleError::Config("ledger.base_url is required".into()))?;

        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        if let Some(token) = &config.auth_token {
            headers.insert(
                "X-Auth-Token",
                HeaderValue::from_str(token).map_err(|e| {
                    RaffleError::Config(format!("invalid ledger.auth_token header value: {e}"))
                })?,
            );
        }
        if let Some(key) = &config.api_key {
            headers.insert(
                "x-api-key",
                HeaderValue::from_str(key).map_err(|e| {
                    RaffleError::Config(format!("invalid ledger.api_key header value: {e}"))
                })?,
            );
        }

        let validate_timeout = Duration::from_secs(config.validate_timeout_secs);
        let register_timeout = Duration::from_secs(config.register_timeout_secs);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(validate_timeout.max(register_timeout))
            .build()
            .map_err(|e| RaffleError::Ledger {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url,
            validate_path: config.validate_path.clone(),
            register_path: config.register_path.clone(),
            validate_timeout,
            register_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Posts a validate-user request.
    pub async fn validate(
        &self,
        request: &ValidationRequest,
    ) -> Result<ValidationReply, RaffleError> {
        let url = format!("{}{}", self.base_url, self.validate_path);
        let response = self
            .client
            .post(&url)
            .timeout(self.validate_timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.validate_timeout))?;

        let status = response.status();
        debug!(status = %status, number = %request.number, "validation response received");

        if status == StatusCode::FORBIDDEN {
            return Ok(ValidationReply::Forbidden);
        }

        let body = response.text().await.map_err(|e| RaffleError::Ledger {
            message: format!("failed to read validation response: {e}"),
            source: Some(Box::new(e)),
        })?;

        if !status.is_success() {
            return Err(RaffleError::Ledger {
                message: error_message(status, &body),
                source: None,
            });
        }

        let parsed: ValidateResponse =
            serde_json::from_str(&body).map_err(|e| RaffleError::Ledger {
                message: format!("failed to parse validation response: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(ValidationReply::Answered(parsed))
    }

    /// Posts a register-purchase request with a fresh nonce.
    ///
    /// An unknown buyer maps to [`RaffleError::UserNotRegistered`], whatever
    /// the HTTP status.
    pub async fn register(
        &self,
        request: &RegistrationRequest,
    ) -> Result<Registration, RaffleError> {
        let url = format!("{}{}", self.base_url, self.register_path);
        let payload = RegisterPayload {
            request,
            nonce: new_nonce(),
        };
        let response = self
            .client
            .post(&url)
            .timeout(self.register_timeout)
            .json(&payload)
            .send()
            .await
            .map_err(|e| map_send_error(e, self.register_timeout))?;

        let status = response.status();
        debug!(status = %status, purchase_id = %request.purchase_id, "registration response received");

        let body = response.text().await.map_err(|e| RaffleError::Ledger {
            message: format!("failed to read registration response: {e}"),
            source: Some(Box::new(e)),
        })?;

        let parsed = serde_json::from_str::<RegisterResponse>(&body).ok();
        match parsed {
            Some(resp) if status.is_success() && resp.success => Ok(Registration {
                purchase_id: resp.purchase_id.as_ref().and_then(scalar_to_string),
                total_numbers: resp
                    .total_numbers
                    .unwrap_or(resp.assigned_numbers.len() as u32),
                assigned_numbers: resp
                    .assigned_numbers
                    .iter()
                    .filter_map(scalar_to_string)
                    .collect(),
            }),
            Some(resp) => {
                let message = resp
                    .error
                    .unwrap_or_else(|| format!("ledger returned {status} without success"));
                Err(classify_registration_error(message))
            }
            None => Err(classify_registration_error(error_message(status, &body))),
        }
    }
}

/// 16 random bytes, hex encoded.
pub fn new_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn is_user_not_found(message: &str) -> bool {
    let lower = message.to_lowercase();
    USER_NOT_FOUND_MARKERS.iter().any(|m| lower.contains(m))
}

fn classify_registration_error(message: String) -> RaffleError {
    if is_user_not_found(&message) {
        RaffleError::UserNotRegistered { message }
    } else {
        RaffleError::Ledger {
            message,
            source: None,
        }
    }
}

fn map_send_error(err: reqwest::Error, timeout: Duration) -> RaffleError {
    if err.is_timeout() {
        RaffleError::Timeout { duration: timeout }
    } else {
        RaffleError::Ledger {
            message: format!("HTTP request failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

fn error_message(status: StatusCode, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error: Some(error) }) => error,
        _ => format!("ledger returned {status}: {body}"),
    }
}
