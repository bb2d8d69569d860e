// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-zero timeouts, image MIME types, and well-formed ledger URLs.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::RaffleConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &RaffleConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.bot.log_level.as_str()) {
        errors.push(ConfigError::validation(format!(
            "bot.log_level must be one of {}, got `{}`",
            LOG_LEVELS.join(", "),
            config.bot.log_level
        )));
    }

    if config.storage.data_dir.trim().is_empty() {
        errors.push(ConfigError::validation("storage.data_dir must not be empty"));
    }

    if config.session.timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "session.timeout_secs must be greater than 0",
        ));
    }

    if config.session.sweep_interval_secs == 0 {
        errors.push(ConfigError::validation(
            "session.sweep_interval_secs must be greater than 0",
        ));
    }

    if config.session.max_failed_attempts == 0 {
        errors.push(ConfigError::validation(
            "session.max_failed_attempts must be at least 1",
        ));
    }

    if config.receipt.max_bytes == 0 {
        errors.push(ConfigError::validation(
            "receipt.max_bytes must be greater than 0",
        ));
    }

    if config.receipt.allowed_mime_types.is_empty() {
        errors.push(ConfigError::validation(
            "receipt.allowed_mime_types must list at least one type",
        ));
    }
    for mime in &config.receipt.allowed_mime_types {
        if !mime.starts_with("image/") {
            errors.push(ConfigError::validation(format!(
                "receipt.allowed_mime_types entry `{mime}` is not an image type"
            )));
        }
    }

    if config.purchase.declaration.trim().is_empty() {
        errors.push(ConfigError::validation(
            "purchase.declaration must not be empty",
        ));
    }

    if config.purchase.unit_price == 0 {
        errors.push(ConfigError::validation(
            "purchase.unit_price must be greater than 0",
        ));
    }

    let code = &config.identity.country_code;
    if code.is_empty() || !code.chars().all(|c| c.is_ascii_digit()) {
        errors.push(ConfigError::validation(format!(
            "identity.country_code must be digits only, got `{code}`"
        )));
    }

    if config.identity.min_digits == 0 {
        errors.push(ConfigError::validation(
            "identity.min_digits must be at least 1",
        ));
    }

    if let Some(url) = &config.ledger.base_url {
        let url = url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ConfigError::validation(format!(
                "ledger.base_url `{url}` must start with http:// or https://"
            )));
        }
    }

    for (key, path) in [
        ("ledger.validate_path", &config.ledger.validate_path),
        ("ledger.register_path", &config.ledger.register_path),
    ] {
        if !path.starts_with('/') {
            errors.push(ConfigError::validation(format!(
                "{key} `{path}` must start with `/`"
            )));
        }
    }

    if !(1..=30).contains(&config.ledger.validate_timeout_secs) {
        errors.push(ConfigError::validation(format!(
            "ledger.validate_timeout_secs must be between 1 and 30, got {}",
            config.ledger.validate_timeout_secs
        )));
    }

    if config.ledger.register_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "ledger.register_timeout_secs must be greater than 0",
        ));
    }

    let mut seen_ids = HashSet::new();
    for (i, raffle) in config.raffles.iter().enumerate() {
        if !seen_ids.insert(raffle.id) {
            errors.push(ConfigError::validation(format!(
                "duplicate raffle id {} in [[raffles]] array",
                raffle.id
            )));
        }
        if raffle.name.trim().is_empty() {
            errors.push(ConfigError::validation(format!(
                "raffles[{i}].name must not be empty"
            )));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
