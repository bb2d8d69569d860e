// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the raffle bot.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level raffle bot configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RaffleConfig {
    /// Bot identity and logging.
    #[serde(default)]
    pub bot: BotConfig,

    /// Where records and receipts live on disk.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Purchase session timing and attempt budget.
    #[serde(default)]
    pub session: SessionConfig,

    /// Receipt acceptance rules.
    #[serde(default)]
    pub receipt: ReceiptConfig,

    /// Purchase declaration format and amount heuristics.
    #[serde(default)]
    pub purchase: PurchaseConfig,

    /// Sender number normalization.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// External user-registry / purchase-ledger service.
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Texts interpolated into user-facing messages.
    #[serde(default)]
    pub messages: MessagesConfig,

    /// Promotions purchases can target.
    #[serde(default)]
    pub raffles: Vec<RaffleEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BotConfig {
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Default log level when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_bot_name() -> String {
    "raffle".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage layout: `pending/`, `completed/`, `canceled/` and `receipts/` under `data_dir`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

impl StorageConfig {
    pub fn receipts_dir(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join("receipts")
    }
}

fn default_data_dir() -> String {
    "data".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Sessions older than this are canceled.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Invalid receipts tolerated before the purchase is canceled.
    #[serde(default = "default_max_failed_attempts")]
    pub max_failed_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            max_failed_attempts: default_max_failed_attempts(),
        }
    }
}

impl SessionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

fn default_timeout_secs() -> u64 {
    3600
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_max_failed_attempts() -> u32 {
    3
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ReceiptConfig {
    #[serde(default = "default_max_bytes")]
    pub max_bytes: u64,

    /// Compared against the lowercased MIME type of the image.
    #[serde(default = "default_allowed_mime_types")]
    pub allowed_mime_types: Vec<String>,
}

impl Default for ReceiptConfig {
    fn default() -> Self {
        Self {
            max_bytes: default_max_bytes(),
            allowed_mime_types: default_allowed_mime_types(),
        }
    }
}

fn default_max_bytes() -> u64 {
    10 * 1024 * 1024
}

fn default_allowed_mime_types() -> Vec<String> {
    ["image/jpeg", "image/jpg", "image/png", "image/webp"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PurchaseConfig {
    /// First-line sentence that marks a message as a purchase declaration.
    #[serde(default = "default_declaration")]
    pub declaration: String,

    /// Price of one item, used when the declared amount is implausible.
    #[serde(default = "default_unit_price")]
    pub unit_price: u64,

    #[serde(default = "default_min_plausible_amount")]
    pub min_plausible_amount: u64,
}

impl Default for PurchaseConfig {
    fn default() -> Self {
        Self {
            declaration: default_declaration(),
            unit_price: default_unit_price(),
            min_plausible_amount: default_min_plausible_amount(),
        }
    }
}

fn default_declaration() -> String {
    "I want to buy these stickers!".to_string()
}

fn default_unit_price() -> u64 {
    1000
}

fn default_min_plausible_amount() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    /// Country calling code stripped from 12-digit numbers.
    #[serde(default = "default_country_code")]
    pub country_code: String,

    #[serde(default = "default_min_digits")]
    pub min_digits: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            country_code: default_country_code(),
            min_digits: default_min_digits(),
        }
    }
}

fn default_country_code() -> String {
    "57".to_string()
}

fn default_min_digits() -> usize {
    8
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LedgerConfig {
    /// Base URL of the ledger service. Required by `serve`.
    #[serde(default)]
    pub base_url: Option<String>,

    #[serde(default = "default_validate_path")]
    pub validate_path: String,

    #[serde(default = "default_register_path")]
    pub register_path: String,

    /// Sent as `X-Auth-Token`.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Sent as `x-api-key`.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_validate_timeout_secs")]
    pub validate_timeout_secs: u64,

    #[serde(default = "default_register_timeout_secs")]
    pub register_timeout_secs: u64,

    /// Treat a 403 from the validation endpoint as a provisional pass.
    #[serde(default = "default_forbidden_is_provisional")]
    pub forbidden_is_provisional: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            validate_path: default_validate_path(),
            register_path: default_register_path(),
            auth_token: None,
            api_key: None,
            validate_timeout_secs: default_validate_timeout_secs(),
            register_timeout_secs: default_register_timeout_secs(),
            forbidden_is_provisional: default_forbidden_is_provisional(),
        }
    }
}

fn default_validate_path() -> String {
    "/api/validate-user".to_string()
}

fn default_register_path() -> String {
    "/api/register-purchase".to_string()
}

fn default_validate_timeout_secs() -> u64 {
    10
}

fn default_register_timeout_secs() -> u64 {
    30
}

fn default_forbidden_is_provisional() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MessagesConfig {
    #[serde(default = "default_brand")]
    pub brand: String,

    #[serde(default = "default_website_url")]
    pub website_url: String,

    #[serde(default = "default_support_contact")]
    pub support_contact: String,

    /// Payment key the buyer transfers to.
    #[serde(default = "default_payment_key")]
    pub payment_key: String,

    /// Image sent with the order confirmation. Text is used when unset or unreadable.
    #[serde(default)]
    pub confirmation_image: Option<String>,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            brand: default_brand(),
            website_url: default_website_url(),
            support_contact: default_support_contact(),
            payment_key: default_payment_key(),
            confirmation_image: None,
        }
    }
}

fn default_brand() -> String {
    "Sticker Rueda y Gana".to_string()
}

fn default_website_url() -> String {
    "https://example.com".to_string()
}

fn default_support_contact() -> String {
    "our support line".to_string()
}

fn default_payment_key() -> String {
    "0000000000".to_string()
}

/// One `[[raffles]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RaffleEntry {
    pub id: u32,

    pub name: String,

    /// Matched case-insensitively against purchase text.
    #[serde(default)]
    pub keyword: Option<String>,

    #[serde(default)]
    pub icon: Option<String>,

    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}
