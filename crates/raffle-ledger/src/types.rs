// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types for the ledger HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use raffle_core::types::RegistrationRequest;

/// Body of the validate-user response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub user: Option<Value>,
    #[serde(default, alias = "purchase_allowed")]
    pub purchase_allowed: Option<bool>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Registration payload as sent on the wire.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterPayload<'a> {
    #[serde(flatten)]
    pub request: &'a RegistrationRequest,
    /// 16 random bytes, hex encoded.
    pub nonce: String,
}

/// Body of the register-purchase response.
///
/// Numbers and ids arrive as strings or integers depending on the ledger version.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default, alias = "purchase_id")]
    pub purchase_id: Option<Value>,
    #[serde(default, alias = "numbers")]
    pub assigned_numbers: Vec<Value>,
    #[serde(default, alias = "total_numbers")]
    pub total_numbers: Option<u32>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Any error body carrying an `error` string.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
}

/// Renders a JSON scalar as the string the ledger meant.
pub fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
