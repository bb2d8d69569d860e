// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sender identity normalization.
//!
//! The chat transport reports the sender through several optional fields.
//! [`normalize_sender`] picks one by a fixed precedence and reduces it to a
//! canonical digits-only [`UserId`].

use raffle_config::model::IdentityConfig;
use raffle_core::types::{SenderFields, UserId};

/// Only JIDs on this domain carry a phone number.
const PHONE_DOMAIN: &str = "@s.whatsapp.net";

/// Length of a national number once the country code is stripped.
const NATIONAL_DIGITS: usize = 10;

/// Rules for turning raw sender fields into a [`UserId`].
#[derive(Debug, Clone)]
pub struct IdentityPolicy {
    pub country_code: String,
    pub min_digits: usize,
}

impl IdentityPolicy {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            country_code: config.country_code.clone(),
            min_digits: config.min_digits,
        }
    }

    fn is_valid(&self, digits: &str) -> bool {
        digits.len() >= self.min_digits
    }
}

/// Resolves the canonical sender of a message.
///
/// Precedence: `participant_pn`, `phone_number`, `remote_jid_alt`,
/// `remote_jid`, `participant`. JID fields only qualify when addressed at the
/// phone-number domain. The first qualifying field that normalizes to a valid
/// number wins.
pub fn normalize_sender(fields: &SenderFields, policy: &IdentityPolicy) -> Option<UserId> {
    let candidates = [
        fields.participant_pn.as_deref().filter(|v| is_phone_jid(v)),
        fields
            .phone_number
            .as_deref()
            .filter(|v| digit_count(v) >= policy.min_digits),
        fields.remote_jid_alt.as_deref().filter(|v| is_phone_jid(v)),
        fields.remote_jid.as_deref().filter(|v| is_phone_jid(v)),
        fields.participant.as_deref().filter(|v| is_phone_jid(v)),
    ];

    candidates
        .into_iter()
        .flatten()
        .map(|raw| strip_country_code(&local_digits(raw), &policy.country_code))
        .find(|digits| policy.is_valid(digits))
        .map(UserId::new)
}

/// US numbers (`1` + 10 digits) get the English registration prompt.
pub fn is_us_number(user: &UserId) -> bool {
    let id = user.as_str();
    id.len() == 11 && id.starts_with('1')
}

/// The number as the ledger knows it: national digits without country code.
pub fn ledger_number(user: &UserId, country_code: &str) -> String {
    strip_country_code(user.as_str(), country_code)
}

fn is_phone_jid(value: &str) -> bool {
    value.ends_with(PHONE_DOMAIN)
}

fn digit_count(value: &str) -> usize {
    value.chars().filter(char::is_ascii_digit).count()
}

/// Digits of the part before `@` and before any `:device` suffix.
fn local_digits(raw: &str) -> String {
    let local = raw.split('@').next().unwrap_or_default();
    let local = local.split(':').next().unwrap_or_default();
    local.chars().filter(char::is_ascii_digit).collect()
}

fn strip_country_code(digits: &str, country_code: &str) -> String {
    if !country_code.is_empty()
        && digits.len() > NATIONAL_DIGITS
        && digits.len().checked_sub(country_code.len()) == Some(NATIONAL_DIGITS)
        && let Some(national) = digits.strip_prefix(country_code)
    {
        return national.to_string();
    }
    digits.to_string()
}
