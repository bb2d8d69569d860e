// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./raffle.toml` > `~/.config/raffle/raffle.toml` > `/etc/raffle/raffle.toml`
//! with environment variable overrides via `RAFFLE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::RaffleConfig;

/// Sections that env var names are split on. No entry is a prefix of another.
const ENV_SECTIONS: &[&str] = &[
    "identity", "messages", "purchase", "receipt", "session", "storage", "ledger", "bot",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/raffle/raffle.toml` (system-wide)
/// 3. `~/.config/raffle/raffle.toml` (user XDG config)
/// 4. `./raffle.toml` (local directory)
/// 5. `RAFFLE_*` environment variables
pub fn load_config() -> Result<RaffleConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string over the compiled defaults.
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<RaffleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RaffleConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<RaffleConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(RaffleConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    let mut figment = Figment::new().merge(Serialized::defaults(RaffleConfig::default()));
    for path in config_file_paths() {
        figment = figment.merge(Toml::file(path));
    }
    figment.merge(env_provider())
}

/// Candidate config files, lowest precedence first.
pub fn config_file_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/raffle/raffle.toml")];
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join("raffle/raffle.toml"));
    }
    paths.push(PathBuf::from("raffle.toml"));
    paths
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `RAFFLE_SESSION_TIMEOUT_SECS` must map to `session.timeout_secs`,
/// not `session.timeout.secs`.
fn env_provider() -> Env {
    Env::prefixed("RAFFLE_").map(|key| map_env_key(key.as_str()).into())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config path.
pub(crate) fn map_env_key(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}
