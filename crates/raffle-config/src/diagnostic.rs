// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Figment-to-miette error bridge with fuzzy match suggestions.
//!
//! Converts Figment deserialization errors into rich miette diagnostics.
//! Unknown keys are matched against the key list of their raffle config
//! section ([`SECTIONS`]) for "did you mean?" suggestions, spans point into
//! the TOML file that set the key, and values that came from `RAFFLE_*`
//! variables name the variable instead.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity score to suggest a correction.
/// Catches typos like `timeout_sec` -> `timeout_secs` without suggesting noise.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// A configuration error with rich diagnostic information.
///
/// Each variant carries enough context for miette to render an Elm-style
/// error message with source spans, suggestions, and valid key listings.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// An unknown key was found in the configuration.
    #[error("unknown configuration key `{key}`")]
    #[diagnostic(
        code(raffle::config::unknown_key),
        help("{}", format_unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        /// The unrecognized key name.
        key: String,
        /// Suggested correction via fuzzy matching, if any.
        suggestion: Option<String>,
        /// List of valid keys for the section.
        valid_keys: String,
        /// Source span for the offending key.
        #[label("this key is not recognized")]
        span: Option<SourceSpan>,
        /// The source file content for context display.
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A table that is not one of the raffle config sections.
    #[error("unknown configuration section `{section}`")]
    #[diagnostic(
        code(raffle::config::unknown_section),
        help("{}", format_unknown_section_help(suggestion.as_deref()))
    )]
    UnknownSection {
        /// The unrecognized section name.
        section: String,
        /// Closest known section, if any.
        suggestion: Option<String>,
        #[label("not a raffle config section")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A configuration value has the wrong type.
    #[error("invalid type for key `{key}`: {detail}")]
    #[diagnostic(
        code(raffle::config::invalid_type),
        help("expected {expected}")
    )]
    InvalidType {
        /// The key with the wrong type.
        key: String,
        /// Description of the type mismatch.
        detail: String,
        /// What type was expected.
        expected: String,
        /// Source span for the offending value.
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        /// The source file content.
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    /// A required configuration key is missing.
    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(raffle::config::missing_key),
        help("add `{key} = <value>` to your raffle.toml")
    )]
    MissingKey {
        /// The missing key name.
        key: String,
    },

    /// A validation error for a config value.
    #[error("validation error: {message}")]
    #[diagnostic(code(raffle::config::validation))]
    Validation {
        /// Description of the validation failure.
        message: String,
    },

    /// Catch-all for other configuration errors.
    #[error("configuration error: {0}")]
    #[diagnostic(code(raffle::config::other))]
    Other(String),
}

impl ConfigError {
    /// Shorthand for a semantic validation failure.
    pub fn validation(message: impl Into<String>) -> Self {
        ConfigError::Validation {
            message: message.into(),
        }
    }
}

/// Every config section with the keys it accepts, in `raffle.toml` order.
///
/// Kept in step with [`crate::model`]; `raffles` is the `[[raffles]]` array.
pub const SECTIONS: &[(&str, &[&str])] = &[
    ("bot", &["name", "log_level"]),
    ("storage", &["data_dir"]),
    (
        "session",
        &["timeout_secs", "sweep_interval_secs", "max_failed_attempts"],
    ),
    ("receipt", &["max_bytes", "allowed_mime_types"]),
    (
        "purchase",
        &["declaration", "unit_price", "min_plausible_amount"],
    ),
    ("identity", &["country_code", "min_digits"]),
    (
        "ledger",
        &[
            "base_url",
            "validate_path",
            "register_path",
            "auth_token",
            "api_key",
            "validate_timeout_secs",
            "register_timeout_secs",
            "forbidden_is_provisional",
        ],
    ),
    (
        "messages",
        &[
            "brand",
            "website_url",
            "support_contact",
            "payment_key",
            "confirmation_image",
        ],
    ),
    ("raffles", &["id", "name", "keyword", "icon", "active"]),
];

/// Keys accepted by `section`, if it is a known section.
pub fn section_keys(section: &str) -> Option<&'static [&'static str]> {
    SECTIONS
        .iter()
        .find(|(name, _)| *name == section)
        .map(|(_, keys)| *keys)
}

fn section_names() -> Vec<&'static str> {
    SECTIONS.iter().map(|(name, _)| *name).collect()
}

fn format_unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

fn format_unknown_section_help(suggestion: Option<&str>) -> String {
    let known = section_names().join(", ");
    match suggestion {
        Some(s) => format!("did you mean `[{s}]`? Sections: {known}"),
        None => format!("sections: {known}"),
    }
}

/// The `RAFFLE_*` variable that sets a dotted config path.
pub fn env_var_for(path: &[String]) -> String {
    format!("RAFFLE_{}", path.join("_").to_ascii_uppercase())
}

/// Where a failing value came from.
enum Origin<'a> {
    /// A TOML file we have the text of.
    File { path: &'a str, content: &'a str },
    Env,
    Unknown,
}

fn origin_of<'a>(error: &figment::Error, toml_sources: &'a [(String, String)]) -> Origin<'a> {
    let Some(metadata) = error.metadata.as_ref() else {
        return Origin::Unknown;
    };
    if let Some(figment::Source::File(file)) = &metadata.source {
        let file = file.display().to_string();
        return toml_sources
            .iter()
            .find(|(path, _)| *path == file)
            .map_or(Origin::Unknown, |(path, content)| Origin::File {
                path: path.as_str(),
                content: content.as_str(),
            });
    }
    if metadata.name.contains("environment") {
        Origin::Env
    } else {
        Origin::Unknown
    }
}

/// Span of `key` under `section` in the file the error came from.
fn span_in(
    origin: &Origin<'_>,
    section: Option<&str>,
    key: &str,
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let Origin::File { path, content } = origin else {
        return (None, None);
    };
    match locate_key(content, section, key) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), key.len())),
            Some(NamedSource::new(*path, content.to_string())),
        ),
        None => (None, None),
    }
}

/// Convert a `figment::Error` into a list of `ConfigError` diagnostics.
///
/// A figment error may carry several failures; each becomes one diagnostic.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
            let section = path.first().map(String::as_str);
            let origin = origin_of(&error, toml_sources);

            match &error.kind {
                Kind::UnknownField(field, _) if section.is_none() => {
                    let (span, src) = span_in(&origin, None, field);
                    ConfigError::UnknownSection {
                        section: field.clone(),
                        suggestion: suggest_key(field, &section_names()),
                        span,
                        src,
                    }
                }
                Kind::UnknownField(field, expected) => {
                    let valid: Vec<&str> =
                        section.and_then(section_keys).unwrap_or(*expected).to_vec();
                    let (span, src) = span_in(&origin, section, field);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        suggestion: suggest_key(field, &valid),
                        valid_keys: valid.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => {
                    let key = match section {
                        Some(section) => format!("{section}.{field}"),
                        None => field.to_string(),
                    };
                    ConfigError::MissingKey { key }
                }
                Kind::InvalidType(actual, expected) => {
                    let detail = if matches!(origin, Origin::Env) {
                        format!("{} is {actual}, expected {expected}", env_var_for(&path))
                    } else {
                        format!("found {actual}, expected {expected}")
                    };
                    let (span, src) = match path.last() {
                        Some(key) if path.len() > 1 => span_in(&origin, section, key),
                        _ => (None, None),
                    };
                    ConfigError::InvalidType {
                        key: path.join("."),
                        detail,
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Byte offset of `key` inside `section` of a TOML document.
///
/// Tracks the current `[table]` / `[[array]]` header line by line, so a key
/// of the same name in another section or a comment is never matched.
/// `section = None` means the top level, before any header; there `key` is
/// matched against header names too, for unknown sections.
pub fn locate_key(content: &str, section: Option<&str>, key: &str) -> Option<usize> {
    let mut current: Option<&str> = None;
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let indent = line.len() - line.trim_start().len();
        let trimmed = line.trim();

        if let Some(header) = trimmed.strip_prefix('[') {
            let name = header.trim_start_matches('[').split(']').next().unwrap_or("").trim();
            if section.is_none() && name == key {
                let within = line.find(name).unwrap_or(indent);
                return Some(offset + within);
            }
            current = Some(name);
        } else if current == section
            && let Some((name, _)) = trimmed.split_once('=')
            && name.trim() == key
        {
            return Some(offset + indent);
        }

        offset += line.len();
    }

    None
}

/// Suggest a similar key name using Jaro-Winkler string similarity.
///
/// Returns the best match above the similarity threshold, or `None` if
/// no valid key is close enough to the unknown key.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render a list of `ConfigError`s to stderr using miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    use miette::GraphicalReportHandler;

    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        let diagnostic: &dyn Diagnostic = error;
        if handler.render_report(&mut buf, diagnostic).is_ok() {
            eprint!("{buf}");
        } else {
            eprintln!("Error: {error}");
        }
    }
}
