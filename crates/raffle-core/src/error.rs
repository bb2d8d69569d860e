// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the raffle purchase bot.

use thiserror::Error;

use crate::types::RecordStatus;

/// The primary error type used across all adapter traits and core operations.
#[derive(Debug, Error)]
pub enum RaffleError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (filesystem I/O, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Chat transport errors (not connected, send failure, malformed frame).
    #[error("channel error: {message}")]
    Channel {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The chat transport has no more inbound messages.
    #[error("channel closed")]
    ChannelClosed,

    /// External user-registry / purchase-ledger failures.
    #[error("ledger error: {message}")]
    Ledger {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The ledger does not know the buyer. Requires manual intervention.
    #[error("user not registered in ledger: {message}")]
    UserNotRegistered { message: String },

    /// No record with this id exists in any partition.
    #[error("record not found: {id}")]
    RecordNotFound { id: String },

    /// The record exists but not in the partition the caller expected.
    #[error("record {id} is {actual}, expected {expected}")]
    NotInPartition {
        id: String,
        expected: RecordStatus,
        actual: RecordStatus,
    },

    /// A write carried a stale version token.
    #[error("version conflict on record {id}: expected {expected}, found {found}")]
    VersionConflict { id: String, expected: u64, found: u64 },

    /// A record with this id already exists.
    #[error("record already exists: {id}")]
    DuplicateRecord { id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl RaffleError {
    /// Wraps any error as a storage failure.
    pub fn storage(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        RaffleError::Storage {
            source: Box::new(err),
        }
    }

    /// Returns true when the error means "this record is no longer pending".
    ///
    /// Callers treat this as an implicit terminal transition rather than a failure.
    pub fn is_resolved_elsewhere(&self) -> bool {
        matches!(
            self,
            RaffleError::NotInPartition {
                expected: RecordStatus::Pending,
                ..
            } | RaffleError::RecordNotFound { .. }
        )
    }
}
