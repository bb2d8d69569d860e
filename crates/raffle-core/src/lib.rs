// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the raffle purchase bot.
//!
//! This crate provides the trait definitions, error type, and domain types
//! shared by every crate in the workspace.

pub mod error;
pub mod traits;
pub mod types;

pub use error::RaffleError;
pub use types::{
    AdapterType, EventKind, HealthStatus, InboundMessage, MessageContent, MessageId,
    OutboundMessage, PurchaseDetails, PurchaseEvent, PurchaseRecord, PurchaseSession, RaffleInfo,
    RecordId, RecordPatch, RecordStatus, UserId,
};

pub use traits::{
    ChannelAdapter, EventSink, PluginAdapter, ReceiptStore, RecordStore, SessionStore, UserLedger,
};
