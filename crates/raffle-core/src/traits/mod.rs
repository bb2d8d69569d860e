// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the raffle bot.
//!
//! Externally-backed adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod channel;
pub mod events;
pub mod ledger;
pub mod session;
pub mod storage;

pub use adapter::PluginAdapter;
pub use channel::ChannelAdapter;
pub use events::EventSink;
pub use ledger::UserLedger;
pub use session::SessionStore;
pub use storage::{ReceiptStore, RecordStore};
