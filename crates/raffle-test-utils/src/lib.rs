// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for raffle integration tests.
//!
//! Provides mock adapters and test harness infrastructure for fast,
//! deterministic, CI-runnable tests without a chat transport or ledger.
//!
//! # Components
//!
//! - [`MockChannel`] - Mock chat transport with message injection and capture
//! - [`MockLedger`] - Mock user ledger with scripted answers
//! - [`TestHarness`] - The whole bot over temp file stores

pub mod harness;
pub mod mock_channel;
pub mod mock_ledger;

pub use harness::{TEST_USER, TestHarness, TestHarnessBuilder, purchase_text};
pub use mock_channel::MockChannel;
pub use mock_ledger::MockLedger;
