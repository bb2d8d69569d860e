// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem persistence for the raffle bot.
//!
//! Purchase records are JSON documents in three status partitions
//! (`pending/`, `completed/`, `canceled/`), one file per record named by id.
//! All mutations go through a single writer and every file write is atomic
//! (temp file + rename). Receipt images live in a flat `receipts/` directory.

pub mod receipts;
pub mod records;
pub mod writer;

pub use receipts::FsReceiptStore;
pub use records::{FsRecordStore, RepairReport};
