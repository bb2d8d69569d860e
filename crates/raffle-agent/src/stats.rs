// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Process-wide activity counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Debug, Default)]
pub struct Stats {
    messages_received: AtomicU64,
    messages_sent: AtomicU64,
    purchases_processed: AtomicU64,
    receipts_received: AtomicU64,
    purchases_rejected: AtomicU64,
    users_blocked: AtomicU64,
}

/// Point-in-time copy of [`Stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub messages_received: u64,
    pub messages_sent: u64,
    pub purchases_processed: u64,
    pub receipts_received: u64,
    pub purchases_rejected: u64,
    pub users_blocked: u64,
}

impl Stats {
    pub fn message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn purchase_processed(&self) {
        self.purchases_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn receipt_received(&self) {
        self.receipts_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn purchase_rejected(&self) {
        self.purchases_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn user_blocked(&self) {
        self.users_blocked.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            purchases_processed: self.purchases_processed.load(Ordering::Relaxed),
            receipts_received: self.receipts_received.load(Ordering::Relaxed),
            purchases_rejected: self.purchases_rejected.load(Ordering::Relaxed),
            users_blocked: self.users_blocked.load(Ordering::Relaxed),
        }
    }
}
