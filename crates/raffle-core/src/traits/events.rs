// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Push channel trait.

use crate::types::PurchaseEvent;

/// Fire-and-forget sink for dashboard events.
///
/// Publishing never fails from the caller's point of view: an event with no
/// listener is simply dropped.
pub trait EventSink: Send + Sync + 'static {
    fn publish(&self, event: PurchaseEvent);
}
