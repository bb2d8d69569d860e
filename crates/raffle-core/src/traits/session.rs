// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session registry trait.

use async_trait::async_trait;

use crate::types::{PurchaseSession, UserId};

/// Mapping from user to their open purchase session, if any.
///
/// Sessions are not durable. They are rebuilt from pending records on demand.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn get(&self, user: &UserId) -> Option<PurchaseSession>;

    async fn set(&self, session: PurchaseSession);

    /// Removes the session and returns it if one existed.
    async fn delete(&self, user: &UserId) -> Option<PurchaseSession>;

    /// Snapshot of every open session.
    async fn list(&self) -> Vec<PurchaseSession>;
}
