// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence traits for purchase records and receipt images.

use async_trait::async_trait;

use crate::error::RaffleError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{PurchaseRecord, RecordId, RecordPatch, RecordStatus, UserId};

/// Durable store of purchase records partitioned by status.
///
/// A record lives in exactly one partition at a time. Moves between partitions
/// are the only way to change status, and only moves out of `Pending` are legal.
#[async_trait]
pub trait RecordStore: PluginAdapter {
    /// The oldest pending record of a user, if any.
    async fn find_pending(&self, user: &UserId) -> Result<Option<PurchaseRecord>, RaffleError>;

    /// All pending records of a user, oldest first.
    async fn list_pending_for(&self, user: &UserId) -> Result<Vec<PurchaseRecord>, RaffleError>;

    /// The oldest pending record of a user that still awaits a receipt.
    ///
    /// Records flagged for manual intervention wait on an operator and are skipped.
    async fn find_active(&self, user: &UserId) -> Result<Option<PurchaseRecord>, RaffleError> {
        Ok(self
            .list_pending_for(user)
            .await?
            .into_iter()
            .find(|record| record.intervention.is_none()))
    }

    /// Looks a record up in every partition.
    async fn find_by_id(&self, id: &RecordId) -> Result<Option<PurchaseRecord>, RaffleError>;

    /// Persists a new record in the pending partition.
    async fn create(&self, record: PurchaseRecord) -> Result<PurchaseRecord, RaffleError>;

    /// Moves a record from one partition to another, applying `patch` on the way.
    ///
    /// Fails with `NotInPartition` when the record is not currently in `from`.
    async fn move_partition(
        &self,
        id: &RecordId,
        from: RecordStatus,
        to: RecordStatus,
        patch: RecordPatch,
    ) -> Result<PurchaseRecord, RaffleError>;

    /// Rewrites a pending record in place.
    async fn update_pending(
        &self,
        id: &RecordId,
        patch: RecordPatch,
    ) -> Result<PurchaseRecord, RaffleError>;

    /// Every record in a partition, oldest first.
    async fn list(&self, status: RecordStatus) -> Result<Vec<PurchaseRecord>, RaffleError>;

    async fn count(&self, status: RecordStatus) -> Result<usize, RaffleError>;
}

/// Store for receipt images.
#[async_trait]
pub trait ReceiptStore: Send + Sync + 'static {
    /// Saves a receipt and returns its reference.
    ///
    /// When `existing` is given the new image replaces it, so a user
    /// replacing a receipt keeps a single file. The returned reference keeps
    /// the stem of `existing`; its extension follows `mime_type`.
    async fn save(
        &self,
        user: &UserId,
        existing: Option<&str>,
        mime_type: &str,
        data: &[u8],
    ) -> Result<String, RaffleError>;

    /// Reads a stored receipt back.
    async fn read(&self, receipt_ref: &str) -> Result<Vec<u8>, RaffleError>;

    /// References of every receipt saved for a user.
    async fn list_for_user(&self, user: &UserId) -> Result<Vec<String>, RaffleError>;

    /// Deletes every receipt of a user and returns how many were removed.
    async fn remove_for_user(&self, user: &UserId) -> Result<usize, RaffleError>;
}
