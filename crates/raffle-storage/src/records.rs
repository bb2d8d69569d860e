// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem implementation of the RecordStore trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use raffle_core::{
    AdapterType, HealthStatus, PluginAdapter, PurchaseRecord, RaffleError, RecordId, RecordPatch,
    RecordStatus, RecordStore, UserId,
};

use crate::writer::{self, SingleWriter, TEMP_SUFFIX};

/// What [`FsRecordStore::repair`] cleaned up.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RepairReport {
    /// Pending copies removed because a terminal copy of the same record exists.
    pub duplicates_removed: usize,
    /// Interrupted temp files removed.
    pub temp_files_removed: usize,
}

/// Record store backed by one directory per status partition.
///
/// Lookups by id check terminal partitions before `pending/`, and pending
/// listings skip records that already have a terminal copy, so a reader never
/// sees a record as pending once a move has written its destination.
pub struct FsRecordStore {
    root: PathBuf,
    writer: SingleWriter,
}

impl FsRecordStore {
    /// Opens (creating if needed) a store rooted at `root` and repairs leftovers
    /// of an interrupted move.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, RaffleError> {
        let store = Self {
            root: root.into(),
            writer: SingleWriter::new(),
        };
        for status in RecordStatus::ALL {
            tokio::fs::create_dir_all(store.partition_dir(status))
                .await
                .map_err(RaffleError::storage)?;
        }
        let report = store.repair().await?;
        if report != RepairReport::default() {
            info!(
                duplicates = report.duplicates_removed,
                temp_files = report.temp_files_removed,
                "repaired record store"
            );
        }
        debug!(root = %store.root.display(), "record store opened");
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_dir(&self, status: RecordStatus) -> PathBuf {
        self.root.join(status.to_string())
    }

    fn record_path(&self, status: RecordStatus, id: &RecordId) -> Result<PathBuf, RaffleError> {
        if !id.is_safe() {
            return Err(RaffleError::Internal(format!("unsafe record id `{id}`")));
        }
        Ok(self.partition_dir(status).join(format!("{id}.json")))
    }

    /// Removes pending copies shadowed by a terminal copy and stray temp files.
    pub async fn repair(&self) -> Result<RepairReport, RaffleError> {
        let _guard = self.writer.acquire().await;
        let mut report = RepairReport::default();

        for status in RecordStatus::ALL {
            for path in list_files(&self.partition_dir(status)).await? {
                if path.extension().is_some_and(|ext| ext == TEMP_SUFFIX) {
                    writer::remove_if_exists(&path).await?;
                    report.temp_files_removed += 1;
                }
            }
        }

        for path in list_files(&self.partition_dir(RecordStatus::Pending)).await? {
            if !is_record_file(&path) {
                continue;
            }
            let Some(id) = record_id_of(&path) else {
                continue;
            };
            if let Some(terminal) = self.terminal_copy(&id).await? {
                warn!(record_id = %id, status = %terminal, "removing pending copy of moved record");
                writer::remove_if_exists(&path).await?;
                report.duplicates_removed += 1;
            }
        }

        Ok(report)
    }

    /// The terminal partition holding a copy of `id`, if any.
    async fn terminal_copy(&self, id: &RecordId) -> Result<Option<RecordStatus>, RaffleError> {
        for status in [RecordStatus::Completed, RecordStatus::Canceled] {
            if tokio::fs::try_exists(self.record_path(status, id)?)
                .await
                .map_err(RaffleError::storage)?
            {
                return Ok(Some(status));
            }
        }
        Ok(None)
    }

    /// Finds a record and the partition it lives in. Terminal partitions win.
    async fn locate(
        &self,
        id: &RecordId,
    ) -> Result<Option<(RecordStatus, PurchaseRecord)>, RaffleError> {
        for status in [
            RecordStatus::Completed,
            RecordStatus::Canceled,
            RecordStatus::Pending,
        ] {
            if let Some(record) = read_record(&self.record_path(status, id)?, status).await? {
                return Ok(Some((status, record)));
            }
        }
        Ok(None)
    }

    async fn write_record(&self, record: &PurchaseRecord) -> Result<(), RaffleError> {
        let path = self.record_path(record.status, &record.id)?;
        let bytes = serde_json::to_vec_pretty(record).map_err(RaffleError::storage)?;
        writer::atomic_write(&path, &bytes).await
    }

    async fn load_partition(&self, status: RecordStatus) -> Result<Vec<PurchaseRecord>, RaffleError> {
        let mut records = Vec::new();
        for path in list_files(&self.partition_dir(status)).await? {
            if !is_record_file(&path) {
                continue;
            }
            // A concurrent move may remove the file between listing and reading.
            let Some(record) = read_record(&path, status).await? else {
                continue;
            };
            if status == RecordStatus::Pending && self.terminal_copy(&record.id).await?.is_some() {
                continue;
            }
            records.push(record);
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(records)
    }
}

fn check_version(record: &PurchaseRecord, patch: &RecordPatch) -> Result<(), RaffleError> {
    match patch.expected_version {
        Some(expected) if expected != record.version => Err(RaffleError::VersionConflict {
            id: record.id.to_string(),
            expected,
            found: record.version,
        }),
        _ => Ok(()),
    }
}

fn is_record_file(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn record_id_of(path: &Path) -> Option<RecordId> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(RecordId::new)
        .filter(RecordId::is_safe)
}

async fn list_files(dir: &Path) -> Result<Vec<PathBuf>, RaffleError> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(RaffleError::storage)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(RaffleError::storage)? {
        if entry
            .file_type()
            .await
            .map_err(RaffleError::storage)?
            .is_file()
        {
            files.push(entry.path());
        }
    }
    Ok(files)
}

/// Reads one record file. A missing file is `Ok(None)`.
///
/// The partition the file was found in is authoritative for `status`.
async fn read_record(
    path: &Path,
    partition: RecordStatus,
) -> Result<Option<PurchaseRecord>, RaffleError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(RaffleError::storage(err)),
    };
    let mut record: PurchaseRecord =
        serde_json::from_slice(&bytes).map_err(RaffleError::storage)?;
    if record.status != partition {
        warn!(
            record_id = %record.id,
            field = %record.status,
            partition = %partition,
            "record status disagrees with its partition"
        );
        record.status = partition;
    }
    Ok(Some(record))
}

#[async_trait]
impl PluginAdapter for FsRecordStore {
    fn name(&self) -> &str {
        "fs-records"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, RaffleError> {
        for status in RecordStatus::ALL {
            let dir = self.partition_dir(status);
            if !tokio::fs::try_exists(&dir)
                .await
                .map_err(RaffleError::storage)?
            {
                return Ok(HealthStatus::Unhealthy(format!(
                    "partition {} is missing",
                    dir.display()
                )));
            }
        }
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RaffleError> {
        // Wait for any in-flight write to finish.
        let _guard = self.writer.acquire().await;
        debug!("record store shut down");
        Ok(())
    }
}

#[async_trait]
impl RecordStore for FsRecordStore {
    async fn find_pending(&self, user: &UserId) -> Result<Option<PurchaseRecord>, RaffleError> {
        Ok(self.list_pending_for(user).await?.into_iter().next())
    }

    async fn list_pending_for(&self, user: &UserId) -> Result<Vec<PurchaseRecord>, RaffleError> {
        let mut records = self.load_partition(RecordStatus::Pending).await?;
        records.retain(|r| &r.user == user);
        Ok(records)
    }

    async fn find_by_id(&self, id: &RecordId) -> Result<Option<PurchaseRecord>, RaffleError> {
        if !id.is_safe() {
            return Ok(None);
        }
        Ok(self.locate(id).await?.map(|(_, record)| record))
    }

    async fn create(&self, mut record: PurchaseRecord) -> Result<PurchaseRecord, RaffleError> {
        let _guard = self.writer.acquire().await;
        if self.locate(&record.id).await?.is_some() {
            return Err(RaffleError::DuplicateRecord {
                id: record.id.to_string(),
            });
        }
        record.status = RecordStatus::Pending;
        record.version = 1;
        self.write_record(&record).await?;
        debug!(record_id = %record.id, user = %record.user, "record created");
        Ok(record)
    }

    async fn move_partition(
        &self,
        id: &RecordId,
        from: RecordStatus,
        to: RecordStatus,
        patch: RecordPatch,
    ) -> Result<PurchaseRecord, RaffleError> {
        if from.is_terminal() || from == to {
            return Err(RaffleError::Internal(format!(
                "illegal transition {from} -> {to} for record {id}"
            )));
        }

        let _guard = self.writer.acquire().await;
        let (actual, mut record) =
            self.locate(id)
                .await?
                .ok_or_else(|| RaffleError::RecordNotFound { id: id.to_string() })?;
        if actual != from {
            return Err(RaffleError::NotInPartition {
                id: id.to_string(),
                expected: from,
                actual,
            });
        }
        check_version(&record, &patch)?;

        let now = Utc::now();
        record.apply(&patch);
        record.status = to;
        record.version += 1;
        record.updated_at = Some(now);
        match to {
            RecordStatus::Completed => record.approved_at = Some(now),
            RecordStatus::Canceled => record.canceled_at = Some(now),
            RecordStatus::Pending => {}
        }

        // Destination first: there is never a moment with zero copies.
        self.write_record(&record).await?;
        writer::remove_if_exists(&self.record_path(from, id)?).await?;

        info!(record_id = %id, from = %from, to = %to, "record moved");
        Ok(record)
    }

    async fn update_pending(
        &self,
        id: &RecordId,
        patch: RecordPatch,
    ) -> Result<PurchaseRecord, RaffleError> {
        let _guard = self.writer.acquire().await;
        let (actual, mut record) =
            self.locate(id)
                .await?
                .ok_or_else(|| RaffleError::RecordNotFound { id: id.to_string() })?;
        if actual != RecordStatus::Pending {
            return Err(RaffleError::NotInPartition {
                id: id.to_string(),
                expected: RecordStatus::Pending,
                actual,
            });
        }
        check_version(&record, &patch)?;

        record.apply(&patch);
        record.version += 1;
        record.updated_at = Some(Utc::now());
        self.write_record(&record).await?;
        debug!(record_id = %id, version = record.version, "pending record updated");
        Ok(record)
    }

    async fn list(&self, status: RecordStatus) -> Result<Vec<PurchaseRecord>, RaffleError> {
        self.load_partition(status).await
    }

    async fn count(&self, status: RecordStatus) -> Result<usize, RaffleError> {
        Ok(self.load_partition(status).await?.len())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use raffle_core::types::{Intervention, PurchaseDetails, RaffleInfo};
    use tempfile::tempdir;

    fn pending_record(user: &str) -> PurchaseRecord {
        let raffle = RaffleInfo {
            id: 1,
            name: "Sticker Rueda y Gana".into(),
            icon: None,
        };
        let details = PurchaseDetails {
            item_count: 10,
            total_amount: 10_000,
            items: Vec::new(),
            error: None,
        };
        PurchaseRecord::new_pending(UserId::new(user), "Ana", &raffle, &details, Utc::now())
    }

    #[tokio::test]
    async fn open_creates_partitions() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        for name in ["pending", "completed", "canceled"] {
            assert!(dir.path().join(name).is_dir());
        }
        assert_eq!(store.health_check().await.unwrap(), HealthStatus::Healthy);
        assert_eq!(store.name(), "fs-records");
        assert_eq!(store.adapter_type(), AdapterType::Storage);
    }

    #[tokio::test]
    async fn create_then_find_pending() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let created = store.create(pending_record("3001234567")).await.unwrap();
        assert_eq!(created.version, 1);

        let found = store
            .find_pending(&UserId::new("3001234567"))
            .await
            .unwrap()
            .expect("pending record");
        assert_eq!(found.id, created.id);
        assert!(
            dir.path()
                .join("pending")
                .join(format!("{}.json", created.id))
                .exists()
        );
        assert!(
            store
                .find_pending(&UserId::new("3009999999"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let record = pending_record("3001234567");
        store.create(record.clone()).await.unwrap();
        let err = store.create(record).await.unwrap_err();
        assert!(matches!(err, RaffleError::DuplicateRecord { .. }));
    }

    #[tokio::test]
    async fn move_writes_destination_and_removes_source() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let record = store.create(pending_record("3001234567")).await.unwrap();

        let patch = RecordPatch {
            assigned_numbers: Some(vec!["001".into(), "002".into()]),
            ..RecordPatch::default()
        };
        let moved = store
            .move_partition(&record.id, RecordStatus::Pending, RecordStatus::Completed, patch)
            .await
            .unwrap();

        assert_eq!(moved.status, RecordStatus::Completed);
        assert!(moved.approved_at.is_some());
        assert_eq!(moved.version, 2);

        let reread = store.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(reread.status, RecordStatus::Completed);
        assert_eq!(reread.assigned_numbers, vec!["001", "002"]);
        assert!(
            !dir.path()
                .join("pending")
                .join(format!("{}.json", record.id))
                .exists()
        );
        assert_eq!(store.count(RecordStatus::Pending).await.unwrap(), 0);
        assert_eq!(store.count(RecordStatus::Completed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn second_move_reports_not_in_partition() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let record = store.create(pending_record("3001234567")).await.unwrap();

        store
            .move_partition(
                &record.id,
                RecordStatus::Pending,
                RecordStatus::Canceled,
                RecordPatch::rejection("expired"),
            )
            .await
            .unwrap();
        let err = store
            .move_partition(
                &record.id,
                RecordStatus::Pending,
                RecordStatus::Completed,
                RecordPatch::default(),
            )
            .await
            .unwrap_err();

        assert!(err.is_resolved_elsewhere());
        assert!(matches!(
            err,
            RaffleError::NotInPartition {
                actual: RecordStatus::Canceled,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn moving_out_of_terminal_partition_is_illegal() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let err = store
            .move_partition(
                &RecordId::new("purchase_1_x"),
                RecordStatus::Completed,
                RecordStatus::Pending,
                RecordPatch::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RaffleError::Internal(_)));
    }

    #[tokio::test]
    async fn move_of_unknown_record_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let err = store
            .move_partition(
                &RecordId::new("purchase_1_missing"),
                RecordStatus::Pending,
                RecordStatus::Canceled,
                RecordPatch::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RaffleError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn stale_version_is_rejected() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let record = store.create(pending_record("3001234567")).await.unwrap();

        store
            .update_pending(&record.id, RecordPatch::receipt("receipt_a.jpg", Utc::now()))
            .await
            .unwrap();

        let stale = RecordPatch {
            expected_version: Some(record.version),
            ..RecordPatch::rejection("admin")
        };
        let err = store
            .move_partition(&record.id, RecordStatus::Pending, RecordStatus::Canceled, stale)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RaffleError::VersionConflict {
                expected: 1,
                found: 2,
                ..
            }
        ));
        assert!(
            store
                .find_pending(&UserId::new("3001234567"))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn update_pending_fails_after_move() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let record = store.create(pending_record("3001234567")).await.unwrap();
        store
            .move_partition(
                &record.id,
                RecordStatus::Pending,
                RecordStatus::Completed,
                RecordPatch::default(),
            )
            .await
            .unwrap();

        let err = store
            .update_pending(&record.id, RecordPatch::receipt("receipt_a.jpg", Utc::now()))
            .await
            .unwrap_err();
        assert!(err.is_resolved_elsewhere());
    }

    #[tokio::test]
    async fn concurrent_moves_have_exactly_one_winner() {
        let dir = tempdir().unwrap();
        let store = Arc::new(FsRecordStore::open(dir.path()).await.unwrap());
        let record = store.create(pending_record("3001234567")).await.unwrap();

        let mut handles = Vec::new();
        for to in [RecordStatus::Completed, RecordStatus::Canceled] {
            let store = Arc::clone(&store);
            let id = record.id.clone();
            handles.push(tokio::spawn(async move {
                store
                    .move_partition(&id, RecordStatus::Pending, to, RecordPatch::default())
                    .await
            }));
        }

        let mut ok = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
        let total = store.count(RecordStatus::Completed).await.unwrap()
            + store.count(RecordStatus::Canceled).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(store.count(RecordStatus::Pending).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn open_repairs_interrupted_move() {
        let dir = tempdir().unwrap();
        let record = {
            let store = FsRecordStore::open(dir.path()).await.unwrap();
            store.create(pending_record("3001234567")).await.unwrap()
        };

        // Simulate a crash after the destination write but before the source delete.
        let pending = dir.path().join("pending").join(format!("{}.json", record.id));
        let mut terminal = record.clone();
        terminal.status = RecordStatus::Canceled;
        tokio::fs::write(
            dir.path().join("canceled").join(format!("{}.json", record.id)),
            serde_json::to_vec(&terminal).unwrap(),
        )
        .await
        .unwrap();
        tokio::fs::write(dir.path().join("pending").join("x.json.tmp"), b"{")
            .await
            .unwrap();

        let store = FsRecordStore::open(dir.path()).await.unwrap();
        assert!(!pending.exists());
        assert!(!dir.path().join("pending").join("x.json.tmp").exists());
        let found = store.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(found.status, RecordStatus::Canceled);
    }

    #[tokio::test]
    async fn shadowed_pending_copy_is_not_listed() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let record = store.create(pending_record("3001234567")).await.unwrap();

        let mut terminal = record.clone();
        terminal.status = RecordStatus::Completed;
        tokio::fs::write(
            dir.path().join("completed").join(format!("{}.json", record.id)),
            serde_json::to_vec(&terminal).unwrap(),
        )
        .await
        .unwrap();

        assert!(
            store
                .find_pending(&UserId::new("3001234567"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn list_is_oldest_first() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let mut older = pending_record("3001234567");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let newer = pending_record("3001234567");
        store.create(newer.clone()).await.unwrap();
        store.create(older.clone()).await.unwrap();

        let listed = store
            .list_pending_for(&UserId::new("3001234567"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, older.id);
    }

    #[tokio::test]
    async fn find_active_skips_flagged_records() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let user = UserId::new("3001234567");
        let mut older = pending_record("3001234567");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        let older = store.create(older).await.unwrap();
        let newer = store.create(pending_record("3001234567")).await.unwrap();

        let flag = RecordPatch {
            intervention: Some(Intervention {
                error: "Usuario no encontrado".into(),
                flagged_at: Utc::now(),
            }),
            ..RecordPatch::default()
        };
        store.update_pending(&older.id, flag).await.unwrap();

        assert_eq!(store.find_pending(&user).await.unwrap().unwrap().id, older.id);
        assert_eq!(store.find_active(&user).await.unwrap().unwrap().id, newer.id);

        store
            .move_partition(
                &newer.id,
                RecordStatus::Pending,
                RecordStatus::Completed,
                RecordPatch::default(),
            )
            .await
            .unwrap();
        assert!(store.find_active(&user).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unsafe_ids_are_never_looked_up() {
        let dir = tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        assert!(
            store
                .find_by_id(&RecordId::new("../../etc/passwd"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
