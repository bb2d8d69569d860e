// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Single-writer discipline and atomic file writes.
//!
//! Every record mutation in raffle-storage holds the [`SingleWriter`] lock for
//! its whole read-check-write sequence. Readers never take the lock; they rely
//! on writes being atomic renames and on moves writing the destination before
//! deleting the source.
//!
//! **Do NOT write record files without holding the writer lock.**

use std::path::{Path, PathBuf};

use raffle_core::RaffleError;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, MutexGuard};

/// Suffix of in-flight temp files. Leftovers are removed on open.
pub const TEMP_SUFFIX: &str = "tmp";

/// The one lock every record mutation passes through.
#[derive(Debug, Default)]
pub struct SingleWriter {
    lock: Mutex<()>,
}

impl SingleWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().await
    }
}

/// Path of the temp file used while writing `path`.
pub fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(TEMP_SUFFIX);
    path.with_file_name(name)
}

/// Writes `bytes` to `path` so that readers see either the old or the new
/// content, never a partial file.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), RaffleError> {
    let tmp = temp_path(path);
    let result = async {
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        tokio::fs::rename(&tmp, path).await
    }
    .await;

    if let Err(err) = result {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(RaffleError::storage(err));
    }
    Ok(())
}

/// Removes a file, treating "already gone" as success.
pub async fn remove_if_exists(path: &Path) -> Result<bool, RaffleError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(RaffleError::storage(err)),
    }
}
