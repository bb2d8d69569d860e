// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Filesystem store for receipt images.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};

use raffle_core::{RaffleError, ReceiptStore, UserId};

use crate::writer;

const RECEIPT_EXTENSIONS: &[&str] = &["jpg", "png", "webp"];

/// Receipts stored flat as `receipt_{user}_{unix_millis}.{ext}`.
pub struct FsReceiptStore {
    dir: PathBuf,
}

impl FsReceiptStore {
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, RaffleError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(RaffleError::storage)?;
        Ok(Self { dir })
    }

    fn prefix(user: &UserId) -> String {
        format!("receipt_{user}_")
    }

    /// Resolves a receipt reference to a path inside the store.
    fn path_of(&self, receipt_ref: &str) -> Result<PathBuf, RaffleError> {
        let safe = !receipt_ref.is_empty()
            && receipt_ref
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !receipt_ref.starts_with('.');
        if !safe {
            return Err(RaffleError::Internal(format!(
                "invalid receipt reference `{receipt_ref}`"
            )));
        }
        Ok(self.dir.join(receipt_ref))
    }
}

/// File extension for an accepted image MIME type.
pub fn extension_for(mime_type: &str) -> &'static str {
    match mime_type.to_ascii_lowercase().as_str() {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

#[async_trait]
impl ReceiptStore for FsReceiptStore {
    async fn save(
        &self,
        user: &UserId,
        existing: Option<&str>,
        mime_type: &str,
        data: &[u8],
    ) -> Result<String, RaffleError> {
        // Only reuse a reference that really belongs to this user.
        let reuse = existing.filter(|r| r.starts_with(&Self::prefix(user)));
        if existing.is_some() && reuse.is_none() {
            warn!(user = %user, "ignoring foreign receipt reference");
        }
        let stem = match reuse {
            Some(existing) => existing
                .rsplit_once('.')
                .map_or(existing, |(stem, _)| stem)
                .to_string(),
            None => format!("{}{}", Self::prefix(user), Utc::now().timestamp_millis()),
        };
        // The stem stays stable across resubmissions; the extension follows the
        // latest image.
        let receipt_ref = format!("{stem}.{}", extension_for(mime_type));

        let path = self.path_of(&receipt_ref)?;
        writer::atomic_write(&path, data).await?;
        if let Some(previous) = reuse.filter(|previous| *previous != receipt_ref) {
            writer::remove_if_exists(&self.path_of(previous)?).await?;
        }
        debug!(user = %user, receipt = %receipt_ref, bytes = data.len(), "receipt saved");
        Ok(receipt_ref)
    }

    async fn read(&self, receipt_ref: &str) -> Result<Vec<u8>, RaffleError> {
        tokio::fs::read(self.path_of(receipt_ref)?)
            .await
            .map_err(RaffleError::storage)
    }

    async fn list_for_user(&self, user: &UserId) -> Result<Vec<String>, RaffleError> {
        let prefix = Self::prefix(user);
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(RaffleError::storage)?;
        let mut refs = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(RaffleError::storage)? {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            let is_image = RECEIPT_EXTENSIONS
                .iter()
                .any(|ext| name.ends_with(&format!(".{ext}")));
            if name.starts_with(&prefix) && is_image {
                refs.push(name);
            }
        }
        refs.sort();
        Ok(refs)
    }

    async fn remove_for_user(&self, user: &UserId) -> Result<usize, RaffleError> {
        let mut removed = 0;
        for receipt_ref in self.list_for_user(user).await? {
            if writer::remove_if_exists(&self.path_of(&receipt_ref)?).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(user = %user, removed, "receipts removed");
        }
        Ok(removed)
    }
}
