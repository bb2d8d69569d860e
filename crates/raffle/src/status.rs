// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `raffle status` command implementation.
//!
//! Reports how many purchase records sit in each partition of the record
//! store. Opening the store repairs crash leftovers first, so the counts
//! never include a record twice.

use std::io::IsTerminal;

use raffle_config::model::RaffleConfig;
use raffle_core::RaffleError;
use raffle_core::traits::RecordStore;
use raffle_core::types::RecordStatus;
use raffle_storage::FsRecordStore;
use serde::Serialize;

/// Structured status output for `--json` mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusResponse {
    pub data_dir: String,
    pub pending: usize,
    pub completed: usize,
    pub canceled: usize,
}

impl StatusResponse {
    pub fn total(&self) -> usize {
        self.pending + self.completed + self.canceled
    }
}

/// Counts the records in every partition.
pub async fn collect_status(store: &impl RecordStore, data_dir: &str) -> Result<StatusResponse, RaffleError> {
    Ok(StatusResponse {
        data_dir: data_dir.to_string(),
        pending: store.count(RecordStatus::Pending).await?,
        completed: store.count(RecordStatus::Completed).await?,
        canceled: store.count(RecordStatus::Canceled).await?,
    })
}

/// Run the `raffle status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(config: &RaffleConfig, json: bool, plain: bool) -> Result<(), RaffleError> {
    let store = FsRecordStore::open(&config.storage.data_dir).await?;
    let status = collect_status(&store, &config.storage.data_dir).await?;

    if json {
        let rendered = serde_json::to_string_pretty(&status)
            .map_err(|e| RaffleError::Internal(format!("failed to serialize status: {e}")))?;
        println!("{rendered}");
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&status, use_color);
    }
    Ok(())
}

fn print_status(status: &StatusResponse, use_color: bool) {
    println!();
    println!("  raffle status");
    println!("  {}", "-".repeat(35));
    println!("    Data dir:   {}", status.data_dir);

    if use_color {
        use colored::Colorize;
        println!("    Pending:    {}", status.pending.to_string().yellow());
        println!("    Completed:  {}", status.completed.to_string().green());
        println!("    Canceled:   {}", status.canceled.to_string().red());
    } else {
        println!("    Pending:    {}", status.pending);
        println!("    Completed:  {}", status.completed);
        println!("    Canceled:   {}", status.canceled);
    }

    println!("    Total:      {}", status.total());
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use raffle_test_utils::TestHarness;

    #[tokio::test]
    async fn counts_each_partition() {
        let harness = TestHarness::new().await.unwrap();
        harness.send(TestHarness::purchase(1)).await.unwrap();

        let status = collect_status(harness.records.as_ref(), "data").await.unwrap();
        assert_eq!(status.pending, 1);
        assert_eq!(status.completed, 0);
        assert_eq!(status.canceled, 0);
        assert_eq!(status.total(), 1);
    }

    #[tokio::test]
    async fn empty_store_reports_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsRecordStore::open(dir.path()).await.unwrap();
        let status = collect_status(&store, "data").await.unwrap();
        assert_eq!(status.total(), 0);
    }

    #[test]
    fn status_response_serializes() {
        let resp = StatusResponse {
            data_dir: "data".to_string(),
            pending: 2,
            completed: 5,
            canceled: 1,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"pending\":2"));
        assert!(json.contains("\"completed\":5"));
    }
}
