// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Graceful shutdown coordination with signal handling.
//!
//! Installs handlers for SIGTERM and SIGINT (Ctrl+C), triggering a
//! [`CancellationToken`] that the message loop, the sweeper and the admin
//! dispatcher monitor. Background tasks are drained before the process exits.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long shutdown waits for in-flight work.
pub const DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Installs signal handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
pub fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "failed to install SIGTERM handler, only Ctrl+C will stop the bot");
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}

/// Waits up to `timeout` for every task in `tasks` to finish, then aborts the rest.
///
/// Returns how many tasks were still running at the deadline.
pub async fn drain_tasks(tasks: &mut JoinSet<()>, timeout: Duration) -> usize {
    if tasks.is_empty() {
        info!("no background tasks to drain");
        return 0;
    }

    info!(count = tasks.len(), "waiting for background tasks to complete");
    let drained = tokio::time::timeout(timeout, async {
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "background task ended abnormally");
            }
        }
    })
    .await;

    if drained.is_ok() {
        info!("all background tasks drained");
        return 0;
    }

    let remaining = tasks.len();
    warn!(remaining, "drain timeout reached, aborting remaining tasks");
    tasks.abort_all();
    remaining
}
