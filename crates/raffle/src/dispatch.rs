// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background tasks that sit between the bridge and the bot: the admin
//! dispatcher and the event forwarder.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use raffle_agent::AdminService;
use raffle_bus::Envelope;
use raffle_core::RaffleError;

use crate::bridge::{AdminAction, AdminRequest, AdminResult, BridgeChannel, OutboundFrame};

fn to_json<T: Serialize>(value: &T) -> Result<Value, RaffleError> {
    serde_json::to_value(value)
        .map_err(|e| RaffleError::Internal(format!("failed to serialize admin result: {e}")))
}

/// Runs one admin action against the bot.
pub async fn execute(admin: &AdminService, action: AdminAction) -> Result<Value, RaffleError> {
    match action {
        AdminAction::Approve {
            record_id,
            assigned_numbers,
            external_purchase_id,
        } => {
            let record = admin
                .approve(&record_id, assigned_numbers, external_purchase_id)
                .await?;
            to_json(&record)
        }
        AdminAction::Accept { record_id } => to_json(&admin.accept(&record_id).await?),
        AdminAction::Reject { record_id, reason } => {
            to_json(&admin.reject(&record_id, reason).await?)
        }
        AdminAction::Block { user, reason } => to_json(&admin.block_user(&user, &reason).await?),
        AdminAction::Unblock { user } => Ok(json!({ "unblocked": admin.unblock_user(&user) })),
    }
}

/// Executes a request and shapes the reply frame.
pub async fn handle_request(admin: &AdminService, request: AdminRequest) -> AdminResult {
    let command = request.action.name().to_string();
    match execute(admin, request.action).await {
        Ok(result) => {
            info!(command = %command, "admin request completed");
            AdminResult {
                request_id: request.request_id,
                command,
                ok: true,
                result: Some(result),
                error: None,
            }
        }
        Err(e) => {
            warn!(command = %command, error = %e, "admin request failed");
            AdminResult {
                request_id: request.request_id,
                command,
                ok: false,
                result: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// Serves admin requests from the bridge until cancelled or the bridge closes.
pub async fn run_admin_dispatcher(
    admin: AdminService,
    mut requests: mpsc::Receiver<AdminRequest>,
    bridge: Arc<BridgeChannel>,
    cancel: CancellationToken,
) {
    info!("admin dispatcher started");
    loop {
        tokio::select! {
            request = requests.recv() => {
                let Some(request) = request else {
                    debug!("admin request stream closed");
                    break;
                };
                let result = handle_request(&admin, request).await;
                if let Err(e) = bridge.emit(OutboundFrame::AdminResult(result)).await {
                    warn!(error = %e, "failed to deliver admin result");
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
    info!("admin dispatcher stopped");
}

/// Forwards push-channel events to the bridge.
pub async fn run_event_forwarder(
    mut events: broadcast::Receiver<Envelope>,
    bridge: Arc<BridgeChannel>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            received = events.recv() => match received {
                Ok(event) => {
                    if let Err(e) = bridge.emit(OutboundFrame::Event { event }).await {
                        warn!(error = %e, "failed to forward event");
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "event forwarder lagged, events dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = cancel.cancelled() => break,
        }
    }
    debug!("event forwarder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use raffle_core::types::{RecordId, RecordStatus, Registration, UserId};
    use raffle_test_utils::TestHarness;

    async fn pending_id(harness: &TestHarness) -> RecordId {
        let handled = harness.send(TestHarness::purchase(2)).await.unwrap();
        match handled {
            raffle_agent::Handled::SessionOpened(record) => record.id,
            other => panic!("expected a session, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn approve_request_returns_completed_record() {
        let harness = TestHarness::new().await.unwrap();
        let id = pending_id(&harness).await;

        let result = handle_request(
            &harness.admin,
            AdminRequest {
                request_id: Some("r1".into()),
                action: AdminAction::Approve {
                    record_id: id,
                    assigned_numbers: vec!["007".into()],
                    external_purchase_id: None,
                },
            },
        )
        .await;

        assert!(result.ok);
        assert_eq!(result.request_id.as_deref(), Some("r1"));
        let record = result.result.unwrap();
        assert_eq!(record["status"], serde_json::to_value(RecordStatus::Completed).unwrap());
    }

    #[tokio::test]
    async fn accept_request_uses_ledger_numbers() {
        let harness = TestHarness::new().await.unwrap();
        harness.ledger.set_registration(Registration {
            purchase_id: Some("ext-9".into()),
            assigned_numbers: vec!["100".into()],
            total_numbers: 1,
        });
        let id = pending_id(&harness).await;

        let result = handle_request(
            &harness.admin,
            AdminRequest {
                request_id: None,
                action: AdminAction::Accept { record_id: id },
            },
        )
        .await;
        assert!(result.ok, "{:?}", result.error);
        assert_eq!(result.command, "accept");
    }

    #[tokio::test]
    async fn failed_request_reports_error() {
        let harness = TestHarness::new().await.unwrap();
        let result = handle_request(
            &harness.admin,
            AdminRequest {
                request_id: Some("r2".into()),
                action: AdminAction::Reject {
                    record_id: RecordId::new("purchase_0_missing"),
                    reason: None,
                },
            },
        )
        .await;
        assert!(!result.ok);
        assert!(result.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn unblock_reports_whether_user_was_blocked() {
        let harness = TestHarness::new().await.unwrap();
        let user = UserId::new("3001234567");
        let value = execute(&harness.admin, AdminAction::Unblock { user: user.clone() })
            .await
            .unwrap();
        assert_eq!(value["unblocked"], false);

        execute(
            &harness.admin,
            AdminAction::Block {
                user: user.clone(),
                reason: "spam".into(),
            },
        )
        .await
        .unwrap();
        let value = execute(&harness.admin, AdminAction::Unblock { user })
            .await
            .unwrap();
        assert_eq!(value["unblocked"], true);
    }
}
