// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Periodic expiry of purchase sessions.
//!
//! Every tick the sweeper walks the open sessions and, under each user's lock,
//! re-reads the record store before acting: a session whose pending record is
//! gone or flagged for intervention is purged, and a session older than the
//! timeout is canceled with reason `expired`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use raffle_core::error::RaffleError;
use raffle_core::types::PurchaseSession;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::context::BotContext;
use crate::session::TerminalReason;

/// Outcome of one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    /// Sessions whose record was already resolved elsewhere.
    pub purged: usize,
    pub expired: usize,
    pub errors: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SweepAction {
    Kept,
    Purged,
    Expired,
}

pub struct ExpirySweeper {
    ctx: Arc<BotContext>,
    interval: Duration,
}

impl ExpirySweeper {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        let interval = ctx.settings.sweep_interval;
        Self { ctx, interval }
    }

    /// Sweeps on a fixed interval until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        // The first tick fires immediately; skip it.
        interval.tick().await;

        info!(interval_secs = self.interval.as_secs(), "expiry sweeper started");
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    match self.sweep().await {
                        Ok(report) if report.purged + report.expired + report.errors > 0 => {
                            info!(
                                scanned = report.scanned,
                                purged = report.purged,
                                expired = report.expired,
                                errors = report.errors,
                                "sweep finished"
                            );
                        }
                        Ok(report) => debug!(scanned = report.scanned, "sweep finished"),
                        Err(e) => error!(error = %e, "sweep failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    debug!("expiry sweeper shutting down");
                    break;
                }
            }
        }
    }

    pub async fn sweep(&self) -> Result<SweepReport, RaffleError> {
        self.sweep_at(Utc::now()).await
    }

    /// Runs one pass as if the current time were `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, RaffleError> {
        let mut report = SweepReport::default();

        for candidate in self.ctx.sessions.list().await {
            if !candidate.awaiting_receipt {
                continue;
            }
            report.scanned += 1;
            match self.check(&candidate, now).await {
                Ok(SweepAction::Kept) => {}
                Ok(SweepAction::Purged) => report.purged += 1,
                Ok(SweepAction::Expired) => report.expired += 1,
                Err(e) => {
                    error!(user = %candidate.user, error = %e, "failed to sweep session");
                    report.errors += 1;
                }
            }
        }

        let pruned = self.ctx.locks.prune();
        if pruned > 0 {
            debug!(pruned, "idle user locks released");
        }
        Ok(report)
    }

    async fn check(
        &self,
        candidate: &PurchaseSession,
        now: DateTime<Utc>,
    ) -> Result<SweepAction, RaffleError> {
        let user = &candidate.user;
        let _guard = self.ctx.locks.lock(user).await;

        // The listing is a snapshot; the session may have moved on since.
        let Some(session) = self.ctx.sessions.get(user).await else {
            return Ok(SweepAction::Kept);
        };

        match self.ctx.records.find_active(user).await? {
            None => {
                self.ctx
                    .purge_session(user, TerminalReason::ResolvedElsewhere)
                    .await;
                Ok(SweepAction::Purged)
            }
            Some(record) if record.id != session.record_id => {
                // Memory tracks an older record; follow the store.
                let rebuilt = PurchaseSession::for_record(&record);
                self.ctx.sessions.set(rebuilt.clone()).await;
                self.expire_if_due(&rebuilt, now).await
            }
            Some(_) => self.expire_if_due(&session, now).await,
        }
    }

    async fn expire_if_due(
        &self,
        session: &PurchaseSession,
        now: DateTime<Utc>,
    ) -> Result<SweepAction, RaffleError> {
        if !session.is_expired(now, self.ctx.settings.timeout) {
            return Ok(SweepAction::Kept);
        }
        if self.ctx.expire(session).await? {
            Ok(SweepAction::Expired)
        } else {
            Ok(SweepAction::Purged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Adapters;
    use crate::session::InMemorySessionStore;
    use raffle_bus::EventBus;
    use raffle_config::model::RaffleConfig;
    use raffle_core::traits::{RecordStore, SessionStore};
    use raffle_core::types::{
        EventKind, Intervention, PurchaseDetails, PurchaseRecord, RaffleInfo, RecordPatch,
        RecordStatus, UserId,
    };
    use raffle_storage::{FsReceiptStore, FsRecordStore};
    use raffle_test_utils::{MockChannel, MockLedger};
    use tempfile::TempDir;

    async fn context() -> (TempDir, Arc<BotContext>, Arc<MockChannel>, Arc<EventBus>) {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(MockChannel::new());
        let bus = Arc::new(EventBus::default());
        let adapters = Adapters {
            channel: channel.clone(),
            records: Arc::new(FsRecordStore::open(dir.path()).await.unwrap()),
            receipts: Arc::new(FsReceiptStore::open(dir.path().join("receipts")).await.unwrap()),
            sessions: Arc::new(InMemorySessionStore::new()),
            ledger: Arc::new(MockLedger::new()),
            events: bus.clone(),
        };
        let ctx = Arc::new(BotContext::new(&RaffleConfig::default(), adapters));
        (dir, ctx, channel, bus)
    }

    async fn open_session(ctx: &BotContext, user: &str, opened_at: DateTime<Utc>) -> PurchaseRecord {
        let record = PurchaseRecord::new_pending(
            UserId::new(user),
            "Ana",
            &RaffleInfo {
                id: 1,
                name: "Sticker Rueda y Gana".into(),
                icon: None,
            },
            &PurchaseDetails {
                item_count: 10,
                total_amount: 10_000,
                ..PurchaseDetails::default()
            },
            opened_at,
        );
        let record = ctx.records.create(record).await.unwrap();
        ctx.sessions.set(PurchaseSession::for_record(&record)).await;
        record
    }

    #[tokio::test]
    async fn expires_sessions_past_timeout() {
        let (_dir, ctx, channel, bus) = context().await;
        let mut events = bus.subscribe();
        let start = Utc::now();
        let record = open_session(&ctx, "3001234567", start).await;

        let sweeper = ExpirySweeper::new(Arc::clone(&ctx));
        let report = sweeper
            .sweep_at(start + chrono::Duration::minutes(61))
            .await
            .unwrap();
        assert_eq!(report.expired, 1);

        let stored = ctx.records.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Canceled);
        assert_eq!(stored.rejection_reason.as_deref(), Some("expired"));
        assert!(ctx.sessions.get(&record.user).await.is_none());
        assert!(channel.sent_messages().await[0].body().contains("expired"));
        assert_eq!(events.recv().await.unwrap().event.kind, EventKind::PurchaseUpdated);
    }

    #[tokio::test]
    async fn keeps_sessions_within_timeout() {
        let (_dir, ctx, channel, _bus) = context().await;
        let start = Utc::now();
        let record = open_session(&ctx, "3001234567", start).await;

        let sweeper = ExpirySweeper::new(Arc::clone(&ctx));
        let report = sweeper
            .sweep_at(start + chrono::Duration::minutes(60))
            .await
            .unwrap();
        assert_eq!(report, SweepReport { scanned: 1, ..SweepReport::default() });
        assert!(ctx.sessions.get(&record.user).await.is_some());
        assert_eq!(channel.sent_count().await, 0);
    }

    #[tokio::test]
    async fn purges_session_whose_record_was_approved() {
        let (_dir, ctx, channel, _bus) = context().await;
        let start = Utc::now();
        let record = open_session(&ctx, "3001234567", start).await;
        ctx.records
            .move_partition(
                &record.id,
                RecordStatus::Pending,
                RecordStatus::Completed,
                RecordPatch::default(),
            )
            .await
            .unwrap();

        let sweeper = ExpirySweeper::new(Arc::clone(&ctx));
        // Even past the timeout an approved record is never canceled.
        let report = sweeper
            .sweep_at(start + chrono::Duration::minutes(90))
            .await
            .unwrap();
        assert_eq!(report.purged, 1);
        assert_eq!(report.expired, 0);

        let stored = ctx.records.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Completed);
        assert!(ctx.sessions.get(&record.user).await.is_none());
        assert_eq!(channel.sent_count().await, 0);
    }

    #[tokio::test]
    async fn flagged_record_is_never_expired() {
        let (_dir, ctx, channel, _bus) = context().await;
        let start = Utc::now();
        let record = open_session(&ctx, "3001234567", start).await;
        ctx.records
            .update_pending(
                &record.id,
                RecordPatch {
                    intervention: Some(Intervention {
                        error: "Usuario no encontrado".into(),
                        flagged_at: start,
                    }),
                    ..RecordPatch::default()
                },
            )
            .await
            .unwrap();

        let sweeper = ExpirySweeper::new(Arc::clone(&ctx));
        let report = sweeper
            .sweep_at(start + chrono::Duration::minutes(61))
            .await
            .unwrap();
        assert_eq!(report.expired, 0);
        assert_eq!(report.purged, 1);

        let stored = ctx.records.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Pending);
        assert!(stored.rejection_reason.is_none());
        assert!(ctx.sessions.get(&record.user).await.is_none());
        assert_eq!(channel.sent_count().await, 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let (_dir, ctx, _channel, _bus) = context().await;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(ExpirySweeper::new(ctx).run(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("sweeper should stop")
            .unwrap();
    }
}
