// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Admin operations on purchase records.
//!
//! Approve, reject and accept move records out of `pending` on behalf of an
//! operator. Each takes the buyer's lock, so it never interleaves with the
//! controller or the sweeper for that user, and purges the buyer's session
//! before returning. `accept` keeps the lock across the ledger call: a record
//! the ledger is assigning numbers to cannot expire underneath it.

use std::sync::Arc;

use chrono::Utc;
use raffle_core::error::RaffleError;
use raffle_core::types::{
    EventKind, Intervention, PurchaseRecord, RecordId, RecordPatch, RecordStatus,
    RegistrationRequest, UserId,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::context::BotContext;
use crate::identity::ledger_number;
use crate::session::TerminalReason;

pub const DEFAULT_REJECTION_REASON: &str = "Invalid payment receipt";

/// Result of [`AdminService::accept`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "record", rename_all = "snake_case")]
pub enum AcceptOutcome {
    /// The ledger assigned numbers and the record is now `completed`.
    Approved(PurchaseRecord),
    /// The ledger does not know the buyer; the record stays `pending`, flagged.
    InterventionRequired(PurchaseRecord),
}

/// Result of [`AdminService::block_user`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BlockOutcome {
    pub newly_blocked: bool,
    pub canceled: Vec<RecordId>,
}

pub struct AdminService {
    ctx: Arc<BotContext>,
}

impl AdminService {
    pub fn new(ctx: Arc<BotContext>) -> Self {
        Self { ctx }
    }

    async fn owner_of(&self, id: &RecordId) -> Result<UserId, RaffleError> {
        match self.ctx.records.find_by_id(id).await? {
            Some(record) => Ok(record.user),
            None => Err(RaffleError::RecordNotFound { id: id.to_string() }),
        }
    }

    async fn pending_record(&self, id: &RecordId) -> Result<PurchaseRecord, RaffleError> {
        let record = self
            .ctx
            .records
            .find_by_id(id)
            .await?
            .ok_or_else(|| RaffleError::RecordNotFound { id: id.to_string() })?;
        if record.status != RecordStatus::Pending {
            return Err(RaffleError::NotInPartition {
                id: id.to_string(),
                expected: RecordStatus::Pending,
                actual: record.status,
            });
        }
        Ok(record)
    }

    /// Drops the buyer's session if it belongs to `id`.
    async fn purge_if_current(&self, user: &UserId, id: &RecordId, reason: TerminalReason) {
        let owns = self
            .ctx
            .sessions
            .get(user)
            .await
            .is_some_and(|session| &session.record_id == id);
        if owns {
            self.ctx.purge_session(user, reason).await;
        }
    }

    /// Moves a pending record out of `pending` under the buyer's lock.
    async fn resolve(
        &self,
        id: &RecordId,
        to: RecordStatus,
        patch: RecordPatch,
        reason: TerminalReason,
    ) -> Result<PurchaseRecord, RaffleError> {
        let user = self.owner_of(id).await?;
        let _guard = self.ctx.locks.lock(&user).await;
        self.resolve_locked(&user, id, to, patch, reason).await
    }

    /// Like [`resolve`](Self::resolve); the caller holds the buyer's lock.
    async fn resolve_locked(
        &self,
        user: &UserId,
        id: &RecordId,
        to: RecordStatus,
        patch: RecordPatch,
        reason: TerminalReason,
    ) -> Result<PurchaseRecord, RaffleError> {
        match self
            .ctx
            .records
            .move_partition(id, RecordStatus::Pending, to, patch)
            .await
        {
            Ok(record) => {
                self.purge_if_current(user, id, reason).await;
                Ok(record)
            }
            Err(e) => {
                if e.is_resolved_elsewhere() {
                    self.purge_if_current(user, id, TerminalReason::ResolvedElsewhere)
                        .await;
                }
                Err(e)
            }
        }
    }

    /// Approves a pending purchase with the numbers the ledger assigned.
    ///
    /// Calling it on a record that already left `pending` fails with
    /// `NotInPartition` and changes nothing.
    pub async fn approve(
        &self,
        id: &RecordId,
        assigned_numbers: Vec<String>,
        external_purchase_id: Option<String>,
    ) -> Result<PurchaseRecord, RaffleError> {
        let patch = RecordPatch {
            assigned_numbers: Some(assigned_numbers),
            external_purchase_id,
            ..RecordPatch::default()
        };
        let record = self
            .resolve(id, RecordStatus::Completed, patch, TerminalReason::Approved)
            .await?;
        self.announce_approval(&record).await;
        Ok(record)
    }

    async fn announce_approval(&self, record: &PurchaseRecord) {
        info!(
            user = %record.user,
            record_id = %record.id,
            numbers = record.assigned_numbers.len(),
            "purchase approved"
        );
        self.ctx.publish(EventKind::PurchaseApproved, record, None);
        let text = self.ctx.messages.approved(record);
        self.ctx.send_text(&record.user, &text).await;
    }

    /// Rejects a pending purchase. The reason defaults to
    /// [`DEFAULT_REJECTION_REASON`].
    pub async fn reject(
        &self,
        id: &RecordId,
        reason: Option<String>,
    ) -> Result<PurchaseRecord, RaffleError> {
        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());
        let record = self
            .resolve(
                id,
                RecordStatus::Canceled,
                RecordPatch::rejection(reason.clone()),
                TerminalReason::Rejected,
            )
            .await?;

        info!(user = %record.user, record_id = %record.id, reason = %reason, "purchase rejected");
        self.ctx.stats.purchase_rejected();
        self.ctx
            .publish(EventKind::PurchaseRejected, &record, Some(reason.as_str()));
        let text = self.ctx.messages.rejected(&record, &reason);
        self.ctx.send_text(&record.user, &text).await;
        Ok(record)
    }

    /// Registers a pending purchase with the ledger and approves it.
    ///
    /// An unknown buyer flags the record for manual intervention instead.
    /// Other ledger failures leave the record untouched.
    pub async fn accept(&self, id: &RecordId) -> Result<AcceptOutcome, RaffleError> {
        let user = self.owner_of(id).await?;
        let _guard = self.ctx.locks.lock(&user).await;
        let record = self.pending_record(id).await?;
        let request = RegistrationRequest {
            number: ledger_number(&record.user, &self.ctx.identity.country_code),
            raffle_id: record.raffle_id,
            quantity: record.item_count,
            amount: record.total_amount,
            purchase_id: record.id.to_string(),
        };

        match self.ctx.ledger.register_purchase(request).await {
            Ok(registration) => {
                let patch = RecordPatch {
                    assigned_numbers: Some(registration.assigned_numbers),
                    external_purchase_id: registration
                        .purchase_id
                        .or_else(|| Some(record.id.to_string())),
                    ..RecordPatch::default()
                };
                let approved = self
                    .resolve_locked(
                        &user,
                        id,
                        RecordStatus::Completed,
                        patch,
                        TerminalReason::Approved,
                    )
                    .await?;
                self.announce_approval(&approved).await;
                Ok(AcceptOutcome::Approved(approved))
            }
            Err(RaffleError::UserNotRegistered { message }) => {
                let flagged = self.flag_intervention(&record, message).await?;
                Ok(AcceptOutcome::InterventionRequired(flagged))
            }
            Err(e) => {
                warn!(record_id = %id, error = %e, "ledger registration failed");
                Err(e)
            }
        }
    }

    /// Flags the record and hands it to an operator. The caller holds the
    /// buyer's lock.
    async fn flag_intervention(
        &self,
        record: &PurchaseRecord,
        error: String,
    ) -> Result<PurchaseRecord, RaffleError> {
        let patch = RecordPatch {
            intervention: Some(Intervention {
                error: error.clone(),
                flagged_at: Utc::now(),
            }),
            ..RecordPatch::default()
        };
        let flagged = self.ctx.records.update_pending(&record.id, patch).await?;
        // The buyer is no longer asked for a receipt, and the record never expires.
        self.purge_if_current(&flagged.user, &flagged.id, TerminalReason::Intervention)
            .await;

        warn!(
            user = %flagged.user,
            record_id = %flagged.id,
            error = %error,
            "manual intervention required"
        );
        self.ctx
            .publish(EventKind::InterventionRequired, &flagged, Some(error.as_str()));
        let text = self.ctx.messages.intervention(&flagged);
        self.ctx.send_text(&flagged.user, &text).await;
        Ok(flagged)
    }

    /// Blocks a user: cancels their pending records and ignores their messages.
    pub async fn block_user(
        &self,
        user: &UserId,
        reason: &str,
    ) -> Result<BlockOutcome, RaffleError> {
        let newly_blocked = self.ctx.blocked.insert(user.clone(), reason);
        let _guard = self.ctx.locks.lock(user).await;

        let mut outcome = BlockOutcome {
            newly_blocked,
            canceled: Vec::new(),
        };
        let cancel_reason = format!("user blocked: {reason}");
        for record in self.ctx.records.list_pending_for(user).await? {
            match self
                .ctx
                .records
                .move_partition(
                    &record.id,
                    RecordStatus::Pending,
                    RecordStatus::Canceled,
                    RecordPatch::rejection(cancel_reason.clone()),
                )
                .await
            {
                Ok(canceled) => {
                    self.ctx
                        .publish(EventKind::PurchaseRejected, &canceled, Some(cancel_reason.as_str()));
                    outcome.canceled.push(canceled.id);
                }
                Err(e) if e.is_resolved_elsewhere() => {}
                Err(e) => return Err(e),
            }
        }
        self.ctx.purge_session(user, TerminalReason::Blocked).await;

        if newly_blocked {
            self.ctx.stats.user_blocked();
        }
        info!(user = %user, reason, canceled = outcome.canceled.len(), "user blocked");
        let text = self.ctx.messages.blocked();
        self.ctx.send_text(user, &text).await;
        Ok(outcome)
    }

    /// Returns false when the user was not blocked.
    pub fn unblock_user(&self, user: &UserId) -> bool {
        let removed = self.ctx.blocked.remove(user);
        if removed {
            info!(user = %user, "user unblocked");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Adapters;
    use crate::session::InMemorySessionStore;
    use crate::sweeper::ExpirySweeper;
    use async_trait::async_trait;
    use chrono::DateTime;
    use raffle_bus::EventBus;
    use raffle_config::model::RaffleConfig;
    use raffle_core::traits::{PluginAdapter, RecordStore, SessionStore, UserLedger};
    use raffle_core::types::{
        AdapterType, HealthStatus, PurchaseDetails, PurchaseSession, RaffleInfo, Registration,
        UserValidation, ValidationRequest,
    };
    use raffle_storage::{FsReceiptStore, FsRecordStore};
    use raffle_test_utils::{MockChannel, MockLedger};
    use std::time::Duration;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    /// Ledger whose registration call blocks until released.
    #[derive(Default)]
    struct GatedLedger {
        entered: Notify,
        release: Notify,
    }

    #[async_trait]
    impl PluginAdapter for GatedLedger {
        fn name(&self) -> &str {
            "gated-ledger"
        }

        fn version(&self) -> semver::Version {
            semver::Version::new(0, 1, 0)
        }

        fn adapter_type(&self) -> AdapterType {
            AdapterType::Ledger
        }

        async fn health_check(&self) -> Result<HealthStatus, RaffleError> {
            Ok(HealthStatus::Healthy)
        }

        async fn shutdown(&self) -> Result<(), RaffleError> {
            Ok(())
        }
    }

    #[async_trait]
    impl UserLedger for GatedLedger {
        async fn validate_user(&self, _request: ValidationRequest) -> UserValidation {
            UserValidation::confirmed(None, true)
        }

        async fn register_purchase(
            &self,
            _request: RegistrationRequest,
        ) -> Result<Registration, RaffleError> {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Registration {
                purchase_id: Some("L-7".into()),
                assigned_numbers: vec!["0007".into()],
                total_numbers: 1,
            })
        }
    }

    struct Fixture {
        _dir: TempDir,
        admin: AdminService,
        ctx: Arc<BotContext>,
        channel: Arc<MockChannel>,
        ledger: Arc<MockLedger>,
    }

    async fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(MockChannel::new());
        let ledger = Arc::new(MockLedger::new());
        let adapters = Adapters {
            channel: channel.clone(),
            records: Arc::new(FsRecordStore::open(dir.path()).await.unwrap()),
            receipts: Arc::new(FsReceiptStore::open(dir.path().join("receipts")).await.unwrap()),
            sessions: Arc::new(InMemorySessionStore::new()),
            ledger: ledger.clone(),
            events: Arc::new(EventBus::default()),
        };
        let ctx = Arc::new(BotContext::new(&RaffleConfig::default(), adapters));
        Fixture {
            _dir: dir,
            admin: AdminService::new(Arc::clone(&ctx)),
            ctx,
            channel,
            ledger,
        }
    }

    async fn open_session(ctx: &BotContext, user: &str) -> PurchaseRecord {
        open_session_at(ctx, user, Utc::now()).await
    }

    async fn open_session_at(
        ctx: &BotContext,
        user: &str,
        opened_at: DateTime<Utc>,
    ) -> PurchaseRecord {
        let record = PurchaseRecord::new_pending(
            UserId::new(user),
            "Ana",
            &RaffleInfo {
                id: 1,
                name: "Sticker Rueda y Gana".into(),
                icon: None,
            },
            &PurchaseDetails {
                item_count: 2,
                total_amount: 2_000,
                ..PurchaseDetails::default()
            },
            opened_at,
        );
        let record = ctx.records.create(record).await.unwrap();
        ctx.sessions.set(PurchaseSession::for_record(&record)).await;
        record
    }

    #[tokio::test]
    async fn approve_completes_record_and_purges_session() {
        let f = fixture().await;
        let record = open_session(&f.ctx, "3001234567").await;

        let approved = f
            .admin
            .approve(&record.id, vec!["001".into(), "002".into()], Some("ext-1".into()))
            .await
            .unwrap();
        assert_eq!(approved.status, RecordStatus::Completed);
        assert_eq!(approved.assigned_numbers, vec!["001", "002"]);
        assert_eq!(approved.external_purchase_id.as_deref(), Some("ext-1"));
        assert!(f.ctx.sessions.get(&record.user).await.is_none());
        assert!(f.channel.sent_messages().await[0].body().contains("001, 002"));
    }

    #[tokio::test]
    async fn approve_twice_is_not_in_partition() {
        let f = fixture().await;
        let record = open_session(&f.ctx, "3001234567").await;
        f.admin.approve(&record.id, vec![], None).await.unwrap();

        let err = f.admin.approve(&record.id, vec![], None).await.unwrap_err();
        assert!(matches!(
            err,
            RaffleError::NotInPartition {
                actual: RecordStatus::Completed,
                ..
            }
        ));
        let err = f.admin.reject(&record.id, None).await.unwrap_err();
        assert!(err.is_resolved_elsewhere());
    }

    #[tokio::test]
    async fn reject_defaults_reason() {
        let f = fixture().await;
        let record = open_session(&f.ctx, "3001234567").await;
        let rejected = f.admin.reject(&record.id, None).await.unwrap();
        assert_eq!(rejected.status, RecordStatus::Canceled);
        assert_eq!(
            rejected.rejection_reason.as_deref(),
            Some(DEFAULT_REJECTION_REASON)
        );
        assert!(f.ctx.sessions.get(&record.user).await.is_none());
        assert_eq!(f.ctx.stats.snapshot().purchases_rejected, 1);
    }

    #[tokio::test]
    async fn unknown_record_is_not_found() {
        let f = fixture().await;
        let err = f
            .admin
            .approve(&RecordId::new("purchase_0_missing"), vec![], None)
            .await
            .unwrap_err();
        assert!(matches!(err, RaffleError::RecordNotFound { .. }));
    }

    #[tokio::test]
    async fn accept_registers_and_approves() {
        let f = fixture().await;
        let record = open_session(&f.ctx, "3001234567").await;
        f.ledger.set_registration(Registration {
            purchase_id: Some("L-9".into()),
            assigned_numbers: vec!["0420".into()],
            total_numbers: 1,
        });

        let outcome = f.admin.accept(&record.id).await.unwrap();
        let AcceptOutcome::Approved(approved) = outcome else {
            panic!("expected approval");
        };
        assert_eq!(approved.assigned_numbers, vec!["0420"]);
        assert_eq!(approved.external_purchase_id.as_deref(), Some("L-9"));

        let calls = f.ledger.registration_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].number, "3001234567");
        assert_eq!(calls[0].purchase_id, record.id.to_string());
        assert_eq!(calls[0].quantity, 2);
    }

    #[tokio::test]
    async fn accept_unknown_user_flags_intervention() {
        let f = fixture().await;
        let record = open_session(&f.ctx, "3001234567").await;
        f.ledger.set_user_not_found("Usuario no encontrado");

        let outcome = f.admin.accept(&record.id).await.unwrap();
        let AcceptOutcome::InterventionRequired(flagged) = outcome else {
            panic!("expected intervention");
        };
        assert_eq!(flagged.status, RecordStatus::Pending);
        assert_eq!(
            flagged.intervention.as_ref().map(|i| i.error.as_str()),
            Some("Usuario no encontrado")
        );
        assert!(f.channel.sent_messages().await[0].body().contains("contact"));
        assert!(f.ctx.sessions.get(&record.user).await.is_none());

        // The flagged record waits for an operator; the sweeper leaves it alone.
        let sweeper = ExpirySweeper::new(Arc::clone(&f.ctx));
        let report = sweeper
            .sweep_at(record.created_at + chrono::Duration::minutes(61))
            .await
            .unwrap();
        assert_eq!(report.expired, 0);
        let stored = f.ctx.records.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Pending);
        assert_eq!(f.channel.sent_count().await, 1);

        // An operator can still approve it by hand.
        let approved = f.admin.approve(&record.id, vec!["0001".into()], None).await.unwrap();
        assert_eq!(approved.status, RecordStatus::Completed);
    }

    #[tokio::test]
    async fn sweep_waits_for_accept_in_flight() {
        let dir = tempfile::tempdir().unwrap();
        let channel = Arc::new(MockChannel::new());
        let ledger = Arc::new(GatedLedger::default());
        let adapters = Adapters {
            channel: channel.clone(),
            records: Arc::new(FsRecordStore::open(dir.path()).await.unwrap()),
            receipts: Arc::new(FsReceiptStore::open(dir.path().join("receipts")).await.unwrap()),
            sessions: Arc::new(InMemorySessionStore::new()),
            ledger: ledger.clone(),
            events: Arc::new(EventBus::default()),
        };
        let ctx = Arc::new(BotContext::new(&RaffleConfig::default(), adapters));
        let admin = Arc::new(AdminService::new(Arc::clone(&ctx)));
        let sweeper = ExpirySweeper::new(Arc::clone(&ctx));

        let opened = Utc::now() - chrono::Duration::minutes(59);
        let record = open_session_at(&ctx, "3001234567", opened).await;

        let accept = tokio::spawn({
            let admin = Arc::clone(&admin);
            let id = record.id.clone();
            async move { admin.accept(&id).await }
        });
        ledger.entered.notified().await;

        // Two minutes later the session would be past its timeout.
        let sweep = tokio::spawn(async move {
            sweeper
                .sweep_at(Utc::now() + chrono::Duration::minutes(2))
                .await
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sweep.is_finished());

        ledger.release.notify_one();
        let outcome = accept.await.unwrap().unwrap();
        let report = sweep.await.unwrap().unwrap();

        let AcceptOutcome::Approved(approved) = outcome else {
            panic!("expected approval");
        };
        assert_eq!(approved.assigned_numbers, vec!["0007"]);
        assert_eq!(report.expired, 0);

        let stored = ctx.records.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Completed);
        assert!(ctx.sessions.get(&record.user).await.is_none());
        let sent = channel.sent_messages().await;
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body().contains("0007"));
    }

    #[tokio::test]
    async fn accept_other_ledger_error_leaves_record() {
        let f = fixture().await;
        let record = open_session(&f.ctx, "3001234567").await;
        f.ledger.set_registration_error("ledger down");

        assert!(f.admin.accept(&record.id).await.is_err());
        let stored = f.ctx.records.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Pending);
        assert!(stored.intervention.is_none());
    }

    #[tokio::test]
    async fn block_cancels_pending_and_blocks_messages() {
        let f = fixture().await;
        let record = open_session(&f.ctx, "3001234567").await;
        let user = record.user.clone();

        let outcome = f.admin.block_user(&user, "fraud").await.unwrap();
        assert!(outcome.newly_blocked);
        assert_eq!(outcome.canceled, vec![record.id.clone()]);

        let stored = f.ctx.records.find_by_id(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.rejection_reason.as_deref(), Some("user blocked: fraud"));
        assert!(f.ctx.blocked.contains(&user));
        assert!(f.ctx.sessions.get(&user).await.is_none());
        assert_eq!(f.ctx.stats.snapshot().users_blocked, 1);

        assert!(f.admin.unblock_user(&user));
        assert!(!f.admin.unblock_user(&user));
    }
}
