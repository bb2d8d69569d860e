// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared state of the purchase bot.
//!
//! [`BotContext`] bundles the adapters with the per-user locks, the block
//! list, the counters and the helpers every transition uses: sending,
//! publishing, and terminating a session against the record store. The
//! session controller, the expiry sweeper and the admin service each hold an
//! `Arc<BotContext>`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use raffle_config::model::RaffleConfig;
use raffle_core::error::RaffleError;
use raffle_core::traits::{
    ChannelAdapter, EventSink, ReceiptStore, RecordStore, SessionStore, UserLedger,
};
use raffle_core::types::{
    EventKind, PurchaseEvent, PurchaseRecord, PurchaseSession, RecordPatch, RecordStatus, UserId,
};
use tracing::{debug, info, warn};

use crate::identity::IdentityPolicy;
use crate::locks::UserLocks;
use crate::messages::Messages;
use crate::session::TerminalReason;
use crate::stats::Stats;

/// The external collaborators the bot runs against.
#[derive(Clone)]
pub struct Adapters {
    pub channel: Arc<dyn ChannelAdapter>,
    pub records: Arc<dyn RecordStore>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub ledger: Arc<dyn UserLedger>,
    pub events: Arc<dyn EventSink>,
}

/// Session and receipt limits taken from configuration.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub timeout: Duration,
    pub sweep_interval: Duration,
    pub max_failed_attempts: u32,
    pub max_receipt_bytes: u64,
    pub allowed_mime_types: Vec<String>,
    pub confirmation_image: Option<PathBuf>,
}

impl SessionSettings {
    pub fn from_config(config: &RaffleConfig) -> Self {
        Self {
            timeout: config.session.timeout(),
            sweep_interval: config.session.sweep_interval(),
            max_failed_attempts: config.session.max_failed_attempts,
            max_receipt_bytes: config.receipt.max_bytes,
            allowed_mime_types: config
                .receipt
                .allowed_mime_types
                .iter()
                .map(|m| m.to_ascii_lowercase())
                .collect(),
            confirmation_image: config.messages.confirmation_image.as_ref().map(PathBuf::from),
        }
    }

    pub fn timeout_minutes(&self) -> u64 {
        self.timeout.as_secs().div_ceil(60)
    }
}

/// Users the bot ignores, with the reason they were blocked.
#[derive(Debug, Default)]
pub struct BlockList {
    users: DashMap<UserId, String>,
}

impl BlockList {
    /// Returns false when the user was already blocked.
    pub fn insert(&self, user: UserId, reason: impl Into<String>) -> bool {
        self.users.insert(user, reason.into()).is_none()
    }

    pub fn remove(&self, user: &UserId) -> bool {
        self.users.remove(user).is_some()
    }

    pub fn contains(&self, user: &UserId) -> bool {
        self.users.contains_key(user)
    }

    pub fn reason(&self, user: &UserId) -> Option<String> {
        self.users.get(user).map(|entry| entry.value().clone())
    }
}

pub struct BotContext {
    pub channel: Arc<dyn ChannelAdapter>,
    pub records: Arc<dyn RecordStore>,
    pub receipts: Arc<dyn ReceiptStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub ledger: Arc<dyn UserLedger>,
    pub events: Arc<dyn EventSink>,
    pub locks: UserLocks,
    pub blocked: BlockList,
    pub stats: Stats,
    pub messages: Messages,
    pub identity: IdentityPolicy,
    pub settings: SessionSettings,
}

impl BotContext {
    pub fn new(config: &RaffleConfig, adapters: Adapters) -> Self {
        Self {
            channel: adapters.channel,
            records: adapters.records,
            receipts: adapters.receipts,
            sessions: adapters.sessions,
            ledger: adapters.ledger,
            events: adapters.events,
            locks: UserLocks::new(),
            blocked: BlockList::default(),
            stats: Stats::default(),
            messages: Messages::new(&config.messages),
            identity: IdentityPolicy::new(&config.identity),
            settings: SessionSettings::from_config(config),
        }
    }

    /// Sends a text. Failures are logged and never retried.
    pub async fn send_text(&self, user: &UserId, text: &str) {
        if !self.channel.is_connected() {
            warn!(user = %user, "transport not connected, message dropped");
            return;
        }
        match self.channel.send_text(user, text).await {
            Ok(_) => self.stats.message_sent(),
            Err(e) => warn!(user = %user, error = %e, "failed to send message"),
        }
    }

    /// Sends an image with a caption. Failures are logged and never retried.
    pub async fn send_image(&self, user: &UserId, data: Vec<u8>, caption: &str) {
        if !self.channel.is_connected() {
            warn!(user = %user, "transport not connected, image dropped");
            return;
        }
        match self.channel.send_image(user, data, caption).await {
            Ok(_) => self.stats.message_sent(),
            Err(e) => warn!(user = %user, error = %e, "failed to send image"),
        }
    }

    pub fn publish(&self, kind: EventKind, record: &PurchaseRecord, detail: Option<&str>) {
        let event = PurchaseEvent::new(kind, record.clone());
        let event = match detail {
            Some(detail) => event.with_detail(detail),
            None => event,
        };
        self.events.publish(event);
    }

    /// Drops the in-memory session of `user`, if any.
    pub async fn purge_session(
        &self,
        user: &UserId,
        reason: TerminalReason,
    ) -> Option<PurchaseSession> {
        let purged = self.sessions.delete(user).await;
        if let Some(session) = &purged {
            info!(
                user = %user,
                record_id = %session.record_id,
                reason = %reason,
                state = %reason.final_state(),
                "session closed"
            );
        }
        purged
    }

    /// Moves the session's record to `canceled` and drops the session.
    ///
    /// Returns `None` when the record had already left `pending`; the session
    /// is purged either way. The caller must hold the user's lock.
    pub async fn cancel_session(
        &self,
        session: &PurchaseSession,
        reason: TerminalReason,
    ) -> Result<Option<PurchaseRecord>, RaffleError> {
        let patch = RecordPatch::rejection(reason.record_reason().unwrap_or("canceled"));
        match self
            .records
            .move_partition(
                &session.record_id,
                RecordStatus::Pending,
                RecordStatus::Canceled,
                patch,
            )
            .await
        {
            Ok(record) => {
                self.purge_session(&session.user, reason).await;
                Ok(Some(record))
            }
            Err(e) if e.is_resolved_elsewhere() => {
                debug!(
                    user = %session.user,
                    record_id = %session.record_id,
                    error = %e,
                    "record already resolved, purging stale session"
                );
                self.purge_session(&session.user, TerminalReason::ResolvedElsewhere)
                    .await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Force-expires a session whose timeout has passed.
    ///
    /// Returns true when the record was canceled by this call. The caller must
    /// hold the user's lock.
    pub async fn expire(&self, session: &PurchaseSession) -> Result<bool, RaffleError> {
        let Some(record) = self.cancel_session(session, TerminalReason::Expired).await? else {
            return Ok(false);
        };
        info!(user = %session.user, record_id = %record.id, "purchase expired");
        self.publish(EventKind::PurchaseUpdated, &record, Some("expired"));
        self.send_text(&session.user, &self.messages.expired(&record))
            .await;
        Ok(true)
    }
}
