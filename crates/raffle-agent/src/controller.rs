// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The purchase session controller.
//!
//! Drives one user at a time through the purchase FSM:
//! open a session on a purchase message, collect and validate receipts, and
//! cancel on attempt exhaustion or timeout. Approval and rejection happen in
//! [`AdminService`](crate::admin::AdminService); the controller notices them
//! by reconciling memory against the record store before every decision.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use raffle_config::model::RaffleConfig;
use raffle_core::error::RaffleError;
use raffle_core::types::{
    EventKind, ImageAttachment, InboundMessage, MessageContent, PurchaseRecord, PurchaseSession,
    RecordPatch, UserId, ValidationRequest,
};
use tracing::{debug, error, info, warn};

use crate::context::BotContext;
use crate::detector::PurchaseDetector;
use crate::identity::{is_us_number, ledger_number, normalize_sender};
use crate::raffles::RaffleCatalog;
use crate::session::TerminalReason;

/// What happened to one inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Own, forwarded, unresolvable or blocked sender.
    Ignored,
    /// The ledger did not validate the user.
    NotRegistered,
    /// Valid user, no purchase: the menu was sent.
    Menu,
    /// The user may not purchase right now.
    PurchaseUnavailable,
    /// Purchase message with a non-positive quantity or amount.
    InvalidPurchase,
    SessionOpened(PurchaseRecord),
    /// A purchase message arrived while a session was open.
    AlreadyActive,
    Reminded,
    ReceiptAccepted(PurchaseRecord),
    ReceiptRejected { remaining_attempts: u32 },
    AttemptsExhausted,
    /// The record left `pending` while the message was handled; the session
    /// was dropped.
    ResolvedElsewhere,
}

pub struct SessionController {
    ctx: Arc<BotContext>,
    detector: PurchaseDetector,
    catalog: RaffleCatalog,
    declaration: String,
}

impl SessionController {
    pub fn new(ctx: Arc<BotContext>, config: &RaffleConfig) -> Self {
        Self {
            ctx,
            detector: PurchaseDetector::new(&config.purchase),
            catalog: RaffleCatalog::new(&config.raffles),
            declaration: config.purchase.declaration.clone(),
        }
    }

    pub fn context(&self) -> &Arc<BotContext> {
        &self.ctx
    }

    pub async fn handle_inbound(&self, msg: InboundMessage) -> Result<Handled, RaffleError> {
        self.handle_inbound_at(msg, Utc::now()).await
    }

    /// Handles one inbound message as if it arrived at `now`.
    pub async fn handle_inbound_at(
        &self,
        msg: InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<Handled, RaffleError> {
        if msg.from_me || msg.forwarded {
            debug!(message_id = %msg.id, "ignoring own or forwarded message");
            return Ok(Handled::Ignored);
        }
        let Some(user) = normalize_sender(&msg.sender, &self.ctx.identity) else {
            debug!(message_id = %msg.id, "ignoring message without a usable sender");
            return Ok(Handled::Ignored);
        };
        if self.ctx.blocked.contains(&user) {
            debug!(user = %user, "ignoring blocked user");
            return Ok(Handled::Ignored);
        }

        self.ctx.stats.message_received();
        let _guard = self.ctx.locks.lock(&user).await;

        let session = match self.reconcile(&user).await? {
            Some(session) if session.is_expired(now, self.ctx.settings.timeout) => {
                info!(user = %user, record_id = %session.record_id, "session timed out before message");
                self.ctx.expire(&session).await?;
                None
            }
            other => other,
        };

        match session {
            Some(session) => self.handle_active(&user, session, &msg, now).await,
            None => self.handle_idle(&user, &msg, now).await,
        }
    }

    /// Brings the in-memory session in line with the record store.
    ///
    /// No active pending record means the session is stale. A pending record
    /// with no matching session (restart, eviction) rebuilds the session from
    /// it. Records flagged for intervention are left to the operator.
    async fn reconcile(&self, user: &UserId) -> Result<Option<PurchaseSession>, RaffleError> {
        let pending = self.ctx.records.find_active(user).await?;
        let current = self.ctx.sessions.get(user).await;

        match (pending, current) {
            (None, None) => Ok(None),
            (None, Some(_)) => {
                self.ctx
                    .purge_session(user, TerminalReason::ResolvedElsewhere)
                    .await;
                Ok(None)
            }
            (Some(record), Some(session)) if session.record_id == record.id => Ok(Some(session)),
            (Some(record), _) => {
                let session = PurchaseSession::for_record(&record);
                debug!(user = %user, record_id = %record.id, "session rebuilt from pending record");
                self.ctx.sessions.set(session.clone()).await;
                Ok(Some(session))
            }
        }
    }

    async fn handle_idle(
        &self,
        user: &UserId,
        msg: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<Handled, RaffleError> {
        let text = msg.text().unwrap_or_default();
        let is_purchase = self.detector.classify(text);
        let raffle = self.catalog.detect(text);
        let details = is_purchase.then(|| self.detector.extract(text));

        let validation = self
            .ctx
            .ledger
            .validate_user(ValidationRequest {
                number: ledger_number(user, &self.ctx.identity.country_code),
                raffle_id: raffle.id,
                text: text.to_string(),
                is_purchase,
                purchase_data: details.clone(),
            })
            .await;

        if !validation.valid {
            info!(user = %user, error = ?validation.error, "user not validated");
            let prompt = self.ctx.messages.registration_prompt(is_us_number(user));
            self.ctx.send_text(user, &prompt).await;
            return Ok(Handled::NotRegistered);
        }

        let Some(details) = details else {
            let menu = self.ctx.messages.menu(msg.display_name.as_deref());
            self.ctx.send_text(user, &menu).await;
            return Ok(Handled::Menu);
        };

        if !validation.purchase_allowed {
            info!(user = %user, "purchase not allowed for user");
            let notice = self.ctx.messages.purchases_unavailable();
            self.ctx.send_text(user, &notice).await;
            return Ok(Handled::PurchaseUnavailable);
        }

        if !details.is_valid() {
            info!(
                user = %user,
                item_count = details.item_count,
                total_amount = details.total_amount,
                error = ?details.error,
                "purchase with non-positive fields"
            );
            let notice = self.ctx.messages.invalid_purchase(&self.declaration);
            self.ctx.send_text(user, &notice).await;
            return Ok(Handled::InvalidPurchase);
        }

        let display_name = msg.display_name.clone().unwrap_or_default();
        let record = PurchaseRecord::new_pending(user.clone(), display_name, &raffle, &details, now);
        let record = self.ctx.records.create(record).await?;
        self.ctx.stats.purchase_processed();
        self.ctx.publish(EventKind::NewPurchase, &record, None);
        self.ctx
            .sessions
            .set(PurchaseSession::for_record(&record))
            .await;
        info!(
            user = %user,
            record_id = %record.id,
            provisional = validation.provisional,
            item_count = record.item_count,
            total_amount = record.total_amount,
            "purchase session opened"
        );

        self.send_confirmation(user, &record).await;
        let instructions = self
            .ctx
            .messages
            .payment_instructions(&record, self.ctx.settings.timeout_minutes());
        self.ctx.send_text(user, &instructions).await;

        Ok(Handled::SessionOpened(record))
    }

    /// Order confirmation, as an image with caption when one is configured.
    async fn send_confirmation(&self, user: &UserId, record: &PurchaseRecord) {
        let caption = self.ctx.messages.order_confirmation(record);
        if let Some(path) = &self.ctx.settings.confirmation_image {
            match tokio::fs::read(path).await {
                Ok(data) => {
                    self.ctx.send_image(user, data, &caption).await;
                    return;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "confirmation image unreadable, sending text");
                }
            }
        }
        self.ctx.send_text(user, &caption).await;
    }

    async fn handle_active(
        &self,
        user: &UserId,
        session: PurchaseSession,
        msg: &InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<Handled, RaffleError> {
        let settings = &self.ctx.settings;
        let minutes = session.remaining_minutes(now, settings.timeout);
        let attempts = session.remaining_attempts(settings.max_failed_attempts);

        match &msg.content {
            MessageContent::Image(image) => self.handle_receipt(user, session, image, now).await,
            MessageContent::Text { text } if self.detector.classify(text) => {
                debug!(user = %user, record_id = %session.record_id, "purchase message during active session");
                let notice = self.ctx.messages.active_session(minutes, attempts);
                self.ctx.send_text(user, &notice).await;
                Ok(Handled::AlreadyActive)
            }
            _ => {
                let reminder = self.ctx.messages.receipt_reminder(minutes, attempts);
                self.ctx.send_text(user, &reminder).await;
                Ok(Handled::Reminded)
            }
        }
    }

    /// Reason an image cannot be a receipt, if any.
    fn check_receipt(&self, image: &ImageAttachment) -> Option<String> {
        let settings = &self.ctx.settings;
        let mime = image.mime_type.to_ascii_lowercase();
        if !settings.allowed_mime_types.contains(&mime) {
            return Some(format!("unsupported image type {}", image.mime_type));
        }
        let size = image.size.max(image.data.len() as u64);
        if size > settings.max_receipt_bytes {
            return Some(format!(
                "image is {size} bytes, the limit is {}",
                settings.max_receipt_bytes
            ));
        }
        if image.data.is_empty() {
            return Some("image is empty".to_string());
        }
        None
    }

    async fn handle_receipt(
        &self,
        user: &UserId,
        mut session: PurchaseSession,
        image: &ImageAttachment,
        now: DateTime<Utc>,
    ) -> Result<Handled, RaffleError> {
        if let Some(reason) = self.check_receipt(image) {
            return self.fail_attempt(user, session, &reason).await;
        }

        let receipt_ref = match self
            .ctx
            .receipts
            .save(
                user,
                session.saved_receipt_ref.as_deref(),
                &image.mime_type,
                &image.data,
            )
            .await
        {
            Ok(receipt_ref) => receipt_ref,
            Err(e) => {
                error!(user = %user, error = %e, "failed to store receipt");
                return self
                    .fail_attempt(user, session, "the image could not be saved")
                    .await;
            }
        };

        let record = match self
            .ctx
            .records
            .update_pending(&session.record_id, RecordPatch::receipt(&receipt_ref, now))
            .await
        {
            Ok(record) => record,
            Err(e) if e.is_resolved_elsewhere() => {
                self.ctx
                    .purge_session(user, TerminalReason::ResolvedElsewhere)
                    .await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let replaced = session.saved_receipt_ref.is_some();
        session.failed_attempts = 0;
        session.saved_receipt_ref = Some(receipt_ref.clone());
        session.last_receipt_at = Some(now);
        self.ctx.sessions.set(session).await;

        self.ctx.stats.receipt_received();
        self.ctx
            .publish(EventKind::ReceiptReceived, &record, Some(receipt_ref.as_str()));
        info!(user = %user, record_id = %record.id, receipt = %receipt_ref, replaced, "receipt accepted");

        let notice = self.ctx.messages.receipt_received(&record, replaced);
        self.ctx.send_text(user, &notice).await;
        Ok(Handled::ReceiptAccepted(record))
    }

    async fn fail_attempt(
        &self,
        user: &UserId,
        mut session: PurchaseSession,
        reason: &str,
    ) -> Result<Handled, RaffleError> {
        let max = self.ctx.settings.max_failed_attempts;
        session.failed_attempts += 1;
        let remaining = session.remaining_attempts(max);
        info!(
            user = %user,
            record_id = %session.record_id,
            attempt = session.failed_attempts,
            remaining,
            reason,
            "receipt rejected"
        );

        if session.failed_attempts < max {
            self.ctx.sessions.set(session).await;
            let notice = self.ctx.messages.invalid_receipt(reason, remaining);
            self.ctx.send_text(user, &notice).await;
            return Ok(Handled::ReceiptRejected {
                remaining_attempts: remaining,
            });
        }

        let Some(record) = self
            .ctx
            .cancel_session(&session, TerminalReason::AttemptLimit)
            .await?
        else {
            info!(user = %user, record_id = %session.record_id, "record resolved before attempts ran out");
            return Ok(Handled::ResolvedElsewhere);
        };
        match self.ctx.receipts.remove_for_user(user).await {
            Ok(removed) => debug!(user = %user, removed, "receipts discarded"),
            Err(e) => error!(user = %user, error = %e, "failed to discard receipts"),
        }
        self.ctx.stats.purchase_rejected();
        self.ctx
            .publish(EventKind::PurchaseUpdated, &record, Some("attempt limit exceeded"));
        let notice = self.ctx.messages.attempts_exhausted();
        self.ctx.send_text(user, &notice).await;
        Ok(Handled::AttemptsExhausted)
    }
}
