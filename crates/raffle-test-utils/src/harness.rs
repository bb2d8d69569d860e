// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the whole bot with mock adapters and file stores
//! in a temp directory, and exposes `send()` to drive inbound messages
//! through the session controller.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use raffle_agent::{
    AdminService, Adapters, BotContext, ExpirySweeper, Handled, InMemorySessionStore,
    SessionController,
};
use raffle_bus::{Envelope, EventBus};
use raffle_config::model::RaffleConfig;
use raffle_core::RaffleError;
use raffle_core::types::{
    ImageAttachment, InboundMessage, MessageContent, SenderFields, UserId, UserValidation,
};
use raffle_storage::{FsReceiptStore, FsRecordStore};

use crate::mock_channel::MockChannel;
use crate::mock_ledger::MockLedger;

/// Default buyer used by the message constructors.
pub const TEST_USER: &str = "3001234567";

/// A purchase declaration for `items` stickers at 1,000 each.
pub fn purchase_text(items: u32) -> String {
    let amount = format_thousands(u64::from(items) * 1_000);
    format!(
        "I want to buy these stickers!\n\
         Sticker Rueda y Gana: {items} items - ${amount}\n\
         Total items: {items}\n\
         Total amount: ${amount}"
    )
}

fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: RaffleConfig,
    validation: Option<UserValidation>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            config: RaffleConfig::default(),
            validation: None,
        }
    }

    /// Replace the whole configuration.
    pub fn with_config(mut self, config: RaffleConfig) -> Self {
        self.config = config;
        self
    }

    /// Adjust the default configuration in place.
    pub fn configure(mut self, f: impl FnOnce(&mut RaffleConfig)) -> Self {
        f(&mut self.config);
        self
    }

    /// Answer every ledger validation with `validation`.
    pub fn with_validation(mut self, validation: UserValidation) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Build the test harness.
    pub async fn build(self) -> Result<TestHarness, RaffleError> {
        let temp_dir = tempfile::tempdir().map_err(RaffleError::storage)?;
        let root = temp_dir.path().to_path_buf();

        let records = Arc::new(FsRecordStore::open(&root).await?);
        let receipts = Arc::new(FsReceiptStore::open(root.join("receipts")).await?);
        let sessions = Arc::new(InMemorySessionStore::new());
        let channel = Arc::new(MockChannel::new());
        let ledger = Arc::new(MockLedger::new());
        if let Some(validation) = self.validation {
            ledger.set_validation(validation);
        }
        let bus = Arc::new(EventBus::default());

        let adapters = Adapters {
            channel: channel.clone(),
            records: records.clone(),
            receipts: receipts.clone(),
            sessions: sessions.clone(),
            ledger: ledger.clone(),
            events: bus.clone(),
        };
        let ctx = Arc::new(BotContext::new(&self.config, adapters));
        let controller = Arc::new(SessionController::new(Arc::clone(&ctx), &self.config));
        let admin = AdminService::new(Arc::clone(&ctx));
        let sweeper = ExpirySweeper::new(Arc::clone(&ctx));

        Ok(TestHarness {
            config: self.config,
            ctx,
            controller,
            admin,
            sweeper,
            channel,
            ledger,
            bus,
            records,
            receipts,
            sessions,
            temp_dir,
        })
    }
}

/// A complete bot with mock transport and ledger over temp file stores.
pub struct TestHarness {
    pub config: RaffleConfig,
    pub ctx: Arc<BotContext>,
    pub controller: Arc<SessionController>,
    pub admin: AdminService,
    pub sweeper: ExpirySweeper,
    pub channel: Arc<MockChannel>,
    pub ledger: Arc<MockLedger>,
    pub bus: Arc<EventBus>,
    pub records: Arc<FsRecordStore>,
    pub receipts: Arc<FsReceiptStore>,
    pub sessions: Arc<InMemorySessionStore>,
    /// Temp directory kept alive for cleanup on drop.
    temp_dir: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new builder for configuring the test harness.
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Build a harness with default configuration.
    pub async fn new() -> Result<Self, RaffleError> {
        Self::builder().build().await
    }

    pub fn data_dir(&self) -> &std::path::Path {
        self.temp_dir.path()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.bus.subscribe()
    }

    /// Drive one inbound message through the controller.
    pub async fn send(&self, msg: InboundMessage) -> Result<Handled, RaffleError> {
        self.controller.handle_inbound(msg).await
    }

    /// Like [`send`](Self::send) with a fixed clock.
    pub async fn send_at(
        &self,
        msg: InboundMessage,
        now: DateTime<Utc>,
    ) -> Result<Handled, RaffleError> {
        self.controller.handle_inbound_at(msg, now).await
    }

    /// Bodies of everything sent to `user`, in order.
    pub async fn sent_to(&self, user: &str) -> Vec<String> {
        self.channel.sent_to(user).await
    }

    pub fn user() -> UserId {
        UserId::new(TEST_USER)
    }

    /// A text message from [`TEST_USER`] as seen on the wire.
    pub fn text(body: &str) -> InboundMessage {
        Self::message_from(TEST_USER, MessageContent::Text { text: body.into() })
    }

    pub fn purchase(items: u32) -> InboundMessage {
        Self::text(&purchase_text(items))
    }

    /// An image from [`TEST_USER`] with the declared MIME type.
    pub fn image(mime_type: &str, data: &[u8]) -> InboundMessage {
        Self::message_from(
            TEST_USER,
            MessageContent::Image(ImageAttachment {
                mime_type: mime_type.into(),
                size: data.len() as u64,
                data: data.to_vec(),
                caption: None,
            }),
        )
    }

    /// A message from a national number, addressed with the default country code.
    pub fn message_from(number: &str, content: MessageContent) -> InboundMessage {
        InboundMessage {
            id: format!("test-{}", uuid::Uuid::new_v4()),
            sender: SenderFields {
                remote_jid: Some(format!("57{number}@s.whatsapp.net")),
                ..SenderFields::default()
            },
            display_name: Some("Test Buyer".into()),
            content,
            from_me: false,
            forwarded: false,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raffle_core::traits::{RecordStore, SessionStore};
    use raffle_core::types::RecordStatus;

    #[test]
    fn purchase_text_formats_amounts() {
        let text = purchase_text(10);
        assert!(text.contains("Total items: 10"));
        assert!(text.contains("$10,000"));
        assert!(purchase_text(1).contains("$1,000"));
    }

    #[tokio::test]
    async fn builder_creates_working_environment() {
        let harness = TestHarness::new().await.unwrap();
        assert!(harness.records.list(RecordStatus::Pending).await.unwrap().is_empty());
        assert!(harness.sessions.list().await.is_empty());
    }

    #[tokio::test]
    async fn purchase_opens_session() {
        let harness = TestHarness::new().await.unwrap();
        let handled = harness.send(TestHarness::purchase(3)).await.unwrap();
        assert!(matches!(handled, Handled::SessionOpened(_)));
        assert!(harness.sessions.get(&TestHarness::user()).await.is_some());
        assert_eq!(harness.sent_to(TEST_USER).await.len(), 2);
    }

    #[tokio::test]
    async fn harnesses_do_not_share_storage() {
        let h1 = TestHarness::new().await.unwrap();
        let h2 = TestHarness::new().await.unwrap();
        h1.send(TestHarness::purchase(1)).await.unwrap();
        assert_eq!(h1.records.list(RecordStatus::Pending).await.unwrap().len(), 1);
        assert!(h2.records.list(RecordStatus::Pending).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn with_validation_overrides_ledger() {
        let harness = TestHarness::builder()
            .with_validation(UserValidation::rejected("not registered"))
            .build()
            .await
            .unwrap();
        let handled = harness.send(TestHarness::text("hola")).await.unwrap();
        assert_eq!(handled, Handled::NotRegistered);
    }
}
