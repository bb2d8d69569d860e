// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the raffle bot.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Canonical chat identifier of a buyer (digits only, country code stripped).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque, immutable identifier of a purchase record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh id of the form `purchase_{unix_millis}_{9 random chars}`.
    pub fn generate() -> Self {
        let millis = Utc::now().timestamp_millis();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..9)
            .map(|_| (rng.sample(rand::distributions::Alphanumeric) as char).to_ascii_lowercase())
            .collect();
        Self(format!("purchase_{millis}_{suffix}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Ids become file names, so only `[A-Za-z0-9_-]` is accepted.
    pub fn is_safe(&self) -> bool {
        !self.0.is_empty()
            && self
                .0
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier returned by the chat transport for a delivered message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a trait object.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Channel,
    Storage,
    Ledger,
    Events,
}

// --- Purchase records ---

/// Status of a purchase record. Also the partition key of the record store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordStatus {
    Pending,
    Completed,
    Canceled,
}

impl RecordStatus {
    pub const ALL: [RecordStatus; 3] = [
        RecordStatus::Pending,
        RecordStatus::Completed,
        RecordStatus::Canceled,
    ];

    /// No record ever leaves a terminal status.
    pub fn is_terminal(self) -> bool {
        !matches!(self, RecordStatus::Pending)
    }
}

/// One line item of a purchase declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseItem {
    pub quantity: u32,
    pub amount: u64,
}

/// Quantity and amount extracted from a purchase message.
///
/// Extraction never fails: unparseable input yields zeros and an `error` marker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseDetails {
    pub item_count: u32,
    pub total_amount: u64,
    #[serde(default)]
    pub items: Vec<PurchaseItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PurchaseDetails {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            ..Self::default()
        }
    }

    /// Both quantity and amount must be positive for a purchase to be accepted.
    pub fn is_valid(&self) -> bool {
        self.item_count > 0 && self.total_amount > 0
    }
}

/// The promotion a purchase targets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaffleInfo {
    pub id: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
}

/// A flag raised when the ledger could not register the buyer automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    pub error: String,
    pub flagged_at: DateTime<Utc>,
}

/// The durable representation of one purchase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecord {
    pub id: RecordId,
    pub user: UserId,
    #[serde(default)]
    pub display_name: String,
    pub raffle_id: u32,
    pub raffle_name: String,
    pub item_count: u32,
    pub total_amount: u64,
    #[serde(default)]
    pub items: Vec<PurchaseItem>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    pub status: RecordStatus,
    #[serde(default)]
    pub receipt_ref: Option<String>,
    /// When the latest receipt was accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canceled_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
    #[serde(default)]
    pub assigned_numbers: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_purchase_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervention: Option<Intervention>,
    /// Incremented on every write by the record store.
    #[serde(default)]
    pub version: u64,
}

impl PurchaseRecord {
    /// Builds a fresh pending record for a detected purchase.
    pub fn new_pending(
        user: UserId,
        display_name: impl Into<String>,
        raffle: &RaffleInfo,
        details: &PurchaseDetails,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: RecordId::generate(),
            user,
            display_name: display_name.into(),
            raffle_id: raffle.id,
            raffle_name: raffle.name.clone(),
            item_count: details.item_count,
            total_amount: details.total_amount,
            items: details.items.clone(),
            created_at: now,
            updated_at: None,
            status: RecordStatus::Pending,
            receipt_ref: None,
            receipt_at: None,
            approved_at: None,
            canceled_at: None,
            rejection_reason: None,
            assigned_numbers: Vec::new(),
            external_purchase_id: None,
            intervention: None,
            version: 0,
        }
    }

    /// Applies the data fields of a patch. Status and timestamps are the store's job.
    pub fn apply(&mut self, patch: &RecordPatch) {
        if let Some(receipt) = &patch.receipt_ref {
            self.receipt_ref = Some(receipt.clone());
        }
        if let Some(at) = patch.receipt_at {
            self.receipt_at = Some(at);
        }
        if let Some(numbers) = &patch.assigned_numbers {
            self.assigned_numbers = numbers.clone();
        }
        if let Some(external) = &patch.external_purchase_id {
            self.external_purchase_id = Some(external.clone());
        }
        if let Some(reason) = &patch.rejection_reason {
            self.rejection_reason = Some(reason.clone());
        }
        if let Some(intervention) = &patch.intervention {
            self.intervention = Some(intervention.clone());
        }
    }
}

/// Changes carried by a record-store write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPatch {
    /// When set, the write fails with `VersionConflict` unless the stored version matches.
    pub expected_version: Option<u64>,
    pub receipt_ref: Option<String>,
    pub receipt_at: Option<DateTime<Utc>>,
    pub assigned_numbers: Option<Vec<String>>,
    pub external_purchase_id: Option<String>,
    pub rejection_reason: Option<String>,
    pub intervention: Option<Intervention>,
}

impl RecordPatch {
    pub fn rejection(reason: impl Into<String>) -> Self {
        Self {
            rejection_reason: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn receipt(receipt_ref: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            receipt_ref: Some(receipt_ref.into()),
            receipt_at: Some(at),
            ..Self::default()
        }
    }
}

// --- Purchase sessions ---

/// Quantity and amount the session was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseSnapshot {
    pub item_count: u32,
    pub total_amount: u64,
}

/// Ephemeral per-user state of an open purchase awaiting a receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseSession {
    pub user: UserId,
    /// The pending record this session belongs to.
    pub record_id: RecordId,
    pub awaiting_receipt: bool,
    pub pending_purchase: PurchaseSnapshot,
    pub opened_at: DateTime<Utc>,
    pub failed_attempts: u32,
    pub saved_receipt_ref: Option<String>,
    /// An accepted receipt restarts the timeout window.
    #[serde(default)]
    pub last_receipt_at: Option<DateTime<Utc>>,
}

impl PurchaseSession {
    /// Rebuilds a session from its pending record.
    ///
    /// Used both when a session is opened and when memory lost track of a
    /// record that is still pending on disk (restart, eviction).
    pub fn for_record(record: &PurchaseRecord) -> Self {
        Self {
            user: record.user.clone(),
            record_id: record.id.clone(),
            awaiting_receipt: true,
            pending_purchase: PurchaseSnapshot {
                item_count: record.item_count,
                total_amount: record.total_amount,
            },
            opened_at: record.created_at,
            failed_attempts: 0,
            saved_receipt_ref: record.receipt_ref.clone(),
            last_receipt_at: record.receipt_at,
        }
    }

    /// Start of the current timeout window: the latest receipt, else the opening.
    pub fn timeout_base(&self) -> DateTime<Utc> {
        self.last_receipt_at.unwrap_or(self.opened_at)
    }

    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now.signed_duration_since(self.timeout_base())
    }

    /// A session expires once its timeout window has run strictly longer
    /// than `timeout`.
    pub fn is_expired(&self, now: DateTime<Utc>, timeout: Duration) -> bool {
        match chrono::Duration::from_std(timeout) {
            Ok(limit) => self.age(now) > limit,
            Err(_) => false,
        }
    }

    /// Whole minutes left before expiry, rounded up, never negative.
    pub fn remaining_minutes(&self, now: DateTime<Utc>, timeout: Duration) -> u64 {
        let timeout_ms = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        let left_ms = timeout_ms.saturating_sub(self.age(now).num_milliseconds());
        if left_ms <= 0 {
            0
        } else {
            (left_ms as u64).div_ceil(60_000)
        }
    }

    pub fn remaining_attempts(&self, max_attempts: u32) -> u32 {
        max_attempts.saturating_sub(self.failed_attempts)
    }
}

// --- Chat transport ---

/// Candidate sender fields as delivered by the chat transport.
///
/// Several may be present at once; identity normalization picks one by precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SenderFields {
    pub participant_pn: Option<String>,
    pub phone_number: Option<String>,
    pub remote_jid_alt: Option<String>,
    pub remote_jid: Option<String>,
    pub participant: Option<String>,
}

/// An image attached to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub mime_type: String,
    /// Declared size in bytes.
    pub size: u64,
    #[serde(with = "base64_bytes", default)]
    pub data: Vec<u8>,
    #[serde(default)]
    pub caption: Option<String>,
}

/// Content of an inbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    Text { text: String },
    Image(ImageAttachment),
    /// Stickers, audio, documents and anything else the bot does not handle.
    Unsupported { kind: String },
}

/// An inbound message received from the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundMessage {
    #[serde(default)]
    pub id: String,
    pub sender: SenderFields,
    #[serde(default)]
    pub display_name: Option<String>,
    pub content: MessageContent,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub forwarded: bool,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl InboundMessage {
    /// The message text, or the caption of an image.
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text { text } => Some(text),
            MessageContent::Image(image) => image.caption.as_deref(),
            MessageContent::Unsupported { .. } => None,
        }
    }
}

/// Content of an outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundContent {
    Text {
        text: String,
    },
    Image {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
        caption: String,
    },
}

/// An outbound message to be sent via the chat transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient: UserId,
    pub content: OutboundContent,
}

impl OutboundMessage {
    pub fn text(recipient: UserId, text: impl Into<String>) -> Self {
        Self {
            recipient,
            content: OutboundContent::Text { text: text.into() },
        }
    }

    pub fn image(recipient: UserId, data: Vec<u8>, caption: impl Into<String>) -> Self {
        Self {
            recipient,
            content: OutboundContent::Image {
                data,
                caption: caption.into(),
            },
        }
    }

    /// The readable part of the message: the text, or the image caption.
    pub fn body(&self) -> &str {
        match &self.content {
            OutboundContent::Text { text } => text,
            OutboundContent::Image { caption, .. } => caption,
        }
    }
}

// --- Push channel ---

/// Push-channel event names.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EventKind {
    NewPurchase,
    PurchaseUpdated,
    ReceiptReceived,
    PurchaseApproved,
    PurchaseRejected,
    InterventionRequired,
}

/// A state change broadcast to the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurchaseEvent {
    pub kind: EventKind,
    pub record: PurchaseRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl PurchaseEvent {
    pub fn new(kind: EventKind, record: PurchaseRecord) -> Self {
        Self {
            kind,
            record,
            detail: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// --- External ledger ---

/// Payload of the ledger's user validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRequest {
    pub number: String,
    pub raffle_id: u32,
    pub text: String,
    pub is_purchase: bool,
    pub purchase_data: Option<PurchaseDetails>,
}

/// Outcome of a user validation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserValidation {
    pub valid: bool,
    /// Validity was assumed, not confirmed by the ledger.
    pub provisional: bool,
    pub purchase_allowed: bool,
    pub user: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl UserValidation {
    pub fn confirmed(user: Option<serde_json::Value>, purchase_allowed: bool) -> Self {
        Self {
            valid: true,
            provisional: false,
            purchase_allowed,
            user,
            error: None,
        }
    }

    pub fn rejected(error: impl Into<String>) -> Self {
        Self {
            valid: false,
            provisional: false,
            purchase_allowed: false,
            user: None,
            error: Some(error.into()),
        }
    }
}

/// Payload of the ledger's purchase registration call.
///
/// The transport adds a fresh nonce to every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    pub number: String,
    pub raffle_id: u32,
    pub quantity: u32,
    pub amount: u64,
    pub purchase_id: String,
}

/// A purchase accepted by the ledger.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub purchase_id: Option<String>,
    pub assigned_numbers: Vec<String>,
    pub total_numbers: u32,
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> PurchaseRecord {
        let raffle = RaffleInfo {
            id: 1,
            name: "Sticker Rueda y Gana".into(),
            icon: None,
        };
        let details = PurchaseDetails {
            item_count: 10,
            total_amount: 10_000,
            items: vec![PurchaseItem {
                quantity: 10,
                amount: 10_000,
            }],
            error: None,
        };
        PurchaseRecord::new_pending(UserId::new("3001234567"), "Ana", &raffle, &details, Utc::now())
    }

    #[test]
    fn generated_record_ids_are_safe_and_unique() {
        let a = RecordId::generate();
        let b = RecordId::generate();
        assert!(a.as_str().starts_with("purchase_"));
        assert!(a.is_safe());
        assert_ne!(a, b);
    }

    #[test]
    fn record_id_rejects_path_components() {
        assert!(!RecordId::new("../etc/passwd").is_safe());
        assert!(!RecordId::new("").is_safe());
        assert!(RecordId::new("purchase_1_abc").is_safe());
    }

    #[test]
    fn record_status_display_and_parse() {
        use std::str::FromStr;
        for status in RecordStatus::ALL {
            let parsed = RecordStatus::from_str(&status.to_string()).unwrap();
            assert_eq!(parsed, status);
        }
        assert_eq!(RecordStatus::Canceled.to_string(), "canceled");
        assert!(!RecordStatus::Pending.is_terminal());
        assert!(RecordStatus::Completed.is_terminal());
    }

    #[test]
    fn record_serializes_with_camel_case_keys() {
        let record = sample_record();
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["itemCount"], 10);
        assert_eq!(json["totalAmount"], 10_000);
        assert_eq!(json["status"], "pending");
        assert!(json["receiptRef"].is_null());
    }

    #[test]
    fn patch_applies_only_set_fields() {
        let mut record = sample_record();
        record.apply(&RecordPatch::receipt("receipt_1.jpg", Utc::now()));
        assert_eq!(record.receipt_ref.as_deref(), Some("receipt_1.jpg"));
        assert!(record.rejection_reason.is_none());

        record.apply(&RecordPatch::rejection("expired"));
        assert_eq!(record.receipt_ref.as_deref(), Some("receipt_1.jpg"));
        assert_eq!(record.rejection_reason.as_deref(), Some("expired"));
    }

    #[test]
    fn session_expiry_is_strictly_after_timeout() {
        let record = sample_record();
        let session = PurchaseSession::for_record(&record);
        let timeout = Duration::from_secs(3600);

        let at_limit = record.created_at + chrono::Duration::seconds(3600);
        assert!(!session.is_expired(at_limit, timeout));
        assert!(session.is_expired(at_limit + chrono::Duration::seconds(1), timeout));
    }

    #[test]
    fn receipt_restarts_the_timeout_window() {
        let mut record = sample_record();
        let timeout = Duration::from_secs(3600);
        let receipt_at = record.created_at + chrono::Duration::minutes(59);
        record.apply(&RecordPatch::receipt("receipt_1.jpg", receipt_at));

        let session = PurchaseSession::for_record(&record);
        assert_eq!(session.last_receipt_at, Some(receipt_at));
        let at_90 = record.created_at + chrono::Duration::minutes(90);
        assert!(!session.is_expired(at_90, timeout));
        assert_eq!(session.remaining_minutes(at_90, timeout), 29);
        assert!(session.is_expired(receipt_at + chrono::Duration::minutes(61), timeout));
    }

    #[test]
    fn remaining_minutes_rounds_up_and_floors_at_zero() {
        let record = sample_record();
        let session = PurchaseSession::for_record(&record);
        let timeout = Duration::from_secs(3600);

        assert_eq!(session.remaining_minutes(record.created_at, timeout), 60);
        let later = record.created_at + chrono::Duration::seconds(90);
        assert_eq!(session.remaining_minutes(later, timeout), 59);
        let expired = record.created_at + chrono::Duration::hours(2);
        assert_eq!(session.remaining_minutes(expired, timeout), 0);
    }

    #[test]
    fn inbound_image_round_trips_base64() {
        let json = r#"{
            "sender": {"remoteJid": "573001234567@s.whatsapp.net"},
            "content": {"type": "image", "mimeType": "image/png", "size": 3, "data": "AQID"}
        }"#;
        let msg: InboundMessage = serde_json::from_str(json).unwrap();
        match &msg.content {
            MessageContent::Image(image) => {
                assert_eq!(image.data, vec![1, 2, 3]);
                assert_eq!(image.mime_type, "image/png");
            }
            other => panic!("expected image, got {other:?}"),
        }
        assert!(!msg.from_me);
    }

    #[test]
    fn event_kind_uses_snake_case_names() {
        assert_eq!(EventKind::NewPurchase.to_string(), "new_purchase");
        assert_eq!(
            serde_json::to_string(&EventKind::InterventionRequired).unwrap(),
            "\"intervention_required\""
        );
    }
}
