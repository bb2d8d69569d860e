// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User-facing chat texts.
//!
//! Every rejected path has its own message so the buyer always learns why and
//! what to do next.

use raffle_config::model::MessagesConfig;
use raffle_core::types::PurchaseRecord;

/// Builds outbound texts from the `[messages]` config section.
#[derive(Debug, Clone)]
pub struct Messages {
    config: MessagesConfig,
}

impl Messages {
    pub fn new(config: &MessagesConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn order_confirmation(&self, record: &PurchaseRecord) -> String {
        format!(
            "🎉 Order received!\n\n\
             Raffle: {}\n\
             Stickers: {}\n\
             Total: {}\n\
             Order: {}\n\n\
             Thank you for buying from {}.",
            record.raffle_name,
            record.item_count,
            format_amount(record.total_amount),
            record.id,
            self.config.brand,
        )
    }

    pub fn payment_instructions(&self, record: &PurchaseRecord, timeout_minutes: u64) -> String {
        format!(
            "💳 To complete your purchase, transfer {} to the payment key {}.\n\n\
             Then send a photo or screenshot of the receipt here.\n\
             You have {timeout_minutes} minutes to send it.",
            format_amount(record.total_amount),
            self.config.payment_key,
        )
    }

    pub fn active_session(&self, remaining_minutes: u64, remaining_attempts: u32) -> String {
        format!(
            "⏳ You already have a purchase waiting for its receipt. \
             Send the payment receipt before starting a new one.\n\
             Time left: {remaining_minutes} min. Attempts left: {remaining_attempts}."
        )
    }

    pub fn receipt_reminder(&self, remaining_minutes: u64, remaining_attempts: u32) -> String {
        format!(
            "📸 We are waiting for your payment receipt. Please send it as an image.\n\
             Time left: {remaining_minutes} min. Attempts left: {remaining_attempts}."
        )
    }

    pub fn invalid_receipt(&self, reason: &str, remaining_attempts: u32) -> String {
        format!(
            "⚠️ That receipt could not be accepted: {reason}.\n\
             Send a clear JPG, PNG or WEBP image. Attempts left: {remaining_attempts}."
        )
    }

    pub fn attempts_exhausted(&self) -> String {
        format!(
            "❌ Your purchase was canceled because the attempt limit was exceeded.\n\
             You can start a new purchase at {}.",
            self.config.website_url
        )
    }

    pub fn receipt_received(&self, record: &PurchaseRecord, replaced: bool) -> String {
        let lead = if replaced {
            "🔄 Your receipt was replaced"
        } else {
            "✅ Receipt received"
        };
        format!(
            "{lead} for order {}.\n\
             Our team will review it and send you your raffle numbers once approved.",
            record.id
        )
    }

    pub fn expired(&self, record: &PurchaseRecord) -> String {
        if record.receipt_ref.is_some() {
            return format!(
                "⌛ Order {} expired before your receipt could be reviewed.\n\
                 If you already paid, contact {} with your receipt.",
                record.id, self.config.support_contact
            );
        }
        format!(
            "⌛ Order {} expired because no receipt arrived in time.\n\
             You can start a new purchase at {}.",
            record.id, self.config.website_url
        )
    }

    pub fn registration_prompt(&self, us_number: bool) -> String {
        if us_number {
            format!(
                "👋 Welcome to {}! To take part you first need to register at {}.",
                self.config.brand, self.config.website_url
            )
        } else {
            format!(
                "👋 Welcome to {}! Your number is not registered yet. \
                 Sign up at {} and then write to us again.",
                self.config.brand, self.config.website_url
            )
        }
    }

    pub fn purchases_unavailable(&self) -> String {
        format!(
            "🚫 Purchases are not available for your account right now. \
             Please contact {}.",
            self.config.support_contact
        )
    }

    pub fn menu(&self, display_name: Option<&str>) -> String {
        let greeting = match display_name {
            Some(name) if !name.is_empty() => format!("Hi {name}!"),
            _ => "Hi!".to_string(),
        };
        format!(
            "{greeting} 👋 This is {}.\n\n\
             To buy stickers, pick them at {} and send us the order message it generates.",
            self.config.brand, self.config.website_url
        )
    }

    pub fn invalid_purchase(&self, declaration: &str) -> String {
        format!(
            "⚠️ We could not read the quantity or the amount of your order.\n\
             Please send it in this format:\n\n\
             {declaration}\n\
             {}: 10 items - $10,000\n\
             Total items: 10\n\
             Total amount: $10,000",
            self.config.brand
        )
    }

    pub fn approved(&self, record: &PurchaseRecord) -> String {
        let numbers = if record.assigned_numbers.is_empty() {
            "Not assigned".to_string()
        } else {
            record.assigned_numbers.join(", ")
        };
        format!(
            "🎊 Your purchase {} was approved!\n\n\
             Raffle: {}\n\
             Your numbers: {numbers}\n\n\
             Good luck!",
            record.id, record.raffle_name
        )
    }

    pub fn rejected(&self, record: &PurchaseRecord, reason: &str) -> String {
        format!(
            "❌ Your purchase {} was rejected.\nReason: {reason}\n\n\
             If you think this is a mistake, contact {}.",
            record.id, self.config.support_contact
        )
    }

    pub fn intervention(&self, record: &PurchaseRecord) -> String {
        format!(
            "🛠️ We received your payment for order {}, but we need to finish your \
             registration manually. Please contact {} so we can assign your numbers.",
            record.id, self.config.support_contact
        )
    }

    pub fn blocked(&self) -> String {
        format!(
            "🚫 Your account can no longer place orders. Contact {} for details.",
            self.config.support_contact
        )
    }
}

/// Formats an amount as `$10,000`.
pub fn format_amount(amount: u64) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    format!("${grouped}")
}
