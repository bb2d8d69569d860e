// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Channel adapter trait for the chat transport.

use async_trait::async_trait;

use crate::error::RaffleError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{InboundMessage, MessageId, OutboundMessage, UserId};

/// Adapter for the bidirectional chat transport.
///
/// The transport delivers inbound messages with their candidate sender fields
/// and accepts outbound text or image messages addressed to a user.
#[async_trait]
pub trait ChannelAdapter: PluginAdapter {
    /// Establishes a connection to the messaging platform.
    async fn connect(&self) -> Result<(), RaffleError>;

    /// Whether the transport can currently deliver messages.
    fn is_connected(&self) -> bool;

    /// Sends a message through the channel.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, RaffleError>;

    /// Receives the next inbound message from the channel.
    ///
    /// Returns [`RaffleError::ChannelClosed`] once no more messages will arrive.
    async fn receive(&self) -> Result<InboundMessage, RaffleError>;

    async fn send_text(&self, to: &UserId, text: &str) -> Result<MessageId, RaffleError> {
        self.send(OutboundMessage::text(to.clone(), text)).await
    }

    async fn send_image(
        &self,
        to: &UserId,
        data: Vec<u8>,
        caption: &str,
    ) -> Result<MessageId, RaffleError> {
        self.send(OutboundMessage::image(to.clone(), data, caption))
            .await
    }
}
