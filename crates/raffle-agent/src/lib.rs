// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Purchase session handling for the raffle bot.
//!
//! The [`AgentLoop`] is the central coordinator that:
//! - Receives messages from the chat transport
//! - Hands each one to the [`SessionController`], one at a time
//! - Keeps going when a single message fails
//! - Stops on cancellation or when the transport closes
//!
//! The [`ExpirySweeper`] and the [`AdminService`] run beside it and share the
//! same [`BotContext`].

pub mod admin;
pub mod context;
pub mod controller;
pub mod detector;
pub mod identity;
pub mod locks;
pub mod messages;
pub mod raffles;
pub mod session;
pub mod shutdown;
pub mod stats;
pub mod sweeper;

use std::sync::Arc;

use raffle_core::error::RaffleError;
use raffle_core::traits::ChannelAdapter;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

pub use admin::{AcceptOutcome, AdminService, BlockOutcome};
pub use context::{Adapters, BotContext, SessionSettings};
pub use controller::{Handled, SessionController};
pub use detector::PurchaseDetector;
pub use session::{InMemorySessionStore, SessionState};
pub use stats::StatsSnapshot;
pub use sweeper::{ExpirySweeper, SweepReport};

/// The message loop between the chat transport and the session controller.
pub struct AgentLoop {
    channel: Arc<dyn ChannelAdapter>,
    controller: Arc<SessionController>,
}

impl AgentLoop {
    pub fn new(controller: Arc<SessionController>) -> Self {
        let channel = Arc::clone(&controller.context().channel);
        info!(channel = channel.name(), "agent loop initialized");
        Self {
            channel,
            controller,
        }
    }

    /// Runs until the cancellation token is triggered or the channel closes.
    ///
    /// Messages are handled in arrival order. An error while handling one
    /// message is logged and the loop moves on to the next.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), RaffleError> {
        info!("agent loop running");

        loop {
            tokio::select! {
                msg = self.channel.receive() => {
                    match msg {
                        Ok(inbound) => {
                            let message_id = inbound.id.clone();
                            match self.controller.handle_inbound(inbound).await {
                                Ok(handled) => debug!(message_id = %message_id, ?handled, "message handled"),
                                Err(e) => error!(message_id = %message_id, error = %e, "failed to handle inbound message"),
                            }
                        }
                        Err(RaffleError::ChannelClosed) => {
                            info!("channel closed, stopping agent loop");
                            break;
                        }
                        Err(e) => {
                            error!(error = %e, "channel receive error");
                        }
                    }
                }
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping agent loop");
                    break;
                }
            }
        }

        if let Err(e) = self.channel.shutdown().await {
            error!(error = %e, "channel shutdown failed");
        }
        info!("agent loop stopped");
        Ok(())
    }
}
