// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! JSON-lines bridge transport.
//!
//! The chat transport process talks to the bot over a pair of byte streams
//! (stdin/stdout in production), one JSON object per line. A reader task
//! turns inbound lines into chat messages, connection updates and admin
//! requests; a writer task serializes outbound frames.
//!
//! Inbound frames, tagged by `type`:
//! - `message`: an [`InboundMessage`]
//! - `connection`: `{ "connected": bool }`
//! - `approve`, `accept`, `reject`, `block`, `unblock`: an [`AdminRequest`]
//!
//! Outbound frames: `send`, `event` and `admin_result`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use raffle_bus::Envelope;
use raffle_core::RaffleError;
use raffle_core::traits::{ChannelAdapter, PluginAdapter};
use raffle_core::types::{
    AdapterType, HealthStatus, InboundMessage, MessageId, OutboundContent, OutboundMessage,
    RecordId, UserId,
};

const QUEUE_CAPACITY: usize = 256;

/// An admin operation requested by the transport process.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum AdminAction {
    Approve {
        record_id: RecordId,
        #[serde(default)]
        assigned_numbers: Vec<String>,
        #[serde(default)]
        external_purchase_id: Option<String>,
    },
    Accept {
        record_id: RecordId,
    },
    Reject {
        record_id: RecordId,
        #[serde(default)]
        reason: Option<String>,
    },
    Block {
        user: UserId,
        #[serde(default)]
        reason: String,
    },
    Unblock {
        user: UserId,
    },
}

impl AdminAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Approve { .. } => "approve",
            Self::Accept { .. } => "accept",
            Self::Reject { .. } => "reject",
            Self::Block { .. } => "block",
            Self::Unblock { .. } => "unblock",
        }
    }
}

/// An admin action plus the caller's correlation id, echoed in the result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub action: AdminAction,
}

/// A parsed inbound line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    Message(InboundMessage),
    Connection { connected: bool },
    Admin(AdminRequest),
}

#[derive(Deserialize)]
struct ConnectionFrame {
    connected: bool,
}

/// Parses one inbound line.
pub fn parse_frame(line: &str) -> Result<InboundFrame, serde_json::Error> {
    let value: Value = serde_json::from_str(line)?;
    match value.get("type").and_then(Value::as_str) {
        Some("message") => Ok(InboundFrame::Message(serde_json::from_value(value)?)),
        Some("connection") => {
            let frame: ConnectionFrame = serde_json::from_value(value)?;
            Ok(InboundFrame::Connection {
                connected: frame.connected,
            })
        }
        _ => Ok(InboundFrame::Admin(serde_json::from_value(value)?)),
    }
}

/// Outcome of an admin request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub command: String,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A line written to the transport process.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    Send { to: UserId, content: OutboundContent },
    Event { event: Envelope },
    AdminResult(AdminResult),
}

/// [`ChannelAdapter`] over a JSON-lines byte stream pair.
pub struct BridgeChannel {
    inbound_rx: Mutex<mpsc::Receiver<InboundMessage>>,
    outbound_tx: mpsc::Sender<OutboundFrame>,
    connected: Arc<AtomicBool>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl BridgeChannel {
    /// Starts the reader and writer tasks.
    ///
    /// Returns the channel and the stream of admin requests. Both end when
    /// `reader` reaches end of file.
    pub fn spawn<R, W>(reader: R, writer: W) -> (Arc<Self>, mpsc::Receiver<AdminRequest>)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (inbound_tx, inbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (admin_tx, admin_rx) = mpsc::channel(QUEUE_CAPACITY);
        let (outbound_tx, outbound_rx) = mpsc::channel(QUEUE_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));

        let reader = tokio::spawn(read_frames(
            reader,
            inbound_tx,
            admin_tx,
            Arc::clone(&connected),
        ));
        tokio::spawn(write_frames(writer, outbound_rx));

        let channel = Arc::new(Self {
            inbound_rx: Mutex::new(inbound_rx),
            outbound_tx,
            connected,
            reader: Mutex::new(Some(reader)),
        });
        (channel, admin_rx)
    }

    /// Bridge over the process's stdin and stdout.
    pub fn stdio() -> (Arc<Self>, mpsc::Receiver<AdminRequest>) {
        Self::spawn(tokio::io::stdin(), tokio::io::stdout())
    }

    /// Queues a frame for the writer task.
    pub async fn emit(&self, frame: OutboundFrame) -> Result<(), RaffleError> {
        self.outbound_tx
            .send(frame)
            .await
            .map_err(|_| RaffleError::Channel {
                message: "bridge writer stopped".to_string(),
                source: None,
            })
    }
}

async fn read_frames<R>(
    reader: R,
    inbound_tx: mpsc::Sender<InboundMessage>,
    admin_tx: mpsc::Sender<AdminRequest>,
    connected: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("bridge input closed");
                break;
            }
            Err(e) => {
                error!(error = %e, "bridge read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match parse_frame(&line) {
            Ok(InboundFrame::Message(msg)) => {
                if inbound_tx.send(msg).await.is_err() {
                    debug!("message loop gone, dropping inbound message");
                }
            }
            Ok(InboundFrame::Connection { connected: up }) => {
                connected.store(up, Ordering::SeqCst);
                info!(connected = up, "transport connection changed");
            }
            Ok(InboundFrame::Admin(request)) => {
                if admin_tx.send(request).await.is_err() {
                    warn!("admin dispatcher gone, dropping admin request");
                }
            }
            Err(e) => warn!(error = %e, "ignoring malformed bridge frame"),
        }
    }
}

async fn write_frames<W>(mut writer: W, mut outbound_rx: mpsc::Receiver<OutboundFrame>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound_rx.recv().await {
        let mut line = match serde_json::to_string(&frame) {
            Ok(line) => line,
            Err(e) => {
                error!(error = %e, "failed to serialize bridge frame");
                continue;
            }
        };
        line.push('\n');
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            error!(error = %e, "bridge write failed");
            break;
        }
        if let Err(e) = writer.flush().await {
            error!(error = %e, "bridge flush failed");
            break;
        }
    }
}

#[async_trait]
impl PluginAdapter for BridgeChannel {
    fn name(&self) -> &str {
        "bridge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Channel
    }

    async fn health_check(&self) -> Result<HealthStatus, RaffleError> {
        if self.outbound_tx.is_closed() {
            Ok(HealthStatus::Unhealthy("bridge writer stopped".into()))
        } else if self.is_connected() {
            Ok(HealthStatus::Healthy)
        } else {
            Ok(HealthStatus::Degraded("transport disconnected".into()))
        }
    }

    async fn shutdown(&self) -> Result<(), RaffleError> {
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
        Ok(())
    }
}

#[async_trait]
impl ChannelAdapter for BridgeChannel {
    async fn connect(&self) -> Result<(), RaffleError> {
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, RaffleError> {
        self.emit(OutboundFrame::Send {
            to: msg.recipient,
            content: msg.content,
        })
        .await?;
        Ok(MessageId(format!("bridge-{}", uuid::Uuid::new_v4())))
    }

    async fn receive(&self) -> Result<InboundMessage, RaffleError> {
        let mut rx = self.inbound_rx.lock().await;
        rx.recv().await.ok_or(RaffleError::ChannelClosed)
    }
}
