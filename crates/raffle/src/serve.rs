// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `raffle serve` command implementation.
//!
//! Opens the record and receipt stores, connects the ledger client and the
//! JSON-lines bridge, then runs the message loop beside the expiry sweeper,
//! the admin dispatcher and the event forwarder until a shutdown signal
//! arrives or the bridge input closes.

use std::sync::Arc;

use raffle_agent::shutdown::{self, DRAIN_TIMEOUT};
use raffle_agent::{
    Adapters, AdminService, AgentLoop, BotContext, ExpirySweeper, InMemorySessionStore,
    SessionController,
};
use raffle_bus::EventBus;
use raffle_config::model::RaffleConfig;
use raffle_core::RaffleError;
use raffle_core::traits::ChannelAdapter;
use raffle_ledger::HttpLedger;
use raffle_storage::{FsReceiptStore, FsRecordStore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::bridge::BridgeChannel;
use crate::dispatch;

/// Runs the `raffle serve` command.
pub async fn run_serve(config: RaffleConfig) -> Result<(), RaffleError> {
    init_tracing(&config.bot.log_level);

    info!(name = %config.bot.name, "starting raffle serve");

    let records = Arc::new(FsRecordStore::open(&config.storage.data_dir).await?);
    let receipts = Arc::new(FsReceiptStore::open(config.storage.receipts_dir()).await?);
    info!(data_dir = %config.storage.data_dir, "record store opened");

    let ledger = Arc::new(HttpLedger::new(&config.ledger).map_err(|e| {
        error!(error = %e, "failed to initialize ledger client");
        e
    })?);

    let (bridge, admin_requests) = BridgeChannel::stdio();
    bridge.connect().await?;

    let bus = Arc::new(EventBus::default());
    let events = bus.subscribe();

    let adapters = Adapters {
        channel: bridge.clone(),
        records,
        receipts,
        sessions: Arc::new(InMemorySessionStore::new()),
        ledger,
        events: bus,
    };
    let ctx = Arc::new(BotContext::new(&config, adapters));
    let controller = Arc::new(SessionController::new(Arc::clone(&ctx), &config));

    let cancel = shutdown::install_signal_handler();
    let mut tasks = JoinSet::new();

    let sweeper = ExpirySweeper::new(Arc::clone(&ctx));
    tasks.spawn(sweeper.run(cancel.clone()));
    info!(
        interval_secs = config.session.sweep_interval_secs,
        timeout_secs = config.session.timeout_secs,
        "expiry sweeper spawned"
    );

    tasks.spawn(dispatch::run_admin_dispatcher(
        AdminService::new(Arc::clone(&ctx)),
        admin_requests,
        bridge.clone(),
        cancel.clone(),
    ));
    tasks.spawn(dispatch::run_event_forwarder(
        events,
        bridge.clone(),
        cancel.clone(),
    ));

    let agent_loop = AgentLoop::new(controller);
    let result = agent_loop.run(cancel.clone()).await;

    // The loop also ends when the bridge input closes.
    cancel.cancel();
    let aborted = shutdown::drain_tasks(&mut tasks, DRAIN_TIMEOUT).await;
    if aborted > 0 {
        warn!(aborted, "some background tasks did not stop in time");
    }

    let stats = ctx.stats.snapshot();
    info!(
        messages_received = stats.messages_received,
        messages_sent = stats.messages_sent,
        purchases_processed = stats.purchases_processed,
        receipts_received = stats.receipts_received,
        "raffle serve shutdown complete"
    );
    result
}

/// Initialize the tracing subscriber with an env filter.
///
/// `RUST_LOG` wins when set; otherwise the configured level applies to the
/// raffle crates and everything else logs warnings only.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(log_level)));

    // stdout carries bridge frames, so logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(false)
        .init();
}

fn default_directives(log_level: &str) -> String {
    [
        "raffle",
        "raffle_agent",
        "raffle_storage",
        "raffle_ledger",
        "raffle_bus",
        "raffle_config",
    ]
    .iter()
    .map(|target| format!("{target}={log_level}"))
    .chain(std::iter::once("warn".to_string()))
    .collect::<Vec<_>>()
    .join(",")
}
