// SPDX-FileCopyrightText: 2026 Raffle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory session registry and the per-user purchase FSM states.
//!
//! Each user goes through: Idle -> AwaitingReceipt -> {Completed | Canceled}.
//! AwaitingReceipt loops on itself while receipts are resubmitted. Only
//! AwaitingReceipt is held in memory; the terminal states live in the record
//! store, and Idle is the absence of a session.

use async_trait::async_trait;
use dashmap::DashMap;
use raffle_core::traits::SessionStore;
use raffle_core::types::{PurchaseSession, UserId};

/// States in the purchase-session FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No open purchase.
    Idle,
    /// A pending record exists and the buyer owes a receipt.
    AwaitingReceipt,
    /// An admin approved the purchase.
    Completed,
    /// Rejected, expired, blocked or out of attempts.
    Canceled,
}

impl SessionState {
    /// The in-memory state of a user given their session, if any.
    pub fn of(session: Option<&PurchaseSession>) -> Self {
        match session {
            Some(s) if s.awaiting_receipt => SessionState::AwaitingReceipt,
            _ => SessionState::Idle,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::AwaitingReceipt => write!(f, "awaiting_receipt"),
            SessionState::Completed => write!(f, "completed"),
            SessionState::Canceled => write!(f, "canceled"),
        }
    }
}

/// Why a session left `AwaitingReceipt`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalReason {
    Approved,
    Rejected,
    Expired,
    AttemptLimit,
    Blocked,
    /// The ledger could not register the buyer; an operator owns the record now.
    Intervention,
    /// The pending record vanished without this process noticing.
    ResolvedElsewhere,
}

impl TerminalReason {
    /// The state a session ends in for this reason.
    pub fn final_state(self) -> SessionState {
        match self {
            TerminalReason::Approved => SessionState::Completed,
            TerminalReason::ResolvedElsewhere | TerminalReason::Intervention => SessionState::Idle,
            _ => SessionState::Canceled,
        }
    }

    /// Rejection reason written to canceled records.
    pub fn record_reason(self) -> Option<&'static str> {
        match self {
            TerminalReason::Expired => Some("expired"),
            TerminalReason::AttemptLimit => Some("attempt limit exceeded"),
            _ => None,
        }
    }
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminalReason::Approved => write!(f, "approved"),
            TerminalReason::Rejected => write!(f, "rejected"),
            TerminalReason::Expired => write!(f, "expired"),
            TerminalReason::AttemptLimit => write!(f, "attempt_limit"),
            TerminalReason::Blocked => write!(f, "blocked"),
            TerminalReason::Intervention => write!(f, "intervention_required"),
            TerminalReason::ResolvedElsewhere => write!(f, "resolved_elsewhere"),
        }
    }
}

/// [`SessionStore`] backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<UserId, PurchaseSession>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, user: &UserId) -> Option<PurchaseSession> {
        self.sessions.get(user).map(|entry| entry.value().clone())
    }

    async fn set(&self, session: PurchaseSession) {
        self.sessions.insert(session.user.clone(), session);
    }

    async fn delete(&self, user: &UserId) -> Option<PurchaseSession> {
        self.sessions.remove(user).map(|(_, session)| session)
    }

    async fn list(&self) -> Vec<PurchaseSession> {
        self.sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use raffle_core::types::{PurchaseSnapshot, RecordId};

    fn session(user: &str) -> PurchaseSession {
        PurchaseSession {
            user: UserId::new(user),
            record_id: RecordId::new(format!("purchase_1_{user}")),
            awaiting_receipt: true,
            pending_purchase: PurchaseSnapshot {
                item_count: 1,
                total_amount: 1_000,
            },
            opened_at: Utc::now(),
            failed_attempts: 0,
            saved_receipt_ref: None,
            last_receipt_at: None,
        }
    }

    #[test]
    fn session_state_display() {
        assert_eq!(SessionState::Idle.to_string(), "idle");
        assert_eq!(SessionState::AwaitingReceipt.to_string(), "awaiting_receipt");
        assert_eq!(SessionState::Completed.to_string(), "completed");
        assert_eq!(SessionState::Canceled.to_string(), "canceled");
    }

    #[test]
    fn state_of_session() {
        let open = session("3001234567");
        assert_eq!(SessionState::of(Some(&open)), SessionState::AwaitingReceipt);
        assert_eq!(SessionState::of(None), SessionState::Idle);
    }

    #[test]
    fn terminal_reasons_map_to_states_and_record_reasons() {
        assert_eq!(TerminalReason::Approved.final_state(), SessionState::Completed);
        assert_eq!(TerminalReason::Expired.final_state(), SessionState::Canceled);
        assert_eq!(TerminalReason::Expired.record_reason(), Some("expired"));
        assert_eq!(
            TerminalReason::AttemptLimit.record_reason(),
            Some("attempt limit exceeded")
        );
        assert_eq!(TerminalReason::Rejected.record_reason(), None);
        assert_eq!(TerminalReason::Intervention.final_state(), SessionState::Idle);
        assert_eq!(TerminalReason::Intervention.record_reason(), None);
    }

    #[tokio::test]
    async fn set_get_delete_list() {
        let store = InMemorySessionStore::new();
        let a = session("3001234567");
        let b = session("3007654321");

        store.set(a.clone()).await;
        store.set(b.clone()).await;
        assert_eq!(store.get(&a.user).await, Some(a.clone()));
        assert_eq!(store.list().await.len(), 2);

        assert_eq!(store.delete(&a.user).await, Some(a.clone()));
        assert_eq!(store.delete(&a.user).await, None);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn set_replaces_existing_session() {
        let store = InMemorySessionStore::new();
        let mut s = session("3001234567");
        store.set(s.clone()).await;
        s.failed_attempts = 2;
        store.set(s.clone()).await;
        assert_eq!(store.get(&s.user).await.unwrap().failed_attempts, 2);
        assert_eq!(store.len(), 1);
    }
}
