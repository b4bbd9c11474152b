//! Per-user withdrawal session state.
//!
//! Each user gets one session slot. Every step of the flow locks the slot
//! for its whole duration, so a user's steps are strictly serialized even
//! when the chat platform delivers updates concurrently. Different users
//! never contend with each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::core::domain::TokenBalance;

/// Where the user is in the withdrawal conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WithdrawalState {
    SelectingToken,
    EnteringAmount,
    EnteringAddress,
    AwaitingConfirmation,
}

/// In-flight withdrawal conversation. Balances are snapshotted once at
/// session start; validation is against the snapshot, the chain has the
/// final word at submission time.
#[derive(Debug, Clone)]
pub struct WithdrawalSession {
    pub state: WithdrawalState,
    /// Spendable balances captured when the session started.
    pub candidates: Vec<TokenBalance>,
    pub token: Option<TokenBalance>,
    pub amount: Option<f64>,
    pub to_address: Option<String>,
    pub started_at: Instant,
}

impl WithdrawalSession {
    pub fn new(candidates: Vec<TokenBalance>) -> Self {
        Self {
            state: WithdrawalState::SelectingToken,
            candidates,
            token: None,
            amount: None,
            to_address: None,
            started_at: Instant::now(),
        }
    }
}

/// Session slots keyed by platform identity.
///
/// The outer map is only locked long enough to fetch or insert a slot;
/// the per-user `Mutex` is what serializes the flow.
#[derive(Default)]
pub struct SessionStore {
    slots: RwLock<HashMap<String, Arc<Mutex<Option<WithdrawalSession>>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's session slot, created empty on first use.
    pub async fn slot(&self, platform_id: &str) -> Arc<Mutex<Option<WithdrawalSession>>> {
        {
            let slots = self.slots.read().await;
            if let Some(slot) = slots.get(platform_id) {
                return Arc::clone(slot);
            }
        }
        let mut slots = self.slots.write().await;
        Arc::clone(
            slots
                .entry(platform_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(None))),
        )
    }

    /// Drop sessions older than `max_age`. Slots currently locked by an
    /// in-flight step are skipped and picked up on the next sweep.
    pub async fn sweep_expired(&self, max_age: Duration) -> usize {
        let mut swept = 0;
        let slots = self.slots.read().await;
        for (platform_id, slot) in slots.iter() {
            if let Ok(mut guard) = slot.try_lock() {
                let expired = guard
                    .as_ref()
                    .map(|s| s.started_at.elapsed() > max_age)
                    .unwrap_or(false);
                if expired {
                    *guard = None;
                    swept += 1;
                    debug!(platform_id, "Swept expired withdrawal session");
                }
            }
        }
        swept
    }
}
