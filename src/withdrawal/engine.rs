//! Guided withdrawal flow: token, amount, address, confirm, submit.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use curve25519_dalek::edwards::CompressedEdwardsY;
use tracing::{info, warn};
use uuid::Uuid;

use crate::blockchain::ChainClient;
use crate::core::domain::{TokenBalance, WithdrawalRecord};
use crate::core::errors::WalletError;
use crate::core::lifecycle::decrypt_wallet_secret;
use crate::crypto::SecretCipher;
use crate::storage::WalletStore;

use super::session::{SessionStore, WithdrawalSession, WithdrawalState};

/// Display symbol and decimals of the chain's native asset.
pub const NATIVE_SYMBOL: &str = "SOL";
pub const NATIVE_DECIMALS: u8 = 9;

/// Outcome of a free-text step. `Retry` leaves the session untouched so
/// the user can correct their input; the string is a user-facing reason.
#[derive(Debug, Clone)]
pub enum StepOutcome<T> {
    Accepted(T),
    Retry(String),
}

/// Outcome of the confirmation step.
#[derive(Debug)]
pub enum ConfirmOutcome {
    Submitted(WithdrawalReceipt),
    Cancelled,
    Retry(String),
}

/// Proof of a completed withdrawal, backed by the persisted record.
#[derive(Debug, Clone)]
pub struct WithdrawalReceipt {
    pub tx_signature: String,
    pub record: WithdrawalRecord,
}

/// Drives the multi-step withdrawal conversation for every user.
///
/// Steps taken out of order, or without a live session, fail with
/// `WalletError::SessionExpired` and clear whatever session remains; the
/// user starts over with [`WithdrawalEngine::begin`].
pub struct WithdrawalEngine {
    store: Arc<dyn WalletStore>,
    chain: Arc<dyn ChainClient>,
    cipher: SecretCipher,
    sessions: SessionStore,
    submission_timeout: Duration,
}

impl WithdrawalEngine {
    pub fn new(
        store: Arc<dyn WalletStore>,
        chain: Arc<dyn ChainClient>,
        cipher: SecretCipher,
        submission_timeout: Duration,
    ) -> Self {
        Self {
            store,
            chain,
            cipher,
            sessions: SessionStore::new(),
            submission_timeout,
        }
    }

    /// Start a withdrawal: snapshot the active wallet's balances and open
    /// a fresh session (replacing any previous one). Returns the spendable
    /// candidates the user can pick from.
    pub async fn begin(&self, identity: &str) -> Result<Vec<TokenBalance>, WalletError> {
        let user = self
            .store
            .get_user_by_identity(identity)
            .await?
            .ok_or_else(|| WalletError::NotFound("no wallet user for this identity".into()))?;
        let wallet = self
            .store
            .get_active_wallet(&user.id)
            .await?
            .ok_or_else(|| WalletError::NotFound("no active wallet".into()))?;
        if wallet.is_locked {
            return Err(WalletError::WalletLocked);
        }

        let native_amount = self.chain.get_balance(&wallet.public_key).await?;
        let token_accounts = self.chain.get_token_accounts(&wallet.public_key).await?;

        let mut candidates = vec![TokenBalance {
            mint: None,
            symbol: NATIVE_SYMBOL.to_string(),
            amount: native_amount,
            decimals: NATIVE_DECIMALS,
        }];
        candidates.extend(token_accounts.into_iter().filter(|t| t.amount > 0.0));

        let slot = self.sessions.slot(identity).await;
        *slot.lock().await = Some(WithdrawalSession::new(candidates.clone()));

        info!(candidates = candidates.len(), "Withdrawal session started");
        Ok(candidates)
    }

    /// Pick the asset to withdraw. `None` selects the native asset.
    /// A mint outside the session's snapshot aborts the session.
    pub async fn select_token(
        &self,
        identity: &str,
        mint: Option<&str>,
    ) -> Result<TokenBalance, WalletError> {
        let slot = self.sessions.slot(identity).await;
        let mut guard = slot.lock().await;
        let session = expect_state(&mut guard, WithdrawalState::SelectingToken)?;

        let Some(token) = session
            .candidates
            .iter()
            .find(|t| t.mint.as_deref() == mint)
            .cloned()
        else {
            warn!("Withdrawal token selection outside snapshot, aborting session");
            *guard = None;
            return Err(WalletError::SessionExpired);
        };

        session.token = Some(token.clone());
        session.state = WithdrawalState::EnteringAmount;
        Ok(token)
    }

    /// Parse and validate the amount the user typed. Thousands separators
    /// are tolerated. Violations re-prompt instead of aborting.
    pub async fn enter_amount(
        &self,
        identity: &str,
        text: &str,
    ) -> Result<StepOutcome<f64>, WalletError> {
        let slot = self.sessions.slot(identity).await;
        let mut guard = slot.lock().await;
        let session = expect_state(&mut guard, WithdrawalState::EnteringAmount)?;
        let Some(token) = session.token.clone() else {
            *guard = None;
            return Err(WalletError::SessionExpired);
        };

        let cleaned = text.trim().replace(',', "");
        let amount: f64 = match cleaned.parse() {
            Ok(v) => v,
            Err(_) => {
                return Ok(StepOutcome::Retry("enter a numeric amount".to_string()));
            }
        };
        if !amount.is_finite() || amount <= 0.0 {
            return Ok(StepOutcome::Retry(
                "amount must be greater than zero".to_string(),
            ));
        }
        if amount > token.amount {
            return Ok(StepOutcome::Retry(format!(
                "amount exceeds the available balance of {} {}",
                token.amount, token.symbol
            )));
        }

        session.amount = Some(amount);
        session.state = WithdrawalState::EnteringAddress;
        Ok(StepOutcome::Accepted(amount))
    }

    /// Validate the destination address: base58, 32 bytes, and a point on
    /// the ed25519 curve. Violations re-prompt instead of aborting.
    pub async fn enter_address(
        &self,
        identity: &str,
        text: &str,
    ) -> Result<StepOutcome<String>, WalletError> {
        let slot = self.sessions.slot(identity).await;
        let mut guard = slot.lock().await;
        let session = expect_state(&mut guard, WithdrawalState::EnteringAddress)?;

        let candidate = text.trim();
        let bytes = match bs58::decode(candidate).into_vec() {
            Ok(bytes) => bytes,
            Err(_) => {
                return Ok(StepOutcome::Retry(
                    "address is not valid base58".to_string(),
                ));
            }
        };
        if bytes.len() != 32 {
            return Ok(StepOutcome::Retry(
                "address must decode to exactly 32 bytes".to_string(),
            ));
        }
        let on_curve = CompressedEdwardsY::from_slice(&bytes)
            .ok()
            .and_then(|point| point.decompress())
            .is_some();
        if !on_curve {
            return Ok(StepOutcome::Retry(
                "address is not a valid ed25519 public key".to_string(),
            ));
        }

        session.to_address = Some(candidate.to_string());
        session.state = WithdrawalState::AwaitingConfirmation;
        Ok(StepOutcome::Accepted(candidate.to_string()))
    }

    /// Final gate. `yes` submits, `cancel` aborts, anything else
    /// re-prompts. Matching is case-insensitive.
    ///
    /// The session ends here no matter how submission goes: a success is
    /// recorded, a failure is reported without a record, and either way
    /// the user must start a new session for another withdrawal.
    pub async fn confirm(
        &self,
        identity: &str,
        answer: &str,
    ) -> Result<ConfirmOutcome, WalletError> {
        let slot = self.sessions.slot(identity).await;
        let mut guard = slot.lock().await;
        expect_state(&mut guard, WithdrawalState::AwaitingConfirmation)?;

        match answer.trim().to_lowercase().as_str() {
            "yes" => {
                // Clearing before submission makes double-submits
                // impossible even if execution fails midway.
                let session = guard.take().ok_or(WalletError::SessionExpired)?;
                let receipt = self.execute(identity, session).await?;
                Ok(ConfirmOutcome::Submitted(receipt))
            }
            "cancel" => {
                *guard = None;
                info!("Withdrawal cancelled by user");
                Ok(ConfirmOutcome::Cancelled)
            }
            _ => Ok(ConfirmOutcome::Retry(
                "reply \"yes\" to submit or \"cancel\" to abort".to_string(),
            )),
        }
    }

    /// Abort the user's session from any state. Returns whether a session
    /// was actually open.
    pub async fn cancel(&self, identity: &str) -> bool {
        let slot = self.sessions.slot(identity).await;
        let had_session = slot.lock().await.take().is_some();
        if had_session {
            info!("Withdrawal session cancelled");
        }
        had_session
    }

    /// Withdrawal history for the user, newest first.
    pub async fn history(&self, identity: &str) -> Result<Vec<WithdrawalRecord>, WalletError> {
        let user = self
            .store
            .get_user_by_identity(identity)
            .await?
            .ok_or_else(|| WalletError::NotFound("no wallet user for this identity".into()))?;
        self.store.get_withdrawal_records(&user.id).await
    }

    /// Drop idle sessions older than `max_age`.
    pub async fn sweep_expired(&self, max_age: Duration) -> usize {
        self.sessions.sweep_expired(max_age).await
    }

    async fn execute(
        &self,
        identity: &str,
        session: WithdrawalSession,
    ) -> Result<WithdrawalReceipt, WalletError> {
        let (Some(token), Some(amount), Some(to_address)) =
            (session.token, session.amount, session.to_address)
        else {
            return Err(WalletError::SessionExpired);
        };

        let user = self
            .store
            .get_user_by_identity(identity)
            .await?
            .ok_or_else(|| WalletError::NotFound("no wallet user for this identity".into()))?;
        let wallet = self
            .store
            .get_active_wallet(&user.id)
            .await?
            .ok_or_else(|| WalletError::NotFound("no active wallet".into()))?;
        if wallet.is_locked {
            return Err(WalletError::WalletLocked);
        }

        let material = decrypt_wallet_secret(&self.cipher, &wallet, identity)?;

        let submission = async {
            if let Some(mint) = token.mint.as_deref() {
                self.chain.ensure_token_account(mint, &to_address).await?;
                self.chain
                    .transfer_token(mint, &material, &to_address, amount, token.decimals)
                    .await
            } else {
                self.chain.transfer_native(&material, &to_address, amount).await
            }
        };
        let tx_signature = match tokio::time::timeout(self.submission_timeout, submission).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("Chain submission timed out");
                return Err(WalletError::ChainSubmissionFailed(
                    "submission timed out".to_string(),
                ));
            }
        };

        let record = WithdrawalRecord {
            id: Uuid::new_v4().to_string(),
            user_id: user.id,
            from_address: wallet.public_key,
            to_address,
            amount: amount.to_string(),
            token_mint: token.mint,
            tx_signature: tx_signature.clone(),
            status: "confirmed".to_string(),
            created_at: Utc::now(),
        };
        self.store.insert_withdrawal_record(&record).await?;

        info!(tx_signature = %record.tx_signature, "Withdrawal submitted and recorded");
        Ok(WithdrawalReceipt {
            tx_signature,
            record,
        })
    }
}

/// A step only runs in its expected state; anything else voids the
/// session and reports it as expired.
fn expect_state<'a>(
    guard: &'a mut Option<WithdrawalSession>,
    expected: WithdrawalState,
) -> Result<&'a mut WithdrawalSession, WalletError> {
    let in_expected_state = matches!(guard, Some(session) if session.state == expected);
    if !in_expected_state {
        *guard = None;
        return Err(WalletError::SessionExpired);
    }
    match guard.as_mut() {
        Some(session) => Ok(session),
        None => Err(WalletError::SessionExpired),
    }
}
