//! Chain port consumed by the withdrawal engine.

use async_trait::async_trait;

use crate::core::domain::{SecretKeyMaterial, TokenBalance};
use crate::core::errors::WalletError;

/// Interface to the underlying chain. Implementations talk to a real RPC
/// endpoint; the core only ever sees this trait (tests use mocks).
///
/// Submission calls are potentially slow network operations and fail with
/// `WalletError::ChainSubmissionFailed`. A submitted transfer cannot be
/// revoked, so no cancellation hook exists here.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Native-asset balance of an address, in display units.
    async fn get_balance(&self, public_key: &str) -> Result<f64, WalletError>;

    /// Token balances held by an address.
    async fn get_token_accounts(&self, public_key: &str)
        -> Result<Vec<TokenBalance>, WalletError>;

    /// Transfer the native asset. Returns the transaction signature.
    async fn transfer_native(
        &self,
        from: &SecretKeyMaterial,
        to: &str,
        amount: f64,
    ) -> Result<String, WalletError>;

    /// Transfer a token. The recipient's token account must already exist
    /// (see [`ChainClient::ensure_token_account`]). Returns the signature.
    async fn transfer_token(
        &self,
        mint: &str,
        from: &SecretKeyMaterial,
        to: &str,
        amount: f64,
        decimals: u8,
    ) -> Result<String, WalletError>;

    /// Create the recipient's token account for `mint` if absent.
    async fn ensure_token_account(&self, mint: &str, owner: &str) -> Result<(), WalletError>;
}
