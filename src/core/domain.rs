//! Core domain types: secret key material, wallets, users, withdrawal
//! records, token balances.

use chrono::{DateTime, Utc};
use ed25519_dalek::SigningKey;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use zeroize::Zeroize;

use crate::core::errors::WalletError;

/// A 64-byte ed25519 keypair secret (32-byte seed followed by the 32-byte
/// public half). Wrapped in `secrecy::Secret` so the bytes are zeroized on
/// drop and never show up in Debug output.
///
/// Exists only in memory during import/create/export/spend; the persisted
/// form is always an [`crate::crypto::EncryptedSecret`].
pub struct SecretKeyMaterial(Secret<[u8; 64]>);

impl SecretKeyMaterial {
    pub const LEN: usize = 64;

    pub fn new(bytes: [u8; 64]) -> Self {
        Self(Secret::new(bytes))
    }

    /// Construct from a byte slice, rejecting anything that is not exactly
    /// 64 bytes. Length is checked here and re-checked by every caller
    /// that obtains bytes from an untrusted decode.
    pub fn try_from_slice(slice: &[u8]) -> Result<Self, WalletError> {
        if slice.len() != Self::LEN {
            return Err(WalletError::InvalidKeyLength { actual: slice.len() });
        }
        let mut arr = [0u8; Self::LEN];
        arr.copy_from_slice(slice);
        let material = Self::new(arr);
        arr.zeroize();
        Ok(material)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        self.0.expose_secret()
    }

    /// Scoped access to the raw bytes. Prefer this over `as_bytes()` so
    /// callers can't hold on to secret data outside a small scope.
    pub fn with_secret<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&[u8; 64]) -> R,
    {
        f(self.0.expose_secret())
    }

    /// Reconstruct the signing key, verifying that the public half matches
    /// the seed. Returns `None` when the two halves disagree; the caller
    /// decides whether that means bad input or a corrupt stored secret.
    pub fn signing_key(&self) -> Option<SigningKey> {
        SigningKey::from_keypair_bytes(self.0.expose_secret()).ok()
    }

    /// Base58 public key derived from (and validated against) the keypair.
    pub fn public_key_base58(&self) -> Option<String> {
        self.signing_key()
            .map(|sk| bs58::encode(sk.verifying_key().as_bytes()).into_string())
    }
}

impl std::fmt::Debug for SecretKeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKeyMaterial([REDACTED])")
    }
}

impl Zeroize for SecretKeyMaterial {
    fn zeroize(&mut self) {
        self.0 = Secret::new([0u8; 64]);
    }
}

impl Drop for SecretKeyMaterial {
    fn drop(&mut self) {
        self.zeroize();
    }
}

/// A user's wallet as persisted by the ledger.
///
/// Invariants (enforced by [`crate::storage::WalletStorage`]):
/// at most one wallet per user has `is_active = true`, and `public_key`
/// is unique across all wallets system-wide.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Wallet {
    pub id: String,
    pub user_id: String,
    /// Base58-encoded 32-byte curve point.
    pub public_key: String,
    /// Serialized encrypted secret, `"<ivHex>:<ctHex>"`.
    pub encrypted_secret: String,
    pub is_active: bool,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
}

/// A bot user. `platform_id` is the stable chat-platform identity string;
/// it doubles as the key-derivation input for the at-rest cipher and is
/// written once, never updated.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WalletUser {
    pub id: String,
    pub platform_id: String,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit row for a resolved withdrawal submission.
/// Only written after the chain accepted the transfer; failures before or
/// during submission leave no record.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct WithdrawalRecord {
    pub id: String,
    pub user_id: String,
    pub from_address: String,
    pub to_address: String,
    /// Display amount as the user entered it.
    pub amount: String,
    /// `None` for native-asset transfers.
    pub token_mint: Option<String>,
    pub tx_signature: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// A spendable balance snapshot taken when a withdrawal session starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// `None` for the chain's native asset.
    pub mint: Option<String>,
    pub symbol: String,
    /// Balance in display units.
    pub amount: f64,
    pub decimals: u8,
}

impl TokenBalance {
    pub fn is_native(&self) -> bool {
        self.mint.is_none()
    }
}
