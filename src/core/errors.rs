//! Error taxonomy for wallet operations.
//!
//! Every failure mode the core can surface is a variant here; callers
//! branch on variants, never on message text. Messages carry format tags
//! and lengths only, never key material.

/// Closed error enumeration for the wallet core.
#[derive(Debug, thiserror::Error)]
pub enum WalletError {
    /// No supported encoding matched the supplied secret. Carries one
    /// rejection note per attempted format for precise user messaging.
    #[error("unrecognized secret key format ({})", .notes.join("; "))]
    InvalidKeyFormat { notes: Vec<String> },

    /// The input decoded, but not to 64 bytes.
    #[error("secret key must decode to 64 bytes, got {actual}")]
    InvalidKeyLength { actual: usize },

    /// Stored ciphertext failed to decrypt or decrypted to something that
    /// is not a valid 64-byte keypair. Not user-correctable.
    #[error("stored wallet secret is corrupt")]
    CorruptSecret,

    /// Cipher or padding check failed during decryption (wrong key or
    /// damaged blob).
    #[error("decryption failed")]
    DecryptionFailed,

    /// A wallet with this public key already exists. This is a
    /// disambiguation branch, not a hard failure: the lifecycle layer
    /// turns it into a switch-to-existing offer.
    #[error("wallet with public key {public_key} already exists")]
    DuplicatePublicKey { public_key: String },

    /// The wallet is locked; export and withdrawal are refused.
    #[error("wallet is locked")]
    WalletLocked,

    /// Stale or tampered multi-step session; the flow must restart.
    #[error("session expired or invalid")]
    SessionExpired,

    /// The chain rejected the submission or it never reached the chain.
    /// Reported, never retried automatically.
    #[error("chain submission failed: {0}")]
    ChainSubmissionFailed(String),

    /// A requested entity does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Underlying database failure (anything other than the
    /// unique-violation case, which maps to `DuplicatePublicKey`).
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// Configuration problem detected at startup.
    #[error("configuration error: {0}")]
    Config(String),
}

impl WalletError {
    /// Whether the user can fix this by re-entering input.
    pub fn is_user_correctable(&self) -> bool {
        matches!(
            self,
            WalletError::InvalidKeyFormat { .. } | WalletError::InvalidKeyLength { .. }
        )
    }
}
