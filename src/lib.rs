//! Custodial wallet core for chat-platform bots.
//!
//! Key material is generated or imported in the core, encrypted at rest
//! with a key derived from the owner's platform identity, and only ever
//! decrypted transiently to sign a withdrawal or serve an export.

pub mod blockchain;
pub mod config;
pub mod core;
pub mod crypto;
pub mod messaging;
pub mod storage;
pub mod withdrawal;

pub use crate::config::WalletConfig;
pub use crate::core::errors::WalletError;
pub use crate::core::lifecycle::WalletLifecycle;
pub use crate::crypto::SecretCipher;
pub use crate::storage::{WalletStorage, WalletStore};
pub use crate::withdrawal::WithdrawalEngine;
