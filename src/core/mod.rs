//! Core wallet domain: key codec, domain types, errors, and the
//! create/import/export/switch lifecycle.

pub mod domain;
pub mod errors;
pub mod keycodec;
pub mod lifecycle;

pub use self::domain::{SecretKeyMaterial, TokenBalance, Wallet, WalletUser, WithdrawalRecord};
pub use self::errors::WalletError;
pub use self::keycodec::{detect_and_decode, encode, export_bundle, ExportBundle, KeyEncoding};
pub use self::lifecycle::{CreatedWallet, ExportedKey, ImportOutcome, WalletLifecycle};
