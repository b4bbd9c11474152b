//! Wallet lifecycle: create, import, export, switch.
//!
//! Orchestrates the key codec, the at-rest cipher, and the ledger. Create
//! and import are the only operations that persist new secret material;
//! export and switch never rewrite stored ciphertext.

use std::sync::Arc;

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use tracing::{info, warn};

use crate::core::domain::{SecretKeyMaterial, Wallet};
use crate::core::errors::WalletError;
use crate::core::keycodec::{self, KeyEncoding};
use crate::crypto::{EncryptedSecret, SecretCipher};
use crate::storage::WalletStore;

/// Result of a successful wallet creation; `secret_base58` is for one-time
/// display and is not retained anywhere in plaintext.
#[derive(Debug, Clone)]
pub struct CreatedWallet {
    pub wallet: Wallet,
    pub secret_base58: String,
}

/// Result of an import attempt. A duplicate public key is a branch, not an
/// error: the caller offers a switch to the existing wallet.
#[derive(Debug, Clone)]
pub enum ImportOutcome {
    Created { wallet: Wallet, encoding: KeyEncoding },
    Duplicate { existing: Wallet },
}

/// Decrypted key re-encoded for export: Base58 for humans, a JSON array of
/// 64 integers for programmatic consumers.
#[derive(Debug, Clone)]
pub struct ExportedKey {
    pub public_key: String,
    pub base58: String,
    pub json_array: String,
}

/// Decrypt a wallet's stored secret and re-validate it as a 64-byte
/// keypair whose public half matches the persisted address. Any failure is
/// `CorruptSecret`: the stored ciphertext is the problem, not the user.
pub fn decrypt_wallet_secret(
    cipher: &SecretCipher,
    wallet: &Wallet,
    identity: &str,
) -> Result<SecretKeyMaterial, WalletError> {
    let blob: EncryptedSecret = wallet.encrypted_secret.parse()?;
    let plaintext = cipher.decrypt(&blob, identity).map_err(|e| match e {
        WalletError::DecryptionFailed => WalletError::CorruptSecret,
        other => other,
    })?;

    let material = SecretKeyMaterial::try_from_slice(&plaintext).map_err(|_| {
        warn!(wallet_id = %wallet.id, len = plaintext.len(), "decrypted secret has wrong length");
        WalletError::CorruptSecret
    })?;

    match material.public_key_base58() {
        Some(pk) if pk == wallet.public_key => Ok(material),
        _ => {
            warn!(wallet_id = %wallet.id, "decrypted secret does not match stored public key");
            Err(WalletError::CorruptSecret)
        }
    }
}

/// Create/import/export/switch orchestration over a [`WalletStore`].
pub struct WalletLifecycle {
    store: Arc<dyn WalletStore>,
    cipher: SecretCipher,
}

impl WalletLifecycle {
    pub fn new(store: Arc<dyn WalletStore>, cipher: SecretCipher) -> Self {
        Self { store, cipher }
    }

    pub fn store(&self) -> &Arc<dyn WalletStore> {
        &self.store
    }

    /// Generate a fresh keypair for the user, encrypt it at rest, and
    /// persist it as the active wallet.
    pub async fn create(&self, identity: &str) -> Result<CreatedWallet, WalletError> {
        let user = self.store.upsert_user(identity).await?;

        let signing_key = SigningKey::generate(&mut OsRng);
        let material = SecretKeyMaterial::new(signing_key.to_keypair_bytes());
        let public_key = bs58::encode(signing_key.verifying_key().as_bytes()).into_string();

        let blob = material.with_secret(|bytes| self.cipher.encrypt(bytes, identity));
        let wallet = self
            .store
            .create_wallet(&user.id, &public_key, &blob.to_string())
            .await?;

        info!(user_id = %user.id, public_key = %public_key, "Created wallet");
        let secret_base58 = keycodec::encode(&material, KeyEncoding::Base58);
        Ok(CreatedWallet { wallet, secret_base58 })
    }

    /// Import a user-supplied secret in any supported encoding.
    ///
    /// # Errors
    /// * `InvalidKeyFormat` / `InvalidKeyLength`: undecodable input, with
    ///   per-format diagnostics (the raw secret is never logged)
    /// * anything the ledger propagates other than the duplicate case
    pub async fn import(&self, identity: &str, raw_text: &str) -> Result<ImportOutcome, WalletError> {
        let user = self.store.upsert_user(identity).await?;

        let (material, encoding) = keycodec::detect_and_decode(raw_text)?;
        let public_key = material.public_key_base58().ok_or_else(|| {
            WalletError::InvalidKeyFormat {
                notes: vec![format!(
                    "{}: decoded 64 bytes are not a consistent ed25519 keypair",
                    encoding.tag()
                )],
            }
        })?;

        let blob = material.with_secret(|bytes| self.cipher.encrypt(bytes, identity));
        match self
            .store
            .create_wallet(&user.id, &public_key, &blob.to_string())
            .await
        {
            Ok(wallet) => {
                info!(user_id = %user.id, format = %encoding, "Imported wallet");
                Ok(ImportOutcome::Created { wallet, encoding })
            }
            Err(WalletError::DuplicatePublicKey { public_key }) => {
                let existing = self
                    .store
                    .get_wallet_by_public_key(&public_key)
                    .await?
                    .ok_or_else(|| WalletError::NotFound(format!("wallet {}", public_key)))?;
                info!(user_id = %user.id, "Import matched an existing wallet");
                Ok(ImportOutcome::Duplicate { existing })
            }
            Err(e) => Err(e),
        }
    }

    /// Decrypt and re-encode a wallet's secret for one-time display.
    ///
    /// # Errors
    /// * `WalletLocked`: locked wallets refuse export
    /// * `CorruptSecret`: ciphertext fails to decrypt, decrypts to the
    ///   wrong length, or mismatches the stored public key; no partial
    ///   key material is ever returned
    pub async fn export(&self, identity: &str, wallet_id: &str) -> Result<ExportedKey, WalletError> {
        let user = self
            .store
            .get_user_by_identity(identity)
            .await?
            .ok_or_else(|| WalletError::NotFound("user".to_string()))?;

        let wallet = self
            .store
            .get_wallet_by_id(wallet_id)
            .await?
            .filter(|w| w.user_id == user.id)
            .ok_or_else(|| WalletError::NotFound(format!("wallet {}", wallet_id)))?;

        if wallet.is_locked {
            return Err(WalletError::WalletLocked);
        }

        let material = decrypt_wallet_secret(&self.cipher, &wallet, identity)?;
        let bundle = keycodec::export_bundle(&material);

        info!(user_id = %user.id, wallet_id = %wallet.id, "Exported wallet secret");
        Ok(ExportedKey {
            public_key: wallet.public_key,
            base58: bundle.base58,
            json_array: bundle.json_array,
        })
    }

    /// Make the given wallet the user's active one.
    pub async fn switch_active_by_id(
        &self,
        identity: &str,
        wallet_id: &str,
    ) -> Result<Wallet, WalletError> {
        let user = self
            .store
            .get_user_by_identity(identity)
            .await?
            .ok_or_else(|| WalletError::NotFound("user".to_string()))?;

        self.store.set_active_wallet(&user.id, wallet_id).await?;
        self.store
            .get_wallet_by_id(wallet_id)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("wallet {}", wallet_id)))
    }

    /// Switch by public key, for callers that only hold the address.
    pub async fn switch_active_by_public_key(
        &self,
        identity: &str,
        public_key: &str,
    ) -> Result<Wallet, WalletError> {
        let wallet = self
            .store
            .get_wallet_by_public_key(public_key)
            .await?
            .ok_or_else(|| WalletError::NotFound(format!("wallet {}", public_key)))?;
        self.switch_active_by_id(identity, &wallet.id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::WalletStorage;

    async fn lifecycle() -> WalletLifecycle {
        let store = WalletStorage::new_with_url("sqlite::memory:").await.unwrap();
        WalletLifecycle::new(Arc::new(store), SecretCipher::new(1_000))
    }

    #[tokio::test]
    async fn test_create_then_export_roundtrip() {
        let lc = lifecycle().await;
        let created = lc.create("tg:1").await.unwrap();
        assert!(created.wallet.is_active);
        assert!(!created.wallet.is_locked);

        let exported = lc.export("tg:1", &created.wallet.id).await.unwrap();
        assert_eq!(exported.base58, created.secret_base58);
        assert_eq!(exported.public_key, created.wallet.public_key);

        // Machine-readable form decodes to the same bytes.
        let bytes: Vec<u8> = serde_json::from_str(&exported.json_array).unwrap();
        let from_b58 = bs58::decode(&exported.base58).into_vec().unwrap();
        assert_eq!(bytes, from_b58);
        assert_eq!(bytes.len(), 64);
    }

    #[tokio::test]
    async fn test_import_base58_roundtrip() {
        let lc = lifecycle().await;
        let sk = SigningKey::generate(&mut OsRng);
        let text = bs58::encode(sk.to_keypair_bytes()).into_string();

        match lc.import("tg:1", &text).await.unwrap() {
            ImportOutcome::Created { wallet, encoding } => {
                assert_eq!(encoding, KeyEncoding::Base58);
                assert_eq!(
                    wallet.public_key,
                    bs58::encode(sk.verifying_key().as_bytes()).into_string()
                );
            }
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_import_decimal_array_reports_array_format() {
        let lc = lifecycle().await;
        let sk = SigningKey::generate(&mut OsRng);
        let nums: Vec<String> =
            sk.to_keypair_bytes().iter().map(|b| b.to_string()).collect();
        let text = format!("[{}]", nums.join(","));

        match lc.import("tg:1", &text).await.unwrap() {
            ImportOutcome::Created { encoding, .. } => {
                assert_eq!(encoding.tag(), "array");
            }
            other => panic!("expected Created, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_import_duplicate_offers_existing_wallet() {
        let lc = lifecycle().await;
        let created = lc.create("tg:1").await.unwrap();

        match lc.import("tg:1", &created.secret_base58).await.unwrap() {
            ImportOutcome::Duplicate { existing } => {
                assert_eq!(existing.id, created.wallet.id);
            }
            other => panic!("expected Duplicate, got {:?}", other),
        }

        // No second row was created.
        let user = lc.store().get_user_by_identity("tg:1").await.unwrap().unwrap();
        let wallets = lc.store().get_wallets_by_user(&user.id).await.unwrap();
        assert_eq!(wallets.len(), 1);
    }

    #[tokio::test]
    async fn test_import_garbage_fails_with_format_error() {
        let lc = lifecycle().await;
        let junk = "x".repeat(90);
        let err = lc.import("tg:1", &junk).await.unwrap_err();
        assert!(matches!(err, WalletError::InvalidKeyFormat { .. }));
    }

    #[tokio::test]
    async fn test_decrypt_with_wrong_identity_is_corrupt_secret() {
        let lc = lifecycle().await;
        let created = lc.create("tg:owner").await.unwrap();
        let wallet = lc.store().get_wallet_by_id(&created.wallet.id).await.unwrap().unwrap();

        // Wrong identity: either the padding check fails outright, or the
        // garbage plaintext fails the keypair/public-key validation. Both
        // surface as CorruptSecret, never partial key material.
        let err = decrypt_wallet_secret(&SecretCipher::new(1_000), &wallet, "tg:other").unwrap_err();
        assert!(matches!(err, WalletError::CorruptSecret));
    }

    #[tokio::test]
    async fn test_tampered_blob_is_corrupt_secret() {
        let lc = lifecycle().await;
        let created = lc.create("tg:owner").await.unwrap();
        let mut wallet = lc.store().get_wallet_by_id(&created.wallet.id).await.unwrap().unwrap();
        wallet.encrypted_secret = "not-a-blob".to_string();

        let err = decrypt_wallet_secret(&SecretCipher::new(1_000), &wallet, "tg:owner").unwrap_err();
        assert!(matches!(err, WalletError::CorruptSecret));
    }

    #[tokio::test]
    async fn test_export_short_plaintext_is_corrupt_secret() {
        let store = WalletStorage::new_with_url("sqlite::memory:").await.unwrap();
        let cipher = SecretCipher::new(1_000);
        let lc = WalletLifecycle::new(Arc::new(store), cipher.clone());

        // A blob that decrypts fine but to 63 bytes: wrong length, so no
        // key material may be returned.
        let user = lc.store().upsert_user("tg:1").await.unwrap();
        let blob = cipher.encrypt(&[7u8; 63], "tg:1");
        let wallet = lc
            .store()
            .create_wallet(&user.id, "ShortSecretKey", &blob.to_string())
            .await
            .unwrap();

        let err = lc.export("tg:1", &wallet.id).await.unwrap_err();
        assert!(matches!(err, WalletError::CorruptSecret));
    }

    #[tokio::test]
    async fn test_locked_wallet_refuses_export() {
        let lc = lifecycle().await;
        let created = lc.create("tg:1").await.unwrap();
        let user = lc.store().get_user_by_identity("tg:1").await.unwrap().unwrap();
        lc.store().set_wallet_locked(&user.id, &created.wallet.id, true).await.unwrap();

        let err = lc.export("tg:1", &created.wallet.id).await.unwrap_err();
        assert!(matches!(err, WalletError::WalletLocked));
    }

    #[tokio::test]
    async fn test_switch_active_by_id_and_public_key() {
        let lc = lifecycle().await;
        let first = lc.create("tg:1").await.unwrap();
        let second = lc.create("tg:1").await.unwrap();

        let user = lc.store().get_user_by_identity("tg:1").await.unwrap().unwrap();
        let active = lc.store().get_active_wallet(&user.id).await.unwrap().unwrap();
        assert_eq!(active.id, second.wallet.id);

        let switched = lc.switch_active_by_id("tg:1", &first.wallet.id).await.unwrap();
        assert!(switched.is_active);

        let switched = lc
            .switch_active_by_public_key("tg:1", &second.wallet.public_key)
            .await
            .unwrap();
        assert!(switched.is_active);

        let wallets = lc.store().get_wallets_by_user(&user.id).await.unwrap();
        assert_eq!(wallets.iter().filter(|w| w.is_active).count(), 1);
    }

    #[tokio::test]
    async fn test_export_other_users_wallet_not_found() {
        let lc = lifecycle().await;
        let created = lc.create("tg:owner").await.unwrap();
        lc.create("tg:intruder").await.unwrap();

        let err = lc.export("tg:intruder", &created.wallet.id).await.unwrap_err();
        assert!(matches!(err, WalletError::NotFound(_)));
    }
}
