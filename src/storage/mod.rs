//! Wallet ledger persistence.
//!
//! SQLite-backed store for users, wallets, and withdrawal records. The two
//! ledger invariants live here: `public_key` is globally unique (violations
//! surface as `WalletError::DuplicatePublicKey` for callers to
//! special-case), and at most one wallet per user is active; every write
//! that touches `is_active` runs inside a single transaction so no
//! observable state has zero or two active wallets for a user.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::core::domain::{Wallet, WalletUser, WithdrawalRecord};
use crate::core::errors::WalletError;

/// Persistence port consumed by the lifecycle and withdrawal layers.
/// Every method may fail with `WalletError::Storage`; `create_wallet`
/// additionally signals the distinguished `DuplicatePublicKey` condition.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn upsert_user(&self, platform_id: &str) -> Result<WalletUser, WalletError>;
    async fn get_user_by_identity(&self, platform_id: &str)
        -> Result<Option<WalletUser>, WalletError>;

    /// Insert a wallet and make it the user's active one (previous active
    /// wallet is deactivated in the same transaction).
    async fn create_wallet(
        &self,
        user_id: &str,
        public_key: &str,
        encrypted_secret: &str,
    ) -> Result<Wallet, WalletError>;

    async fn get_wallet_by_id(&self, wallet_id: &str) -> Result<Option<Wallet>, WalletError>;
    async fn get_wallet_by_public_key(
        &self,
        public_key: &str,
    ) -> Result<Option<Wallet>, WalletError>;
    async fn get_wallets_by_user(&self, user_id: &str) -> Result<Vec<Wallet>, WalletError>;
    async fn get_active_wallet(&self, user_id: &str) -> Result<Option<Wallet>, WalletError>;

    /// Transactionally deactivate every other wallet of the user and
    /// activate the target.
    async fn set_active_wallet(&self, user_id: &str, wallet_id: &str) -> Result<(), WalletError>;

    async fn deactivate_all_wallets(&self, user_id: &str) -> Result<(), WalletError>;
    async fn set_wallet_locked(
        &self,
        user_id: &str,
        wallet_id: &str,
        locked: bool,
    ) -> Result<(), WalletError>;

    async fn insert_withdrawal_record(&self, record: &WithdrawalRecord)
        -> Result<(), WalletError>;
    async fn get_withdrawal_records(
        &self,
        user_id: &str,
    ) -> Result<Vec<WithdrawalRecord>, WalletError>;
}

/// SQLite implementation of [`WalletStore`].
#[derive(Debug, Clone)]
pub struct WalletStorage {
    pool: SqlitePool,
}

impl WalletStorage {
    pub async fn new_with_url(database_url: &str) -> Result<Self, WalletError> {
        // Accept both "sqlite:" and "sqlite://" forms.
        let mut db_url = database_url.to_string();
        if db_url.starts_with("sqlite:") && !db_url.starts_with("sqlite://") {
            db_url = db_url.replacen("sqlite:", "sqlite://", 1);
        }

        // Ensure the parent directory exists for file-backed databases.
        if let Some(path) = db_url.strip_prefix("sqlite://") {
            let path_only = path.split_once('?').map(|(p, _)| p).unwrap_or(path);
            if path_only != ":memory:" && !path_only.is_empty() {
                if let Some(parent) = std::path::Path::new(path_only).parent() {
                    if !parent.as_os_str().is_empty() {
                        if let Err(e) = std::fs::create_dir_all(parent) {
                            warn!("Failed to create database dir {:?}: {}", parent, e);
                        }
                    }
                }
            }
        }

        info!("[storage] connecting to wallet database");
        let is_memory = db_url.contains(":memory:");
        let connect_options = SqliteConnectOptions::from_str(&db_url)
            .map_err(|e| WalletError::Config(format!("invalid database URL: {}", e)))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

        // An in-memory database lives and dies with its connection, so it
        // gets a single never-idle connection instead of a real pool.
        let pool_options = if is_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(10)
                .acquire_timeout(Duration::from_secs(30))
        };
        let pool = pool_options.connect_with(connect_options).await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        info!("Wallet storage initialized");
        Ok(storage)
    }

    async fn initialize_schema(&self) -> Result<(), WalletError> {
        debug!("Initializing database schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                platform_id TEXT UNIQUE NOT NULL,
                created_at DATETIME NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS wallets (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                public_key TEXT UNIQUE NOT NULL,
                encrypted_secret TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 0,
                is_locked BOOLEAN NOT NULL DEFAULT 0,
                created_at DATETIME NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS withdrawals (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                amount TEXT NOT NULL,
                token_mint TEXT,
                tx_signature TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users (id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_wallets_user_id ON wallets (user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_withdrawals_user_id ON withdrawals (user_id)")
            .execute(&self.pool)
            .await?;

        debug!("Database schema initialized");
        Ok(())
    }

    fn is_unique_violation(err: &sqlx::Error) -> bool {
        matches!(
            err,
            sqlx::Error::Database(db)
                if matches!(db.kind(), sqlx::error::ErrorKind::UniqueViolation)
        )
    }
}

#[async_trait]
impl WalletStore for WalletStorage {
    async fn upsert_user(&self, platform_id: &str) -> Result<WalletUser, WalletError> {
        // Written once; there is deliberately no identity-update path, so
        // the cipher's derivation input can never diverge from this row.
        sqlx::query(
            r#"
            INSERT INTO users (id, platform_id, created_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(platform_id) DO NOTHING
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(platform_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        let user = sqlx::query_as::<_, WalletUser>(
            "SELECT id, platform_id, created_at FROM users WHERE platform_id = ?1",
        )
        .bind(platform_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn get_user_by_identity(
        &self,
        platform_id: &str,
    ) -> Result<Option<WalletUser>, WalletError> {
        let user = sqlx::query_as::<_, WalletUser>(
            "SELECT id, platform_id, created_at FROM users WHERE platform_id = ?1",
        )
        .bind(platform_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_wallet(
        &self,
        user_id: &str,
        public_key: &str,
        encrypted_secret: &str,
    ) -> Result<Wallet, WalletError> {
        debug!(user_id, "Creating wallet row");

        let wallet = Wallet {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            public_key: public_key.to_string(),
            encrypted_secret: encrypted_secret.to_string(),
            is_active: true,
            is_locked: false,
            created_at: Utc::now(),
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE wallets SET is_active = 0 WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        let insert = sqlx::query(
            r#"
            INSERT INTO wallets (id, user_id, public_key, encrypted_secret, is_active, is_locked, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(&wallet.id)
        .bind(&wallet.user_id)
        .bind(&wallet.public_key)
        .bind(&wallet.encrypted_secret)
        .bind(wallet.is_active)
        .bind(wallet.is_locked)
        .bind(wallet.created_at)
        .execute(&mut *tx)
        .await;

        match insert {
            Ok(_) => {
                tx.commit().await?;
                info!(wallet_id = %wallet.id, "Wallet row created");
                Ok(wallet)
            }
            Err(e) if Self::is_unique_violation(&e) => {
                // Rolls back the deactivation too; the previous active
                // wallet stays active.
                tx.rollback().await?;
                Err(WalletError::DuplicatePublicKey { public_key: public_key.to_string() })
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e.into())
            }
        }
    }

    async fn get_wallet_by_id(&self, wallet_id: &str) -> Result<Option<Wallet>, WalletError> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE id = ?1")
            .bind(wallet_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(wallet)
    }

    async fn get_wallet_by_public_key(
        &self,
        public_key: &str,
    ) -> Result<Option<Wallet>, WalletError> {
        let wallet = sqlx::query_as::<_, Wallet>("SELECT * FROM wallets WHERE public_key = ?1")
            .bind(public_key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(wallet)
    }

    async fn get_wallets_by_user(&self, user_id: &str) -> Result<Vec<Wallet>, WalletError> {
        let wallets = sqlx::query_as::<_, Wallet>(
            "SELECT * FROM wallets WHERE user_id = ?1 ORDER BY created_at ASC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(wallets)
    }

    async fn get_active_wallet(&self, user_id: &str) -> Result<Option<Wallet>, WalletError> {
        let wallet = sqlx::query_as::<_, Wallet>(
            "SELECT * FROM wallets WHERE user_id = ?1 AND is_active = 1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(wallet)
    }

    async fn set_active_wallet(&self, user_id: &str, wallet_id: &str) -> Result<(), WalletError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("UPDATE wallets SET is_active = 0 WHERE user_id = ?1")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        // Activation is scoped to the owner: a wallet id belonging to a
        // different user changes zero rows and the whole switch rolls back.
        let result = sqlx::query(
            "UPDATE wallets SET is_active = 1 WHERE id = ?1 AND user_id = ?2",
        )
        .bind(wallet_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() != 1 {
            tx.rollback().await?;
            return Err(WalletError::NotFound(format!("wallet {}", wallet_id)));
        }

        tx.commit().await?;
        debug!(user_id, wallet_id, "Active wallet switched");
        Ok(())
    }

    async fn deactivate_all_wallets(&self, user_id: &str) -> Result<(), WalletError> {
        sqlx::query("UPDATE wallets SET is_active = 0 WHERE user_id = ?1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_wallet_locked(
        &self,
        user_id: &str,
        wallet_id: &str,
        locked: bool,
    ) -> Result<(), WalletError> {
        let result =
            sqlx::query("UPDATE wallets SET is_locked = ?1 WHERE id = ?2 AND user_id = ?3")
                .bind(locked)
                .bind(wallet_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() != 1 {
            return Err(WalletError::NotFound(format!("wallet {}", wallet_id)));
        }
        Ok(())
    }

    async fn insert_withdrawal_record(
        &self,
        record: &WithdrawalRecord,
    ) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            INSERT INTO withdrawals (id, user_id, from_address, to_address, amount, token_mint, tx_signature, status, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(&record.id)
        .bind(&record.user_id)
        .bind(&record.from_address)
        .bind(&record.to_address)
        .bind(&record.amount)
        .bind(&record.token_mint)
        .bind(&record.tx_signature)
        .bind(&record.status)
        .bind(record.created_at)
        .execute(&self.pool)
        .await?;

        debug!(user_id = %record.user_id, "Withdrawal record stored");
        Ok(())
    }

    async fn get_withdrawal_records(
        &self,
        user_id: &str,
    ) -> Result<Vec<WithdrawalRecord>, WalletError> {
        let records = sqlx::query_as::<_, WithdrawalRecord>(
            "SELECT * FROM withdrawals WHERE user_id = ?1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }
}
