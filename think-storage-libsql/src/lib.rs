#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]

//! # Think Storage - libSQL
//!
//! Encrypted libSQL storage backend for the Think knowledge hub.
//!
//! This crate provides:
//! - Database open/unlock with at-rest encryption keyed from the master
//!   password
//! - Forward-only, idempotent schema migrations in a version ledger
//! - Typed CRUD for memories, tags, links, conversations, jobs, and settings
//! - Hybrid vector + FTS5 search fused with Reciprocal Rank Fusion
//! - The per-domain encrypted blob vault
//!
//! All writes funnel through one dedicated connection behind an async mutex,
//! so concurrent CRUD never contends on the database file. Reads multiplex
//! over fresh connections from the `Database` factory.
//!
//! ## Example
//!
//! ```no_run
//! use think_storage_libsql::{database_exists, setup, unlock};
//!
//! # async fn example() -> think_core::Result<()> {
//! let data_dir = std::path::Path::new("/tmp/think-data");
//! let unlocked = if database_exists(data_dir) {
//!     unlock(data_dir, "hunter2").await?
//! } else {
//!     setup(data_dir, "hunter2").await?
//! };
//! let memories = unlocked.store.count_memories_with_embeddings().await?;
//! # let _ = memories;
//! # Ok(())
//! # }
//! ```

use libsql::{Builder, Connection, Database};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use think_core::crypto::Keyring;
use think_core::{Error, Result};

pub mod fts5_schema;
pub mod migrations;
pub mod schema;
pub mod store;
pub mod vault;

mod trait_impl;

pub use vault::BlobVault;

/// Database file name under the data directory.
pub const DB_FILE_NAME: &str = "think.db";

/// Encrypted libSQL store with a single-writer executor.
pub struct LibsqlStore {
    db: Database,
    writer: Mutex<Connection>,
}

impl LibsqlStore {
    /// Open (or create) the encrypted database at `path`.
    ///
    /// A wrong key surfaces as [`Error::AuthInvalid`] when the first
    /// statement touches the corrupted-looking pages.
    pub async fn open(path: &Path, db_key: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let existed = path.exists();

        let encryption = libsql::EncryptionConfig::new(
            libsql::Cipher::Aes256Cbc,
            db_key.as_bytes().to_vec().into(),
        );
        let db = Builder::new_local(path)
            .encryption_config(encryption)
            .build()
            .await
            .map_err(|e| {
                // A pre-existing file that refuses to open means the key is
                // wrong; anything else is an environment problem
                if existed {
                    Error::AuthInvalid
                } else {
                    Error::Storage(format!("Failed to open database: {e}"))
                }
            })?;

        let writer = db
            .connect()
            .map_err(|e| Error::Storage(format!("Failed to connect: {e}")))?;

        // Touching the schema verifies the key
        writer
            .query("SELECT count(*) FROM sqlite_master", ())
            .await
            .map_err(|_| Error::AuthInvalid)?;
        writer
            .execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to enable foreign keys: {e}")))?;

        debug!("Opened encrypted database at {}", path.display());
        Ok(LibsqlStore {
            db,
            writer: Mutex::new(writer),
        })
    }

    /// A fresh read connection.
    pub(crate) async fn reader(&self) -> Result<Connection> {
        let conn = self
            .db
            .connect()
            .map_err(|e| Error::Storage(format!("Failed to connect: {e}")))?;
        conn.execute("PRAGMA foreign_keys = ON", ())
            .await
            .map_err(|e| Error::Storage(format!("Failed to enable foreign keys: {e}")))?;
        Ok(conn)
    }

    /// The dedicated write connection; holding the guard serializes writers.
    pub(crate) async fn writer(&self) -> MutexGuard<'_, Connection> {
        self.writer.lock().await
    }

    /// Run all pending schema migrations on the writer connection.
    pub async fn migrate(&self) -> Result<Vec<(i64, String)>> {
        let conn = self.writer().await;
        migrations::run_migrations(&conn).await
    }
}

/// Path of the database file under a data directory.
pub fn db_path(data_dir: &Path) -> PathBuf {
    data_dir.join(DB_FILE_NAME)
}

/// Whether a database exists on disk (i.e. a password was set).
pub fn database_exists(data_dir: &Path) -> bool {
    db_path(data_dir).exists()
}

/// An unlocked storage layer: the relational store plus the blob vault.
pub struct Unlocked {
    pub store: Arc<LibsqlStore>,
    pub vault: Arc<BlobVault>,
}

async fn open_with_password(data_dir: &Path, password: &str) -> Result<Unlocked> {
    let keyring = Keyring::unlock(data_dir, password)?;
    let store = LibsqlStore::open(&db_path(data_dir), keyring.db_key()).await?;
    store.migrate().await?;
    Ok(Unlocked {
        store: Arc::new(store),
        vault: Arc::new(BlobVault::new(data_dir, keyring)),
    })
}

/// First-run setup: refuse when a database already exists.
pub async fn setup(data_dir: &Path, password: &str) -> Result<Unlocked> {
    if database_exists(data_dir) {
        return Err(Error::Conflict("Password already set".to_string()));
    }
    let unlocked = open_with_password(data_dir, password).await?;
    info!("Initialized new encrypted store");
    Ok(unlocked)
}

/// Unlock an existing database with the master password.
pub async fn unlock(data_dir: &Path, password: &str) -> Result<Unlocked> {
    if !database_exists(data_dir) {
        return Err(Error::Validation("No password set".to_string()));
    }
    open_with_password(data_dir, password).await
}
