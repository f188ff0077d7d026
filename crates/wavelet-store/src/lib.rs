//! # wavelet-store
//!
//! Persistent store for a linked device: identity keypairs, the Noise
//! static key, the adv secret, pre-keys, the pairing-established account
//! record, and the per-peer Signal namespaces.
//!
//! Backed by embedded SQLite via `sqlx`; ordered migrations carry the
//! schema version. Safe for concurrent use — per-namespace writes serialize
//! through SQLite's single-writer model and the pool.

pub mod device;
pub mod error;
pub mod keys;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

pub use device::{DeviceData, DEVICE_SCHEMA_VERSION};
pub use error::{Result, StoreError};
pub use keys::{IdentityKeyPair, KeyPair, SignedPreKey};

/// Handle to the device store.
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if needed) the store at `path` and run migrations.
    pub async fn open(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory store for tests and throwaway sessions.
    pub async fn open_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<()> {
        tracing::debug!("Running store migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    /// The underlying pool, for the repository modules.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Load the device row, generating and persisting fresh identity
    /// material on first run.
    pub async fn load_or_init_device(&self) -> Result<DeviceData> {
        if let Some(device) = device::load(&self.pool).await? {
            return Ok(device);
        }
        let device = DeviceData::generate();
        device::save(&self.pool, &device).await?;
        tracing::info!(
            registration_id = device.registration_id,
            "Generated new device identity"
        );
        Ok(device)
    }

    /// Persist the device row.
    pub async fn save_device(&self, device: &DeviceData) -> Result<()> {
        device::save(&self.pool, device).await
    }

    /// Wipe the store whole: device row and every dependent namespace.
    /// Used as the pairing-commit rollback and on logout.
    pub async fn delete_store(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "identities",
            "sessions",
            "prekeys",
            "sender_keys",
            "app_state",
            "chat_settings",
            "contacts",
            "lid_map",
            "device",
        ] {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        tracing::warn!("Device store wiped");
        Ok(())
    }
}
