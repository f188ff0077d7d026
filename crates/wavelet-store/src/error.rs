//! Store error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Corrupt {column} column: expected {expected} bytes, found {actual}")]
    CorruptKeyMaterial {
        column: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Corrupt account blob: {0}")]
    CorruptAccount(#[from] prost::DecodeError),

    #[error("Corrupt JID column: {0}")]
    CorruptJid(#[from] wavelet_codec::CodecError),
}
