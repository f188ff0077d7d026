//! Signal session records, opaque to the store, keyed by signal address.
//! Created lazily by the ratchet library and deleted on logout or contact
//! removal.

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn put_session(pool: &SqlitePool, address: &str, record: &[u8]) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sessions (address, record) VALUES (?, ?)
        ON CONFLICT (address) DO UPDATE SET record = excluded.record
        "#,
    )
    .bind(address)
    .bind(record)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_session(pool: &SqlitePool, address: &str) -> Result<Option<Vec<u8>>> {
    let row: Option<(Vec<u8>,)> =
        sqlx::query_as("SELECT record FROM sessions WHERE address = ?")
            .bind(address)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(record,)| record))
}

pub async fn has_session(pool: &SqlitePool, address: &str) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM sessions WHERE address = ?")
        .bind(address)
        .fetch_optional(pool)
        .await?;
    Ok(row.is_some())
}

pub async fn delete_session(pool: &SqlitePool, address: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE address = ?")
        .bind(address)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete every session for a user across device indices
/// (`user:0`, `user:1`, …).
pub async fn delete_all_sessions(pool: &SqlitePool, user: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE address = ? OR address LIKE ? || ':%'")
        .bind(user)
        .bind(user)
        .execute(pool)
        .await?;
    Ok(())
}
