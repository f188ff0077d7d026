//! App-state sync versions per collection name. The patch/mutation
//! machinery lives outside the store; this namespace only tracks where each
//! collection stands.

use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppStateVersion {
    pub version: u64,
    pub hash: Vec<u8>,
}

pub async fn put_version(
    pool: &SqlitePool,
    name: &str,
    state: &AppStateVersion,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO app_state (name, version, hash) VALUES (?, ?, ?)
        ON CONFLICT (name) DO UPDATE SET version = excluded.version, hash = excluded.hash
        "#,
    )
    .bind(name)
    .bind(state.version as i64)
    .bind(&state.hash)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_version(pool: &SqlitePool, name: &str) -> Result<Option<AppStateVersion>> {
    let row: Option<(i64, Vec<u8>)> =
        sqlx::query_as("SELECT version, hash FROM app_state WHERE name = ?")
            .bind(name)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(version, hash)| AppStateVersion { version: version as u64, hash }))
}

pub async fn delete_version(pool: &SqlitePool, name: &str) -> Result<()> {
    sqlx::query("DELETE FROM app_state WHERE name = ?")
        .bind(name)
        .execute(pool)
        .await?;
    Ok(())
}
