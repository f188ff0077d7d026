//! One-time pre-key ring. Keys are minted in batches, marked once uploaded,
//! and deleted when a peer consumes them in an X3DH exchange.

use sqlx::SqlitePool;

use crate::error::Result;
use crate::keys::{blob_to_array, KeyPair};

/// How many unused pre-keys the client keeps ahead of the server.
pub const WANTED_PREKEY_COUNT: usize = 30;

#[derive(Debug, Clone)]
pub struct PreKey {
    pub id: u32,
    pub key_pair: KeyPair,
}

/// Mint `count` fresh pre-keys with consecutive ids following the current
/// maximum.
pub async fn generate_prekeys(pool: &SqlitePool, count: usize) -> Result<Vec<PreKey>> {
    let next_id = next_prekey_id(pool).await?;
    let mut minted = Vec::with_capacity(count);
    let mut tx = pool.begin().await?;
    for offset in 0..count {
        let id = next_id + offset as u32;
        let key_pair = KeyPair::generate();
        sqlx::query("INSERT INTO prekeys (id, secret, public, uploaded) VALUES (?, ?, ?, FALSE)")
            .bind(id as i64)
            .bind(key_pair.secret_bytes().to_vec())
            .bind(key_pair.public_bytes().to_vec())
            .execute(&mut *tx)
            .await?;
        minted.push(PreKey { id, key_pair });
    }
    tx.commit().await?;
    Ok(minted)
}

pub async fn get_prekey(pool: &SqlitePool, id: u32) -> Result<Option<PreKey>> {
    let row: Option<(i64, Vec<u8>)> =
        sqlx::query_as("SELECT id, secret FROM prekeys WHERE id = ?")
            .bind(id as i64)
            .fetch_optional(pool)
            .await?;
    row.map(|(id, secret)| {
        Ok(PreKey {
            id: id as u32,
            key_pair: KeyPair::from_secret_bytes(blob_to_array("secret", &secret)?),
        })
    })
    .transpose()
}

/// Pre-keys not yet uploaded to the server, oldest first.
pub async fn get_unuploaded_prekeys(pool: &SqlitePool, limit: usize) -> Result<Vec<PreKey>> {
    let rows: Vec<(i64, Vec<u8>)> = sqlx::query_as(
        "SELECT id, secret FROM prekeys WHERE uploaded = FALSE ORDER BY id ASC LIMIT ?",
    )
    .bind(limit as i64)
    .fetch_all(pool)
    .await?;
    rows.into_iter()
        .map(|(id, secret)| {
            Ok(PreKey {
                id: id as u32,
                key_pair: KeyPair::from_secret_bytes(blob_to_array("secret", &secret)?),
            })
        })
        .collect()
}

/// Mark every pre-key with id ≤ `up_to_id` as uploaded.
pub async fn mark_prekeys_uploaded(pool: &SqlitePool, up_to_id: u32) -> Result<()> {
    sqlx::query("UPDATE prekeys SET uploaded = TRUE WHERE id <= ?")
        .bind(up_to_id as i64)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete a consumed pre-key.
pub async fn delete_prekey(pool: &SqlitePool, id: u32) -> Result<()> {
    sqlx::query("DELETE FROM prekeys WHERE id = ?")
        .bind(id as i64)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn uploaded_prekey_count(pool: &SqlitePool) -> Result<usize> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM prekeys WHERE uploaded = TRUE")
            .fetch_one(pool)
            .await?;
    Ok(count as usize)
}

/// The id the next minted pre-key will get.
pub async fn next_prekey_id(pool: &SqlitePool) -> Result<u32> {
    let (max,): (Option<i64>,) = sqlx::query_as("SELECT MAX(id) FROM prekeys")
        .fetch_one(pool)
        .await?;
    Ok(max.map_or(1, |m| m as u32 + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn prekey_ring_lifecycle() {
        let store = Store::open_in_memory().await.unwrap();
        let pool = store.pool();

        let minted = generate_prekeys(pool, 5).await.unwrap();
        assert_eq!(minted.len(), 5);
        assert_eq!(minted[0].id, 1);
        assert_eq!(minted[4].id, 5);
        assert_eq!(next_prekey_id(pool).await.unwrap(), 6);

        // Ids keep climbing across batches.
        let more = generate_prekeys(pool, 2).await.unwrap();
        assert_eq!(more[0].id, 6);

        assert_eq!(get_unuploaded_prekeys(pool, 100).await.unwrap().len(), 7);
        mark_prekeys_uploaded(pool, 5).await.unwrap();
        assert_eq!(uploaded_prekey_count(pool).await.unwrap(), 5);
        assert_eq!(get_unuploaded_prekeys(pool, 100).await.unwrap().len(), 2);

        // Consumption removes the key outright.
        assert!(get_prekey(pool, 3).await.unwrap().is_some());
        delete_prekey(pool, 3).await.unwrap();
        assert!(get_prekey(pool, 3).await.unwrap().is_none());
    }
}
