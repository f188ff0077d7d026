//! Per-peer Signal identity keys, keyed by signal address (`user:device`).

use sqlx::SqlitePool;

use crate::error::Result;

/// Store (or replace) the identity key for an address.
pub async fn put_identity(pool: &SqlitePool, address: &str, identity: &[u8]) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO identities (address, identity) VALUES (?, ?)
        ON CONFLICT (address) DO UPDATE SET identity = excluded.identity
        "#,
    )
    .bind(address)
    .bind(identity)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_identity(pool: &SqlitePool, address: &str) -> Result<Option<Vec<u8>>> {
    let row: Option<(Vec<u8>,)> =
        sqlx::query_as("SELECT identity FROM identities WHERE address = ?")
            .bind(address)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(identity,)| identity))
}

/// Whether the stored identity for `address` matches `identity` (trust on
/// first use: an absent row is trusted).
pub async fn is_trusted_identity(
    pool: &SqlitePool,
    address: &str,
    identity: &[u8],
) -> Result<bool> {
    Ok(match get_identity(pool, address).await? {
        Some(stored) => stored == identity,
        None => true,
    })
}

pub async fn delete_identity(pool: &SqlitePool, address: &str) -> Result<()> {
    sqlx::query("DELETE FROM identities WHERE address = ?")
        .bind(address)
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn identity_upsert_and_trust() {
        let store = Store::open_in_memory().await.unwrap();
        let pool = store.pool();

        assert!(is_trusted_identity(pool, "1555:0", &[1; 32]).await.unwrap());
        put_identity(pool, "1555:0", &[1; 32]).await.unwrap();
        assert!(is_trusted_identity(pool, "1555:0", &[1; 32]).await.unwrap());
        assert!(!is_trusted_identity(pool, "1555:0", &[2; 32]).await.unwrap());

        put_identity(pool, "1555:0", &[2; 32]).await.unwrap();
        assert_eq!(get_identity(pool, "1555:0").await.unwrap(), Some(vec![2; 32]));

        delete_identity(pool, "1555:0").await.unwrap();
        assert_eq!(get_identity(pool, "1555:0").await.unwrap(), None);
    }
}
