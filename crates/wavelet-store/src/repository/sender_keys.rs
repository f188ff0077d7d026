//! Group sender-key records, opaque blobs keyed by (group, sender address).

use sqlx::SqlitePool;

use crate::error::Result;

pub async fn put_sender_key(
    pool: &SqlitePool,
    group_jid: &str,
    sender: &str,
    record: &[u8],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO sender_keys (group_jid, sender, record) VALUES (?, ?, ?)
        ON CONFLICT (group_jid, sender) DO UPDATE SET record = excluded.record
        "#,
    )
    .bind(group_jid)
    .bind(sender)
    .bind(record)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_sender_key(
    pool: &SqlitePool,
    group_jid: &str,
    sender: &str,
) -> Result<Option<Vec<u8>>> {
    let row: Option<(Vec<u8>,)> =
        sqlx::query_as("SELECT record FROM sender_keys WHERE group_jid = ? AND sender = ?")
            .bind(group_jid)
            .bind(sender)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(record,)| record))
}

/// Drop every sender key for a group (membership reset).
pub async fn delete_group_sender_keys(pool: &SqlitePool, group_jid: &str) -> Result<()> {
    sqlx::query("DELETE FROM sender_keys WHERE group_jid = ?")
        .bind(group_jid)
        .execute(pool)
        .await?;
    Ok(())
}
