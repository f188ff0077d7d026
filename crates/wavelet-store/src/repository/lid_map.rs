//! 1:1 mapping between pseudonymous LID addresses and phone-number JIDs.

use sqlx::SqlitePool;

use crate::error::Result;

/// Record the LID↔PN pair, replacing stale mappings on either side.
pub async fn put_mapping(pool: &SqlitePool, lid: &str, pn: &str) -> Result<()> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM lid_map WHERE lid = ? OR pn = ?")
        .bind(lid)
        .bind(pn)
        .execute(&mut *tx)
        .await?;
    sqlx::query("INSERT INTO lid_map (lid, pn) VALUES (?, ?)")
        .bind(lid)
        .bind(pn)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(())
}

pub async fn pn_for_lid(pool: &SqlitePool, lid: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT pn FROM lid_map WHERE lid = ?")
        .bind(lid)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(pn,)| pn))
}

pub async fn lid_for_pn(pool: &SqlitePool, pn: &str) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as("SELECT lid FROM lid_map WHERE pn = ?")
        .bind(pn)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(lid,)| lid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;

    #[tokio::test]
    async fn mapping_replaces_stale_pairs() {
        let store = Store::open_in_memory().await.unwrap();
        let pool = store.pool();

        put_mapping(pool, "99001@lid", "15551234@s.whatsapp.net").await.unwrap();
        assert_eq!(
            pn_for_lid(pool, "99001@lid").await.unwrap().as_deref(),
            Some("15551234@s.whatsapp.net")
        );
        assert_eq!(
            lid_for_pn(pool, "15551234@s.whatsapp.net").await.unwrap().as_deref(),
            Some("99001@lid")
        );

        // Re-pairing the PN to a new LID retires the old row.
        put_mapping(pool, "99002@lid", "15551234@s.whatsapp.net").await.unwrap();
        assert_eq!(pn_for_lid(pool, "99001@lid").await.unwrap(), None);
        assert_eq!(
            lid_for_pn(pool, "15551234@s.whatsapp.net").await.unwrap().as_deref(),
            Some("99002@lid")
        );
    }
}
