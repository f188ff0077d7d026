//! Contact names, merged from push names, app-state sync, and business
//! profiles.

use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, sqlx::FromRow)]
pub struct ContactInfo {
    pub first_name: String,
    pub full_name: String,
    pub push_name: String,
    pub business_name: String,
}

pub async fn put_contact(pool: &SqlitePool, their_jid: &str, info: &ContactInfo) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO contacts (their_jid, first_name, full_name, push_name, business_name)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (their_jid) DO UPDATE SET
            first_name = excluded.first_name,
            full_name = excluded.full_name,
            push_name = excluded.push_name,
            business_name = excluded.business_name
        "#,
    )
    .bind(their_jid)
    .bind(&info.first_name)
    .bind(&info.full_name)
    .bind(&info.push_name)
    .bind(&info.business_name)
    .execute(pool)
    .await?;
    Ok(())
}

/// Update only the push name, preserving other fields. Returns whether the
/// stored name changed.
pub async fn put_push_name(pool: &SqlitePool, their_jid: &str, push_name: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        INSERT INTO contacts (their_jid, push_name) VALUES (?, ?)
        ON CONFLICT (their_jid) DO UPDATE SET push_name = excluded.push_name
        WHERE contacts.push_name != excluded.push_name
        "#,
    )
    .bind(their_jid)
    .bind(push_name)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_contact(pool: &SqlitePool, their_jid: &str) -> Result<Option<ContactInfo>> {
    let row = sqlx::query_as::<_, ContactInfo>(
        "SELECT first_name, full_name, push_name, business_name FROM contacts WHERE their_jid = ?",
    )
    .bind(their_jid)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn delete_contact(pool: &SqlitePool, their_jid: &str) -> Result<()> {
    sqlx::query("DELETE FROM contacts WHERE their_jid = ?")
        .bind(their_jid)
        .execute(pool)
        .await?;
    Ok(())
}
