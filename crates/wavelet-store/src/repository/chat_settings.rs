//! Local chat settings (mute/pin/archive) mirrored from app-state patches.

use sqlx::SqlitePool;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatSettings {
    /// Unix seconds until which the chat is muted; 0 = unmuted.
    pub muted_until: i64,
    pub pinned: bool,
    pub archived: bool,
}

pub async fn put_settings(
    pool: &SqlitePool,
    chat_jid: &str,
    settings: &ChatSettings,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO chat_settings (chat_jid, muted_until, pinned, archived)
        VALUES (?, ?, ?, ?)
        ON CONFLICT (chat_jid) DO UPDATE SET
            muted_until = excluded.muted_until,
            pinned = excluded.pinned,
            archived = excluded.archived
        "#,
    )
    .bind(chat_jid)
    .bind(settings.muted_until)
    .bind(settings.pinned)
    .bind(settings.archived)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn get_settings(pool: &SqlitePool, chat_jid: &str) -> Result<ChatSettings> {
    let row: Option<(i64, bool, bool)> = sqlx::query_as(
        "SELECT muted_until, pinned, archived FROM chat_settings WHERE chat_jid = ?",
    )
    .bind(chat_jid)
    .fetch_optional(pool)
    .await?;
    Ok(row
        .map(|(muted_until, pinned, archived)| ChatSettings { muted_until, pinned, archived })
        .unwrap_or_default())
}
