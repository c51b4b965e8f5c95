//! Conversation ledger: one thread per (account, phone number) pair.

use super::{format_ts, parse_ts, Store};
use crate::error::{Error, Result};
use crate::types::Conversation;
use chrono::Utc;
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

/// Preview length for the derived last-message summary.
const PREVIEW_LEN: usize = 50;

const CONVERSATION_COLUMNS: &str = "id, account_id, phone_number, contact_id, last_message_at, \
     last_message_preview, unread_count, created_at";

impl Store {
    // ── Conversations ───────────────────────────────────────────

    /// Atomic lookup-or-insert keyed by (account, phone number).
    ///
    /// Concurrent first-contact deliveries are resolved by the uniqueness
    /// constraint: the insert is `ON CONFLICT DO NOTHING` and the winner's
    /// row is fetched afterwards, so two racing calls converge on one row.
    pub async fn get_or_create_conversation(
        &self,
        account_id: &str,
        phone_number: &str,
    ) -> Result<Conversation> {
        let inserted = sqlx::query(
            "INSERT INTO conversations
             (id, account_id, phone_number, last_message_preview, unread_count, created_at)
             VALUES (?1, ?2, ?3, '', 0, ?4)
             ON CONFLICT(account_id, phone_number) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(account_id)
        .bind(phone_number)
        .bind(format_ts(Utc::now()))
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE account_id = ?1 AND phone_number = ?2"
        ))
        .bind(account_id)
        .bind(phone_number)
        .fetch_optional(&self.pool)
        .await?;

        let conversation = row
            .as_ref()
            .map(row_to_conversation)
            .transpose()?
            .ok_or_else(|| {
                Error::Internal(format!(
                    "conversation vanished after insert for {phone_number}"
                ))
            })?;

        if inserted.rows_affected() > 0 {
            debug!(account_id, phone_number, "Created conversation");
            // Link the contact directory entry for brand-new threads
            self.refresh_conversation(&conversation.id).await?;
        }
        Ok(conversation)
    }

    /// Get a conversation by ID.
    pub async fn get_conversation(&self, id: &str) -> Result<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    /// Conversations for an account, most recently active first.
    pub async fn list_conversations(&self, account_id: &str) -> Result<Vec<Conversation>> {
        let rows = sqlx::query(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations
             WHERE account_id = ?1
             ORDER BY last_message_at IS NULL, last_message_at DESC"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_conversation).collect()
    }

    /// Recompute the derived fields of a conversation from its messages.
    ///
    /// Idempotent; invoked after every member-message mutation.
    pub async fn refresh_conversation(&self, id: &str) -> Result<()> {
        let Some(conversation) = self.get_conversation(id).await? else {
            return Ok(());
        };

        let last = sqlx::query(
            "SELECT content, timestamp FROM messages
             WHERE conversation_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        let (preview, last_at) = match last {
            Some(row) => {
                let content: String = row.try_get("content")?;
                let ts: String = row.try_get("timestamp")?;
                (preview(&content), Some(ts))
            }
            None => (String::new(), None),
        };

        let unread: i64 = sqlx::query(
            "SELECT COUNT(*) AS n FROM messages
             WHERE conversation_id = ?1 AND direction = 'incoming' AND status != 'read'",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await?
        .try_get("n")?;

        let contact_id = self
            .find_contact_for_phone(&conversation.phone_number)
            .await?;

        sqlx::query(
            "UPDATE conversations
             SET last_message_at = ?2, last_message_preview = ?3,
                 unread_count = ?4, contact_id = ?5
             WHERE id = ?1",
        )
        .bind(id)
        .bind(last_at)
        .bind(preview)
        .bind(unread)
        .bind(contact_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Mark all incoming messages of a conversation as read.
    pub async fn mark_conversation_read(&self, id: &str) -> Result<()> {
        sqlx::query(
            "UPDATE messages SET status = 'read'
             WHERE conversation_id = ?1 AND direction = 'incoming' AND status != 'read'",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        self.refresh_conversation(id).await
    }

    /// Total number of stored conversations.
    pub async fn conversation_count(&self) -> Result<u64> {
        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM conversations")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(n as u64)
    }
}

fn preview(content: &str) -> String {
    let mut p: String = content.chars().take(PREVIEW_LEN).collect();
    if content.chars().count() > PREVIEW_LEN {
        p.push_str("...");
    }
    p
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation> {
    let created: String = row.try_get("created_at")?;
    let last_at: Option<String> = row.try_get("last_message_at")?;
    Ok(Conversation {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        phone_number: row.try_get("phone_number")?,
        contact_id: row.try_get("contact_id")?,
        last_message_at: last_at.as_deref().map(parse_ts),
        last_message_preview: row.try_get("last_message_preview")?,
        unread_count: row.try_get::<i64, _>("unread_count")? as u32,
        created_at: parse_ts(&created),
    })
}
