//! Message store: inbound recording, outbound recording, status
//! reconciliation. All keyed mutations are idempotent under redelivery.

use super::{format_ts, parse_ts, Store};
use crate::error::Result;
use crate::types::{Direction, InboundMessage, Message, MessageStatus, OutboundMessage, StatusUpdate};
use chrono::Utc;
use sqlx::Row;
use tracing::{debug, warn};
use uuid::Uuid;

const MESSAGE_COLUMNS: &str = "id, account_id, conversation_id, direction, phone_number, \
     message_type, content, media_ref, provider_message_id, status, error_message, timestamp";

impl Store {
    // ── Inbound ─────────────────────────────────────────────────

    /// Record an inbound message from the webhook.
    ///
    /// The provider redelivers at-least-once, so inserts are deduplicated by
    /// (account, provider message id) when the provider supplied an id.
    /// Returns `None` for a duplicate, so the caller skips notification.
    /// Messages without a provider id are inserted as-is.
    pub async fn record_inbound(
        &self,
        account_id: &str,
        inbound: &InboundMessage,
    ) -> Result<Option<Message>> {
        if let Some(pid) = &inbound.provider_message_id {
            if self
                .find_message_by_provider_id(account_id, pid)
                .await?
                .is_some()
            {
                debug!(provider_message_id = %pid, "Duplicate inbound message, skipping");
                return Ok(None);
            }
        }

        let conversation = self
            .get_or_create_conversation(account_id, &inbound.phone_number)
            .await?;

        let message = Message {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            conversation_id: Some(conversation.id.clone()),
            direction: Direction::Incoming,
            phone_number: inbound.phone_number.clone(),
            message_type: inbound.message_type.clone(),
            content: inbound.content.clone(),
            media_ref: inbound.media_ref.clone(),
            provider_message_id: inbound.provider_message_id.clone(),
            // Receipt implies delivery
            status: MessageStatus::Delivered,
            error_message: None,
            // Arrival time; provider timestamps are unreliable or absent
            timestamp: Utc::now(),
        };

        // A racing redelivery can still slip past the pre-check; the partial
        // unique index resolves it and we treat the loss as a duplicate.
        let inserted = self.insert_message(&message).await?;
        if !inserted {
            debug!(
                provider_message_id = ?inbound.provider_message_id,
                "Lost insert race to a concurrent redelivery"
            );
            return Ok(None);
        }

        self.refresh_conversation(&conversation.id).await?;
        Ok(Some(message))
    }

    // ── Outbound ────────────────────────────────────────────────

    /// Record the outcome of an outbound send.
    ///
    /// Exactly one row per send attempt: `Ok(provider_id)` records a sent
    /// message, `Err(detail)` records a failed one. Failures are kept for
    /// audit history, never dropped.
    pub async fn record_outbound(
        &self,
        account_id: &str,
        conversation_id: Option<&str>,
        outbound: &OutboundMessage,
        result: std::result::Result<Option<String>, String>,
    ) -> Result<Message> {
        let conversation_id = match conversation_id {
            Some(id) => id.to_string(),
            None => {
                self.get_or_create_conversation(account_id, &outbound.phone_number)
                    .await?
                    .id
            }
        };

        let (status, provider_message_id, error_message) = match result {
            Ok(pid) => (MessageStatus::Sent, pid, None),
            Err(detail) => (MessageStatus::Failed, None, Some(detail)),
        };

        let message = Message {
            id: Uuid::new_v4().to_string(),
            account_id: account_id.to_string(),
            conversation_id: Some(conversation_id.clone()),
            direction: Direction::Outgoing,
            phone_number: outbound.phone_number.clone(),
            message_type: outbound.message_type.clone(),
            content: outbound.content.clone(),
            media_ref: None,
            provider_message_id,
            status,
            error_message,
            timestamp: Utc::now(),
        };

        self.insert_message(&message).await?;
        self.refresh_conversation(&conversation_id).await?;
        Ok(message)
    }

    // ── Status reconciliation ───────────────────────────────────

    /// Apply a delivery-status callback against a previously recorded message.
    ///
    /// Unknown provider ids and unmapped status strings are no-ops returning
    /// `None`. A recognized status overwrites the stored one unconditionally;
    /// out-of-order redelivery can move a status backward (known limitation).
    pub async fn reconcile_status(
        &self,
        account_id: &str,
        update: &StatusUpdate,
    ) -> Result<Option<Message>> {
        let Some(mut message) = self
            .find_message_by_provider_id(account_id, &update.provider_message_id)
            .await?
        else {
            warn!(
                provider_message_id = %update.provider_message_id,
                "Status update for unknown message, dropping"
            );
            return Ok(None);
        };

        let Some(status) = MessageStatus::from_provider(&update.status) else {
            debug!(status = %update.status, "Unmapped provider status, ignoring");
            return Ok(None);
        };

        message.status = status;
        if status == MessageStatus::Failed {
            if let Some(detail) = &update.error_message {
                message.error_message = Some(detail.clone());
            }
        }

        sqlx::query("UPDATE messages SET status = ?2, error_message = ?3 WHERE id = ?1")
            .bind(&message.id)
            .bind(message.status.to_string())
            .bind(&message.error_message)
            .execute(&self.pool)
            .await?;

        if let Some(cid) = &message.conversation_id {
            self.refresh_conversation(cid).await?;
        }
        Ok(Some(message))
    }

    // ── Queries ─────────────────────────────────────────────────

    /// Get a message by ID.
    pub async fn get_message(&self, id: &str) -> Result<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// Look up the unique message for (account, provider message id).
    pub async fn find_message_by_provider_id(
        &self,
        account_id: &str,
        provider_message_id: &str,
    ) -> Result<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE account_id = ?1 AND provider_message_id = ?2"
        ))
        .bind(account_id)
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_message).transpose()
    }

    /// Messages of a conversation, oldest first (chat display order).
    pub async fn list_messages(
        &self,
        conversation_id: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<Message>> {
        let rows = sqlx::query(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages
             WHERE conversation_id = ?1
             ORDER BY timestamp ASC, id ASC
             LIMIT ?2 OFFSET ?3"
        ))
        .bind(conversation_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }

    /// Total number of stored messages.
    pub async fn message_count(&self) -> Result<u64> {
        let n: i64 = sqlx::query("SELECT COUNT(*) AS n FROM messages")
            .fetch_one(&self.pool)
            .await?
            .try_get("n")?;
        Ok(n as u64)
    }

    /// Insert a message row. Returns false when the provider-id uniqueness
    /// constraint swallowed the insert (concurrent duplicate).
    async fn insert_message(&self, message: &Message) -> Result<bool> {
        let res = sqlx::query(
            "INSERT INTO messages
             (id, account_id, conversation_id, direction, phone_number, message_type,
              content, media_ref, provider_message_id, status, error_message, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT DO NOTHING",
        )
        .bind(&message.id)
        .bind(&message.account_id)
        .bind(&message.conversation_id)
        .bind(message.direction.to_string())
        .bind(&message.phone_number)
        .bind(&message.message_type)
        .bind(&message.content)
        .bind(&message.media_ref)
        .bind(&message.provider_message_id)
        .bind(message.status.to_string())
        .bind(&message.error_message)
        .bind(format_ts(message.timestamp))
        .execute(&self.pool)
        .await?;

        Ok(res.rows_affected() > 0)
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message> {
    let direction: String = row.try_get("direction")?;
    let status: String = row.try_get("status")?;
    let ts: String = row.try_get("timestamp")?;
    Ok(Message {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        conversation_id: row.try_get("conversation_id")?,
        direction: Direction::parse(&direction),
        phone_number: row.try_get("phone_number")?,
        message_type: row.try_get("message_type")?,
        content: row.try_get("content")?,
        media_ref: row.try_get("media_ref")?,
        provider_message_id: row.try_get("provider_message_id")?,
        status: MessageStatus::parse(&status),
        error_message: row.try_get("error_message")?,
        timestamp: parse_ts(&ts),
    })
}
