use super::Store;
use crate::error::Result;

impl Store {
    // ── Migrations ──────────────────────────────────────────────

    pub(crate) async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS accounts (
                id              TEXT PRIMARY KEY,
                name            TEXT NOT NULL,
                phone_number_id TEXT NOT NULL,
                access_token    TEXT NOT NULL,
                verify_token    TEXT NOT NULL,
                waba_id         TEXT,
                state           TEXT NOT NULL DEFAULT 'disconnected',
                active          INTEGER NOT NULL DEFAULT 1,
                created_at      TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Uniqueness holds among *active* accounts only; soft-deleted rows
        // may keep their old identifiers.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_phone_number_id
             ON accounts(phone_number_id) WHERE active = 1",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_verify_token
             ON accounts(verify_token) WHERE active = 1",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS contacts (
                id     TEXT PRIMARY KEY,
                name   TEXT NOT NULL,
                phone  TEXT,
                mobile TEXT
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS conversations (
                id                   TEXT PRIMARY KEY,
                account_id           TEXT NOT NULL REFERENCES accounts(id),
                phone_number         TEXT NOT NULL,
                contact_id           TEXT,
                last_message_at      TEXT,
                last_message_preview TEXT NOT NULL DEFAULT '',
                unread_count         INTEGER NOT NULL DEFAULT 0,
                created_at           TEXT NOT NULL,
                UNIQUE(account_id, phone_number)
            )",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS messages (
                id                  TEXT PRIMARY KEY,
                account_id          TEXT NOT NULL REFERENCES accounts(id),
                conversation_id     TEXT REFERENCES conversations(id),
                direction           TEXT NOT NULL,
                phone_number        TEXT NOT NULL,
                message_type        TEXT NOT NULL DEFAULT 'text',
                content             TEXT NOT NULL DEFAULT '',
                media_ref           TEXT,
                provider_message_id TEXT,
                status              TEXT NOT NULL DEFAULT 'pending',
                error_message       TEXT,
                timestamp           TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        // Reconciliation key: at most one message per provider id per account.
        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS idx_messages_provider_id
             ON messages(account_id, provider_message_id)
             WHERE provider_message_id IS NOT NULL",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_conversation
             ON messages(conversation_id, timestamp)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS templates (
                id            TEXT PRIMARY KEY,
                account_id    TEXT NOT NULL REFERENCES accounts(id),
                template_name TEXT NOT NULL,
                display_name  TEXT NOT NULL,
                language      TEXT NOT NULL DEFAULT 'en',
                category      TEXT NOT NULL DEFAULT 'utility',
                status        TEXT NOT NULL DEFAULT 'pending',
                body_text     TEXT NOT NULL DEFAULT '',
                header_text   TEXT,
                footer_text   TEXT,
                has_buttons   INTEGER NOT NULL DEFAULT 0,
                UNIQUE(account_id, template_name)
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
