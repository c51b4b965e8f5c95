//! Account registry: resolve inbound identifiers to configured accounts.

use super::{format_ts, parse_ts, Store};
use crate::error::{Error, Result};
use crate::types::{Account, AccountState};
use sqlx::Row;

const ACCOUNT_COLUMNS: &str = "id, name, phone_number_id, access_token, verify_token, \
     waba_id, state, active, created_at";

impl Store {
    // ── Accounts ────────────────────────────────────────────────

    /// Register an account.
    ///
    /// Fails with [`Error::Conflict`] when the phone-number-id or verify
    /// token collides with another active account.
    pub async fn insert_account(&self, account: &Account) -> Result<()> {
        let res = sqlx::query(
            "INSERT INTO accounts
             (id, name, phone_number_id, access_token, verify_token, waba_id,
              state, active, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        )
        .bind(&account.id)
        .bind(&account.name)
        .bind(&account.phone_number_id)
        .bind(&account.access_token)
        .bind(&account.verify_token)
        .bind(&account.waba_id)
        .bind(account.state.to_string())
        .bind(account.active)
        .bind(format_ts(account.created_at))
        .execute(&self.pool)
        .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if is_unique_violation(&e) => Err(Error::Conflict(format!(
                "phone_number_id or verify_token already registered: {}",
                account.phone_number_id
            ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Exact match on the webhook verify token, active accounts only.
    ///
    /// `None` is a normal outcome: reject the handshake.
    pub async fn find_account_by_verify_token(&self, token: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE verify_token = ?1 AND active = 1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Exact match on the provider phone-number-id, active accounts only.
    ///
    /// `None` is a normal outcome: ignore the payload.
    pub async fn find_account_by_phone_number_id(&self, id: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts
             WHERE phone_number_id = ?1 AND active = 1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// Get an account by ID (active or not).
    pub async fn get_account(&self, id: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_account).transpose()
    }

    /// All active accounts, for operator tooling.
    pub async fn list_active_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE active = 1 ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_account).collect()
    }

    /// Update connectivity state after an explicit connection check.
    pub async fn set_account_state(&self, id: &str, state: AccountState) -> Result<()> {
        sqlx::query("UPDATE accounts SET state = ?2 WHERE id = ?1")
            .bind(id)
            .bind(state.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft-delete an account. Messages keep referencing it.
    pub async fn deactivate_account(&self, id: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET active = 0 WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .is_some_and(|d| d.is_unique_violation())
}

fn row_to_account(row: &sqlx::sqlite::SqliteRow) -> Result<Account> {
    let state: String = row.try_get("state")?;
    let created: String = row.try_get("created_at")?;
    Ok(Account {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        phone_number_id: row.try_get("phone_number_id")?,
        access_token: row.try_get("access_token")?,
        verify_token: row.try_get("verify_token")?,
        waba_id: row.try_get("waba_id")?,
        state: AccountState::parse(&state),
        active: row.try_get("active")?,
        created_at: parse_ts(&created),
    })
}
