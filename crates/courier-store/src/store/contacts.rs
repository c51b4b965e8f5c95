//! Minimal contact directory backing the conversation-linking heuristic.

use super::Store;
use crate::error::Result;
use crate::types::Contact;
use sqlx::Row;

impl Store {
    // ── Contacts ────────────────────────────────────────────────

    /// Add a directory contact.
    pub async fn insert_contact(&self, contact: &Contact) -> Result<()> {
        sqlx::query(
            "INSERT INTO contacts (id, name, phone, mobile)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&contact.id)
        .bind(&contact.name)
        .bind(&contact.phone)
        .bind(&contact.mobile)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Get a contact by ID.
    pub async fn get_contact(&self, id: &str) -> Result<Option<Contact>> {
        let row = sqlx::query("SELECT id, name, phone, mobile FROM contacts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_contact).transpose()
    }

    /// Best-effort phone match: full match on phone/mobile, or a suffix match
    /// on the last 10 digits (tolerates country-code prefix mismatches).
    /// First match wins.
    pub(crate) async fn find_contact_for_phone(&self, phone: &str) -> Result<Option<String>> {
        if phone.is_empty() {
            return Ok(None);
        }
        let suffix: String = {
            let digits: Vec<char> = phone.chars().filter(char::is_ascii_digit).collect();
            let start = digits.len().saturating_sub(10);
            digits[start..].iter().collect()
        };
        let suffix_pattern = format!("%{suffix}");

        let row = sqlx::query(
            "SELECT id FROM contacts
             WHERE phone = ?1 OR mobile = ?1
                OR phone LIKE ?2 OR mobile LIKE ?2
             ORDER BY rowid LIMIT 1",
        )
        .bind(phone)
        .bind(&suffix_pattern)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.get("id")))
    }
}

fn row_to_contact(row: &sqlx::sqlite::SqliteRow) -> Result<Contact> {
    Ok(Contact {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
        mobile: row.try_get("mobile")?,
    })
}
