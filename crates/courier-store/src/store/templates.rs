//! Synced template cache, keyed by (account, template name).

use super::Store;
use crate::error::Result;
use crate::types::Template;
use sqlx::Row;

const TEMPLATE_COLUMNS: &str = "id, account_id, template_name, display_name, language, \
     category, status, body_text, header_text, footer_text, has_buttons";

impl Store {
    // ── Templates ───────────────────────────────────────────────

    /// Insert or update a template by its (account, name) cache key.
    pub async fn upsert_template(&self, template: &Template) -> Result<()> {
        sqlx::query(
            "INSERT INTO templates
             (id, account_id, template_name, display_name, language, category,
              status, body_text, header_text, footer_text, has_buttons)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(account_id, template_name) DO UPDATE SET
                display_name = excluded.display_name,
                language     = excluded.language,
                category     = excluded.category,
                status       = excluded.status,
                body_text    = excluded.body_text,
                header_text  = excluded.header_text,
                footer_text  = excluded.footer_text,
                has_buttons  = excluded.has_buttons",
        )
        .bind(&template.id)
        .bind(&template.account_id)
        .bind(&template.template_name)
        .bind(&template.display_name)
        .bind(&template.language)
        .bind(&template.category)
        .bind(&template.status)
        .bind(&template.body_text)
        .bind(&template.header_text)
        .bind(&template.footer_text)
        .bind(template.has_buttons)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Find a cached template by name.
    pub async fn find_template(
        &self,
        account_id: &str,
        template_name: &str,
    ) -> Result<Option<Template>> {
        let row = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates
             WHERE account_id = ?1 AND template_name = ?2"
        ))
        .bind(account_id)
        .bind(template_name)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_template).transpose()
    }

    /// Cached templates for an account.
    pub async fn list_templates(&self, account_id: &str) -> Result<Vec<Template>> {
        let rows = sqlx::query(&format!(
            "SELECT {TEMPLATE_COLUMNS} FROM templates
             WHERE account_id = ?1 ORDER BY template_name"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_template).collect()
    }
}

fn row_to_template(row: &sqlx::sqlite::SqliteRow) -> Result<Template> {
    Ok(Template {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        template_name: row.try_get("template_name")?,
        display_name: row.try_get("display_name")?,
        language: row.try_get("language")?,
        category: row.try_get("category")?,
        status: row.try_get("status")?,
        body_text: row.try_get("body_text")?,
        header_text: row.try_get("header_text")?,
        footer_text: row.try_get("footer_text")?,
        has_buttons: row.try_get("has_buttons")?,
    })
}
