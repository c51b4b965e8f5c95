//! Channel engine: webhook orchestration and the outbound send path.
//!
//! Control flow for one webhook delivery: normalize the payload, resolve
//! each change's account, record inbound messages, reconcile statuses, and
//! publish notifications. Items are processed independently; one bad item
//! never aborts its siblings.

use crate::client::{ProviderApi, ProviderTemplate};
use crate::error::{Error, Result};
use crate::notify::{ChannelEvent, EventBus, MessageEnvelope};
use crate::util::{mask_for_logging, normalize_phone, title_case};
use crate::webhook::extract_changes;
use courier_store::{Account, AccountState, Message, OutboundMessage, Store, Template};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Per-delivery processing outcome; items are counted, never short-circuited.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WebhookSummary {
    /// Inbound messages recorded
    pub recorded: usize,
    /// Status updates applied to known messages
    pub reconciled: usize,
    /// Items skipped (unknown account, duplicate, unknown target, failure)
    pub skipped: usize,
}

/// The channel engine.
pub struct Engine {
    store: Store,
    provider: Arc<dyn ProviderApi>,
    bus: EventBus,
}

impl Engine {
    /// Wire the engine to its collaborators.
    #[must_use]
    pub fn new(store: Store, provider: Arc<dyn ProviderApi>, bus: EventBus) -> Self {
        Self {
            store,
            provider,
            bus,
        }
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// The notification bus.
    #[must_use]
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    // ── Webhook ingestion ───────────────────────────────────────

    /// Process one webhook delivery.
    ///
    /// Returns `Ok` with a summary even when individual items fail; those
    /// are logged and counted as skipped. Redelivered duplicates count as
    /// skipped too.
    pub async fn handle_webhook(&self, payload: &Value) -> Result<WebhookSummary> {
        let mut summary = WebhookSummary::default();

        for batch in extract_changes(payload) {
            let item_count = batch.inbound.len() + batch.statuses.len();
            let account = match self
                .store
                .find_account_by_phone_number_id(&batch.phone_number_id)
                .await
            {
                Ok(Some(account)) => account,
                Ok(None) => {
                    warn!(
                        phone_number_id = %batch.phone_number_id,
                        "No account for phone_number_id, skipping change"
                    );
                    summary.skipped += item_count;
                    continue;
                }
                Err(e) => {
                    error!(error = %e, "Account lookup failed, skipping change");
                    summary.skipped += item_count;
                    continue;
                }
            };

            for inbound in &batch.inbound {
                match self.store.record_inbound(&account.id, inbound).await {
                    Ok(Some(message)) => {
                        info!(
                            from = %message.phone_number,
                            text = %mask_for_logging(&message.content),
                            "Recorded inbound WhatsApp message"
                        );
                        self.bus.publish(ChannelEvent::NewMessage {
                            account_id: account.id.clone(),
                            conversation_id: message.conversation_id.clone(),
                            message: MessageEnvelope::from(&message),
                        });
                        summary.recorded += 1;
                    }
                    Ok(None) => summary.skipped += 1,
                    Err(e) => {
                        error!(error = %e, "Failed to record inbound message");
                        summary.skipped += 1;
                    }
                }
            }

            for status in &batch.statuses {
                match self.store.reconcile_status(&account.id, status).await {
                    Ok(Some(message)) => {
                        self.bus.publish(ChannelEvent::StatusUpdate {
                            account_id: account.id.clone(),
                            message_id: message.id.clone(),
                            provider_message_id: message.provider_message_id.clone(),
                            status: message.status.to_string(),
                            error_message: message.error_message.clone(),
                        });
                        summary.reconciled += 1;
                    }
                    Ok(None) => summary.skipped += 1,
                    Err(e) => {
                        error!(error = %e, "Failed to reconcile status update");
                        summary.skipped += 1;
                    }
                }
            }
        }

        Ok(summary)
    }

    // ── Outbound sends ──────────────────────────────────────────

    /// Send a plain text message.
    ///
    /// Always records exactly one message: `sent` with the provider id on
    /// success, `failed` with the error detail otherwise. No error escapes
    /// for a provider failure; callers inspect the returned message.
    pub async fn send_text(
        &self,
        account: &Account,
        to: &str,
        body: &str,
        conversation_id: Option<&str>,
    ) -> Result<Message> {
        let to = normalize_phone(to);
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "text",
            "text": {
                "preview_url": false,
                "body": body,
            }
        });
        let outbound = OutboundMessage {
            phone_number: to,
            message_type: "text".to_string(),
            content: body.to_string(),
        };
        self.dispatch(account, conversation_id, outbound, &payload)
            .await
    }

    /// Send a pre-approved template message.
    pub async fn send_template(
        &self,
        account: &Account,
        to: &str,
        template_name: &str,
        language_code: &str,
        components: Option<Value>,
        conversation_id: Option<&str>,
    ) -> Result<Message> {
        let to = normalize_phone(to);
        let mut template = json!({
            "name": template_name,
            "language": { "code": language_code },
        });
        if let Some(components) = components {
            template["components"] = components;
        }
        let payload = json!({
            "messaging_product": "whatsapp",
            "recipient_type": "individual",
            "to": to,
            "type": "template",
            "template": template,
        });
        let outbound = OutboundMessage {
            phone_number: to,
            message_type: "template".to_string(),
            content: format!("Template: {template_name}"),
        };
        self.dispatch(account, conversation_id, outbound, &payload)
            .await
    }

    async fn dispatch(
        &self,
        account: &Account,
        conversation_id: Option<&str>,
        outbound: OutboundMessage,
        payload: &Value,
    ) -> Result<Message> {
        let result = match self.provider.send(account, payload).await {
            Ok(receipt) => Ok(receipt.provider_message_id),
            Err(e) => {
                error!(error = %e, to = %outbound.phone_number, "WhatsApp send failed");
                Err(e.to_string())
            }
        };

        let message = self
            .store
            .record_outbound(&account.id, conversation_id, &outbound, result)
            .await?;
        Ok(message)
    }

    // ── Account operations ──────────────────────────────────────

    /// Test provider connectivity and update the account state accordingly.
    /// Returns the display phone number on success.
    pub async fn check_connection(&self, account: &Account) -> Result<String> {
        match self.provider.check_connection(account).await {
            Ok(display_phone_number) => {
                self.store
                    .set_account_state(&account.id, AccountState::Connected)
                    .await?;
                info!(account = %account.name, %display_phone_number, "WhatsApp connection OK");
                Ok(display_phone_number)
            }
            Err(e) => {
                self.store
                    .set_account_state(&account.id, AccountState::Disconnected)
                    .await?;
                Err(e)
            }
        }
    }

    /// Sync the account's templates from the provider into the local cache.
    /// Returns the number of templates upserted.
    pub async fn sync_templates(&self, account: &Account) -> Result<usize> {
        let waba_id = account
            .waba_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| Error::Config("WABA ID is required to sync templates".to_string()))?;

        let definitions = self.provider.fetch_templates(account, waba_id).await?;
        let count = definitions.len();
        for definition in &definitions {
            let template = template_from_definition(&account.id, definition);
            self.store.upsert_template(&template).await?;
        }
        info!(account = %account.name, count, "Synced WhatsApp templates");
        Ok(count)
    }
}

fn template_from_definition(account_id: &str, def: &ProviderTemplate) -> Template {
    let component = |kind: &str| {
        def.components
            .iter()
            .find(|c| c.component_type.eq_ignore_ascii_case(kind))
    };

    let body_text = component("BODY")
        .and_then(|c| c.text.clone())
        .unwrap_or_default();
    let header_text = component("HEADER")
        .filter(|c| {
            c.format
                .as_deref()
                .is_none_or(|f| f.eq_ignore_ascii_case("TEXT"))
        })
        .and_then(|c| c.text.clone());
    let footer_text = component("FOOTER").and_then(|c| c.text.clone());
    let has_buttons = component("BUTTONS").is_some_and(|c| !c.buttons.is_empty());

    Template {
        id: Uuid::new_v4().to_string(),
        account_id: account_id.to_string(),
        template_name: def.name.clone(),
        display_name: title_case(&def.name),
        language: def.language.clone(),
        category: def.category.to_lowercase(),
        status: def.status.to_lowercase(),
        body_text,
        header_text,
        footer_text,
        has_buttons,
    }
}

#[cfg(test)]
mod tests;
