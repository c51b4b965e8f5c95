use super::*;
use crate::client::{SendReceipt, TemplateComponent};
use async_trait::async_trait;
use chrono::Utc;
use courier_store::MessageStatus;

// ── Provider fakes ──────────────────────────────────────────────

/// Accepts every send with a fixed provider message id.
struct AcceptingProvider {
    message_id: &'static str,
}

#[async_trait]
impl ProviderApi for AcceptingProvider {
    async fn send(&self, _account: &Account, _body: &Value) -> Result<SendReceipt> {
        Ok(SendReceipt {
            provider_message_id: Some(self.message_id.to_string()),
        })
    }

    async fn check_connection(&self, _account: &Account) -> Result<String> {
        Ok("+1 555-0100".to_string())
    }

    async fn fetch_templates(
        &self,
        _account: &Account,
        _waba_id: &str,
    ) -> Result<Vec<ProviderTemplate>> {
        Ok(Vec::new())
    }
}

/// Fails every provider call, as a timeout would.
struct UnreachableProvider;

#[async_trait]
impl ProviderApi for UnreachableProvider {
    async fn send(&self, _account: &Account, _body: &Value) -> Result<SendReceipt> {
        Err(Error::Provider("send failed: connection timed out".into()))
    }

    async fn check_connection(&self, _account: &Account) -> Result<String> {
        Err(Error::Provider("connection check failed: timeout".into()))
    }

    async fn fetch_templates(
        &self,
        _account: &Account,
        _waba_id: &str,
    ) -> Result<Vec<ProviderTemplate>> {
        Err(Error::Provider("template fetch failed: timeout".into()))
    }
}

/// Serves a fixed template list.
struct TemplateProvider(Vec<ProviderTemplate>);

#[async_trait]
impl ProviderApi for TemplateProvider {
    async fn send(&self, _account: &Account, _body: &Value) -> Result<SendReceipt> {
        Ok(SendReceipt {
            provider_message_id: None,
        })
    }

    async fn check_connection(&self, _account: &Account) -> Result<String> {
        Ok("+1 555-0100".to_string())
    }

    async fn fetch_templates(
        &self,
        _account: &Account,
        _waba_id: &str,
    ) -> Result<Vec<ProviderTemplate>> {
        Ok(self.0.clone())
    }
}

// ── Helpers ─────────────────────────────────────────────────────

async fn engine_with(provider: Arc<dyn ProviderApi>) -> (Engine, Account) {
    let store = Store::in_memory().await.unwrap();
    let account = Account {
        id: Uuid::new_v4().to_string(),
        name: "Test".into(),
        phone_number_id: "pnid-1".into(),
        access_token: "token".into(),
        verify_token: "verify".into(),
        waba_id: Some("waba-1".into()),
        state: AccountState::Disconnected,
        active: true,
        created_at: Utc::now(),
    };
    store.insert_account(&account).await.unwrap();
    (Engine::new(store, provider, EventBus::default()), account)
}

fn inbound_payload(provider_id: &str, body: &str) -> Value {
    json!({
        "entry": [{ "changes": [{ "field": "messages", "value": {
            "metadata": { "phone_number_id": "pnid-1" },
            "contacts": [{ "wa_id": "33612345678", "profile": { "name": "Alice" } }],
            "messages": [{ "from": "33612345678", "id": provider_id, "type": "text",
                           "text": { "body": body } }]
        }}]}]
    })
}

fn status_payload(provider_id: &str, status: &str) -> Value {
    json!({
        "entry": [{ "changes": [{ "field": "messages", "value": {
            "metadata": { "phone_number_id": "pnid-1" },
            "statuses": [{ "id": provider_id, "status": status, "recipient_id": "336" }]
        }}]}]
    })
}

// ── Webhook ingestion ───────────────────────────────────────────

#[tokio::test]
async fn test_inbound_webhook_records_and_publishes() {
    let (engine, account) = engine_with(Arc::new(AcceptingProvider { message_id: "x" })).await;
    let mut rx = engine.bus().subscribe();

    let summary = engine
        .handle_webhook(&inbound_payload("wamid.in", "hello"))
        .await
        .unwrap();
    assert_eq!(summary.recorded, 1);
    assert_eq!(summary.skipped, 0);

    let event = rx.recv().await.unwrap();
    assert_eq!(event.account_id(), account.id);
    let wire = serde_json::to_value(&event).unwrap();
    assert_eq!(wire["type"], "new_message");
    assert_eq!(wire["message"]["content"], "hello");

    assert_eq!(engine.store().conversation_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_redelivered_webhook_is_idempotent() {
    let (engine, _) = engine_with(Arc::new(AcceptingProvider { message_id: "x" })).await;

    let payload = inbound_payload("wamid.in", "hello");
    let first = engine.handle_webhook(&payload).await.unwrap();
    let second = engine.handle_webhook(&payload).await.unwrap();

    assert_eq!(first.recorded, 1);
    assert_eq!(second.recorded, 0);
    assert_eq!(second.skipped, 1);
    assert_eq!(engine.store().message_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_account_change_is_skipped() {
    let (engine, _) = engine_with(Arc::new(AcceptingProvider { message_id: "x" })).await;

    let payload = json!({
        "entry": [{ "changes": [{ "field": "messages", "value": {
            "metadata": { "phone_number_id": "someone-elses" },
            "messages": [{ "from": "336", "id": "m1", "type": "text",
                           "text": { "body": "hi" } }]
        }}]}]
    });

    let summary = engine.handle_webhook(&payload).await.unwrap();
    assert_eq!(summary.recorded, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(engine.store().message_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_status_for_unknown_message_is_skipped() {
    let (engine, _) = engine_with(Arc::new(AcceptingProvider { message_id: "x" })).await;

    let summary = engine
        .handle_webhook(&status_payload("wamid.ghost", "delivered"))
        .await
        .unwrap();
    assert_eq!(summary.reconciled, 0);
    assert_eq!(summary.skipped, 1);
}

// ── Send path ───────────────────────────────────────────────────

#[tokio::test]
async fn test_send_then_status_round_trip() {
    let (engine, account) =
        engine_with(Arc::new(AcceptingProvider { message_id: "wamid.out" })).await;

    let sent = engine
        .send_text(&account, "+33 6 12 34 56 78", "hello", None)
        .await
        .unwrap();
    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(sent.phone_number, "33612345678");
    assert_eq!(sent.provider_message_id.as_deref(), Some("wamid.out"));

    let mut rx = engine.bus().subscribe();
    let summary = engine
        .handle_webhook(&status_payload("wamid.out", "delivered"))
        .await
        .unwrap();
    assert_eq!(summary.reconciled, 1);

    let event = rx.recv().await.unwrap();
    let wire = serde_json::to_value(&event).unwrap();
    assert_eq!(wire["type"], "status_update");
    assert_eq!(wire["status"], "delivered");

    let stored = engine.store().get_message(&sent.id).await.unwrap().unwrap();
    assert_eq!(stored.status, MessageStatus::Delivered);
    assert_eq!(engine.store().message_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_failed_send_is_recorded_not_dropped() {
    let (engine, account) = engine_with(Arc::new(UnreachableProvider)).await;

    let message = engine
        .send_text(&account, "33612345678", "hello", None)
        .await
        .unwrap();

    assert_eq!(message.status, MessageStatus::Failed);
    assert!(message
        .error_message
        .as_deref()
        .is_some_and(|e| !e.is_empty()));
    assert!(message.provider_message_id.is_none());
    assert_eq!(engine.store().message_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_send_template_records_description() {
    let (engine, account) =
        engine_with(Arc::new(AcceptingProvider { message_id: "wamid.t" })).await;

    let message = engine
        .send_template(
            &account,
            "33612345678",
            "order_update",
            "en",
            Some(json!([{ "type": "body",
                          "parameters": [{ "type": "text", "text": "42" }] }])),
            None,
        )
        .await
        .unwrap();

    assert_eq!(message.message_type, "template");
    assert_eq!(message.content, "Template: order_update");
    assert_eq!(message.status, MessageStatus::Sent);
}

// ── Account operations ──────────────────────────────────────────

#[tokio::test]
async fn test_check_connection_updates_state() {
    let (engine, account) = engine_with(Arc::new(AcceptingProvider { message_id: "x" })).await;

    let display = engine.check_connection(&account).await.unwrap();
    assert_eq!(display, "+1 555-0100");
    let stored = engine.store().get_account(&account.id).await.unwrap().unwrap();
    assert_eq!(stored.state, AccountState::Connected);
}

#[tokio::test]
async fn test_failed_connection_check_disconnects() {
    let (engine, account) = engine_with(Arc::new(UnreachableProvider)).await;
    engine
        .store()
        .set_account_state(&account.id, AccountState::Connected)
        .await
        .unwrap();

    assert!(engine.check_connection(&account).await.is_err());
    let stored = engine.store().get_account(&account.id).await.unwrap().unwrap();
    assert_eq!(stored.state, AccountState::Disconnected);
}

#[tokio::test]
async fn test_sync_templates_requires_waba_id() {
    let (engine, mut account) = engine_with(Arc::new(UnreachableProvider)).await;
    account.waba_id = None;

    match engine.sync_templates(&account).await {
        Err(Error::Config(_)) => {}
        other => panic!("expected Config error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_sync_templates_upserts_cache() {
    let definitions = vec![ProviderTemplate {
        name: "order_update".into(),
        language: "en_US".into(),
        category: "UTILITY".into(),
        status: "APPROVED".into(),
        components: vec![
            TemplateComponent {
                component_type: "HEADER".into(),
                format: Some("TEXT".into()),
                text: Some("Order news".into()),
                buttons: Vec::new(),
            },
            TemplateComponent {
                component_type: "BODY".into(),
                format: None,
                text: Some("Your order {{1}} shipped".into()),
                buttons: Vec::new(),
            },
            TemplateComponent {
                component_type: "BUTTONS".into(),
                format: None,
                text: None,
                buttons: vec![json!({ "type": "QUICK_REPLY", "text": "Track" })],
            },
        ],
    }];
    let (engine, account) = engine_with(Arc::new(TemplateProvider(definitions))).await;

    let count = engine.sync_templates(&account).await.unwrap();
    assert_eq!(count, 1);

    // Re-sync updates in place instead of duplicating
    engine.sync_templates(&account).await.unwrap();
    let templates = engine.store().list_templates(&account.id).await.unwrap();
    assert_eq!(templates.len(), 1);

    let template = &templates[0];
    assert_eq!(template.display_name, "Order Update");
    assert_eq!(template.status, "approved");
    assert_eq!(template.body_text, "Your order {{1}} shipped");
    assert_eq!(template.header_text.as_deref(), Some("Order news"));
    assert!(template.has_buttons);
}
