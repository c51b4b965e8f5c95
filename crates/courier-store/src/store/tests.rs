use super::Store;
use crate::error::Error;
use crate::types::*;
use chrono::Utc;
use uuid::Uuid;

async fn test_store() -> Store {
    Store::in_memory().await.unwrap()
}

fn make_account(tag: &str) -> Account {
    Account {
        id: Uuid::new_v4().to_string(),
        name: format!("Account {tag}"),
        phone_number_id: format!("pnid-{tag}"),
        access_token: "token".into(),
        verify_token: format!("verify-{tag}"),
        waba_id: Some(format!("waba-{tag}")),
        state: AccountState::Disconnected,
        active: true,
        created_at: Utc::now(),
    }
}

fn make_inbound(pid: Option<&str>, phone: &str, content: &str) -> InboundMessage {
    InboundMessage {
        provider_message_id: pid.map(Into::into),
        phone_number: phone.into(),
        sender_name: Some("Alice".into()),
        message_type: "text".into(),
        content: content.into(),
        media_ref: None,
    }
}

fn make_outbound(phone: &str, content: &str) -> OutboundMessage {
    OutboundMessage {
        phone_number: phone.into(),
        message_type: "text".into(),
        content: content.into(),
    }
}

// ── Accounts ────────────────────────────────────────────────────

#[tokio::test]
async fn test_account_lookup_by_token_and_phone_number_id() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let by_token = store
        .find_account_by_verify_token("verify-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_token.id, account.id);

    let by_pnid = store
        .find_account_by_phone_number_id("pnid-a")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_pnid.id, account.id);

    assert!(store
        .find_account_by_verify_token("VERIFY-A")
        .await
        .unwrap()
        .is_none());
    assert!(store
        .find_account_by_phone_number_id("nope")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_duplicate_phone_number_id_rejected() {
    let store = test_store().await;
    store.insert_account(&make_account("a")).await.unwrap();

    let mut dup = make_account("b");
    dup.phone_number_id = "pnid-a".into();
    match store.insert_account(&dup).await {
        Err(Error::Conflict(_)) => {}
        other => panic!("expected Conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn test_deactivated_account_invisible_and_id_reusable() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();
    store.deactivate_account(&account.id).await.unwrap();

    assert!(store
        .find_account_by_phone_number_id("pnid-a")
        .await
        .unwrap()
        .is_none());

    // Uniqueness only binds active accounts
    let mut replacement = make_account("c");
    replacement.phone_number_id = "pnid-a".into();
    store.insert_account(&replacement).await.unwrap();
}

#[tokio::test]
async fn test_account_state_transition() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    store
        .set_account_state(&account.id, AccountState::Connected)
        .await
        .unwrap();
    let got = store.get_account(&account.id).await.unwrap().unwrap();
    assert_eq!(got.state, AccountState::Connected);
}

// ── Conversations ───────────────────────────────────────────────

#[tokio::test]
async fn test_get_or_create_is_idempotent() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let first = store
        .get_or_create_conversation(&account.id, "33612345678")
        .await
        .unwrap();
    let second = store
        .get_or_create_conversation(&account.id, "33612345678")
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(store.conversation_count().await.unwrap(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_get_or_create_yields_one_row() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        let account_id = account.id.clone();
        handles.push(tokio::spawn(async move {
            store
                .get_or_create_conversation(&account_id, "33612345678")
                .await
                .unwrap()
                .id
        }));
    }

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap());
    }
    ids.dedup();
    assert_eq!(ids.len(), 1);
    assert_eq!(store.conversation_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_derived_fields_track_messages() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let long_body = "x".repeat(80);
    store
        .record_inbound(&account.id, &make_inbound(Some("wamid.1"), "336", "hello"))
        .await
        .unwrap();
    store
        .record_inbound(&account.id, &make_inbound(Some("wamid.2"), "336", &long_body))
        .await
        .unwrap();

    let convo = store.get_or_create_conversation(&account.id, "336").await.unwrap();
    assert_eq!(convo.unread_count, 2);
    assert_eq!(convo.last_message_preview.chars().count(), 53); // 50 + "..."
    assert!(convo.last_message_at.is_some());

    store.mark_conversation_read(&convo.id).await.unwrap();
    let convo = store.get_conversation(&convo.id).await.unwrap().unwrap();
    assert_eq!(convo.unread_count, 0);
}

#[tokio::test]
async fn test_contact_link_by_suffix() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    store
        .insert_contact(&Contact {
            id: "c1".into(),
            name: "Alice".into(),
            phone: Some("0612345678".into()),
            mobile: None,
        })
        .await
        .unwrap();

    // Country-code prefixed number still links by last-10-digit suffix
    let convo = store
        .get_or_create_conversation(&account.id, "330612345678")
        .await
        .unwrap();
    assert_eq!(convo.contact_id.as_deref(), Some("c1"));

    let unlinked = store
        .get_or_create_conversation(&account.id, "4915700000000")
        .await
        .unwrap();
    assert!(unlinked.contact_id.is_none());
}

// ── Messages ────────────────────────────────────────────────────

#[tokio::test]
async fn test_record_inbound_creates_delivered_message() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let message = store
        .record_inbound(&account.id, &make_inbound(Some("wamid.1"), "336", "hi"))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(message.direction, Direction::Incoming);
    assert_eq!(message.status, MessageStatus::Delivered);
    assert!(message.conversation_id.is_some());
    assert_eq!(message.provider_message_id.as_deref(), Some("wamid.1"));
}

#[tokio::test]
async fn test_duplicate_inbound_is_dropped() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let inbound = make_inbound(Some("wamid.1"), "336", "hi");
    assert!(store.record_inbound(&account.id, &inbound).await.unwrap().is_some());
    assert!(store.record_inbound(&account.id, &inbound).await.unwrap().is_none());
    assert_eq!(store.message_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_inbound_without_provider_id_always_inserts() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let inbound = make_inbound(None, "336", "hi");
    store.record_inbound(&account.id, &inbound).await.unwrap().unwrap();
    store.record_inbound(&account.id, &inbound).await.unwrap().unwrap();
    assert_eq!(store.message_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_record_outbound_success_and_failure() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let sent = store
        .record_outbound(
            &account.id,
            None,
            &make_outbound("336", "hello"),
            Ok(Some("wamid.out".into())),
        )
        .await
        .unwrap();
    assert_eq!(sent.status, MessageStatus::Sent);
    assert_eq!(sent.provider_message_id.as_deref(), Some("wamid.out"));
    assert!(sent.conversation_id.is_some());

    let failed = store
        .record_outbound(
            &account.id,
            sent.conversation_id.as_deref(),
            &make_outbound("336", "oops"),
            Err("connection timed out".into()),
        )
        .await
        .unwrap();
    assert_eq!(failed.status, MessageStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("connection timed out"));
    assert_eq!(store.message_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_status_round_trip_updates_in_place() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let sent = store
        .record_outbound(
            &account.id,
            None,
            &make_outbound("336", "hello"),
            Ok(Some("wamid.out".into())),
        )
        .await
        .unwrap();

    let updated = store
        .reconcile_status(
            &account.id,
            &StatusUpdate {
                provider_message_id: "wamid.out".into(),
                status: "delivered".into(),
                error_message: None,
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.id, sent.id);
    assert_eq!(updated.status, MessageStatus::Delivered);
    assert_eq!(store.message_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_unknown_status_target_is_noop() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let result = store
        .reconcile_status(
            &account.id,
            &StatusUpdate {
                provider_message_id: "wamid.unknown".into(),
                status: "delivered".into(),
                error_message: None,
            },
        )
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(store.message_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_unmapped_status_string_is_ignored() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let sent = store
        .record_outbound(
            &account.id,
            None,
            &make_outbound("336", "hello"),
            Ok(Some("wamid.out".into())),
        )
        .await
        .unwrap();

    let result = store
        .reconcile_status(
            &account.id,
            &StatusUpdate {
                provider_message_id: "wamid.out".into(),
                status: "warming_up".into(),
                error_message: None,
            },
        )
        .await
        .unwrap();
    assert!(result.is_none());

    let unchanged = store.get_message(&sent.id).await.unwrap().unwrap();
    assert_eq!(unchanged.status, MessageStatus::Sent);
}

#[tokio::test]
async fn test_failed_status_attaches_error_detail() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    store
        .record_outbound(
            &account.id,
            None,
            &make_outbound("336", "hello"),
            Ok(Some("wamid.out".into())),
        )
        .await
        .unwrap();

    let failed = store
        .reconcile_status(
            &account.id,
            &StatusUpdate {
                provider_message_id: "wamid.out".into(),
                status: "failed".into(),
                error_message: Some("Message undeliverable".into()),
            },
        )
        .await
        .unwrap()
        .unwrap();

    assert_eq!(failed.status, MessageStatus::Failed);
    assert_eq!(failed.error_message.as_deref(), Some("Message undeliverable"));
}

#[tokio::test]
async fn test_status_reconciliation_is_scoped_per_account() {
    let store = test_store().await;
    let a = make_account("a");
    let b = make_account("b");
    store.insert_account(&a).await.unwrap();
    store.insert_account(&b).await.unwrap();

    store
        .record_outbound(&a.id, None, &make_outbound("336", "hi"), Ok(Some("wamid.x".into())))
        .await
        .unwrap();

    // Same provider id under a different account is a foreign message
    let result = store
        .reconcile_status(
            &b.id,
            &StatusUpdate {
                provider_message_id: "wamid.x".into(),
                status: "read".into(),
                error_message: None,
            },
        )
        .await
        .unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_list_messages_oldest_first() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    store
        .record_inbound(&account.id, &make_inbound(Some("m1"), "336", "first"))
        .await
        .unwrap();
    store
        .record_inbound(&account.id, &make_inbound(Some("m2"), "336", "second"))
        .await
        .unwrap();

    let convo = store.get_or_create_conversation(&account.id, "336").await.unwrap();
    let messages = store.list_messages(&convo.id, 50, 0).await.unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].content, "first");
    assert_eq!(messages[1].content, "second");
}

// ── Templates ───────────────────────────────────────────────────

#[tokio::test]
async fn test_template_upsert_by_name() {
    let store = test_store().await;
    let account = make_account("a");
    store.insert_account(&account).await.unwrap();

    let mut template = Template {
        id: Uuid::new_v4().to_string(),
        account_id: account.id.clone(),
        template_name: "order_update".into(),
        display_name: "Order Update".into(),
        language: "en".into(),
        category: "utility".into(),
        status: "pending".into(),
        body_text: "Your order {{1}} shipped".into(),
        header_text: None,
        footer_text: None,
        has_buttons: false,
    };
    store.upsert_template(&template).await.unwrap();

    template.id = Uuid::new_v4().to_string();
    template.status = "approved".into();
    store.upsert_template(&template).await.unwrap();

    let templates = store.list_templates(&account.id).await.unwrap();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].status, "approved");

    let found = store
        .find_template(&account.id, "order_update")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.body_text, "Your order {{1}} shipped");
}
