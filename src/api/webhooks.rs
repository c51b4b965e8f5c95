//! WhatsApp webhook endpoints.
//!
//! The provider calls these anonymously; authenticity relies on the
//! verify-token handshake only (known limitation of the Cloud API model).

use crate::server::AppConfig;
use axum::extract::{Extension, Query};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use courier_store::Store;
use courier_whatsapp::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Webhook verification query
#[derive(Debug, Deserialize)]
pub struct WebhookVerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

/// Verify webhook (GET)
///
/// Meta sends this during webhook setup: echo the challenge when the verify
/// token belongs to an active account.
async fn verify_webhook(
    Query(query): Query<WebhookVerifyQuery>,
    Extension(store): Extension<Store>,
) -> Response {
    let mode = query.mode.as_deref().unwrap_or("");
    let token = query.verify_token.as_deref().unwrap_or("");
    let challenge = query.challenge.clone().unwrap_or_default();

    if mode != "subscribe" || token.is_empty() {
        return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
    }

    match store.find_account_by_verify_token(token).await {
        Ok(Some(account)) => {
            info!(account = %account.name, "Webhook verified");
            challenge.into_response()
        }
        Ok(None) => {
            warn!("Webhook verification failed: token not found");
            (StatusCode::FORBIDDEN, "Forbidden").into_response()
        }
        Err(e) => {
            error!(error = %e, "Webhook verification lookup failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response()
        }
    }
}

/// Receive webhook (POST)
///
/// Incoming messages and delivery-status updates. Per-item failures are
/// swallowed inside the engine; only a top-level parse or processing
/// failure yields a 500.
async fn receive_webhook(Extension(engine): Extension<Arc<Engine>>, body: String) -> Response {
    let payload: Value = match serde_json::from_str(&body) {
        Ok(payload) => payload,
        Err(e) => {
            error!(error = %e, "Unparseable webhook body");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response();
        }
    };

    match engine.handle_webhook(&payload).await {
        Ok(summary) => {
            info!(
                recorded = summary.recorded,
                reconciled = summary.reconciled,
                skipped = summary.skipped,
                "Processed WhatsApp webhook"
            );
            (StatusCode::OK, "OK").into_response()
        }
        Err(e) => {
            error!(error = %e, "Webhook processing failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response()
        }
    }
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    accounts: Vec<AccountStatus>,
}

#[derive(Debug, Serialize)]
struct AccountStatus {
    id: String,
    name: String,
    state: String,
    phone_number_id: String,
}

/// Webhook configuration status, for operator tooling. Gated by the
/// configured operator token; an unset token locks the endpoint.
async fn webhook_status(
    headers: HeaderMap,
    Extension(store): Extension<Store>,
    Extension(config): Extension<Arc<AppConfig>>,
) -> Response {
    if !is_authorized(&headers, config.operator_token.as_deref()) {
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    match store.list_active_accounts().await {
        Ok(accounts) => Json(StatusResponse {
            status: "ok",
            accounts: accounts
                .into_iter()
                .map(|a| AccountStatus {
                    id: a.id,
                    name: a.name,
                    state: a.state.to_string(),
                    phone_number_id: a.phone_number_id,
                })
                .collect(),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to list accounts");
            (StatusCode::INTERNAL_SERVER_ERROR, "Error").into_response()
        }
    }
}

fn is_authorized(headers: &HeaderMap, operator_token: Option<&str>) -> bool {
    let Some(expected) = operator_token.filter(|t| !t.is_empty()) else {
        return false;
    };
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .is_some_and(|token| token == expected)
}

/// Create webhook routes
pub fn routes() -> Router {
    Router::new()
        .route("/whatsapp/webhook", get(verify_webhook).post(receive_webhook))
        .route("/whatsapp/webhook/status", get(webhook_status))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_verify_query_deserialize() {
        let query = "hub.mode=subscribe&hub.verify_token=test&hub.challenge=abc123";
        let parsed: WebhookVerifyQuery = serde_urlencoded::from_str(query).unwrap();
        assert_eq!(parsed.mode.as_deref(), Some("subscribe"));
        assert_eq!(parsed.verify_token.as_deref(), Some("test"));
        assert_eq!(parsed.challenge.as_deref(), Some("abc123"));
    }

    #[test]
    fn test_authorization_check() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer sekrit"),
        );

        assert!(is_authorized(&headers, Some("sekrit")));
        assert!(!is_authorized(&headers, Some("other")));
        // Unset or empty operator token locks the endpoint
        assert!(!is_authorized(&headers, None));
        assert!(!is_authorized(&headers, Some("")));
        assert!(!is_authorized(&HeaderMap::new(), Some("sekrit")));
    }
}
