//! Graph API client for the WhatsApp Cloud API.
//!
//! All provider access goes through the [`ProviderApi`] trait so the engine
//! can be exercised against fakes; [`CloudClient`] is the real
//! implementation. Calls are blocking call-and-wait with a fixed 30 second
//! timeout and no automatic retry.

use crate::error::{Error, Result};
use async_trait::async_trait;
use courier_store::Account;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

/// Graph API base URL (includes the pinned API version).
pub const API_BASE: &str = "https://graph.facebook.com/v22.0";

/// Fixed provider call timeout, in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Provider acknowledgement of an accepted send.
#[derive(Debug, Clone)]
pub struct SendReceipt {
    /// Provider-assigned message id, used later for status reconciliation
    pub provider_message_id: Option<String>,
}

/// One template definition as returned by the provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderTemplate {
    /// Exact template name
    #[serde(default)]
    pub name: String,
    /// Language code
    #[serde(default = "default_language")]
    pub language: String,
    /// Category (`MARKETING`, `UTILITY`, `AUTHENTICATION`)
    #[serde(default = "default_category")]
    pub category: String,
    /// Approval status (`APPROVED`, `PENDING`, `REJECTED`)
    #[serde(default = "default_status")]
    pub status: String,
    /// Structured components (HEADER/BODY/FOOTER/BUTTONS)
    #[serde(default)]
    pub components: Vec<TemplateComponent>,
}

fn default_language() -> String {
    "en".to_string()
}

fn default_category() -> String {
    "UTILITY".to_string()
}

fn default_status() -> String {
    "PENDING".to_string()
}

/// One component of a provider template.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateComponent {
    /// Component type (`HEADER`, `BODY`, `FOOTER`, `BUTTONS`)
    #[serde(rename = "type", default)]
    pub component_type: String,
    /// Header format (`TEXT`, `IMAGE`, ...), headers only
    #[serde(default)]
    pub format: Option<String>,
    /// Component text, where applicable
    #[serde(default)]
    pub text: Option<String>,
    /// Button definitions, BUTTONS components only
    #[serde(default)]
    pub buttons: Vec<Value>,
}

/// Abstract provider capability used by the engine.
#[async_trait]
pub trait ProviderApi: Send + Sync {
    /// POST a message envelope to `{base}/{phone_number_id}/messages`.
    async fn send(&self, account: &Account, body: &Value) -> Result<SendReceipt>;

    /// Connectivity check against `{base}/{phone_number_id}`.
    /// Returns the display phone number reported by the provider.
    async fn check_connection(&self, account: &Account) -> Result<String>;

    /// Fetch template definitions from `{base}/{waba_id}/message_templates`.
    async fn fetch_templates(
        &self,
        account: &Account,
        waba_id: &str,
    ) -> Result<Vec<ProviderTemplate>>;
}

/// Real Cloud API client.
pub struct CloudClient {
    http: reqwest::Client,
    base: String,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    messages: Vec<MessageInfo>,
    #[serde(default)]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct MessageInfo {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Debug, Deserialize)]
struct PhoneNumberInfo {
    #[serde(default)]
    display_phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TemplateListResponse {
    #[serde(default)]
    data: Vec<ProviderTemplate>,
}

impl CloudClient {
    /// Create a client against the default Graph API base.
    #[must_use]
    pub fn new() -> Self {
        Self::with_base(API_BASE)
    }

    /// Create a client against a custom base URL (tests, proxies).
    #[must_use]
    pub fn with_base(base: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            http,
            base: base.into(),
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Provider(format!(
                "provider returned {status}: {body}"
            )));
        }
        resp.json()
            .await
            .map_err(|e| Error::Provider(format!("invalid provider response: {e}")))
    }
}

impl Default for CloudClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderApi for CloudClient {
    async fn send(&self, account: &Account, body: &Value) -> Result<SendReceipt> {
        let url = format!("{}/{}/messages", self.base, account.phone_number_id);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&account.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("send failed: {e}")))?;

        let parsed: ApiResponse = Self::read_json(resp).await?;
        if let Some(error) = parsed.error {
            return Err(Error::Provider(format!(
                "API error {}: {}",
                error.code, error.message
            )));
        }

        let provider_message_id = parsed.messages.first().map(|m| m.id.clone());
        debug!(provider_message_id = ?provider_message_id, "Provider accepted message");
        Ok(SendReceipt {
            provider_message_id,
        })
    }

    async fn check_connection(&self, account: &Account) -> Result<String> {
        let url = format!("{}/{}", self.base, account.phone_number_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&account.access_token)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("connection check failed: {e}")))?;

        let info: PhoneNumberInfo = Self::read_json(resp).await?;
        Ok(info
            .display_phone_number
            .unwrap_or_else(|| "Unknown".to_string()))
    }

    async fn fetch_templates(
        &self,
        account: &Account,
        waba_id: &str,
    ) -> Result<Vec<ProviderTemplate>> {
        let url = format!("{}/{}/message_templates", self.base, waba_id);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&account.access_token)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("template fetch failed: {e}")))?;

        let parsed: TemplateListResponse = Self::read_json(resp).await?;
        Ok(parsed.data)
    }
}
