//! Core data types for the conversation/message state engine.
//!
//! The model mirrors the WhatsApp Cloud API integration: **accounts** (one
//! configured business number each) own **conversations** (one per external
//! phone number) which group **messages**. Templates are a synced cache of
//! provider-approved message formats.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A configured WhatsApp Business endpoint (one phone number).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Unique account ID (UUID)
    pub id: String,
    /// Display name
    pub name: String,
    /// Provider-assigned phone number ID (unique among active accounts)
    pub phone_number_id: String,
    /// Bearer credential for the Cloud API
    pub access_token: String,
    /// Shared secret for the webhook handshake (unique among active accounts)
    pub verify_token: String,
    /// WhatsApp Business Account ID, required for template operations
    pub waba_id: Option<String>,
    /// Connectivity state, changed only by an explicit connection check
    pub state: AccountState,
    /// Soft-delete flag; inactive accounts are invisible to lookups
    pub active: bool,
    /// When this account was registered
    pub created_at: DateTime<Utc>,
}

/// Connectivity state of an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    /// Never checked, or last connection check failed
    Disconnected,
    /// Last connection check succeeded
    Connected,
}

impl std::fmt::Display for AccountState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

impl AccountState {
    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "connected" => Self::Connected,
            _ => Self::Disconnected,
        }
    }
}

/// A thread between one account and one external phone number.
///
/// `last_message_at`, `last_message_preview`, `unread_count` and `contact_id`
/// are derived fields, recomputed by the store whenever a member message is
/// created or changes status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique conversation ID (UUID)
    pub id: String,
    /// Owning account
    pub account_id: String,
    /// External phone number (E.164 digits, no separators)
    pub phone_number: String,
    /// Best-effort link into the contact directory
    pub contact_id: Option<String>,
    /// Timestamp of the newest member message
    pub last_message_at: Option<DateTime<Utc>>,
    /// Preview of the newest member message (truncated)
    pub last_message_preview: String,
    /// Count of incoming messages with status != read
    pub unread_count: u32,
    /// When the thread was created
    pub created_at: DateTime<Utc>,
}

/// A directory contact used for best-effort conversation linking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    /// Unique contact ID (UUID)
    pub id: String,
    /// Contact name
    pub name: String,
    /// Landline / primary phone
    pub phone: Option<String>,
    /// Mobile phone
    pub mobile: Option<String>,
}

/// Direction of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Received from the external party
    Incoming,
    /// Sent by us
    Outgoing,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Incoming => write!(f, "incoming"),
            Self::Outgoing => write!(f, "outgoing"),
        }
    }
}

impl Direction {
    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "incoming" => Self::Incoming,
            _ => Self::Outgoing,
        }
    }
}

/// Delivery status of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    /// Created locally, not yet accepted by the provider
    Pending,
    /// Accepted by the provider
    Sent,
    /// Delivered to the recipient device
    Delivered,
    /// Read by the recipient
    Read,
    /// Rejected or undeliverable
    Failed,
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Sent => write!(f, "sent"),
            Self::Delivered => write!(f, "delivered"),
            Self::Read => write!(f, "read"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl MessageStatus {
    /// Map a provider status string to a canonical status.
    ///
    /// Returns `None` for unrecognized strings; callers treat that as a
    /// no-op, not an error.
    #[must_use]
    pub fn from_provider(s: &str) -> Option<Self> {
        match s {
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "read" => Some(Self::Read),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub(crate) fn parse(s: &str) -> Self {
        match s {
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// A single WhatsApp message, inbound or outbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Unique message ID (UUID)
    pub id: String,
    /// Owning account
    pub account_id: String,
    /// Owning conversation (always set by the store at creation)
    pub conversation_id: Option<String>,
    /// Incoming or outgoing
    pub direction: Direction,
    /// External phone number (digits, no separators)
    pub phone_number: String,
    /// Canonical message type (`text`, `image`, `template`, ...)
    pub message_type: String,
    /// Text body, caption, or derived placeholder
    pub content: String,
    /// Opaque provider media id for media messages (not the binary)
    pub media_ref: Option<String>,
    /// Provider-assigned message id; reconciliation key, unique per account
    pub provider_message_id: Option<String>,
    /// Delivery status
    pub status: MessageStatus,
    /// Failure detail when status is failed
    pub error_message: Option<String>,
    /// Arrival time (inbound) or send time (outbound); provider timestamps
    /// are unreliable and not used
    pub timestamp: DateTime<Utc>,
}

/// A normalized inbound message, produced by the payload normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Provider message id, when the provider supplied one
    pub provider_message_id: Option<String>,
    /// Sender phone number (contact `wa_id`, falling back to `from`)
    pub phone_number: String,
    /// Sender display name from the contact profile, if present
    pub sender_name: Option<String>,
    /// Canonical message type
    pub message_type: String,
    /// Derived content (body, caption, or placeholder)
    pub content: String,
    /// Provider media id, for media messages
    pub media_ref: Option<String>,
}

/// A normalized delivery-status callback, produced by the payload normalizer.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusUpdate {
    /// Provider message id this status refers to
    pub provider_message_id: String,
    /// Raw provider status string (`sent`, `delivered`, `read`, `failed`, ...)
    pub status: String,
    /// First reported error message, if any
    pub error_message: Option<String>,
}

/// An outbound send request, as recorded regardless of outcome.
#[derive(Debug, Clone)]
pub struct OutboundMessage {
    /// Recipient phone number (digits, no separators)
    pub phone_number: String,
    /// Canonical message type (`text` or `template`)
    pub message_type: String,
    /// Text body or template description
    pub content: String,
}

/// Cached metadata mirror of a provider-approved message template.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Unique template ID (UUID)
    pub id: String,
    /// Owning account
    pub account_id: String,
    /// Exact template name as registered with the provider; cache key
    pub template_name: String,
    /// Human-readable name derived from the template name
    pub display_name: String,
    /// Language code (e.g. `en`, `en_US`)
    pub language: String,
    /// Provider category (`marketing`, `utility`, `authentication`)
    pub category: String,
    /// Approval status (`approved`, `pending`, `rejected`)
    pub status: String,
    /// Body text, may contain `{{n}}` placeholders
    pub body_text: String,
    /// Header text, when the template has a text header
    pub header_text: Option<String>,
    /// Footer text, if any
    pub footer_text: Option<String>,
    /// Whether the template declares buttons
    pub has_buttons: bool,
}
