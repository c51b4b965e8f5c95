//! Best-effort notification bus for live listeners.
//!
//! Uses `tokio::broadcast` so multiple subscribers can receive the same
//! events. Slow subscribers miss events (lagged) rather than blocking the
//! publisher, and publishing never fails the originating webhook or send.

use courier_store::Message;
use serde::Serialize;
use tokio::sync::broadcast;

/// Event published to live listeners.
///
/// Every event carries the account id; subscribers filter on it to get the
/// per-account topic behavior.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChannelEvent {
    /// A new message was recorded (inbound via webhook)
    NewMessage {
        /// Owning account
        account_id: String,
        /// Conversation the message belongs to
        conversation_id: Option<String>,
        /// The recorded message
        message: MessageEnvelope,
    },
    /// A previously recorded message changed status
    StatusUpdate {
        /// Owning account
        account_id: String,
        /// Internal message id
        message_id: String,
        /// Provider message id
        provider_message_id: Option<String>,
        /// New status
        status: String,
        /// Failure detail, when failed
        error_message: Option<String>,
    },
}

impl ChannelEvent {
    /// The account this event belongs to.
    #[must_use]
    pub fn account_id(&self) -> &str {
        match self {
            Self::NewMessage { account_id, .. } | Self::StatusUpdate { account_id, .. } => {
                account_id
            }
        }
    }
}

/// Wire representation of a message inside a notification.
#[derive(Debug, Clone, Serialize)]
pub struct MessageEnvelope {
    /// Internal message id
    pub id: String,
    /// `incoming` or `outgoing`
    pub direction: String,
    /// Stored content
    pub content: String,
    /// Canonical message type
    pub message_type: String,
    /// Message timestamp, RFC 3339
    pub timestamp: String,
    /// Delivery status
    pub status: String,
    /// External phone number
    pub phone_number: String,
}

impl From<&Message> for MessageEnvelope {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id.clone(),
            direction: message.direction.to_string(),
            content: message.content.clone(),
            message_type: message.message_type.clone(),
            timestamp: message.timestamp.to_rfc3339(),
            status: message.status.to_string(),
            phone_number: message.phone_number.clone(),
        }
    }
}

/// Broadcast-based notification bus.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChannelEvent>,
}

impl EventBus {
    /// Create a bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to all events; filter on [`ChannelEvent::account_id`] for a
    /// per-account view.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of subscribers reached; with no
    /// subscribers the event is silently dropped.
    pub fn publish(&self, event: ChannelEvent) -> usize {
        // send() errors only when there are no receivers, which is fine
        self.sender.send(event).unwrap_or(0)
    }

    /// Current number of active subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
