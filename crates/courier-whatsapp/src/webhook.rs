//! Webhook payload normalizer.
//!
//! The Cloud API delivers webhook bodies either enveloped
//! (`entry[].changes[]`) or as a flattened single change (`{field, value}`).
//! Both shapes normalize to the same list of [`ChangeEvents`]. Decoding is
//! defensive throughout: absent nested fields fall back to placeholders, and
//! a malformed item is skipped with a warning instead of failing the batch.

use crate::util::title_case;
use courier_store::{InboundMessage, StatusUpdate};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

/// One resolved `messages` change: everything attributed to a single
/// phone-number-id, in payload order.
#[derive(Debug, Default, Clone)]
pub struct ChangeEvents {
    /// Provider phone-number-id this change belongs to
    pub phone_number_id: String,
    /// Normalized inbound messages, in payload order
    pub inbound: Vec<InboundMessage>,
    /// Normalized status updates, in payload order
    pub statuses: Vec<StatusUpdate>,
}

/// Raw inbound message item, as delivered by the provider.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookMessage {
    /// Sender phone number
    #[serde(default)]
    pub from: String,
    /// Provider message id
    #[serde(default)]
    pub id: Option<String>,
    /// Declared message type
    #[serde(rename = "type", default = "default_message_type")]
    pub message_type: String,
    #[serde(default)]
    text: Option<TextBody>,
    #[serde(default)]
    image: Option<MediaBody>,
    #[serde(default)]
    video: Option<MediaBody>,
    #[serde(default)]
    audio: Option<MediaBody>,
    #[serde(default)]
    sticker: Option<MediaBody>,
    #[serde(default)]
    document: Option<DocumentBody>,
    #[serde(default)]
    location: Option<LocationBody>,
    #[serde(default)]
    reaction: Option<ReactionBody>,
}

fn default_message_type() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TextBody {
    #[serde(default)]
    body: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct MediaBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    caption: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DocumentBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    filename: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct LocationBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    latitude: Option<serde_json::Number>,
    #[serde(default)]
    longitude: Option<serde_json::Number>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ReactionBody {
    #[serde(default)]
    emoji: Option<String>,
}

/// Sender info item (`contacts[]`), joined to messages by `wa_id`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookContact {
    /// Sender phone number
    #[serde(default)]
    pub wa_id: Option<String>,
    /// Sender profile
    #[serde(default)]
    pub profile: Option<WebhookProfile>,
}

/// Sender profile info.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookProfile {
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
}

/// Delivery-receipt item (`statuses[]`).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookStatus {
    /// Provider message id the status refers to
    #[serde(default)]
    pub id: Option<String>,
    /// New status string
    #[serde(default)]
    pub status: Option<String>,
    /// Error details, populated on failures
    #[serde(default)]
    pub errors: Vec<StatusError>,
}

/// One entry of a status `errors[]` list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusError {
    /// Human-readable error description
    #[serde(default)]
    pub message: Option<String>,
}

/// Message content as a tagged union over the provider `type` field.
///
/// Unknown types decode to [`InboundContent::Other`] rather than failing,
/// so new provider message types degrade to a placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundContent {
    /// Plain text
    Text {
        /// Message body
        body: String,
    },
    /// Image, optionally captioned
    Image {
        /// Caption, if any
        caption: Option<String>,
        /// Provider media id
        media_id: Option<String>,
    },
    /// Video, optionally captioned
    Video {
        /// Caption, if any
        caption: Option<String>,
        /// Provider media id
        media_id: Option<String>,
    },
    /// Voice note or audio file
    Audio {
        /// Provider media id
        media_id: Option<String>,
    },
    /// Sticker
    Sticker {
        /// Provider media id
        media_id: Option<String>,
    },
    /// Document attachment
    Document {
        /// Original filename
        filename: Option<String>,
        /// Provider media id
        media_id: Option<String>,
    },
    /// Shared location
    Location {
        /// Place name, if any
        name: Option<String>,
        /// Latitude as sent by the provider
        latitude: Option<serde_json::Number>,
        /// Longitude as sent by the provider
        longitude: Option<serde_json::Number>,
    },
    /// Emoji reaction to an earlier message
    Reaction {
        /// The emoji
        emoji: Option<String>,
    },
    /// Any type without a dedicated variant (contacts, interactive, ...)
    Other {
        /// Raw provider type name
        kind: String,
    },
}

impl InboundContent {
    /// Decode the typed content of a raw webhook message.
    #[must_use]
    pub fn from_message(msg: &WebhookMessage) -> Self {
        match msg.message_type.as_str() {
            "text" => Self::Text {
                body: msg.text.clone().unwrap_or_default().body,
            },
            "image" => {
                let body = msg.image.clone().unwrap_or_default();
                Self::Image {
                    caption: body.caption,
                    media_id: body.id,
                }
            }
            "video" => {
                let body = msg.video.clone().unwrap_or_default();
                Self::Video {
                    caption: body.caption,
                    media_id: body.id,
                }
            }
            "audio" => Self::Audio {
                media_id: msg.audio.clone().unwrap_or_default().id,
            },
            "sticker" => Self::Sticker {
                media_id: msg.sticker.clone().unwrap_or_default().id,
            },
            "document" => {
                let body = msg.document.clone().unwrap_or_default();
                Self::Document {
                    filename: body.filename,
                    media_id: body.id,
                }
            }
            "location" => {
                let body = msg.location.clone().unwrap_or_default();
                Self::Location {
                    name: body.name,
                    latitude: body.latitude,
                    longitude: body.longitude,
                }
            }
            "reaction" => Self::Reaction {
                emoji: msg.reaction.clone().unwrap_or_default().emoji,
            },
            other => Self::Other {
                kind: other.to_string(),
            },
        }
    }

    /// Canonical message type string for storage.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Video { .. } => "video",
            Self::Audio { .. } => "audio",
            Self::Sticker { .. } => "sticker",
            Self::Document { .. } => "document",
            Self::Location { .. } => "location",
            Self::Reaction { .. } => "reaction",
            Self::Other { kind } => kind,
        }
    }

    /// Derive the stored content: body text, caption, or a placeholder.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Text { body } => body.clone(),
            Self::Image { caption, .. } => caption.clone().unwrap_or_else(|| "[Image]".into()),
            Self::Video { caption, .. } => caption.clone().unwrap_or_else(|| "[Video]".into()),
            Self::Audio { .. } => "[Audio Message]".into(),
            Self::Sticker { .. } => "[Sticker]".into(),
            Self::Document { filename, .. } => {
                filename.clone().unwrap_or_else(|| "[Document]".into())
            }
            Self::Location {
                name,
                latitude,
                longitude,
            } => format!(
                "📍 {} ({}, {})",
                name.clone().unwrap_or_default(),
                latitude.as_ref().map(ToString::to_string).unwrap_or_default(),
                longitude.as_ref().map(ToString::to_string).unwrap_or_default(),
            ),
            Self::Reaction { emoji } => {
                format!("Reaction: {}", emoji.clone().unwrap_or_default())
            }
            Self::Other { kind } => format!("[{} message]", title_case(kind)),
        }
    }

    /// Opaque provider media id, for media content.
    #[must_use]
    pub fn media_ref(&self) -> Option<String> {
        match self {
            Self::Image { media_id, .. }
            | Self::Video { media_id, .. }
            | Self::Audio { media_id }
            | Self::Sticker { media_id }
            | Self::Document { media_id, .. } => media_id.clone(),
            _ => None,
        }
    }
}

/// Normalize one webhook delivery into zero or more change batches.
///
/// Accepts a JSON value of arbitrary shape. Changes without a
/// `metadata.phone_number_id`, or whose field is not `"messages"`, are
/// skipped; account resolution is the caller's job.
#[must_use]
pub fn extract_changes(payload: &Value) -> Vec<ChangeEvents> {
    let entries: Vec<Value> = match payload.get("entry").and_then(Value::as_array) {
        Some(list) if !list.is_empty() => list.clone(),
        _ if payload.get("field").is_some() && payload.get("value").is_some() => {
            // Flattened single-change payload: synthesize the envelope
            vec![serde_json::json!({ "changes": [payload] })]
        }
        _ => Vec::new(),
    };

    let mut batches = Vec::new();
    for entry in &entries {
        let changes = entry
            .get("changes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        for change in &changes {
            if change.get("field").and_then(Value::as_str) != Some("messages") {
                continue;
            }
            let value = change.get("value").cloned().unwrap_or_default();
            let Some(phone_number_id) = value
                .pointer("/metadata/phone_number_id")
                .and_then(Value::as_str)
            else {
                warn!("Change without metadata.phone_number_id, skipping");
                continue;
            };

            batches.push(normalize_change(phone_number_id, &value));
        }
    }
    batches
}

fn normalize_change(phone_number_id: &str, value: &Value) -> ChangeEvents {
    let contacts: Vec<WebhookContact> = decode_items(value.get("contacts"));

    let mut events = ChangeEvents {
        phone_number_id: phone_number_id.to_string(),
        ..Default::default()
    };

    for raw in value
        .get("messages")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        let msg: WebhookMessage = match serde_json::from_value(raw.clone()) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Undecodable inbound message item, skipping");
                continue;
            }
        };

        let contact = contacts
            .iter()
            .find(|c| c.wa_id.as_deref() == Some(msg.from.as_str()));
        let phone_number = contact
            .and_then(|c| c.wa_id.clone())
            .unwrap_or_else(|| msg.from.clone());
        let sender_name = contact
            .and_then(|c| c.profile.as_ref())
            .and_then(|p| p.name.clone());

        let content = InboundContent::from_message(&msg);
        events.inbound.push(InboundMessage {
            provider_message_id: msg.id.clone(),
            phone_number,
            sender_name,
            message_type: content.kind().to_string(),
            content: content.render(),
            media_ref: content.media_ref(),
        });
    }

    for status in decode_items::<WebhookStatus>(value.get("statuses")) {
        let (Some(id), Some(new_status)) = (status.id.clone(), status.status.clone()) else {
            continue;
        };
        let error_message = status.errors.first().map(|e| {
            e.message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string())
        });
        events.statuses.push(StatusUpdate {
            provider_message_id: id,
            status: new_status,
            error_message,
        });
    }

    events
}

/// Decode a JSON array item by item, skipping undecodable entries.
fn decode_items<T: serde::de::DeserializeOwned>(value: Option<&Value>) -> Vec<T> {
    value
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|item| match serde_json::from_value(item.clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                warn!(error = %e, "Undecodable webhook item, skipping");
                None
            }
        })
        .collect()
}
