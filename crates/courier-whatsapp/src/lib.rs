//! Courier WhatsApp - provider-facing channel logic
//!
//! This crate turns WhatsApp Cloud API webhook deliveries into canonical
//! store operations and drives the outbound send path:
//! - `webhook`: tolerant payload normalizer (enveloped or flattened shapes)
//! - `client`: Graph API client behind the [`ProviderApi`] trait
//! - `engine`: webhook orchestration, sends, template sync, connectivity
//! - `notify`: best-effort broadcast of new-message / status-change events

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod engine;
pub mod error;
pub mod notify;
pub mod util;
pub mod webhook;

pub use client::{CloudClient, ProviderApi, ProviderTemplate, SendReceipt, TemplateComponent};
pub use engine::{Engine, WebhookSummary};
pub use error::{Error, Result};
pub use notify::{ChannelEvent, EventBus, MessageEnvelope};
pub use webhook::{extract_changes, ChangeEvents, InboundContent};
