//! Courier Store - canonical data model and persistence
//!
//! This crate owns the conversation/message state engine behind the WhatsApp
//! gateway: accounts, conversation threads, messages, and the synced template
//! cache, persisted in SQLite via `sqlx`.
//!
//! Uniqueness and idempotency contracts (one conversation per account/phone
//! pair, at most one message per provider message id, fetch-on-conflict
//! instead of check-then-insert) live at the storage layer so concurrent
//! webhook deliveries stay safe without application-level locking.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod store;
pub mod types;

pub use error::{Error, Result};
pub use store::Store;
pub use types::{
    Account, AccountState, Contact, Conversation, Direction, InboundMessage, Message,
    MessageStatus, OutboundMessage, StatusUpdate, Template,
};
