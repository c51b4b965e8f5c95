//! HTTP API: webhook endpoints and health.

pub mod health;
pub mod webhooks;
