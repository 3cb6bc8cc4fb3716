//! Push delivery capability
//!
//! The borrowing workflow never depends on delivery succeeding: senders
//! report what happened and the caller logs it.

use async_trait::async_trait;
use serde_json::Value;

use super::DomainError;

/// One user-facing push, fanned out to every token of the recipient
#[derive(Debug, Clone)]
pub struct PushMessage {
    pub tokens: Vec<String>,
    pub title: String,
    pub body: String,
    pub data: Value,
}

/// What the provider accepted
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PushReport {
    pub accepted: usize,
    /// Tokens the provider says no longer belong to a device
    pub invalid_tokens: Vec<String>,
}

#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<PushReport, DomainError>;
}
