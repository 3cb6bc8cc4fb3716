//! Push senders: the Expo push API and a disabled sender for offline setups

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{DomainError, PushMessage, PushReport, PushSender};

const EXPO_TOKEN_PREFIX: &str = "ExponentPushToken[";

/// Posts messages to the Expo push endpoint
pub struct ExpoPushSender {
    client: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct ExpoMessage<'a> {
    to: &'a str,
    sound: &'static str,
    title: &'a str,
    body: &'a str,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    data: &'a serde_json::Value,
}

#[derive(Deserialize)]
struct ExpoResponse {
    #[serde(default)]
    data: Vec<ExpoTicket>,
}

#[derive(Deserialize)]
struct ExpoTicket {
    status: String,
    message: Option<String>,
    details: Option<ExpoTicketDetails>,
}

#[derive(Deserialize)]
struct ExpoTicketDetails {
    error: Option<String>,
}

pub fn is_expo_token(token: &str) -> bool {
    token.starts_with(EXPO_TOKEN_PREFIX) && token.ends_with(']')
}

impl ExpoPushSender {
    pub fn new(url: impl Into<String>) -> Result<Self, DomainError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| DomainError::Internal(format!("push client: {}", e)))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl PushSender for ExpoPushSender {
    async fn send(&self, message: &PushMessage) -> Result<PushReport, DomainError> {
        let tokens: Vec<&str> = message
            .tokens
            .iter()
            .map(String::as_str)
            .filter(|token| {
                let valid = is_expo_token(token);
                if !valid {
                    tracing::warn!("Skipping malformed push token: {}", token);
                }
                valid
            })
            .collect();

        if tokens.is_empty() {
            return Ok(PushReport::default());
        }

        let payload: Vec<ExpoMessage<'_>> = tokens
            .iter()
            .map(|token| ExpoMessage {
                to: token,
                sound: "default",
                title: &message.title,
                body: &message.body,
                data: &message.data,
            })
            .collect();

        tracing::debug!("Sending {} push message(s) to {}", payload.len(), self.url);

        let response = self
            .client
            .post(&self.url)
            .header("Accept", "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| DomainError::External(e.to_string()))?;

        if !response.status().is_success() {
            return Err(DomainError::External(format!(
                "push provider answered {}",
                response.status()
            )));
        }

        let body: ExpoResponse = response
            .json()
            .await
            .map_err(|e| DomainError::External(format!("unreadable push response: {}", e)))?;

        let mut report = PushReport::default();
        for (ticket, token) in body.data.iter().zip(tokens.iter()) {
            if ticket.status == "ok" {
                report.accepted += 1;
                continue;
            }

            tracing::warn!(
                "Push to {} failed: {}",
                token,
                ticket.message.as_deref().unwrap_or("no message")
            );
            let error_code = ticket.details.as_ref().and_then(|d| d.error.as_deref());
            if error_code == Some("DeviceNotRegistered") {
                report.invalid_tokens.push(token.to_string());
            }
        }

        Ok(report)
    }
}

/// Used when `PUSH_ENABLED=false`: notifications are still recorded, never pushed
pub struct DisabledPushSender;

#[async_trait]
impl PushSender for DisabledPushSender {
    async fn send(&self, message: &PushMessage) -> Result<PushReport, DomainError> {
        tracing::debug!("Push disabled, dropping '{}'", message.title);
        Ok(PushReport::default())
    }
}
