//! Remote dialogue service client.
//!
//! The service receives a user identifier and message text and answers with
//! reply text plus optional tone annotations. All failure kinds (transport,
//! non-success status, undecodable body) surface as [`ChatError::Service`];
//! the session controller does not distinguish between them.

use crate::config::ServiceConfig;
use crate::error::{ChatError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Outbound chat request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub user_id: String,
    pub message: String,
}

/// Reply body returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub text: String,
    #[serde(default)]
    pub emotion: Option<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
    #[serde(default)]
    pub is_crisis: Option<bool>,
}

/// Dialogue service contract. Implementations must be cancel-safe to drop.
#[async_trait]
pub trait DialogueService: Send + Sync {
    /// Send one message and wait for the reply.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply>;
}

/// HTTP JSON client for the dialogue service.
pub struct HttpDialogueService {
    endpoint: String,
    client: reqwest::Client,
}

impl HttpDialogueService {
    /// Build a client for the configured endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is empty or the HTTP client cannot be built.
    pub fn new(config: &ServiceConfig) -> Result<Self> {
        if config.endpoint.trim().is_empty() {
            return Err(ChatError::Config("service endpoint is empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| ChatError::Service(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            endpoint: config.endpoint.clone(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl DialogueService for HttpDialogueService {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        debug!(endpoint = %self.endpoint, "sending chat request");
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ChatError::Service(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Service(format!(
                "service returned {status}: {body}"
            )));
        }

        response
            .json::<ChatReply>()
            .await
            .map_err(|e| ChatError::Service(format!("invalid reply body: {e}")))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn request_serializes_camel_case() {
        let request = ChatRequest {
            user_id: "user1".to_owned(),
            message: "hello".to_owned(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json, serde_json::json!({"userId": "user1", "message": "hello"}));
    }

    #[test]
    fn reply_optional_fields_default_to_none() {
        let reply: ChatReply = serde_json::from_str(r#"{"text":"hi"}"#).unwrap();
        assert_eq!(reply.text, "hi");
        assert!(reply.emotion.is_none());
        assert!(reply.confidence.is_none());
        assert!(reply.is_crisis.is_none());
    }

    #[test]
    fn reply_reads_crisis_flag() {
        let reply: ChatReply =
            serde_json::from_str(r#"{"text":"help","emotion":"crisis","isCrisis":true}"#).unwrap();
        assert_eq!(reply.is_crisis, Some(true));
        assert_eq!(reply.emotion.as_deref(), Some("crisis"));
    }

    #[test]
    fn empty_endpoint_is_rejected() {
        let config = ServiceConfig {
            endpoint: "  ".to_owned(),
            ..ServiceConfig::default()
        };
        assert!(matches!(
            HttpDialogueService::new(&config),
            Err(ChatError::Config(_))
        ));
    }
}
