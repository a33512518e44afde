//! Webhook collaborator
//!
//! Posts each escalation action as JSON to a configured URL:
//!
//! ```json
//! {"action": "regulatory_filing", "payload": { ...CaseFile... }}
//! ```
//!
//! A response body of `{"receipt": "..."}` becomes the stage receipt;
//! otherwise the HTTP status is used.

use super::collaborators::{
    CaseFile, CollectiveActionService, MediaContactService, NotificationService,
    RegulatoryFilingService,
};
use crate::error::{MonitorError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct WebhookRequest<'a, T: Serialize> {
    action: &'a str,
    payload: &'a T,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Notification<'a> {
    user_ids: &'a [String],
    message: &'a str,
}

#[derive(Deserialize)]
struct WebhookReceipt {
    receipt: Option<String>,
}

/// HTTP webhook implementing every outbound escalation action
pub struct WebhookCollaborator {
    client: reqwest::Client,
    url: String,
}

impl WebhookCollaborator {
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn post<T: Serialize + Sync>(&self, action: &str, payload: &T) -> Result<String> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookRequest { action, payload })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MonitorError::EscalationStage {
                stage: action.to_string(),
                reason: format!("webhook {} answered HTTP {}", self.url, status),
            });
        }

        let body = response.text().await?;
        let receipt = serde_json::from_str::<WebhookReceipt>(&body)
            .ok()
            .and_then(|r| r.receipt);
        Ok(receipt.unwrap_or_else(|| format!("HTTP {}", status.as_u16())))
    }
}

#[async_trait]
impl NotificationService for WebhookCollaborator {
    async fn notify(&self, user_ids: &[String], message: &str) -> Result<()> {
        self.post("notification", &Notification { user_ids, message })
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl RegulatoryFilingService for WebhookCollaborator {
    async fn file(&self, complaint: &CaseFile) -> Result<String> {
        self.post("regulatory_filing", complaint).await
    }
}

#[async_trait]
impl MediaContactService for WebhookCollaborator {
    async fn trigger(&self, campaign: &CaseFile) -> Result<()> {
        self.post("media_campaign", campaign).await.map(|_| ())
    }
}

#[async_trait]
impl CollectiveActionService for WebhookCollaborator {
    async fn prepare(&self, case: &CaseFile) -> Result<String> {
        self.post("collective_action", case).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_shape() {
        let ids = vec!["u1".to_string()];
        let request = WebhookRequest {
            action: "notification",
            payload: &Notification {
                user_ids: &ids,
                message: "hello",
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["action"], "notification");
        assert_eq!(json["payload"]["userIds"][0], "u1");
        assert_eq!(json["payload"]["message"], "hello");
    }

    #[tokio::test]
    async fn test_unreachable_webhook_is_error() {
        let webhook = WebhookCollaborator::new("http://127.0.0.1:1/hook");
        let result = webhook.notify(&["u1".to_string()], "hello").await;
        assert!(result.is_err());
    }
}
