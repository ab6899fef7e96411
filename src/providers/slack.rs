//! Slack Web API client.
//!
//! Wraps a bot access token over the handful of methods the gateway exposes
//! as tools. Slack answers HTTP 200 with `{ok: false, error}` on logical
//! failures, so every response goes through the same envelope check.

use super::ProviderApiError;
use serde::{Deserialize, Serialize};

const SLACK_API_BASE: &str = "https://slack.com/api";

/// Parameters for `chat.postMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendMessageParams {
    pub channel: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
}

/// Parameters for `chat.update`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateMessageParams {
    pub channel: String,
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<serde_json::Value>,
}

/// Parameters for `chat.delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteMessageParams {
    pub channel: String,
    pub ts: String,
}

/// Parameters for `chat.scheduleMessage`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleMessageParams {
    pub channel: String,
    /// Unix timestamp for delivery
    pub post_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocks: Option<serde_json::Value>,
}

/// Parameters for `conversations.list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListChannelsParams {
    /// Comma-separated channel types, e.g. "public_channel,private_channel"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub types: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

pub struct SlackClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
}

impl SlackClient {
    pub fn new(http: reqwest::Client, access_token: String) -> Self {
        Self {
            http,
            base_url: SLACK_API_BASE.to_string(),
            access_token,
        }
    }

    #[cfg(test)]
    fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub async fn send_message(
        &self,
        params: &SendMessageParams,
    ) -> Result<serde_json::Value, ProviderApiError> {
        self.call("chat.postMessage", params).await
    }

    pub async fn update_message(
        &self,
        params: &UpdateMessageParams,
    ) -> Result<serde_json::Value, ProviderApiError> {
        self.call("chat.update", params).await
    }

    pub async fn delete_message(
        &self,
        params: &DeleteMessageParams,
    ) -> Result<serde_json::Value, ProviderApiError> {
        self.call("chat.delete", params).await
    }

    pub async fn schedule_message(
        &self,
        params: &ScheduleMessageParams,
    ) -> Result<serde_json::Value, ProviderApiError> {
        self.call("chat.scheduleMessage", params).await
    }

    pub async fn list_channels(
        &self,
        params: &ListChannelsParams,
    ) -> Result<serde_json::Value, ProviderApiError> {
        self.call("conversations.list", params).await
    }

    /// POST a Slack Web API method and unwrap the `{ok, error}` envelope.
    async fn call<P: Serialize>(
        &self,
        method: &str,
        params: &P,
    ) -> Result<serde_json::Value, ProviderApiError> {
        let url = format!("{}/{}", self.base_url, method);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.access_token)
            .json(params)
            .send()
            .await
            .map_err(|e| ProviderApiError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderApiError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ProviderApiError::Network(e.to_string()))?;

        if json.get("ok").and_then(|v| v.as_bool()) == Some(false) {
            let error = json
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("Unknown error")
                .to_string();
            tracing::warn!(method = %method, error = %error, "Slack API error");
            return Err(ProviderApiError::Api(error));
        }

        Ok(json)
    }
}
