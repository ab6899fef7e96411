//! Gmail and Google Calendar REST client.
//!
//! Covers the tool surface the gateway exposes: listing/reading/sending
//! Gmail messages and listing/creating Calendar events. Outgoing mail is
//! assembled as a minimal RFC 822 message and base64url-encoded the way the
//! Gmail API expects.

use super::ProviderApiError;
use base64::{engine::general_purpose::URL_SAFE, Engine};
use serde::{Deserialize, Serialize};

const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1";
const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

fn default_max_results() -> u32 {
    10
}

/// Parameters for listing Gmail messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListMessagesParams {
    /// Gmail search query, e.g. "is:unread from:ops@example.com"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

/// Parameters for fetching a single Gmail message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetMessageParams {
    pub message_id: String,
    /// "full", "metadata", "minimal", or "raw"
    #[serde(default = "default_message_format")]
    pub format: String,
}

fn default_message_format() -> String {
    "full".to_string()
}

/// Parameters for sending a Gmail message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendEmailParams {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bcc: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

/// Parameters for listing Calendar events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListEventsParams {
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    /// RFC 3339 lower bound on event start time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_min: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_max: Option<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_calendar_id() -> String {
    "primary".to_string()
}

/// Parameters for creating a Calendar event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEventParams {
    #[serde(default = "default_calendar_id")]
    pub calendar_id: String,
    pub summary: String,
    /// RFC 3339 start time
    pub start_time: String,
    /// RFC 3339 end time
    pub end_time: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendees: Option<Vec<String>>,
}

pub struct GoogleClient {
    http: reqwest::Client,
    gmail_base: String,
    calendar_base: String,
    access_token: String,
}

impl GoogleClient {
    pub fn new(http: reqwest::Client, access_token: String) -> Self {
        Self {
            http,
            gmail_base: GMAIL_API_BASE.to_string(),
            calendar_base: CALENDAR_API_BASE.to_string(),
            access_token,
        }
    }

    #[cfg(test)]
    fn with_base_urls(mut self, gmail: String, calendar: String) -> Self {
        self.gmail_base = gmail;
        self.calendar_base = calendar;
        self
    }

    pub async fn list_messages(
        &self,
        params: &ListMessagesParams,
    ) -> Result<serde_json::Value, ProviderApiError> {
        let mut query = vec![("maxResults", params.max_results.to_string())];
        if let Some(q) = &params.query {
            query.push(("q", q.clone()));
        }
        self.get(
            &format!("{}/users/me/messages", self.gmail_base),
            &query,
        )
        .await
    }

    pub async fn get_message(
        &self,
        params: &GetMessageParams,
    ) -> Result<serde_json::Value, ProviderApiError> {
        self.get(
            &format!(
                "{}/users/me/messages/{}",
                self.gmail_base,
                urlencoding::encode(&params.message_id)
            ),
            &[("format", params.format.clone())],
        )
        .await
    }

    pub async fn send_email(
        &self,
        params: &SendEmailParams,
    ) -> Result<serde_json::Value, ProviderApiError> {
        let raw = URL_SAFE.encode(build_rfc822_message(params));

        let mut body = serde_json::json!({ "raw": raw });
        if let Some(thread_id) = &params.thread_id {
            body["threadId"] = serde_json::json!(thread_id);
        }

        self.post(
            &format!("{}/users/me/messages/send", self.gmail_base),
            &body,
        )
        .await
    }

    pub async fn list_events(
        &self,
        params: &ListEventsParams,
    ) -> Result<serde_json::Value, ProviderApiError> {
        let mut query = vec![
            ("maxResults", params.max_results.to_string()),
            ("singleEvents", "true".to_string()),
            ("orderBy", "startTime".to_string()),
        ];
        if let Some(time_min) = &params.time_min {
            query.push(("timeMin", time_min.clone()));
        }
        if let Some(time_max) = &params.time_max {
            query.push(("timeMax", time_max.clone()));
        }

        self.get(
            &format!(
                "{}/calendars/{}/events",
                self.calendar_base,
                urlencoding::encode(&params.calendar_id)
            ),
            &query,
        )
        .await
    }

    pub async fn create_event(
        &self,
        params: &CreateEventParams,
    ) -> Result<serde_json::Value, ProviderApiError> {
        let attendees: Vec<serde_json::Value> = params
            .attendees
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|email| serde_json::json!({ "email": email }))
            .collect();

        let body = serde_json::json!({
            "summary": params.summary,
            "description": params.description,
            "location": params.location,
            "start": { "dateTime": params.start_time, "timeZone": "UTC" },
            "end": { "dateTime": params.end_time, "timeZone": "UTC" },
            "attendees": attendees,
        });

        self.post(
            &format!(
                "{}/calendars/{}/events",
                self.calendar_base,
                urlencoding::encode(&params.calendar_id)
            ),
            &body,
        )
        .await
    }

    async fn get(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<serde_json::Value, ProviderApiError> {
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .query(query)
            .send()
            .await
            .map_err(|e| ProviderApiError::Network(e.to_string()))?;

        unwrap_response(response).await
    }

    async fn post(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, ProviderApiError> {
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderApiError::Network(e.to_string()))?;

        unwrap_response(response).await
    }
}

async fn unwrap_response(
    response: reqwest::Response,
) -> Result<serde_json::Value, ProviderApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        // Google wraps errors as {"error": {"code", "message", ...}}
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .and_then(|m| m.as_str())
                    .map(|m| m.to_string())
            });
        return match message {
            Some(msg) => Err(ProviderApiError::Api(msg)),
            None => Err(ProviderApiError::Http {
                status: status.as_u16(),
                body,
            }),
        };
    }

    response
        .json()
        .await
        .map_err(|e| ProviderApiError::Network(e.to_string()))
}

/// Minimal RFC 822 message for the Gmail send endpoint.
fn build_rfc822_message(params: &SendEmailParams) -> String {
    let mut message = String::new();
    message.push_str(&format!("To: {}\r\n", params.to));
    if let Some(cc) = &params.cc {
        message.push_str(&format!("Cc: {}\r\n", cc));
    }
    if let Some(bcc) = &params.bcc {
        message.push_str(&format!("Bcc: {}\r\n", bcc));
    }
    message.push_str(&format!("Subject: {}\r\n", params.subject));
    message.push_str("Content-Type: text/plain; charset=\"utf-8\"\r\n");
    message.push_str("\r\n");
    message.push_str(&params.body);
    message
}
