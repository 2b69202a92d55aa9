//! HTTP transport: one POST per user message.

use crate::config::WidgetConfig;
use crate::error::{WidgetError, WidgetResult};
use serde_json::{Map, Value};
use tokio::time::Duration;
use tracing::debug;

/// Response header carrying the thread identity out-of-band
pub const THREAD_ID_HEADER: &str = "x-thread-id";

/// Sends user messages to the configured endpoint
#[derive(Clone)]
pub struct Transport {
    client: reqwest::Client,
    url: String,
    user: Map<String, Value>,
}

impl Transport {
    pub fn new(config: &WidgetConfig) -> WidgetResult<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let client = builder.build().map_err(WidgetError::network)?;

        Ok(Self {
            client,
            url: config.url.clone(),
            user: config.user.clone(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// `{"message", "threadId", ...user}` with the first two taking
    /// precedence over metadata keys of the same name.
    pub fn request_body(&self, message: &str, thread_id: Option<&str>) -> Value {
        let mut body = self.user.clone();
        body.insert("message".to_string(), Value::from(message));
        body.insert(
            "threadId".to_string(),
            thread_id.map_or(Value::Null, Value::from),
        );
        Value::Object(body)
    }

    /// POST the message and hand back the unparsed response.
    ///
    /// Any non-2xx status is a `Network` error.
    pub async fn send(
        &self,
        message: &str,
        thread_id: Option<&str>,
    ) -> WidgetResult<reqwest::Response> {
        debug!(url = %self.url, thread_id = ?thread_id, "Sending message");

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(&self.request_body(message, thread_id))
            .send()
            .await
            .map_err(WidgetError::network)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WidgetError::Network {
                status: Some(status.as_u16()),
                message: format!("endpoint returned {}: {}", status, body),
            });
        }

        Ok(response)
    }
}

/// Thread identity supplied in the `x-thread-id` header, if any
pub fn header_thread_id(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(THREAD_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
