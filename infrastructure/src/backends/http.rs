//! OpenAI-compatible HTTP backend (`/chat/completions`).
//!
//! Used for job backends other than the peer relay, e.g. a hosted router or a
//! local model server, and as a failover target.

use crate::config::FileBackendConfig;
use async_trait::async_trait;
use relay_application::{BackendError, ChatBackend};
use relay_domain::ChatCompletionRequest;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::debug;

pub struct HttpChatBackend {
    name: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    api_key_env: Option<String>,
    model: Option<String>,
    timeout: Duration,
}

impl HttpChatBackend {
    pub fn from_config(name: impl Into<String>, config: &FileBackendConfig) -> Self {
        let timeout = config.timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            name: name.into(),
            client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key(),
            api_key_env: config.api_key_env.clone(),
            model: config.model.clone(),
            timeout,
        }
    }

    fn body(&self, request: &ChatCompletionRequest) -> Value {
        let messages: Vec<Value> = request
            .messages
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();
        json!({
            "model": self.model.as_deref().unwrap_or(&request.model),
            "messages": messages,
            "stream": false,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> BackendError {
        if e.is_timeout() {
            BackendError::Timeout(self.timeout.as_secs())
        } else {
            BackendError::Upstream(format!("{}: {e}", self.name))
        }
    }
}

fn map_status(status: reqwest::StatusCode, body: &str) -> BackendError {
    let detail = format!("HTTP {status}: {}", relay_domain::util::truncate_str(body, 300));
    match status.as_u16() {
        401 | 403 => BackendError::Configuration(detail),
        429 => BackendError::CapacityExceeded(detail),
        _ => BackendError::Upstream(detail),
    }
}

/// Pull `choices[0].message.content` out of a completion response.
fn extract_content(body: &Value) -> Option<String> {
    body.get("choices")?
        .get(0)?
        .get("message")?
        .get("content")?
        .as_str()
        .map(str::to_string)
}

#[async_trait]
impl ChatBackend for HttpChatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: ChatCompletionRequest) -> Result<String, BackendError> {
        if self.api_key.is_none()
            && let Some(var) = &self.api_key_env
        {
            return Err(BackendError::Configuration(format!(
                "{}: environment variable {var} is not set",
                self.name
            )));
        }

        let mut builder = self.client.post(&self.endpoint).json(&self.body(&request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        debug!(backend = %self.name, endpoint = %self.endpoint, "Sending completion request");

        let response = builder.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_send_error(e))?;
        if !status.is_success() {
            return Err(map_status(status, &text));
        }

        let body: Value = serde_json::from_str(&text)
            .map_err(|e| BackendError::Upstream(format!("{}: invalid JSON: {e}", self.name)))?;
        extract_content(&body)
            .ok_or_else(|| BackendError::Upstream(format!("{}: response has no content", self.name)))
    }
}
