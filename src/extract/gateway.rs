//! LLM gateway: chat-completion requests over an OpenAI-compatible API.
//!
//! The production gateway talks to OpenRouter. Any non-2xx status is an
//! error for that call; the caller's durable step decides whether to retry.

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use crate::config::LlmConfig;
use crate::error::GatewayError;
use crate::utils::truncate_for_log;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Sends one chat request and returns the first choice's text content.
pub trait LlmGateway {
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError>;
}

/// Pull the first choice's content out of a raw response body.
pub(crate) fn first_choice_content(body: &str) -> Result<String, GatewayError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|source| GatewayError::Decode {
        body: truncate_for_log(body, 500),
        source,
    })?;

    parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| GatewayError::MissingContent {
            body: truncate_for_log(body, 500),
        })
}

pub struct OpenRouterGateway {
    http: Client,
    base_url: String,
    api_key: String,
    app_name: String,
}

impl fmt::Debug for OpenRouterGateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenRouterGateway")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("app_name", &self.app_name)
            .finish()
    }
}

impl OpenRouterGateway {
    pub fn new(config: &LlmConfig) -> Result<Self, GatewayError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| GatewayError::NotConfigured("OpenRouter API key is required".to_string()))?;
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            app_name: config.app_name.clone(),
        })
    }

    fn headers(&self) -> Result<HeaderMap, GatewayError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
            .map_err(|e| GatewayError::NotConfigured(format!("invalid API key: {e}")))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        if let Ok(val) = HeaderValue::from_str(&self.app_name) {
            headers.insert("X-Title", val);
        }
        Ok(headers)
    }
}

impl LlmGateway for OpenRouterGateway {
    #[instrument(level = "info", skip_all, fields(model = %request.model))]
    async fn complete(&self, request: &ChatRequest) -> Result<String, GatewayError> {
        let t0 = Instant::now();
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(%status, body = %truncate_for_log(&body, 300), "Gateway returned an error");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let content = first_choice_content(&body)?;
        debug!(
            elapsed_ms = t0.elapsed().as_millis() as u64,
            content_bytes = content.len(),
            "Gateway call succeeded"
        );
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_wire_shape() {
        let request = ChatRequest {
            model: "google/gemini-2.0-flash-001".to_string(),
            messages: vec![ChatMessage::user("hello")],
            temperature: 0.0,
            response_format: ResponseFormat::json_object(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["messages"][0]["role"], "user");
        assert_eq!(value["messages"][0]["content"], "hello");
        assert_eq!(value["temperature"], 0.0);
        assert_eq!(value["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_first_choice_content() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"{\"a\":1}"}}]}"#;
        assert_eq!(first_choice_content(body).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn test_no_choices_is_an_error() {
        let err = first_choice_content(r#"{"choices":[]}"#).unwrap_err();
        assert!(matches!(err, GatewayError::MissingContent { .. }));

        let err = first_choice_content("<html>bad gateway</html>").unwrap_err();
        assert!(matches!(err, GatewayError::Decode { .. }));
    }

    #[test]
    fn test_gateway_requires_api_key() {
        let err = OpenRouterGateway::new(&LlmConfig::default()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "gateway is not configured: OpenRouter API key is required"
        );

        let config = LlmConfig {
            api_key: Some("sk-test".to_string()),
            ..LlmConfig::default()
        };
        let gateway = OpenRouterGateway::new(&config).unwrap();
        assert!(!format!("{gateway:?}").contains("sk-test"));
    }
}
