//! Tier 2: headless-browser rendering through the Browserless `/content` API.
//!
//! The renderer executes the page's scripts and waits for the network to go
//! quiet before returning the final HTML, which then goes through the same
//! text extraction as tier 1. It is slower and costlier than a plain GET.

use reqwest::{Client, StatusCode};
use serde_json::json;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::light::{is_block_status, is_gone_status};
use super::{ContentSource, extract_article};
use crate::config::RendererConfig;
use crate::error::{FetchError, Tier};
use crate::models::ScrapedArticle;

pub struct BrowserRenderer {
    client: Client,
    base_url: String,
    token: Option<String>,
    min_text_chars: usize,
}

impl std::fmt::Debug for BrowserRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserRenderer")
            .field("base_url", &self.base_url)
            .field("token", &self.token.as_deref().map(|_| "<redacted>"))
            .finish()
    }
}

impl BrowserRenderer {
    pub fn new(config: &RendererConfig, min_text_chars: usize) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            min_text_chars,
        })
    }

    fn endpoint(&self) -> String {
        let mut endpoint = format!("{}/content", self.base_url);
        if let Some(ref token) = self.token {
            endpoint.push_str(&format!("?token={}", urlencoding::encode(token)));
        }
        endpoint
    }
}

/// Map a non-success status from the renderer to a fetch failure.
fn render_status_error(status: StatusCode, message: &str) -> FetchError {
    match status.as_u16() {
        408 | 504 => FetchError::Timeout,
        s if is_block_status(status) => FetchError::Blocked { status: s },
        s if is_gone_status(status) => FetchError::NotFound { status: s },
        _ => FetchError::network(format!("renderer status {status}: {message}")),
    }
}

impl ContentSource for BrowserRenderer {
    fn tier(&self) -> Tier {
        Tier::Render
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<ScrapedArticle, FetchError> {
        let t0 = Instant::now();
        let body = json!({
            "url": url,
            "gotoOptions": { "waitUntil": "networkidle2" },
            "rejectResourceTypes": ["image", "media", "font"],
        });

        let resp = self.client.post(self.endpoint()).json(&body).send().await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            warn!(%status, "Renderer returned an error");
            return Err(render_status_error(status, &message));
        }

        let html = resp.text().await?;
        let article = extract_article(&html, self.min_text_chars)?;
        debug!(
            bytes = html.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Rendered article"
        );
        Ok(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_encodes_token() {
        let renderer = BrowserRenderer::new(
            &RendererConfig {
                base_url: "https://chrome.example.io/".to_string(),
                token: Some("a b&c".to_string()),
                timeout_secs: 5,
            },
            100,
        )
        .unwrap();
        assert_eq!(renderer.endpoint(), "https://chrome.example.io/content?token=a%20b%26c");
        assert!(format!("{renderer:?}").contains("<redacted>"));
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(render_status_error(StatusCode::GATEWAY_TIMEOUT, ""), FetchError::Timeout);
        assert_eq!(
            render_status_error(StatusCode::FORBIDDEN, ""),
            FetchError::Blocked { status: 403 }
        );
        assert_eq!(render_status_error(StatusCode::BAD_GATEWAY, "down").tag(), "network");
        assert_eq!(
            render_status_error(StatusCode::NOT_FOUND, ""),
            FetchError::NotFound { status: 404 }
        );
    }
}
