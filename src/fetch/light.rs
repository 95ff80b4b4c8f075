//! Tier 1: direct HTTP GET plus HTML text extraction.

use reqwest::{Client, StatusCode, header};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::{ContentSource, extract_article};
use crate::config::FetcherConfig;
use crate::error::{FetchError, Tier};
use crate::models::ScrapedArticle;

/// Status codes sites use to turn scrapers away.
pub(crate) fn is_block_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 401 | 403 | 429 | 451)
}

/// The page does not exist; asking again will not change that.
pub(crate) fn is_gone_status(status: StatusCode) -> bool {
    matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE)
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    min_text_chars: usize,
}

impl HttpFetcher {
    pub fn new(config: &FetcherConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            min_text_chars: config.min_text_chars,
        })
    }
}

impl ContentSource for HttpFetcher {
    fn tier(&self) -> Tier {
        Tier::Light
    }

    #[instrument(level = "debug", skip(self))]
    async fn fetch(&self, url: &str) -> Result<ScrapedArticle, FetchError> {
        let t0 = Instant::now();
        let resp = self
            .client
            .get(url)
            .header(header::ACCEPT, "text/html,application/xhtml+xml")
            .send()
            .await?;

        let status = resp.status();
        if is_block_status(status) {
            warn!(%status, "Site refused plain fetch");
            return Err(FetchError::Blocked {
                status: status.as_u16(),
            });
        }
        if is_gone_status(status) {
            return Err(FetchError::NotFound {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(FetchError::network(format!("HTTP {status}")));
        }

        let is_pdf = resp
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/pdf"));
        if is_pdf {
            return Err(FetchError::UnsupportedFormat);
        }

        let body = resp.text().await?;
        let article = extract_article(&body, self.min_text_chars)?;
        debug!(
            bytes = body.len(),
            text_chars = article.text.len(),
            elapsed_ms = t0.elapsed().as_millis() as u64,
            "Fetched article"
        );
        Ok(article)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_statuses() {
        assert!(is_block_status(StatusCode::FORBIDDEN));
        assert!(is_block_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(!is_block_status(StatusCode::NOT_FOUND));
        assert!(!is_block_status(StatusCode::OK));
    }

    #[test]
    fn test_gone_statuses() {
        assert!(is_gone_status(StatusCode::NOT_FOUND));
        assert!(is_gone_status(StatusCode::GONE));
        assert!(!is_gone_status(StatusCode::BAD_GATEWAY));
        assert!(!FetchError::NotFound { status: 404 }.is_transient());
        assert_eq!(FetchError::NotFound { status: 410 }.tag(), "not-found");
    }

    #[test]
    fn test_builds_from_default_config() {
        let fetcher = HttpFetcher::new(&FetcherConfig::default()).unwrap();
        assert_eq!(fetcher.tier(), Tier::Light);
        assert_eq!(fetcher.min_text_chars, 100);
    }
}
