//! Multi-tier content fetching.
//!
//! [`Fetcher::fetch`] turns a URL into `{title, text, published_time}` or a
//! tagged [`FetchFailure`], in this order:
//!
//! 1. URLs whose path ends in `.pdf` fail with `unsupported-format` and no
//!    network call is made.
//! 2. The [`FetchPolicy`] picks the starting tier. Tricky domains, which are
//!    known to defeat plain fetches, start at the renderer.
//! 3. Otherwise the lightweight fetch runs first and its success is returned.
//! 4. If it fails, a random jitter delay passes before the renderer is tried,
//!    so retries against the same site don't line up.
//! 5. A renderer failure is returned as-is.
//!
//! Expected failures (blocked, empty, timeout) are values, never panics.
//!
//! # Submodules
//!
//! - [`policy`]: domain table choosing the starting tier
//! - [`light`]: tier 1, plain HTTP
//! - [`render`]: tier 2, Browserless rendering
//! - [`html`]: text extraction shared by both tiers

pub mod html;
pub mod light;
pub mod policy;
pub mod render;

pub use html::extract_article;
pub use light::HttpFetcher;
pub use policy::{DomainRule, FetchPolicy};
pub use render::BrowserRenderer;

use rand::{Rng, rng};
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, instrument, warn};

use crate::config::{FetcherConfig, RendererConfig};
use crate::error::{FetchError, FetchFailure, Tier};
use crate::models::ScrapedArticle;
use crate::utils::{hostname, is_pdf_url};

/// One way of getting article content for a URL.
pub trait ContentSource {
    fn tier(&self) -> Tier;

    async fn fetch(&self, url: &str) -> Result<ScrapedArticle, FetchError>;
}

/// What the workflow needs from a fetcher.
pub trait ArticleFetcher {
    async fn fetch(&self, url: &str) -> Result<ScrapedArticle, FetchFailure>;
}

/// Uniform random delay between the two tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub min: Duration,
    pub max: Duration,
}

impl Jitter {
    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn sample(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let ms = rng().random_range(self.min.as_millis() as u64..=self.max.as_millis() as u64);
        Duration::from_millis(ms)
    }
}

impl From<&FetcherConfig> for Jitter {
    fn from(config: &FetcherConfig) -> Self {
        Self {
            min: Duration::from_millis(config.jitter_min_ms),
            max: Duration::from_millis(config.jitter_max_ms),
        }
    }
}

/// Upper bound on one call to each tier. A tier still running at its limit
/// is abandoned and reported as `timeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierTimeouts {
    pub light: Duration,
    pub render: Duration,
}

impl TierTimeouts {
    pub fn from_config(fetcher: &FetcherConfig, renderer: &RendererConfig) -> Self {
        Self {
            light: Duration::from_secs(fetcher.timeout_secs),
            render: Duration::from_secs(renderer.timeout_secs),
        }
    }
}

/// Lightweight-first fetcher with a rendering fallback.
#[derive(Debug)]
pub struct Fetcher<L, R> {
    light: L,
    render: R,
    policy: FetchPolicy,
    jitter: Jitter,
    timeouts: Option<TierTimeouts>,
}

impl<L: ContentSource, R: ContentSource> Fetcher<L, R> {
    pub fn new(light: L, render: R, policy: FetchPolicy, jitter: Jitter) -> Self {
        Self {
            light,
            render,
            policy,
            jitter,
            timeouts: None,
        }
    }

    pub fn with_tier_timeouts(mut self, timeouts: TierTimeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }

    async fn run_tier<S: ContentSource>(
        source: &S,
        url: &str,
        limit: Option<Duration>,
    ) -> Result<ScrapedArticle, FetchFailure> {
        let fetched = match limit {
            Some(limit) => match timeout(limit, source.fetch(url)).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(tier = ?source.tier(), ?limit, "Tier did not finish in time");
                    Err(FetchError::Timeout)
                }
            },
            None => source.fetch(url).await,
        };
        fetched.map_err(|e| FetchFailure::new(source.tier(), e))
    }

    async fn light_tier(&self, url: &str) -> Result<ScrapedArticle, FetchFailure> {
        Self::run_tier(&self.light, url, self.timeouts.map(|t| t.light)).await
    }

    async fn render_tier(&self, url: &str) -> Result<ScrapedArticle, FetchFailure> {
        Self::run_tier(&self.render, url, self.timeouts.map(|t| t.render)).await
    }
}

impl Fetcher<HttpFetcher, BrowserRenderer> {
    /// Production fetcher built from configuration.
    pub fn from_config(fetcher: &FetcherConfig, renderer: &RendererConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(
            HttpFetcher::new(fetcher)?,
            BrowserRenderer::new(renderer, fetcher.min_text_chars)?,
            FetchPolicy::with_tricky_domains(&fetcher.tricky_domains),
            Jitter::from(fetcher),
        )
        .with_tier_timeouts(TierTimeouts::from_config(fetcher, renderer)))
    }
}

impl<L: ContentSource, R: ContentSource> ArticleFetcher for Fetcher<L, R> {
    #[instrument(level = "info", skip(self))]
    async fn fetch(&self, url: &str) -> Result<ScrapedArticle, FetchFailure> {
        if is_pdf_url(url) {
            debug!("Skipping PDF");
            return Err(FetchFailure::new(Tier::Light, FetchError::UnsupportedFormat));
        }

        let Some(host) = hostname(url) else {
            return Err(FetchFailure::new(
                Tier::Light,
                FetchError::InvalidUrl { url: url.to_string() },
            ));
        };

        if self.policy.start_tier(&host) == Tier::Render {
            debug!(%host, "Tricky domain; rendering first");
            return self.render_tier(url).await;
        }

        match self.light_tier(url).await {
            Ok(article) => Ok(article),
            Err(failure) => {
                let delay = self.jitter.sample();
                warn!(%host, error = %failure, ?delay, "Light fetch failed; falling back to renderer");
                sleep(delay).await;
                let rendered = self.render_tier(url).await;
                if rendered.is_ok() {
                    info!(%host, "Renderer recovered article");
                }
                rendered
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Scripted content source recording every URL it was asked for.
    pub struct FakeSource {
        tier: Tier,
        default: Result<ScrapedArticle, FetchError>,
        by_url: HashMap<String, Result<ScrapedArticle, FetchError>>,
        delay: Duration,
        pub calls: RefCell<Vec<String>>,
    }

    impl FakeSource {
        pub fn new(tier: Tier, default: Result<ScrapedArticle, FetchError>) -> Self {
            Self {
                tier,
                default,
                by_url: HashMap::new(),
                delay: Duration::ZERO,
                calls: RefCell::new(Vec::new()),
            }
        }

        /// Take `delay` to answer every call.
        pub fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        pub fn with(mut self, url: &str, result: Result<ScrapedArticle, FetchError>) -> Self {
            self.by_url.insert(url.to_string(), result);
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.borrow().len()
        }
    }

    impl ContentSource for FakeSource {
        fn tier(&self) -> Tier {
            self.tier
        }

        async fn fetch(&self, url: &str) -> Result<ScrapedArticle, FetchError> {
            self.calls.borrow_mut().push(url.to_string());
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            self.by_url.get(url).cloned().unwrap_or_else(|| self.default.clone())
        }
    }

    pub fn scraped(title: &str) -> ScrapedArticle {
        ScrapedArticle {
            title: title.to_string(),
            text: format!("{title} body text"),
            published_time: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{FakeSource, scraped};
    use super::*;

    fn fetcher(light: FakeSource, render: FakeSource) -> Fetcher<FakeSource, FakeSource> {
        Fetcher::new(
            light,
            render,
            FetchPolicy::with_tricky_domains(&["reuters.com", "nytimes.com"]),
            Jitter::none(),
        )
    }

    #[tokio::test]
    async fn test_pdf_never_touches_network() {
        let f = fetcher(
            FakeSource::new(Tier::Light, Ok(scraped("light"))),
            FakeSource::new(Tier::Render, Ok(scraped("render"))),
        );
        let err = f.fetch("https://example.com/files/Report.PDF").await.unwrap_err();
        assert_eq!(err.error, FetchError::UnsupportedFormat);
        assert_eq!(f.light.call_count(), 0);
        assert_eq!(f.render.call_count(), 0);
    }

    #[tokio::test]
    async fn test_tricky_domain_skips_light_tier() {
        let f = fetcher(
            FakeSource::new(Tier::Light, Ok(scraped("light"))),
            FakeSource::new(Tier::Render, Ok(scraped("render"))),
        );
        let article = f.fetch("https://www.reuters.com/world/story").await.unwrap();
        assert_eq!(article.title, "render");
        assert_eq!(f.light.call_count(), 0);
        assert_eq!(f.render.call_count(), 1);
    }

    #[tokio::test]
    async fn test_tricky_domain_render_failure_is_returned() {
        let f = fetcher(
            FakeSource::new(Tier::Light, Ok(scraped("light"))),
            FakeSource::new(Tier::Render, Err(FetchError::Blocked { status: 403 })),
        );
        let err = f.fetch("https://nytimes.com/x").await.unwrap_err();
        assert_eq!(err, FetchFailure::new(Tier::Render, FetchError::Blocked { status: 403 }));
        assert_eq!(f.light.call_count(), 0);
    }

    #[tokio::test]
    async fn test_light_success_short_circuits() {
        let f = fetcher(
            FakeSource::new(Tier::Light, Ok(scraped("light"))),
            FakeSource::new(Tier::Render, Ok(scraped("render"))),
        );
        let article = f.fetch("https://apnews.com/article/1").await.unwrap();
        assert_eq!(article.title, "light");
        assert_eq!(f.render.call_count(), 0);
    }

    #[tokio::test]
    async fn test_fallback_returns_render_content() {
        let f = fetcher(
            FakeSource::new(Tier::Light, Err(FetchError::Blocked { status: 403 })),
            FakeSource::new(Tier::Render, Ok(scraped("render"))),
        );
        let article = f.fetch("https://apnews.com/article/1").await.unwrap();
        assert_eq!(article, scraped("render"));
        assert_eq!(f.light.call_count(), 1);
        assert_eq!(f.render.call_count(), 1);
    }

    #[tokio::test]
    async fn test_both_tiers_fail_reports_render_failure() {
        let f = fetcher(
            FakeSource::new(Tier::Light, Err(FetchError::Empty)),
            FakeSource::new(Tier::Render, Err(FetchError::Timeout)),
        );
        let err = f.fetch("https://apnews.com/article/1").await.unwrap_err();
        assert_eq!(err.tier, Tier::Render);
        assert_eq!(err.error, FetchError::Timeout);
    }

    #[tokio::test(start_paused = true)]
    async fn test_jitter_delays_fallback() {
        let f = Fetcher::new(
            FakeSource::new(Tier::Light, Err(FetchError::Empty)),
            FakeSource::new(Tier::Render, Ok(scraped("render"))),
            FetchPolicy::with_tricky_domains::<&str>(&[]),
            Jitter {
                min: Duration::from_millis(500),
                max: Duration::from_millis(3000),
            },
        );
        let t0 = tokio::time::Instant::now();
        f.fetch("https://example.com/a").await.unwrap();
        let waited = t0.elapsed();
        assert!(waited >= Duration::from_millis(500));
        assert!(waited <= Duration::from_millis(3100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_light_tier_is_cut_off_in_time_for_render() {
        let f = fetcher(
            FakeSource::new(Tier::Light, Ok(scraped("light"))).slow(Duration::from_secs(30)),
            FakeSource::new(Tier::Render, Ok(scraped("render"))).slow(Duration::from_secs(39)),
        )
        .with_tier_timeouts(TierTimeouts {
            light: Duration::from_secs(15),
            render: Duration::from_secs(40),
        });
        let t0 = tokio::time::Instant::now();
        let article = f.fetch("https://apnews.com/article/1").await.unwrap();
        assert_eq!(article.title, "render");
        let waited = t0.elapsed();
        assert!(waited >= Duration::from_secs(15 + 39));
        assert!(waited < Duration::from_secs(55));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_renderer_reports_timeout() {
        let f = fetcher(
            FakeSource::new(Tier::Light, Ok(scraped("light"))),
            FakeSource::new(Tier::Render, Ok(scraped("render"))).slow(Duration::from_secs(90)),
        )
        .with_tier_timeouts(TierTimeouts {
            light: Duration::from_secs(15),
            render: Duration::from_secs(40),
        });
        let err = f.fetch("https://www.nytimes.com/2025/story").await.unwrap_err();
        assert_eq!(err, FetchFailure::new(Tier::Render, FetchError::Timeout));
    }

    #[test]
    fn test_jitter_sample_in_range() {
        let jitter = Jitter {
            min: Duration::from_millis(500),
            max: Duration::from_millis(3000),
        };
        for _ in 0..100 {
            let d = jitter.sample();
            assert!(d >= jitter.min && d <= jitter.max);
        }
        assert_eq!(Jitter::none().sample(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let f = fetcher(
            FakeSource::new(Tier::Light, Ok(scraped("light"))),
            FakeSource::new(Tier::Render, Ok(scraped("render"))),
        );
        let err = f.fetch("not a url").await.unwrap_err();
        assert_eq!(err.error.tag(), "invalid-url");
    }
}
