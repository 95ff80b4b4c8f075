//! Data models for articles moving through the ingestion pipeline.
//!
//! This module defines the core data structures shared by every stage:
//! - [`Article`]: a row owned by the article store, as read from the backlog
//! - [`ScrapedArticle`]: page content returned by either fetch tier
//! - [`ExtractionResult`]: validated model output plus the normalized summary
//! - [`ProcessedArticle`]: the outcome fields written back for a successful article
//!
//! The classification enums serialize as the SCREAMING_SNAKE_CASE strings the
//! model is instructed to emit, so the same types are used both for validation
//! and for persistence.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::hostname;

/// Identifier of an article in the store.
pub type ArticleId = i64;

/// An article as held by the article store.
///
/// An article is *pending* while both `processed_at` and `fail_reason` are
/// unset. Setting either makes it terminal; terminal articles are never
/// selected by the backlog query again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: ArticleId,
    pub url: String,
    pub title: String,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub processed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub fail_reason: Option<String>,
    #[serde(default)]
    pub completeness: Option<Completeness>,
    #[serde(default)]
    pub relevance: Option<Relevance>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
}

impl Article {
    /// Build a fresh, pending article.
    pub fn new(id: ArticleId, url: impl Into<String>, title: impl Into<String>, published_at: DateTime<Utc>) -> Self {
        Self {
            id,
            url: url.into(),
            title: title.into(),
            published_at,
            content: None,
            processed_at: None,
            fail_reason: None,
            completeness: None,
            relevance: None,
            language: None,
            location: None,
            summary: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.processed_at.is_none() && self.fail_reason.is_none()
    }

    /// Domain key used for rate limiting: the URL's hostname, or `"unknown"`
    /// when the URL does not parse.
    pub fn domain(&self) -> String {
        hostname(&self.url).unwrap_or_else(|| "unknown".to_string())
    }
}

/// Content extracted from a fetched or rendered page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrapedArticle {
    pub title: String,
    pub text: String,
    pub published_time: Option<String>,
}

/// How much of the article the fetched text actually contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Completeness {
    Complete,
    PartialUseful,
    PartialUseless,
}

impl Completeness {
    pub const ALL: [&'static str; 3] = ["COMPLETE", "PARTIAL_USEFUL", "PARTIAL_USELESS"];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "COMPLETE" => Some(Self::Complete),
            "PARTIAL_USEFUL" => Some(Self::PartialUseful),
            "PARTIAL_USELESS" => Some(Self::PartialUseless),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "COMPLETE",
            Self::PartialUseful => "PARTIAL_USEFUL",
            Self::PartialUseless => "PARTIAL_USELESS",
        }
    }
}

impl fmt::Display for Completeness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether the article is news worth keeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relevance {
    Relevant,
    NotRelevant,
}

impl Relevance {
    pub const ALL: [&'static str; 2] = ["RELEVANT", "NOT_RELEVANT"];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RELEVANT" => Some(Self::Relevant),
            "NOT_RELEVANT" => Some(Self::NotRelevant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Relevant => "RELEVANT",
            Self::NotRelevant => "NOT_RELEVANT",
        }
    }
}

impl fmt::Display for Relevance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated analysis of one article.
///
/// `summary` holds the four-line `HEADLINE`/`ENTITIES`/`EVENT`/`CONTEXT`
/// block, or `None` when the model returned no summary object at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionResult {
    pub completeness: Completeness,
    pub relevance: Relevance,
    pub language: String,
    pub location: Option<String>,
    pub summary: Option<String>,
}

/// Fields written back by `mark_processed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedArticle {
    pub text: String,
    pub title: String,
    pub completeness: Completeness,
    pub relevance: Relevance,
    pub language: String,
    pub location: Option<String>,
    pub summary: Option<String>,
}

impl ProcessedArticle {
    pub fn new(scraped: &ScrapedArticle, analysis: ExtractionResult) -> Self {
        Self {
            text: scraped.text.clone(),
            title: scraped.title.clone(),
            completeness: analysis.completeness,
            relevance: analysis.relevance,
            language: analysis.language,
            location: analysis.location,
            summary: analysis.summary,
        }
    }
}
