//! Article text extraction from HTML, shared by both fetch tiers.
//!
//! - **Title**: `og:title`, then `<title>`, then the first `<h1>`
//! - **Published time**: `article:published_time` meta, `<time datetime>`,
//!   then JSON-LD `datePublished` (including `@graph` documents)
//! - **Text**: paragraphs inside `<article>`, then `<main>`, then the whole page

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::error::FetchError;
use crate::models::ScrapedArticle;

fn selector(css: &str) -> Selector {
    Selector::parse(css).unwrap_or_else(|e| panic!("invalid built-in selector {css}: {e}"))
}

static OG_TITLE: Lazy<Selector> = Lazy::new(|| selector(r#"meta[property="og:title"]"#));
static TITLE: Lazy<Selector> = Lazy::new(|| selector("title"));
static H1: Lazy<Selector> = Lazy::new(|| selector("h1"));
static PUBLISHED_META: Lazy<Selector> = Lazy::new(|| {
    selector(r#"meta[property="article:published_time"], meta[name="pubdate"], meta[itemprop="datePublished"]"#)
});
static TIME: Lazy<Selector> = Lazy::new(|| selector("time[datetime]"));
static JSON_LD: Lazy<Selector> = Lazy::new(|| selector(r#"script[type="application/ld+json"]"#));
static ARTICLE_P: Lazy<Selector> = Lazy::new(|| selector("article p"));
static MAIN_P: Lazy<Selector> = Lazy::new(|| selector("main p"));
static ANY_P: Lazy<Selector> = Lazy::new(|| selector("p"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap_or_else(|e| panic!("{e}")));

fn clean(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

fn element_text(el: ElementRef<'_>) -> String {
    clean(&el.text().collect::<String>())
}

fn meta_content(document: &Html, sel: &Selector) -> Option<String> {
    document
        .select(sel)
        .filter_map(|el| el.value().attr("content"))
        .map(clean)
        .find(|s| !s.is_empty())
}

fn extract_title(document: &Html) -> String {
    meta_content(document, &OG_TITLE)
        .or_else(|| document.select(&TITLE).map(element_text).find(|s| !s.is_empty()))
        .or_else(|| document.select(&H1).map(element_text).find(|s| !s.is_empty()))
        .unwrap_or_default()
}

fn json_ld_date(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => items.iter().find_map(json_ld_date),
        Value::Object(map) => map
            .get("datePublished")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| map.get("@graph").and_then(json_ld_date)),
        _ => None,
    }
}

fn extract_published(document: &Html) -> Option<String> {
    meta_content(document, &PUBLISHED_META)
        .or_else(|| {
            document
                .select(&TIME)
                .filter_map(|el| el.value().attr("datetime"))
                .map(clean)
                .find(|s| !s.is_empty())
        })
        .or_else(|| {
            document.select(&JSON_LD).find_map(|el| {
                let raw = el.text().collect::<String>();
                serde_json::from_str::<Value>(&raw).ok().as_ref().and_then(json_ld_date)
            })
        })
}

fn paragraphs(document: &Html, sel: &Selector) -> String {
    document
        .select(sel)
        .map(element_text)
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn extract_text(document: &Html, min_chars: usize) -> String {
    let mut best = String::new();
    for sel in [&*ARTICLE_P, &*MAIN_P, &*ANY_P] {
        let text = paragraphs(document, sel);
        if text.chars().count() >= min_chars {
            return text;
        }
        if text.len() > best.len() {
            best = text;
        }
    }
    best
}

/// Extract article content from a page.
///
/// Fails with [`FetchError::Empty`] when fewer than `min_chars` characters
/// of paragraph text are found.
pub fn extract_article(html: &str, min_chars: usize) -> Result<ScrapedArticle, FetchError> {
    let document = Html::parse_document(html);
    let text = extract_text(&document, min_chars);
    if text.trim().is_empty() || text.chars().count() < min_chars {
        return Err(FetchError::Empty);
    }

    Ok(ScrapedArticle {
        title: extract_title(&document),
        text,
        published_time: extract_published(&document),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: &str = "The council voted on Tuesday to approve the new transit plan after months of debate.";

    fn page(head: &str, body: &str) -> String {
        format!("<html><head>{head}</head><body>{body}</body></html>")
    }

    #[test]
    fn test_prefers_article_paragraphs() {
        let html = page(
            r#"<title>Site | Story</title><meta property="og:title" content="Story headline">"#,
            &format!("<nav><p>Menu</p></nav><article><p>{LONG}</p><p>  Second   paragraph. </p></article>"),
        );
        let article = extract_article(&html, 20).unwrap();
        assert_eq!(article.title, "Story headline");
        assert_eq!(article.text, format!("{LONG}\n\nSecond paragraph."));
    }

    #[test]
    fn test_falls_back_to_all_paragraphs_and_title_tag() {
        let html = page("<title> Plain title </title>", &format!("<div><p>{LONG}</p></div>"));
        let article = extract_article(&html, 20).unwrap();
        assert_eq!(article.title, "Plain title");
        assert_eq!(article.text, LONG);
    }

    #[test]
    fn test_short_text_is_empty() {
        let html = page("<title>T</title>", "<p>Subscribe now</p>");
        assert_eq!(extract_article(&html, 100), Err(FetchError::Empty));
    }

    #[test]
    fn test_published_time_from_meta() {
        let html = page(
            r#"<meta property="article:published_time" content="2025-05-06T10:00:00Z">"#,
            &format!("<p>{LONG}</p>"),
        );
        let article = extract_article(&html, 20).unwrap();
        assert_eq!(article.published_time.as_deref(), Some("2025-05-06T10:00:00Z"));
    }

    #[test]
    fn test_published_time_from_json_ld_graph() {
        let html = page(
            r#"<script type="application/ld+json">{"@graph":[{"@type":"WebPage"},{"@type":"NewsArticle","datePublished":"2025-05-07"}]}</script>"#,
            &format!("<h1>Heading</h1><p>{LONG}</p>"),
        );
        let article = extract_article(&html, 20).unwrap();
        assert_eq!(article.published_time.as_deref(), Some("2025-05-07"));
        assert_eq!(article.title, "Heading");
    }
}
