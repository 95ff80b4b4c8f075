//! The article analysis prompt.

/// Build the analysis prompt for one article.
///
/// The model is asked for a single JSON object; the accepted shape is
/// enforced afterwards by [`super::validate`].
pub fn article_analysis_prompt(title: &str, text: &str) -> String {
    format!(
        r#"You are a news analyst. Read the article below and return ONE JSON object, with no surrounding text, matching this shape:

{{
  "completeness": "COMPLETE" | "PARTIAL_USEFUL" | "PARTIAL_USELESS",
  "relevance": "RELEVANT" | "NOT_RELEVANT",
  "language": "<ISO 639-1 two-letter code of the article's language>",
  "location": "<main country or city the story is about, or null>",
  "summary": {{
    "HEADLINE": "<one-line neutral headline>",
    "ENTITIES": ["<key people, organizations and places>"],
    "EVENT": "<what happened, one or two sentences>",
    "CONTEXT": "<why it matters, one or two sentences>"
  }}
}}

Rules:
- completeness: COMPLETE if the text holds the full story, PARTIAL_USEFUL if it is cut off but still informative, PARTIAL_USELESS if it is a paywall stub, cookie notice or otherwise unusable.
- relevance: NOT_RELEVANT for ads, listicles, horoscopes, recipes, sports scores and other non-news content.
- Omit "summary" when completeness is PARTIAL_USELESS or relevance is NOT_RELEVANT.
- Use only information in the article.

<title>
{title}
</title>

<article>
{text}
</article>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_title_and_text() {
        let prompt = article_analysis_prompt("Dam breaks", "Water flooded the valley.");
        assert!(prompt.contains("<title>\nDam breaks\n</title>"));
        assert!(prompt.contains("Water flooded the valley."));
        for field in ["completeness", "relevance", "language", "HEADLINE", "ENTITIES", "EVENT", "CONTEXT"] {
            assert!(prompt.contains(field), "prompt is missing {field}");
        }
    }
}
