//! Structured extraction: article text in, validated [`ExtractionResult`] out.
//!
//! One call per article:
//!
//! 1. Build the analysis prompt ([`prompt`]); the text is cut to
//!    `max_input_chars` on a char boundary first.
//! 2. Send a deterministic, JSON-object-mode chat request through an
//!    [`LlmGateway`].
//! 3. Strip code fences and parse the payload. A top-level array is a known
//!    model quirk: its first element is taken as the object.
//! 4. Validate the object ([`validate`]), collecting every violation.
//! 5. Derive the four-line summary ([`summary`]).
//!
//! Retries are not done here. The workflow's durable step owns them.

pub mod gateway;
pub mod prompt;
pub mod summary;
pub mod validate;

pub use gateway::{ChatMessage, ChatRequest, LlmGateway, OpenRouterGateway, ResponseFormat};
pub use prompt::article_analysis_prompt;
pub use summary::normalize_summary;
pub use validate::{ArticleAnalysis, Entities, SummaryFields, validate_analysis};

use serde::Serialize;
use serde_json::{Map, Value};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::config::LlmConfig;
use crate::error::{ExtractionError, FieldViolation};
use crate::models::ExtractionResult;
use crate::utils::{looks_truncated, strip_code_blocks, truncate_for_log, truncate_to_char_boundary};

/// Asks the model for a trivial JSON object to prove the gateway works.
pub const GATEWAY_CHECK_PROMPT: &str = "Return a JSON object with a single field 'status' set to 'working'";

/// Outcome of [`ExtractionService::check_gateway`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GatewayCheck {
    pub model: String,
    pub status: String,
    pub elapsed_ms: u64,
}

/// What the workflow needs from an extractor.
pub trait Analyzer {
    async fn analyze(&self, title: &str, text: &str) -> Result<ExtractionResult, ExtractionError>;
}

#[derive(Debug)]
pub struct ExtractionService<G> {
    gateway: G,
    model: String,
    temperature: f32,
    max_input_chars: usize,
}

impl<G: LlmGateway> ExtractionService<G> {
    pub fn new(gateway: G, config: &LlmConfig) -> Self {
        Self {
            gateway,
            model: config.model.clone(),
            temperature: config.temperature,
            max_input_chars: config.max_input_chars,
        }
    }

    fn request(&self, title: &str, text: &str) -> ChatRequest {
        let text = truncate_to_char_boundary(text, self.max_input_chars);
        self.json_request(article_analysis_prompt(title, text))
    }

    fn json_request(&self, prompt: impl Into<String>) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: self.temperature,
            response_format: ResponseFormat::json_object(),
        }
    }

    /// Send a trivial JSON-mode request and require `{"status": <string>}`
    /// back. Nothing is retried or persisted.
    #[instrument(level = "info", skip_all, fields(model = %self.model))]
    pub async fn check_gateway(&self) -> Result<GatewayCheck, ExtractionError> {
        let t0 = Instant::now();
        let raw = self.gateway.complete(&self.json_request(GATEWAY_CHECK_PROMPT)).await?;
        let object = parse_object(&raw)?;

        let Some(Value::String(status)) = object.get("status") else {
            return Err(ExtractionError::Validation {
                raw,
                violations: vec![FieldViolation {
                    path: "status".to_string(),
                    message: "expected a string".to_string(),
                }],
            });
        };

        let check = GatewayCheck {
            model: self.model.clone(),
            status: status.clone(),
            elapsed_ms: t0.elapsed().as_millis() as u64,
        };
        info!(status = %check.status, elapsed_ms = check.elapsed_ms, "Gateway answered");
        Ok(check)
    }
}

/// Parse and validate raw model output.
pub fn parse_model_output(raw: &str) -> Result<ExtractionResult, ExtractionError> {
    let object = parse_object(raw)?;
    let analysis = validate_analysis(&object).map_err(|violations| ExtractionError::Validation {
        raw: raw.to_string(),
        violations,
    })?;

    Ok(ExtractionResult {
        completeness: analysis.completeness,
        relevance: analysis.relevance,
        language: analysis.language,
        location: analysis.location,
        summary: analysis.summary.as_ref().map(normalize_summary),
    })
}

/// Strip code fences, parse, and unwrap the array quirk.
fn parse_object(raw: &str) -> Result<Map<String, Value>, ExtractionError> {
    let payload = strip_code_blocks(raw);
    let value: Value = serde_json::from_str(payload).map_err(|source| {
        if looks_truncated(&source) {
            warn!(raw_len = payload.len(), "Model output looks truncated");
        }
        ExtractionError::Parse {
            raw: raw.to_string(),
            source,
        }
    })?;

    into_object(value, raw)
}

/// Unwrap the array quirk: `[{...}]` is treated as `{...}`.
fn into_object(value: Value, raw: &str) -> Result<Map<String, Value>, ExtractionError> {
    let value = match value {
        Value::Array(items) => {
            debug!(len = items.len(), "Model returned an array; using its first element");
            items
                .into_iter()
                .next()
                .ok_or_else(|| ExtractionError::EmptyArray { raw: raw.to_string() })?
        }
        other => other,
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(ExtractionError::NotAnObject { raw: raw.to_string() }),
    }
}

impl<G: LlmGateway> Analyzer for ExtractionService<G> {
    #[instrument(level = "info", skip_all, fields(title = %truncate_for_log(title, 80)))]
    async fn analyze(&self, title: &str, text: &str) -> Result<ExtractionResult, ExtractionError> {
        let t0 = Instant::now();
        let request = self.request(title, text);
        let raw = self.gateway.complete(&request).await?;

        match parse_model_output(&raw) {
            Ok(result) => {
                debug!(
                    elapsed_ms = t0.elapsed().as_millis() as u64,
                    completeness = %result.completeness,
                    relevance = %result.relevance,
                    language = %result.language,
                    "Extraction succeeded"
                );
                Ok(result)
            }
            Err(e) => {
                warn!(error = %e, raw = %truncate_for_log(&raw, 500), "Extraction failed");
                Err(e)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ScriptedGateway, VALID};
    use super::*;
    use crate::models::{Completeness, Relevance};

    fn service(replies: Vec<Result<String, u16>>) -> ExtractionService<ScriptedGateway> {
        ExtractionService::new(ScriptedGateway::new(replies), &LlmConfig::default())
    }

    #[test]
    fn test_array_wrapped_equals_bare_object() {
        let bare = parse_model_output(VALID).unwrap();
        let wrapped = parse_model_output(&format!("[{VALID}]")).unwrap();
        assert_eq!(bare, wrapped);
        assert_eq!(bare.completeness, Completeness::Complete);
        assert_eq!(bare.relevance, Relevance::Relevant);
        assert_eq!(
            bare.summary.as_deref(),
            Some(
                "HEADLINE: Dam breaks\nENTITIES: Vale, Minas Gerais\nEVENT: A tailings dam collapsed.\nCONTEXT: Second failure in four years."
            )
        );
    }

    #[test]
    fn test_code_fenced_output_is_accepted() {
        let fenced = format!("```json\n{VALID}\n```");
        assert_eq!(parse_model_output(&fenced).unwrap(), parse_model_output(VALID).unwrap());
    }

    #[test]
    fn test_absent_summary_is_none() {
        let result = parse_model_output(
            r#"{"completeness":"PARTIAL_USELESS","relevance":"NOT_RELEVANT","language":"es","location":null}"#,
        )
        .unwrap();
        assert_eq!(result.summary, None);
        assert_eq!(result.location, None);
    }

    #[test]
    fn test_parse_failures_are_tagged() {
        assert!(matches!(
            parse_model_output("not json at all").unwrap_err(),
            ExtractionError::Parse { .. }
        ));
        assert!(matches!(parse_model_output("[]").unwrap_err(), ExtractionError::EmptyArray { .. }));
        assert!(matches!(parse_model_output("\"text\"").unwrap_err(), ExtractionError::NotAnObject { .. }));
        assert!(matches!(parse_model_output("[1, 2]").unwrap_err(), ExtractionError::NotAnObject { .. }));
    }

    #[test]
    fn test_validation_error_carries_raw_and_fields() {
        let raw = r#"{"completeness":"FULL","relevance":"RELEVANT"}"#;
        match parse_model_output(raw).unwrap_err() {
            ExtractionError::Validation { raw: got, violations } => {
                assert_eq!(got, raw);
                let paths: Vec<_> = violations.iter().map(|v| v.path.clone()).collect();
                assert_eq!(paths, vec!["completeness", "language"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_service_sends_deterministic_json_request() {
        let svc = service(vec![Ok(VALID.to_string())]);
        let result = svc.analyze("Dam breaks", "Body").await.unwrap();
        assert_eq!(result.location.as_deref(), Some("Brazil"));

        let requests = svc.gateway.requests.borrow();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "google/gemini-2.0-flash-001");
        assert_eq!(requests[0].temperature, 0.0);
        assert_eq!(requests[0].response_format.kind, "json_object");
        assert!(requests[0].messages[0].content.contains("Dam breaks"));
    }

    #[tokio::test]
    async fn test_service_truncates_long_text() {
        let mut svc = service(vec![Ok(VALID.to_string())]);
        svc.max_input_chars = 10;
        svc.analyze("t", &"é".repeat(50)).await.unwrap();
        let prompt = svc.gateway.requests.borrow()[0].messages[0].content.clone();
        assert!(prompt.contains(&"é".repeat(5)));
        assert!(!prompt.contains(&"é".repeat(6)));
    }

    #[tokio::test]
    async fn test_gateway_check_reads_status() {
        let svc = service(vec![Ok("```json\n{\"status\": \"working\"}\n```".to_string())]);
        let check = svc.check_gateway().await.unwrap();
        assert_eq!(check.status, "working");
        assert_eq!(check.model, "google/gemini-2.0-flash-001");

        let requests = svc.gateway.requests.borrow();
        assert_eq!(requests[0].messages[0].content, GATEWAY_CHECK_PROMPT);
        assert_eq!(requests[0].response_format.kind, "json_object");
    }

    #[tokio::test]
    async fn test_gateway_check_rejects_missing_status() {
        let svc = service(vec![Ok(r#"{"state": "ok"}"#.to_string())]);
        match svc.check_gateway().await.unwrap_err() {
            ExtractionError::Validation { violations, .. } => assert_eq!(violations[0].path, "status"),
            other => panic!("unexpected error: {other}"),
        }

        let down = service(vec![Err(401)]);
        assert!(matches!(down.check_gateway().await.unwrap_err(), ExtractionError::Gateway(_)));
    }

    #[tokio::test]
    async fn test_gateway_status_is_surfaced() {
        let svc = service(vec![Err(502)]);
        let err = svc.analyze("t", "body").await.unwrap_err();
        assert!(matches!(err, ExtractionError::Gateway(_)));
    }
}
