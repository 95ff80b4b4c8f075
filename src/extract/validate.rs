//! Schema validation of model output.
//!
//! Every violation is collected, not just the first, so a failed extraction
//! can be diagnosed from a single log line.

use serde_json::{Map, Value};

use crate::error::FieldViolation;
use crate::models::{Completeness, Relevance};

/// Model output that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleAnalysis {
    pub completeness: Completeness,
    pub relevance: Relevance,
    pub language: String,
    pub location: Option<String>,
    pub summary: Option<SummaryFields>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SummaryFields {
    pub headline: Option<String>,
    pub entities: Option<Entities>,
    pub event: Option<String>,
    pub context: Option<String>,
}

/// Models return entities either as a list or as one delimited string.
#[derive(Debug, Clone, PartialEq)]
pub enum Entities {
    List(Vec<String>),
    Text(String),
}

struct Checker {
    violations: Vec<FieldViolation>,
}

impl Checker {
    fn violation(&mut self, path: &str, message: impl Into<String>) {
        self.violations.push(FieldViolation {
            path: path.to_string(),
            message: message.into(),
        });
    }

    fn required_str<'v>(&mut self, obj: &'v Map<String, Value>, key: &str) -> Option<&'v str> {
        match obj.get(key) {
            None | Some(Value::Null) => {
                self.violation(key, "required");
                None
            }
            Some(Value::String(s)) => Some(s),
            Some(other) => {
                self.violation(key, format!("expected string, got {}", type_name(other)));
                None
            }
        }
    }

    fn optional_str(&mut self, obj: &Map<String, Value>, key: &str, path: &str) -> Option<String> {
        match obj.get(key) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                self.violation(path, format!("expected string, got {}", type_name(other)));
                None
            }
        }
    }

    fn one_of<T>(&mut self, key: &str, value: Option<&str>, allowed: &[&str], parse: fn(&str) -> Option<T>) -> Option<T> {
        let raw = value?;
        let parsed = parse(raw.trim());
        if parsed.is_none() {
            self.violation(key, format!("expected one of {}, got {raw:?}", allowed.join(" | ")));
        }
        parsed
    }

    fn summary(&mut self, value: Option<&Value>) -> Option<SummaryFields> {
        let obj = match value {
            None | Some(Value::Null) => return None,
            Some(Value::Object(obj)) => obj,
            Some(other) => {
                self.violation("summary", format!("expected object, got {}", type_name(other)));
                return None;
            }
        };

        let entities = match obj.get("ENTITIES") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(Entities::Text(s.clone())),
            Some(Value::Array(items)) => {
                let mut names = Vec::with_capacity(items.len());
                for (i, item) in items.iter().enumerate() {
                    match item {
                        Value::String(s) => names.push(s.clone()),
                        other => self.violation(
                            &format!("summary.ENTITIES[{i}]"),
                            format!("expected string, got {}", type_name(other)),
                        ),
                    }
                }
                Some(Entities::List(names))
            }
            Some(other) => {
                self.violation(
                    "summary.ENTITIES",
                    format!("expected list of strings or string, got {}", type_name(other)),
                );
                None
            }
        };

        Some(SummaryFields {
            headline: self.optional_str(obj, "HEADLINE", "summary.HEADLINE"),
            entities,
            event: self.optional_str(obj, "EVENT", "summary.EVENT"),
            context: self.optional_str(obj, "CONTEXT", "summary.CONTEXT"),
        })
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn is_language_code(code: &str) -> bool {
    code.len() == 2 && code.chars().all(|c| c.is_ascii_alphabetic())
}

/// Validate a JSON object against the analysis schema.
pub fn validate_analysis(obj: &Map<String, Value>) -> Result<ArticleAnalysis, Vec<FieldViolation>> {
    let mut check = Checker { violations: Vec::new() };

    let completeness_raw = check.required_str(obj, "completeness");
    let completeness = check.one_of("completeness", completeness_raw, &Completeness::ALL, Completeness::parse);

    let relevance_raw = check.required_str(obj, "relevance");
    let relevance = check.one_of("relevance", relevance_raw, &Relevance::ALL, Relevance::parse);

    let language = check.required_str(obj, "language").and_then(|raw| {
        let code = raw.trim();
        if is_language_code(code) {
            Some(code.to_ascii_lowercase())
        } else {
            check.violation("language", format!("expected two-letter language code, got {raw:?}"));
            None
        }
    });

    let location = check
        .optional_str(obj, "location", "location")
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty());

    let summary = check.summary(obj.get("summary"));

    match (completeness, relevance, language) {
        (Some(completeness), Some(relevance), Some(language)) if check.violations.is_empty() => Ok(ArticleAnalysis {
            completeness,
            relevance,
            language,
            location,
            summary,
        }),
        _ => Err(check.violations),
    }
}
