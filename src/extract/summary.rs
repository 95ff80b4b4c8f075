//! Four-line summary derivation.

use itertools::Itertools;

use super::validate::{Entities, SummaryFields};

/// Render summary fields as
/// `HEADLINE: ..\nENTITIES: ..\nEVENT: ..\nCONTEXT: ..`, trimmed as a whole.
///
/// Missing fields render as empty values. A list of entities is joined with
/// `", "`; a string is used verbatim, so both forms of the same entities
/// produce the same line.
pub fn normalize_summary(fields: &SummaryFields) -> String {
    let entities = match &fields.entities {
        Some(Entities::List(items)) => items.iter().map(|s| s.trim()).join(", "),
        Some(Entities::Text(text)) => text.trim().to_string(),
        None => String::new(),
    };
    let line = |v: &Option<String>| v.as_deref().map(str::trim).unwrap_or_default().to_string();

    format!(
        "HEADLINE: {}\nENTITIES: {}\nEVENT: {}\nCONTEXT: {}",
        line(&fields.headline),
        entities,
        line(&fields.event),
        line(&fields.context),
    )
    .trim()
    .to_string()
}
