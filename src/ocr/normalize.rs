//! Result shape normalization
//!
//! Recognition backends disagree on what a result looks like, and the same
//! backend changes shape between versions. This module folds every shape we
//! know about into one [`OcrResult`] and treats anything else as "no text".
//!
//! Shapes are tried in a fixed order:
//!
//! 1. `[line, line, ...]` where a line is `{"text", "score"}` or `[box, [text, score]]`
//! 2. `[[line, ...], ...]`, one inner list per page
//! 3. `{"rec_texts": [...], "rec_scores": [...]}`
//! 4. `{"res": {"rec_texts": [...], "rec_scores": [...]}}`, one level of nesting
//!
//! A list of mappings shaped like 3 or 4 is read page by page. Everything else,
//! including `null` and `[]`, is the empty result.

use serde_json::{Map, Value};

use super::types::OcrResult;

const TEXTS_KEY: &str = "rec_texts";
const SCORES_KEY: &str = "rec_scores";

/// Classified raw result
#[derive(Debug)]
enum RawShape<'a> {
    /// Flat list of line records
    Lines(&'a [Value]),
    /// List of line lists
    Wrapped(&'a [Value]),
    /// List of page mappings
    Pages(&'a [Value]),
    /// Mapping with parallel `rec_texts` / `rec_scores`
    Columns(&'a Map<String, Value>),
    /// Mapping whose values carry `rec_texts` / `rec_scores`
    Nested(&'a Map<String, Value>),
    Unrecognized,
}

/// Normalize a backend raw result. Never fails.
pub fn normalize(raw: &Value) -> OcrResult {
    let mut result = OcrResult::empty();
    collect(raw, &mut result);
    result
}

fn collect(raw: &Value, out: &mut OcrResult) {
    match classify(raw) {
        RawShape::Lines(items) => collect_lines(items, out),
        RawShape::Wrapped(pages) => {
            for page in pages {
                if let Value::Array(items) = page {
                    collect_lines(items, out);
                }
            }
        }
        RawShape::Pages(pages) => {
            for page in pages {
                if let Value::Object(map) = page {
                    collect_mapping(map, out);
                }
            }
        }
        RawShape::Columns(map) | RawShape::Nested(map) => collect_mapping(map, out),
        RawShape::Unrecognized => {}
    }
}

fn classify(raw: &Value) -> RawShape<'_> {
    match raw {
        Value::Array(items) if items.is_empty() => RawShape::Unrecognized,
        Value::Array(items) => {
            if items.iter().any(|item| line_record(item).is_some()) {
                RawShape::Lines(items)
            } else if items.iter().any(is_line_list) {
                RawShape::Wrapped(items)
            } else if items.iter().any(|item| item.as_object().is_some_and(is_page_mapping)) {
                RawShape::Pages(items)
            } else {
                RawShape::Unrecognized
            }
        }
        Value::Object(map) if has_columns(map) => RawShape::Columns(map),
        Value::Object(map) if has_nested_columns(map) => RawShape::Nested(map),
        _ => RawShape::Unrecognized,
    }
}

fn has_columns(map: &Map<String, Value>) -> bool {
    map.contains_key(TEXTS_KEY)
}

fn has_nested_columns(map: &Map<String, Value>) -> bool {
    map.values()
        .any(|value| value.as_object().is_some_and(has_columns))
}

fn is_page_mapping(map: &Map<String, Value>) -> bool {
    has_columns(map) || has_nested_columns(map)
}

fn is_line_list(value: &Value) -> bool {
    value
        .as_array()
        .is_some_and(|items| items.iter().any(|item| line_record(item).is_some()))
}

/// Text and score of a line record, if `value` looks like one.
///
/// The text is returned unvalidated; filtering happens in [`push_line`].
fn line_record(value: &Value) -> Option<(&Value, Option<&Value>)> {
    match value {
        Value::Object(map) => {
            let text = map.get("text")?;
            let score = map.get("score").or_else(|| map.get("confidence"));
            Some((text, score))
        }
        // Classic PaddleOCR line: [box, [text, score]]
        Value::Array(parts) if parts.len() == 2 => {
            let pair = parts[1].as_array()?;
            let text = pair.first().filter(|text| text.is_string())?;
            Some((text, pair.get(1)))
        }
        _ => None,
    }
}

fn collect_lines(items: &[Value], out: &mut OcrResult) {
    for item in items {
        if let Some((text, score)) = line_record(item) {
            push_line(text, score, out);
        }
    }
}

fn collect_mapping(map: &Map<String, Value>, out: &mut OcrResult) {
    if has_columns(map) {
        collect_columns(map, out);
        return;
    }

    for value in map.values() {
        if let Some(inner) = value.as_object().filter(|inner| has_columns(inner)) {
            collect_columns(inner, out);
        }
    }
}

fn collect_columns(map: &Map<String, Value>, out: &mut OcrResult) {
    let Some(texts) = map.get(TEXTS_KEY).and_then(Value::as_array) else {
        return;
    };
    let scores = map
        .get(SCORES_KEY)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    for (index, text) in texts.iter().enumerate() {
        push_line(text, scores.get(index), out);
    }
}

fn push_line(text: &Value, score: Option<&Value>, out: &mut OcrResult) {
    let Some(text) = text.as_str().map(str::trim).filter(|text| !text.is_empty()) else {
        return;
    };
    let score = score.and_then(Value::as_f64).unwrap_or(0.0);
    out.push(text, score);
}
