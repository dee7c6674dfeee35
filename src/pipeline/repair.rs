//! Structured-output repair for near-JSON model responses.
//!
//! Models regularly wrap JSON in markdown fences, write a bare `None` where
//! JSON needs `null`, or add a sentence around the object. `repair_json`
//! walks an escalating list of rewrites and tries a structural parse after
//! each one, so valid input is returned untouched by the first step.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// `"unit": None` → `"unit": null`
static KEY_VALUE_NONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(:\s*)None\b").unwrap());
/// `None,` / `None]` / `None}` → `null,` / `null]` / `null}`
static TRAILING_NONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bNone(\s*[,\]}])").unwrap());
/// `[None` / `, None` → `[null` / `, null`
static LEADING_NONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([\[,]\s*)None\b").unwrap());

/// Every escalation step failed to produce parseable JSON.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed output after {steps} repair steps: {last_error}")]
pub struct MalformedOutput {
    /// The text exactly as the model produced it.
    pub raw: String,
    pub steps: usize,
    pub last_error: String,
}

/// Strip a markdown code fence that encloses the payload, if any.
///
/// A fence only counts when it opens before the first `{`; a run of
/// backticks inside a JSON string value is left alone. Prefers a
/// ```` ```json ```` block, then any fenced block; otherwise returns the
/// trimmed input.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let payload_start = trimmed.find('{').or_else(|| trimmed.find('['));
    let encloses = |fence: usize| payload_start.map_or(true, |payload| fence < payload);

    let opening = trimmed
        .find("```json")
        .filter(|&i| encloses(i))
        .map(|i| i + 7)
        .or_else(|| trimmed.find("```").filter(|&i| encloses(i)).map(|i| i + 3));
    let Some(body_start) = opening else {
        return trimmed;
    };

    // Skip a language identifier such as `python`.
    let after_fence = &trimmed[body_start..];
    let body = after_fence.trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_' || c == '-');

    // JSON strings cannot hold a raw newline, so a fence at line start is
    // always the closing one.
    let end = body.find("\n```").or_else(|| body.rfind("```"));
    match end {
        Some(end) => body[..end].trim(),
        None => trimmed,
    }
}

/// Apply `rewrite` to the text outside JSON string literals only.
fn rewrite_unquoted(text: &str, rewrite: Step) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut segment_start = 0;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
                out.push_str(&text[segment_start..=i]);
                segment_start = i + 1;
            }
        } else if c == '"' {
            out.push_str(&rewrite(&text[segment_start..i]));
            in_string = true;
            segment_start = i;
        }
    }

    let tail = &text[segment_start..];
    if in_string {
        out.push_str(tail);
    } else {
        out.push_str(&rewrite(tail));
    }
    out
}

fn key_value_none(segment: &str) -> Cow<'_, str> {
    KEY_VALUE_NONE.replace_all(segment, "${1}null")
}

fn positional_none(segment: &str) -> Cow<'_, str> {
    let trailing = TRAILING_NONE.replace_all(segment, "null${1}");
    Cow::Owned(LEADING_NONE.replace_all(&trailing, "${1}null").into_owned())
}

fn replace_key_value_none(text: &str) -> Cow<'_, str> {
    Cow::Owned(rewrite_unquoted(text, key_value_none))
}

fn replace_positional_none(text: &str) -> Cow<'_, str> {
    Cow::Owned(rewrite_unquoted(text, positional_none))
}

/// First `{` to last `}` (or `[`..`]`), dropping prose around the payload.
fn slice_outer_object(text: &str) -> Cow<'_, str> {
    for (open, close) in [('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (text.find(open), text.rfind(close)) {
            if start < end {
                return Cow::Borrowed(&text[start..=end]);
            }
        }
    }
    Cow::Borrowed(text)
}

type Step = fn(&str) -> Cow<'_, str>;

/// Escalation order. Each step is applied on top of the previous ones.
const STEPS: &[Step] = &[
    replace_key_value_none,
    replace_positional_none,
    slice_outer_object,
];

/// Repair near-JSON text into a structured value.
///
/// When `allow_list` is given and the result is an object, keys outside the
/// list are dropped. Keys inside the list are never touched.
pub fn repair_json(raw: &str, allow_list: Option<&[&str]>) -> Result<Value, MalformedOutput> {
    if let Ok(value) = serde_json::from_str::<Value>(raw.trim()) {
        return Ok(filter_fields(value, allow_list));
    }

    let mut candidate = strip_code_fence(raw).to_string();
    let mut last_error = match serde_json::from_str::<Value>(&candidate) {
        Ok(value) => return Ok(filter_fields(value, allow_list)),
        Err(e) => e.to_string(),
    };

    for (index, step) in STEPS.iter().enumerate() {
        candidate = step(&candidate).into_owned();
        match serde_json::from_str::<Value>(&candidate) {
            Ok(value) => {
                tracing::debug!(step = index + 1, "structured output repaired");
                return Ok(filter_fields(value, allow_list));
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(MalformedOutput {
        raw: raw.to_string(),
        steps: STEPS.len() + 1,
        last_error,
    })
}

/// Drop object keys that are not in `allow_list`.
pub fn filter_fields(value: Value, allow_list: Option<&[&str]>) -> Value {
    match (value, allow_list) {
        (Value::Object(map), Some(allowed)) => Value::Object(
            map.into_iter()
                .filter(|(key, _)| allowed.contains(&key.as_str()))
                .collect(),
        ),
        (value, _) => value,
    }
}
