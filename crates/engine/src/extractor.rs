//! Pulls the payload out of console text.
//!
//! The console mixes the result with prompts, timing lines and sometimes
//! banners. Strategies run from cheapest to most forgiving and the first one
//! that yields valid JSON wins.

use dubbo_invoke_types::InvokeError;
use serde_json::Value;
use tracing::debug;

use crate::assembler::{PROMPT_MARKER, TIMING_MARKERS, console_payload, has_error_phrase, is_business_null};

#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    pub payload: Option<Value>,
    pub is_business_null: bool,
}

impl Extraction {
    fn value(payload: Value) -> Self {
        Self {
            payload: Some(payload),
            is_business_null: false,
        }
    }

    fn business_null() -> Self {
        Self {
            payload: None,
            is_business_null: true,
        }
    }
}

/// Extracts the payload of one response. Error phrases win over any JSON in
/// the same text and come back as [`InvokeError::RemoteError`] carrying the
/// raw text.
pub fn extract(text: &str) -> Result<Extraction, InvokeError> {
    if has_error_phrase(text) {
        return Err(InvokeError::remote(text));
    }
    if is_business_null(text) {
        return Ok(Extraction::business_null());
    }

    let content = console_payload(text);
    if let Ok(value) = serde_json::from_str::<Value>(&content) {
        return Ok(Extraction::value(value));
    }
    if content.starts_with('[')
        && let Some(value) = repair_array(&content)
    {
        debug!(bytes = content.len(), "recovered truncated array");
        return Ok(Extraction::value(value));
    }
    if let Some(value) = longest_balanced_span(&content) {
        return Ok(Extraction::value(value));
    }
    if let Some(value) = scan_lines(text) {
        return Ok(Extraction::value(value));
    }
    Err(InvokeError::no_payload(text))
}

/// Truncates after the last complete top-level object and closes the array.
pub fn repair_array(text: &str) -> Option<Value> {
    let mut depth = 0usize;
    let mut last_complete = None;
    for (index, byte) in text.bytes().enumerate() {
        match byte {
            b'{' => depth += 1,
            b'}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    last_complete = Some(index);
                }
            }
            _ => {}
        }
    }
    let end = last_complete?;
    serde_json::from_str(&format!("{}]", &text[..=end])).ok()
}

/// Longest `[...]` or `{...}` span that parses. Each kind counts only its own
/// delimiters, and delimiters inside string literals are counted too, so a
/// payload whose strings carry unbalanced brackets may be missed here.
pub fn longest_balanced_span(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut best: Option<(usize, Value)> = None;
    for (open, close) in [(b'[', b']'), (b'{', b'}')] {
        for start in (0..bytes.len()).filter(|index| bytes[*index] == open) {
            let mut depth = 0usize;
            for (index, byte) in bytes.iter().enumerate().skip(start) {
                if *byte == open {
                    depth += 1;
                } else if *byte == close {
                    depth -= 1;
                    if depth == 0 {
                        let span = &text[start..=index];
                        if best.as_ref().is_none_or(|(length, _)| span.len() > *length)
                            && let Ok(value) = serde_json::from_str::<Value>(span)
                        {
                            best = Some((span.len(), value));
                        }
                        break;
                    }
                }
            }
        }
    }
    best.map(|(_, value)| value)
}

/// Line by line: accumulate from an opening line until a closing line makes
/// the whole parse, or accept a lone scalar line.
fn scan_lines(text: &str) -> Option<Value> {
    let mut accumulated = String::new();
    let mut closer = None;

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with(TIMING_MARKERS[0]) || line.starts_with(PROMPT_MARKER) {
            continue;
        }
        if closer.is_none() && line.starts_with(['{', '[']) {
            closer = Some(if line.starts_with('{') { '}' } else { ']' });
        }
        if let Some(close) = closer {
            accumulated.push_str(line);
            if line.ends_with(close)
                && let Ok(value) = serde_json::from_str::<Value>(&accumulated)
            {
                return Some(value);
            }
            continue;
        }
        if let Some(value) = scalar_line(line) {
            return Some(value);
        }
    }

    match closer {
        Some(_) => serde_json::from_str(&accumulated)
            .ok()
            .or_else(|| accumulated.starts_with('[').then(|| repair_array(&accumulated)).flatten()),
        None => None,
    }
}

/// A quoted string (unwrapped when it holds JSON), a number or a boolean.
fn scalar_line(line: &str) -> Option<Value> {
    if line.len() > 2 && line.starts_with('"') && line.ends_with('"') {
        if let Ok(inner) = serde_json::from_str::<String>(line) {
            return Some(match serde_json::from_str::<Value>(&inner) {
                Ok(nested @ (Value::Object(_) | Value::Array(_))) => nested,
                _ => Value::String(inner),
            });
        }
        return serde_json::from_str::<Value>(&line[1..line.len() - 1])
            .ok()
            .filter(|value| value.is_object() || value.is_array());
    }
    match serde_json::from_str::<Value>(line) {
        Ok(value @ (Value::Number(_) | Value::Bool(_))) => Some(value),
        _ => None,
    }
}
