//! Best-effort recovery of JSON from model output.
//!
//! Long structured generations get cut off mid-object, leave trailing commas, or
//! lose closing brackets. Recovery runs in stages and stops at the first value
//! that parses:
//!
//! 1. Direct parse.
//! 2. Close out: drop a trailing comma, close an odd quote, then append the
//!    closers for every bracket still open outside of strings.
//! 3. Truncate at the last complete `},` and try a fixed set of suffixes that
//!    close the risk list and its envelope.
//!
//! If nothing parses, the original parse error is returned. Recovery never
//! invents risk entries; the only synthesized content is the top-level summary
//! placeholder in stage 3.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*$").expect("Invalid trailing comma regex"));

static OBJECT_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\}\s*,").expect("Invalid object boundary regex"));

/// Suffixes tried after truncating at the last complete risk object, in order.
const ENVELOPE_SUFFIXES: [&str; 3] = [
    r#"]},"overall_risk_score":5,"summary":"Analysis truncated.","recommendations":[]}"#,
    "]}",
    "]}}}",
];

/// Number of characters of the raw output kept on the error for diagnostics.
const PREVIEW_CHARS: usize = 200;

#[derive(Debug, thiserror::Error)]
#[error("model output is not valid JSON: {source}")]
pub struct RepairError {
    #[source]
    pub source: serde_json::Error,
    /// Leading slice of the raw output.
    pub preview: String,
}

/// Parse `raw` as JSON, repairing truncation damage if needed.
pub fn repair_json(raw: &str) -> Result<Value, RepairError> {
    let text = strip_code_fence(raw.trim());

    let original_error = match serde_json::from_str::<Value>(text) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    if let Ok(value) = serde_json::from_str::<Value>(&close_unbalanced(text)) {
        tracing::debug!("recovered model output by closing open brackets");
        return Ok(value);
    }

    if let Some(value) = close_at_last_object(text) {
        tracing::debug!("recovered model output by truncating at last complete object");
        return Ok(value);
    }

    Err(RepairError {
        source: original_error,
        preview: text.chars().take(PREVIEW_CHARS).collect(),
    })
}

/// Stage 2: close every quote and bracket left open at the end of `text`.
pub fn close_unbalanced(text: &str) -> String {
    let mut base = TRAILING_COMMA.replace(text, "").into_owned();

    let quotes = base.matches('"').count();
    let escaped = base.matches("\\\"").count();
    if quotes.saturating_sub(escaped) % 2 != 0 {
        base.push('"');
    }

    let closers = open_bracket_closers(&base);

    let mut candidate = TRAILING_COMMA.replace(&base, "").into_owned();
    candidate.extend(closers.iter().rev());
    candidate
}

/// Closers for the brackets still open outside of string literals, in opening order.
fn open_bracket_closers(text: &str) -> Vec<char> {
    let mut stack = Vec::new();
    let mut in_string = false;
    let mut escape = false;

    for ch in text.chars() {
        if escape {
            escape = false;
            continue;
        }
        match ch {
            '\\' => escape = true,
            '"' => in_string = !in_string,
            _ if in_string => {}
            '{' => stack.push('}'),
            '[' => stack.push(']'),
            '}' | ']' => {
                if stack.last() == Some(&ch) {
                    stack.pop();
                }
            }
            _ => {}
        }
    }
    stack
}

/// Stage 3: cut after the last complete object followed by a comma and close the envelope.
fn close_at_last_object(text: &str) -> Option<Value> {
    let boundary = OBJECT_BOUNDARY.find_iter(text).last()?;
    // Keep the closing brace, drop the comma.
    let truncated = &text[..boundary.end() - 1];

    ENVELOPE_SUFFIXES.iter().find_map(|suffix| {
        let candidate = format!("{truncated}{suffix}");
        serde_json::from_str::<Value>(&candidate).ok()
    })
}

/// Remove a surrounding markdown code fence, if present.
pub fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest
        .strip_prefix("json")
        .or_else(|| rest.strip_prefix("JSON"))
        .unwrap_or(rest);
    let rest = rest.trim_start();
    rest.strip_suffix("```").unwrap_or(rest).trim_end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_json_is_returned_unchanged() {
        let raw = r#"{"risks": [{"title": "a"}], "overall_risk_score": 6.5}"#;
        let expected: Value = serde_json::from_str(raw).unwrap();
        assert_eq!(repair_json(raw).unwrap(), expected);
        // Stage 2 is a no-op on balanced input.
        assert_eq!(
            serde_json::from_str::<Value>(&close_unbalanced(raw)).unwrap(),
            expected
        );
    }

    #[test]
    fn truncated_risk_list_recovers_one_entry() {
        let value = repair_json(r#"{"risks":[{"title":"a"},"#).unwrap();
        let risks = value["risks"].as_array().unwrap();
        assert_eq!(risks.len(), 1);
        assert_eq!(risks[0]["title"], "a");
    }

    #[test]
    fn unterminated_string_is_closed() {
        let value = repair_json(r#"{"risks":[{"title":"crowd surge at gate"#).unwrap();
        assert_eq!(value["risks"][0]["title"], "crowd surge at gate");
    }

    #[test]
    fn brackets_inside_strings_are_ignored() {
        let value = repair_json(r#"{"risks":[{"title":"stage [A] {north}","severity":7}"#).unwrap();
        assert_eq!(value["risks"][0]["title"], "stage [A] {north}");
        assert_eq!(value["risks"][0]["severity"], 7);
    }

    #[test]
    fn falls_back_to_last_complete_object() {
        // The dangling key defeats stage 2, so stage 3 cuts at the last `},`.
        let raw = r#"{"risks":[{"title":"a"},{"title":"b"},{"title":"c","severity":"#;
        let value = repair_json(raw).unwrap();
        let risks = value["risks"].as_array().unwrap();
        assert_eq!(risks.len(), 2);
        assert_eq!(risks[1]["title"], "b");
        assert!(value.get("summary").is_none());
    }

    #[test]
    fn nested_envelope_gets_placeholder_summary() {
        let raw = r#"{"result":{"risks":[{"title":"a"},{"title":"b","sev"#;
        let value = repair_json(raw).unwrap();
        assert_eq!(value["result"]["risks"].as_array().unwrap().len(), 1);
        assert_eq!(value["summary"], "Analysis truncated.");
        assert_eq!(value["overall_risk_score"], 5);
        assert_eq!(value["recommendations"], json!([]));
    }

    #[test]
    fn unrecoverable_text_returns_original_error() {
        let err = repair_json("the model said no").unwrap_err();
        assert!(err.preview.starts_with("the model"));
        assert!(err.to_string().contains("not valid JSON"));
    }

    #[test]
    fn code_fences_are_stripped() {
        let raw = "```json\n{\"risks\": []}\n```";
        assert_eq!(repair_json(raw).unwrap(), json!({"risks": []}));
    }

    #[test]
    fn escaped_quotes_do_not_unbalance() {
        let raw = r#"{"risks":[{"title":"the \"east\" gate"}"#;
        let value = repair_json(raw).unwrap();
        assert_eq!(value["risks"][0]["title"], "the \"east\" gate");
    }
}
