//! Recovering a JSON object from free-form model output.
//!
//! Models asked for structured output still wrap it in markdown fences, put a
//! sentence in front of it, or get cut off at the token ceiling. The
//! extraction tries, in order:
//! 1. a fenced ```` ```json ```` block
//! 2. any fenced block whose body is an object
//! 3. the whole (trimmed) response, when it is an object
//! 4. the first balanced `{...}` found by brace matching
//!
//! Candidates are accepted only if they parse as JSON. When an object starts
//! but never closes the result is [`JsonExtractionError::Truncated`], which
//! callers usually want to report differently from plain prose.
//!
//! ```
//! use report_forge::utils::json_extraction::extract_json_object;
//!
//! let reply = "Here you go:\n```json\n{\"executiveSummary\": \"ok\"}\n```";
//! let json = extract_json_object(reply).unwrap();
//! assert_eq!(json, "{\"executiveSummary\": \"ok\"}");
//! ```

use std::sync::OnceLock;

use regex::Regex;
use thiserror::Error;

/// Error type for JSON extraction failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces, {unclosed_brackets} unclosed brackets")]
    Truncated {
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    #[error("No JSON object found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Brace/bracket balance of a piece of text, ignoring string contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonStructureAnalysis {
    pub unclosed_braces: usize,
    pub unclosed_brackets: usize,
    /// Whether the text ended inside a string literal.
    pub in_string: bool,
    /// Byte offset of the first `{`.
    pub object_start: Option<usize>,
}

/// Scan `s` tracking brace and bracket depth outside string literals.
pub fn analyze_json_structure(s: &str) -> JsonStructureAnalysis {
    let mut braces: isize = 0;
    let mut brackets: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;
    let mut object_start = None;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => {
                object_start.get_or_insert(i);
                braces += 1;
            }
            '}' if !in_string => braces -= 1,
            '[' if !in_string => brackets += 1,
            ']' if !in_string => brackets -= 1,
            _ => {}
        }
    }

    JsonStructureAnalysis {
        unclosed_braces: braces.max(0) as usize,
        unclosed_brackets: brackets.max(0) as usize,
        in_string,
        object_start,
    }
}

/// Byte index of the `}` closing the `{` at `start`, if it is balanced.
pub fn find_matching_brace(s: &str, start: usize) -> Option<usize> {
    if s.as_bytes().get(start) != Some(&b'{') {
        return None;
    }
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, c) in s[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)```[ \t]*([A-Za-z0-9_-]*)[ \t]*\r?\n(.*?)```").ok())
        .as_ref()
}

fn is_object(candidate: &str) -> bool {
    matches!(
        serde_json::from_str::<serde_json::Value>(candidate),
        Ok(serde_json::Value::Object(_))
    )
}

/// Fenced block bodies, `json`-tagged ones first.
fn fenced_bodies(response: &str) -> Vec<&str> {
    let Some(fence) = fence_regex() else {
        return Vec::new();
    };
    let mut tagged = Vec::new();
    let mut untagged = Vec::new();
    for captures in fence.captures_iter(response) {
        let body = captures.get(2).map(|m| m.as_str().trim()).unwrap_or("");
        let lang = captures.get(1).map(|m| m.as_str()).unwrap_or("");
        if lang.eq_ignore_ascii_case("json") {
            tagged.push(body);
        } else {
            untagged.push(body);
        }
    }
    tagged.extend(untagged);
    tagged
}

/// Extract the first JSON object from a model response.
///
/// Returns the object text exactly as it appears in the response (trimmed).
pub fn extract_json_object(response: &str) -> Result<String, JsonExtractionError> {
    for body in fenced_bodies(response) {
        if is_object(body) {
            return Ok(body.to_string());
        }
    }

    let trimmed = response.trim();
    if is_object(trimmed) {
        return Ok(trimmed.to_string());
    }

    let mut search_from = 0;
    while let Some(rel) = trimmed[search_from..].find('{') {
        let start = search_from + rel;
        match find_matching_brace(trimmed, start) {
            Some(end) => {
                let candidate = &trimmed[start..=end];
                if is_object(candidate) {
                    return Ok(candidate.to_string());
                }
                search_from = start + 1;
            }
            None => break,
        }
    }

    let analysis = analyze_json_structure(trimmed);
    if analysis.object_start.is_some() && analysis.unclosed_braces > 0 {
        return Err(JsonExtractionError::Truncated {
            unclosed_braces: analysis.unclosed_braces,
            unclosed_brackets: analysis.unclosed_brackets,
        });
    }

    Err(JsonExtractionError::NotFound {
        content_preview: trimmed.chars().take(50).collect(),
    })
}
