//! Forgiving parser for the scorer's JSON contract (§9): strip ```` ``` ````
//! code fences, locate the outermost `{...}`, then validate against the
//! schema. A model that wraps its JSON in prose or fences still parses; one
//! that returns something with no balanced object surfaces `ParseError`.

use thiserror::Error;

use super::types::ScoreReview;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in scorer response")]
    NoObjectFound,
    #[error("scorer response was not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

/// Extract the outermost balanced `{...}` from `raw`, stripping any
/// ` ```json ... ``` ` fence first.
#[must_use]
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let stripped = strip_code_fences(raw);
    let start = stripped.find('{')?;
    let bytes = stripped.as_bytes();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&stripped[start..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    }
}

/// Parse a raw scorer response into a [`ScoreReview`], per §9.
pub fn parse_score_review(raw: &str) -> Result<ScoreReview, ParseError> {
    let object = extract_json_object(raw).ok_or(ParseError::NoObjectFound)?;
    let review: ScoreReview = serde_json::from_str(object)?;
    Ok(review)
}
