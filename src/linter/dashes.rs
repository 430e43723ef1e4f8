//! Em-dash / en-dash / multi-hyphen detection and normalization.
//!
//! Dashes are a hard defect but the *only* one the Micro-Fix Loop is allowed
//! to silently repair itself (`crate::micro_fix`'s auto-normalize path) and
//! the only one the LLM client strips from live stream deltas before they
//! ever reach the editor.

use std::sync::LazyLock;

use regex::Regex;

use super::{DefectKind, LintDefect, Severity};

static DASH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(---|--|—|–)").unwrap());
static COMMA_COLLAPSE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",\s*,").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[ \t]{2,}").unwrap());

/// Find every em/en-dash or double/triple-hyphen run in `text`.
pub(super) fn dash_defects(text: &str) -> Vec<LintDefect> {
    DASH_RE
        .find_iter(text)
        .map(|m| LintDefect {
            kind: DefectKind::Dash,
            severity: Severity::Hard,
            text: m.as_str().to_string(),
            position: m.start(),
        })
        .collect()
}

/// Replace every em/en-dash or double/triple-hyphen run with `", "`, then
/// collapse any resulting double commas and redundant whitespace.
///
/// This is the *only* auto-fixable hard defect (§4.A, §4.F): the Micro-Fix
/// Loop applies this before re-linting a candidate fix that introduced at
/// most three new dash defects.
#[must_use]
pub fn normalize_dashes(text: &str) -> String {
    let replaced = DASH_RE.replace_all(text, ", ");
    let collapsed = COMMA_COLLAPSE_RE.replace_all(&replaced, ",");
    let spaced = WHITESPACE_RE.replace_all(&collapsed, " ");
    spaced.into_owned()
}
