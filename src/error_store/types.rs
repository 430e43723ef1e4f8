use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::scorer::IssueSeverity;

/// A learned defect, keyed by a content fingerprint so the same AI tic
/// reported across many sessions accumulates frequency instead of
/// duplicating (§4.C, Invariant 4).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorPattern {
    pub id: String,
    pub fingerprint: String,
    pub category: String,
    pub text: String,
    pub problem: String,
    pub severity: IssueSeverity,
    pub estimated_impact: f64,
    pub frequency: u32,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub dismissed: bool,
    pub projects: BTreeSet<String>,
    pub sessions_seen: BTreeSet<String>,
}

impl ErrorPattern {
    /// Severity-weighted ranking score used by `build_negative_prompt` and
    /// `stats` to surface the most corrosive patterns first (§4.C).
    #[must_use]
    pub fn rank_score(&self) -> f64 {
        f64::from(self.severity.weight()) * f64::from(self.frequency)
    }
}

/// Caller-supplied context for a single `ErrorStore::record` call.
#[derive(Clone, Debug, Default)]
pub struct RecordContext {
    pub session_key: String,
    pub project_id: Option<String>,
    pub chapter_id: Option<String>,
    pub chapter_title: Option<String>,
    pub genre: Option<String>,
}

/// Tunables for `ErrorStore::build_negative_prompt`.
#[derive(Clone, Debug)]
pub struct NegativePromptOptions {
    /// Maximum number of patterns to include, ranked by `rank_score`.
    pub max_patterns: usize,
    /// Only include patterns with at least this frequency.
    pub min_frequency: u32,
}

impl Default for NegativePromptOptions {
    fn default() -> Self {
        Self {
            max_patterns: 20,
            min_frequency: 1,
        }
    }
}

/// Snapshot returned by `ErrorStore::stats` (§4.C).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorStoreStats {
    pub total_patterns: usize,
    pub dismissed_count: usize,
    pub total_occurrences: u64,
    /// Pattern count per `ErrorPattern::category`.
    pub category_counts: BTreeMap<String, usize>,
    /// Distinct projects across every pattern's `projects` set.
    pub project_count: usize,
}
