//! Deterministic prose linter.
//!
//! `lint` is a pure function over `&str`: no I/O, no model calls, fully
//! unit-testable. It is the first line of defense the Micro-Fix Loop
//! (`crate::micro_fix`) uses to prefer fixing concrete, mechanical defects
//! before spending a model call on subjective ones.

mod dashes;
mod four_requirements;
mod rules;

pub use dashes::normalize_dashes;
pub use four_requirements::{FourRequirements, four_requirements_for_windows};

use serde::{Deserialize, Serialize};

/// How strongly a defect should block an accepted fix.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Soft,
    Medium,
    Hard,
}

/// The kind of thing a [`LintDefect`] flags.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum DefectKind {
    BannedPhrase { phrase: String },
    Dash,
    Budget { phrase: String, limit: u32, count: u32 },
    TricolonOveruse { limit: u32, count: u32 },
    KickerDensity { density_pct: u32 },
    ParagraphVariance { stddev: f64 },
    FabricatedPrecision,
}

/// A single defect found by the linter.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LintDefect {
    pub kind: DefectKind,
    pub severity: Severity,
    pub text: String,
    /// Byte offset into the linted text where the defect starts.
    pub position: usize,
}

impl LintDefect {
    pub fn is_hard(&self) -> bool {
        self.severity == Severity::Hard
    }

    /// Fingerprint used to compare defect sets before/after a candidate fix
    /// (see `crate::micro_fix`'s "no new hard defects" check). Position is
    /// deliberately excluded: a fix that shifts text should not count as a
    /// *new* defect just because the same phrase moved.
    pub fn fingerprint(&self) -> (String, String) {
        let kind = match &self.kind {
            DefectKind::BannedPhrase { phrase } => format!("banned:{phrase}"),
            DefectKind::Dash => "dash".to_string(),
            DefectKind::Budget { phrase, .. } => format!("budget:{phrase}"),
            DefectKind::TricolonOveruse { .. } => "tricolon".to_string(),
            DefectKind::KickerDensity { .. } => "kicker".to_string(),
            DefectKind::ParagraphVariance { .. } => "paragraph_variance".to_string(),
            DefectKind::FabricatedPrecision => "fabricated_precision".to_string(),
        };
        (kind, self.text.clone())
    }
}

/// Aggregate counters summarizing a lint pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LintStats {
    pub hard_defects: u32,
    pub medium_defects: u32,
    pub tricolon_count: u32,
    pub kicker_density_pct: u32,
    pub paragraph_variance: f64,
    pub four_requirements_total: u32,
}

/// Non-defect prose metrics, reported alongside defects for the scorer's
/// context and for tests.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub sentence_length_std_dev: f64,
    pub short_sentence_pct: u32,
    pub filter_word_count: u32,
}

/// Full output of a lint pass.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LintReport {
    pub defects: Vec<LintDefect>,
    pub stats: LintStats,
    pub quality_metrics: QualityMetrics,
}

impl LintReport {
    #[must_use]
    pub fn hard_defects(&self) -> Vec<&LintDefect> {
        self.defects.iter().filter(|d| d.is_hard()).collect()
    }
}

/// Lint a passage of prose. Pure, deterministic, never fails: any internal
/// regex/parse surprise degrades to "no defect found" rather than aborting,
/// since the linter must never block the Micro-Fix Loop (see §7 error
/// handling: "lint never fails").
#[must_use]
pub fn lint(text: &str) -> LintReport {
    let mut defects = Vec::new();

    defects.extend(rules::banned_phrases(text));
    defects.extend(dashes::dash_defects(text));
    defects.extend(rules::budget_violations(text));
    let tricolon_count = rules::tricolon_count(text);
    defects.extend(rules::tricolon_defects(text, tricolon_count));

    let paragraphs = rules::paragraphs(text);
    let kicker_density_pct = rules::kicker_density_pct(&paragraphs);
    defects.extend(rules::kicker_defect(kicker_density_pct));

    let paragraph_variance = rules::paragraph_word_count_stddev(&paragraphs);
    defects.extend(rules::paragraph_variance_defect(
        paragraph_variance,
        paragraphs.len(),
    ));

    defects.extend(rules::fabricated_precision(text));

    let hard_defects = defects.iter().filter(|d| d.is_hard()).count() as u32;
    let medium_defects = defects
        .iter()
        .filter(|d| d.severity == Severity::Medium)
        .count() as u32;

    let windows = four_requirements::chunk_windows(text);
    let four_requirements_total = windows
        .iter()
        .filter(|w| four_requirements::check(w).any_met())
        .count() as u32;

    let quality_metrics = QualityMetrics {
        sentence_length_std_dev: rules::sentence_length_stddev(text),
        short_sentence_pct: rules::short_sentence_pct(text),
        filter_word_count: rules::filter_word_count(text),
    };

    LintReport {
        defects,
        stats: LintStats {
            hard_defects,
            medium_defects,
            tricolon_count,
            kicker_density_pct,
            paragraph_variance,
            four_requirements_total,
        },
        quality_metrics,
    }
}
