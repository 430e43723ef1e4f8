use serde::{Deserialize, Serialize};

use crate::linter::LintDefect;

/// Severity of a scorer-reported issue or negative-prompt pattern. Distinct
/// from `crate::linter::Severity`: that one grades *mechanical* defects,
/// this one grades the model's own subjective judgment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

impl IssueSeverity {
    /// Weight used to rank error-store patterns (§4.C): high=3, medium=2, low=1.
    #[must_use]
    pub fn weight(self) -> u32 {
        match self {
            IssueSeverity::High => 3,
            IssueSeverity::Medium => 2,
            IssueSeverity::Low => 1,
        }
    }
}

/// A single defect the scorer's subjective read flagged in the passage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub severity: IssueSeverity,
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub problem: String,
    pub estimated_impact: f64,
}

/// A recognizable AI-generation tic the scorer flagged, with examples.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AiPattern {
    pub pattern: String,
    #[serde(default)]
    pub examples: Vec<String>,
    pub estimated_impact: f64,
}

/// The eight named subscores, each documented with its own max, summing to 100.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscores {
    pub sentence_variety: u8,
    pub dialogue_authenticity: u8,
    pub sensory_detail: u8,
    pub emotional_resonance: u8,
    pub vocabulary_precision: u8,
    pub narrative_flow: u8,
    pub originality_voice: u8,
    pub technical_execution: u8,
}

impl Subscores {
    /// Maximum attainable value for each named subscore, in declaration order.
    pub const MAXES: [u8; 8] = [15, 15, 15, 15, 10, 10, 10, 10];

    #[must_use]
    pub fn sum(self) -> u32 {
        self.sentence_variety as u32
            + self.dialogue_authenticity as u32
            + self.sensory_detail as u32
            + self.emotional_resonance as u32
            + self.vocabulary_precision as u32
            + self.narrative_flow as u32
            + self.originality_voice as u32
            + self.technical_execution as u32
    }
}

/// The craft checklist the scorer (not the linter) found present, mirroring
/// `crate::linter::FourRequirements` but as the model's own judgment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FourRequirementsFound {
    pub character_specific_thought: bool,
    pub precise_observation: bool,
    pub musical_sentence: bool,
    pub expectation_break: bool,
}

/// Free-form grouping label attached to an accepted or attempted fix.
pub type FixCategory = String;

/// One score-and-maybe-fix response, exactly the shape of §3's Score review.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreReview {
    pub score: u8,
    pub label: String,
    pub subscores: Subscores,
    #[serde(default)]
    pub issues: Vec<Issue>,
    #[serde(default)]
    pub ai_patterns: Vec<AiPattern>,
    #[serde(default)]
    pub four_requirements_found: FourRequirementsFound,

    pub before_score: u8,
    #[serde(default)]
    pub after_score: u8,
    #[serde(default)]
    pub micro_fixed_prose: Option<String>,
    #[serde(default)]
    pub fix_applied: Option<String>,
    #[serde(default)]
    pub fix_category: Option<FixCategory>,
    #[serde(default)]
    pub fix_target: Option<String>,
    #[serde(default)]
    pub internal_validation: Option<String>,
}

impl ScoreReview {
    #[must_use]
    pub fn has_fix(&self) -> bool {
        self.micro_fixed_prose.is_some()
    }
}

/// Locked narrative commitments established once per chunk (§4.D) so later
/// micro-fix passes cannot drift POV, tense, or the chunk's core intent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentLedger {
    pub pov_type: String,
    pub tense: String,
    pub core_intent: String,
}

/// Input to `Scorer::generate_intent_ledger`.
#[derive(Clone, Debug, Default)]
pub struct IntentLedgerContext {
    pub plot: String,
    pub chapter_outline: String,
    pub characters: String,
    pub existing_prose: String,
    pub chapter_title: String,
}

/// Input to `Scorer::score_and_fix`.
#[derive(Clone, Debug, Default)]
pub struct ScoreContext {
    pub threshold: u8,
    pub iteration_num: u32,
    pub max_iterations: u32,
    pub previous_fixes: Vec<String>,
    pub attempted_fixes: Vec<String>,
    pub lint_defects: Vec<LintDefect>,
    pub intent_ledger: Option<IntentLedger>,
    pub genre: String,
    pub voice: String,
    pub ai_instructions: String,
    pub negative_prompt: String,
    /// Set by the Rewrite Action (§4.H) so the scorer knows this call is
    /// re-scoring a targeted rewrite rather than a fresh chunk pass.
    pub rewrite_context: Option<RewriteScoreContext>,
}

impl ScoreContext {
    #[must_use]
    pub fn is_final_pass(&self) -> bool {
        self.iteration_num >= self.max_iterations
    }
}

/// Extra context the scorer is given during a §4.H rewrite rescore.
#[derive(Clone, Debug, PartialEq)]
pub struct RewriteScoreContext {
    pub previous_score: u8,
    pub previous_issue_count: u32,
    pub previous_subscores: Subscores,
}
