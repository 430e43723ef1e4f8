//! Rewrite Action (§4.H): a user-triggered targeted rewrite of an existing
//! review. Rolls the session back to the pre-generation snapshot, streams a
//! rewrite addressing a scoped subset of the review's problems, then
//! rescores with a rewrite context so the scorer knows what it's revising
//! against. Grounded on the Micro-Fix Loop's accept/reject bookkeeping
//! (`src/micro_fix/mod.rs`) for the auto-revert and convergence safeguards.

use miette::Diagnostic;
use thiserror::Error;
use tracing::{info, instrument};

use crate::llm::{CallOptions, LlmClient, LlmError};
use crate::scorer::{IssueSeverity, RewriteScoreContext, ScoreContext, ScoreReview, Scorer, ScorerError};

/// Consecutive low-delta rewrites (`|Δscore| <= 1`) before convergence is flagged.
const CONVERGENCE_STREAK: u32 = 2;
/// Cap on formatted problems handed to the rewrite prompt (§4.H).
const MAX_PROBLEMS_PER_PASS: usize = 10;
/// `Δscore` at or below this magnitude counts toward the convergence streak.
const CONVERGENCE_DELTA: f64 = 1.0;

#[derive(Debug, Error, Diagnostic)]
pub enum RewriteError {
    #[error("LLM call failed: {0}")]
    #[diagnostic(code(ipgre::rewrite::llm))]
    Llm(#[from] LlmError),

    #[error("rescore failed: {0}")]
    #[diagnostic(code(ipgre::rewrite::scorer))]
    Scorer(#[from] ScorerError),
}

/// Which problems from the existing review to target.
#[derive(Clone, Debug, PartialEq)]
pub enum RewriteScope {
    /// Every medium/high severity issue plus all AI patterns. Low severity
    /// is always skipped; fixing it degrades more than it helps.
    All,
    /// High severity issues plus AI patterns only.
    Critical,
    /// Free-form user instructions layered onto the rewrite prompt instead
    /// of (or alongside) review-derived problems.
    UserNotes(String),
}

/// One problem pulled from the review, ready to format into the rewrite prompt.
#[derive(Clone, Debug, PartialEq)]
pub struct RewriteProblem {
    pub text: Option<String>,
    pub description: String,
    pub severity: IssueSeverity,
    pub estimated_impact: f64,
}

/// Pull the problems `scope` selects from `review`, already sorted by
/// `estimated_impact` descending and capped at [`MAX_PROBLEMS_PER_PASS`].
#[must_use]
pub fn collect_problems(review: &ScoreReview, scope: &RewriteScope) -> Vec<RewriteProblem> {
    let include_medium = matches!(scope, RewriteScope::All);

    let mut problems: Vec<RewriteProblem> = review
        .issues
        .iter()
        .filter(|issue| match issue.severity {
            IssueSeverity::Low => false,
            IssueSeverity::Medium => include_medium,
            IssueSeverity::High => true,
        })
        .map(|issue| RewriteProblem {
            text: issue.text.clone(),
            description: issue.problem.clone(),
            severity: issue.severity,
            estimated_impact: issue.estimated_impact,
        })
        .collect();

    problems.extend(review.ai_patterns.iter().map(|pattern| RewriteProblem {
        text: pattern.examples.first().cloned(),
        description: pattern.pattern.clone(),
        severity: IssueSeverity::High,
        estimated_impact: pattern.estimated_impact,
    }));

    problems.sort_by(|a, b| b.estimated_impact.partial_cmp(&a.estimated_impact).unwrap_or(std::cmp::Ordering::Equal));
    problems.truncate(MAX_PROBLEMS_PER_PASS);
    problems
}

/// Format problems as `FIND: "{text}" → PROBLEM: {description} [sev, ~pts]`,
/// one per line (§4.H).
#[must_use]
pub fn format_problems(problems: &[RewriteProblem]) -> String {
    problems
        .iter()
        .map(|p| {
            let sev = match p.severity {
                IssueSeverity::High => "high",
                IssueSeverity::Medium => "medium",
                IssueSeverity::Low => "low",
            };
            let found = p.text.as_deref().unwrap_or("(whole passage)");
            format!("FIND: \"{found}\" → PROBLEM: {} [{sev}, ~{:.0}pts]", p.description, p.estimated_impact)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Cross-rewrite bookkeeping: the last accepted rewrite (for auto-revert)
/// and the consecutive-low-delta streak (for convergence detection).
#[derive(Clone, Debug)]
pub struct RewriteState {
    previous_rewrite_text: Option<String>,
    previous_score: u8,
    low_delta_streak: u32,
}

impl RewriteState {
    #[must_use]
    pub fn new(current_score: u8) -> Self {
        Self {
            previous_rewrite_text: None,
            previous_score: current_score,
            low_delta_streak: 0,
        }
    }
}

/// Result of one rewrite pass.
#[derive(Clone, Debug)]
pub struct RewriteOutcome {
    pub text: String,
    pub review: ScoreReview,
    /// `true` if the new rewrite scored lower than the previous one and was
    /// automatically discarded in favor of `text` (which is then the prior
    /// accepted rewrite, not the fresh attempt).
    pub reverted: bool,
    /// `true` once two consecutive rewrites landed within
    /// [`CONVERGENCE_DELTA`] points of each other — further rewriting is
    /// unlikely to help.
    pub converged: bool,
}

/// Run one rewrite pass: roll back to `snapshot_text`, stream a rewrite
/// addressing `scope`'s problems from `review`, rescore with a rewrite
/// context, then apply the auto-revert and convergence safeguards (§4.H).
#[instrument(skip(llm, scorer, state, snapshot_text, review), fields(previous_score = state.previous_score))]
pub async fn run_rewrite(
    llm: &LlmClient,
    scorer: &Scorer,
    state: &mut RewriteState,
    snapshot_text: &str,
    review: &ScoreReview,
    scope: &RewriteScope,
    voice: &str,
    genre: &str,
) -> Result<RewriteOutcome, RewriteError> {
    let problems = collect_problems(review, scope);
    let directive = match scope {
        RewriteScope::UserNotes(notes) => notes.clone(),
        _ => format_problems(&problems),
    };

    let system = format!(
        "You are revising a passage of long-form fiction. Genre: {genre}. Voice: {voice}. \
        Address the following problems with the minimum necessary change, preserving everything \
        else about the passage's content and structure:\n{directive}"
    );
    let user = format!("Passage to revise:\n{snapshot_text}");

    let rewritten = llm
        .call(&system, &user, CallOptions { max_tokens: 4096, temperature: 0.7 })
        .await?;

    let ctx = ScoreContext {
        threshold: 0,
        iteration_num: 1,
        max_iterations: 1,
        genre: genre.to_string(),
        voice: voice.to_string(),
        rewrite_context: Some(RewriteScoreContext {
            previous_score: state.previous_score,
            previous_issue_count: review.issues.len() as u32,
            previous_subscores: review.subscores,
        }),
        ..Default::default()
    };
    let new_review = scorer.score_and_fix(&rewritten, &ctx).await?;

    let delta = f64::from(new_review.score) - f64::from(state.previous_score);
    let (text, reverted) = if new_review.score < state.previous_score && state.previous_rewrite_text.is_some() {
        info!(new_score = new_review.score, previous_score = state.previous_score, "rewrite regressed, auto-reverting");
        (state.previous_rewrite_text.clone().expect("checked is_some"), true)
    } else {
        (rewritten.clone(), false)
    };

    if !reverted {
        state.previous_rewrite_text = Some(rewritten);
        state.previous_score = new_review.score;
    }

    if delta.abs() <= CONVERGENCE_DELTA {
        state.low_delta_streak += 1;
    } else {
        state.low_delta_streak = 0;
    }
    let converged = state.low_delta_streak >= CONVERGENCE_STREAK;
    if converged {
        info!("rewrite convergence reached");
    }

    Ok(RewriteOutcome {
        text,
        review: new_review,
        reverted,
        converged,
    })
}
