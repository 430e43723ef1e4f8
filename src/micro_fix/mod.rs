//! The Micro-Fix Loop (§4.F): up to `MAX` score -> fix -> validate passes
//! per chunk, each guarded against variance collapse, word drift, new hard
//! defects, and outright regression.

use std::collections::HashSet;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::linter::{self, DefectKind, Severity};
use crate::scorer::{ScoreContext, ScoreReview, Scorer, ScorerError};
use crate::session::{IterationRecord, SessionState};

/// Bulk generation allows more passes per chunk than interactive
/// single-paragraph editing (§4.F).
pub const MAX_PASSES_BULK: u32 = 8;
pub const MAX_PASSES_ITERATIVE: u32 = 5;

/// Variance guard: a candidate whose `before_score` falls this far below
/// the running best is treated as a scoring fluke and the loop bails
/// rather than chasing it (§4.F).
const VARIANCE_GUARD_MARGIN: i32 = 3;

/// Word-drift rejection threshold (Invariant 3).
const MAX_WORD_DRIFT: f64 = 0.15;

/// At most this many *dash-only* new hard defects are tolerated and
/// silently auto-normalized rather than rejecting the fix outright (§4.F).
const MAX_TOLERATED_DASH_DEFECTS: usize = 3;

#[derive(Debug, Error, Diagnostic)]
pub enum MicroFixError {
    #[error("scorer call failed: {0}")]
    #[diagnostic(code(ipgre::micro_fix::scorer))]
    Scorer(#[from] ScorerError),
}

/// Why a candidate fix was rejected instead of accepted, recorded on the
/// session's iteration history for audit and test assertions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    VarianceGuard,
    WordDrift,
    NewHardDefects,
    Regression,
    ParseFailure,
}

impl RejectReason {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::VarianceGuard => "variance_guard",
            RejectReason::WordDrift => "word_drift",
            RejectReason::NewHardDefects => "new_hard_defects",
            RejectReason::Regression => "regression",
            RejectReason::ParseFailure => "parse_failure",
        }
    }
}

/// Outcome of running the loop to completion (passes exhausted, no-fix
/// exit, or threshold met).
#[derive(Debug, Clone)]
pub struct MicroFixOutcome {
    pub final_text: String,
    pub final_score: u8,
    pub passes_run: u32,
    pub stopped_early: bool,
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn word_drift(pre: &str, post: &str) -> f64 {
    let pre_words = word_count(pre) as f64;
    if pre_words == 0.0 {
        return 0.0;
    }
    let post_words = word_count(post) as f64;
    (post_words - pre_words).abs() / pre_words
}

/// Hard-defect fingerprints introduced by `post` that weren't present in
/// `pre`. Dash-only introductions are filtered separately by the caller so
/// they can be auto-normalized instead of rejected.
fn new_hard_defects(pre_defects: &[crate::linter::LintDefect], post_defects: &[crate::linter::LintDefect]) -> Vec<crate::linter::LintDefect> {
    let pre_fingerprints: HashSet<_> = pre_defects.iter().filter(|d| d.is_hard()).map(|d| d.fingerprint()).collect();
    post_defects
        .iter()
        .filter(|d| d.is_hard() && !pre_fingerprints.contains(&d.fingerprint()))
        .cloned()
        .collect()
}

/// Run the Micro-Fix Loop against `session.current_text`, mutating
/// `session` with each accepted or rejected pass, until `max_passes` is
/// exhausted, the threshold is met, or two consecutive passes come back
/// with no fix proposed at all.
#[instrument(skip(scorer, session), fields(session_key = %session.session_key), err)]
pub async fn run(
    scorer: &Scorer,
    session: &mut SessionState,
    threshold: u8,
    max_passes: u32,
    mut ctx_template: ScoreContext,
) -> Result<MicroFixOutcome, MicroFixError> {
    let mut passes_run = 0;
    let mut stopped_early = false;
    let mut baseline_seeded = false;

    let initial_report = linter::lint(&session.current_text);
    if initial_report.hard_defects().is_empty() {
        let review = scorer.score(&session.current_text).await?;
        passes_run += 1;
        let met_threshold = review.score >= threshold;
        session.record_iteration(IterationRecord {
            iteration_num: 1,
            before_score: review.score,
            after_score: review.score,
            accepted: met_threshold,
            no_fix_proposed: false,
            reason: None,
        });
        if met_threshold {
            session.try_commit_best(session.current_text.clone(), review.score, review.clone());
            return Ok(MicroFixOutcome {
                final_text: session.best_text.clone(),
                final_score: session.best_score,
                passes_run,
                stopped_early: false,
            });
        }
        session.best_score = review.score;
        baseline_seeded = true;
    }

    for iteration_num in 1..=max_passes {
        if session.consecutive_no_fix >= 2 {
            info!(iteration_num, "stopping early: two consecutive passes had no fix proposed");
            stopped_early = true;
            break;
        }

        ctx_template.iteration_num = iteration_num;
        ctx_template.max_iterations = max_passes;
        ctx_template.threshold = threshold;
        ctx_template.previous_fixes = session.previous_fixes.clone();
        ctx_template.attempted_fixes = session.attempted_fixes.clone();

        let pre_report = linter::lint(&session.current_text);
        ctx_template.lint_defects = pre_report.defects.clone();

        let review = scorer.score_and_fix(&session.current_text, &ctx_template).await?;
        passes_run += 1;

        if !baseline_seeded {
            session.best_score = review.before_score;
            baseline_seeded = true;
        } else if i32::from(review.before_score) < i32::from(session.best_score) - VARIANCE_GUARD_MARGIN {
            warn!(
                iteration_num,
                before_score = review.before_score,
                best_score = session.best_score,
                "variance guard: bailing out of micro-fix loop"
            );
            stopped_early = true;
            break;
        }

        if review.score >= threshold && !review.has_fix() {
            session.try_commit_best(session.current_text.clone(), review.score, review);
            break;
        }

        let Some(candidate_raw) = review.micro_fixed_prose.clone() else {
            session.record_iteration(IterationRecord {
                iteration_num,
                before_score: review.before_score,
                after_score: review.after_score,
                accepted: false,
                no_fix_proposed: true,
                reason: None,
            });
            continue;
        };

        match validate_candidate(session, &pre_report, &review, &candidate_raw) {
            Ok(normalized_candidate) => {
                session.current_text = normalized_candidate.clone();
                let committed = session.try_commit_best(normalized_candidate, review.after_score, review.clone());
                if let Some(fix) = &review.fix_applied {
                    session.previous_fixes.push(fix.clone());
                }
                session.record_iteration(IterationRecord {
                    iteration_num,
                    before_score: review.before_score,
                    after_score: review.after_score,
                    accepted: committed,
                    no_fix_proposed: false,
                    reason: None,
                });
                if review.after_score >= threshold {
                    break;
                }
            }
            Err(reason) => {
                warn!(?reason, iteration_num, "rejected candidate fix");
                if let Some(fix) = &review.fix_applied {
                    session.attempted_fixes.push(fix.clone());
                }
                session.record_iteration(IterationRecord {
                    iteration_num,
                    before_score: review.before_score,
                    after_score: review.after_score,
                    accepted: false,
                    no_fix_proposed: false,
                    reason: Some(reason.as_str().to_string()),
                });
            }
        }
    }

    Ok(MicroFixOutcome {
        final_text: session.best_text.clone(),
        final_score: session.best_score,
        passes_run,
        stopped_early,
    })
}

/// Applies the word-drift, regression, and new-hard-defect acceptance gates
/// from §4.F in order, returning the (possibly dash-normalized) candidate
/// text on success. The variance guard is checked once per iteration in
/// `run`, before a candidate fix is even looked at, since §4.F applies it to
/// every pass, fix or no fix, and a trip bails the whole loop rather than
/// just rejecting one candidate.
fn validate_candidate(
    session: &SessionState,
    pre_report: &crate::linter::LintReport,
    review: &ScoreReview,
    candidate_raw: &str,
) -> Result<String, RejectReason> {
    if word_drift(&session.current_text, candidate_raw) > MAX_WORD_DRIFT {
        return Err(RejectReason::WordDrift);
    }

    if review.after_score < review.before_score {
        return Err(RejectReason::Regression);
    }

    let normalized_candidate = linter::normalize_dashes(candidate_raw);
    let post_report = linter::lint(&normalized_candidate);
    let introduced = new_hard_defects(&pre_report.defects, &post_report.defects);
    let non_dash_introduced: Vec<_> = introduced
        .iter()
        .filter(|d| !matches!(d.kind, DefectKind::Dash))
        .collect();
    if !non_dash_introduced.is_empty() {
        return Err(RejectReason::NewHardDefects);
    }
    let dash_introduced = introduced.iter().filter(|d| matches!(d.kind, DefectKind::Dash) && d.severity == Severity::Hard).count();
    if dash_introduced > MAX_TOLERATED_DASH_DEFECTS {
        return Err(RejectReason::NewHardDefects);
    }

    Ok(normalized_candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmBackend;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    struct ScriptedScorerBackend {
        responses: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl LlmBackend for ScriptedScorerBackend {
        async fn call(&self, _messages: &[crate::message::Message], _opts: &crate::llm::CallOptions) -> Result<String, crate::llm::LlmError> {
            let mut responses = self.responses.lock().unwrap();
            if responses.is_empty() {
                return Ok("{}".to_string());
            }
            Ok(responses.remove(0))
        }

        async fn generate_stream(
            &self,
            _messages: &[crate::message::Message],
            _max_tokens: u32,
            _cancelled: Arc<AtomicBool>,
            _tx: mpsc::Sender<crate::llm::StreamDelta>,
        ) -> Result<(), crate::llm::LlmError> {
            Ok(())
        }
    }

    fn review_json(before: u8, after: u8, fixed_prose: Option<&str>) -> String {
        let fix_fields = match fixed_prose {
            Some(p) => format!(r#", "microFixedProse": {:?}, "fixApplied": "tightened a sentence""#, p),
            None => String::new(),
        };
        format!(
            r#"{{
                "score": {after}, "label": "ok",
                "subscores": {{"sentenceVariety":10,"dialogueAuthenticity":10,"sensoryDetail":10,
                    "emotionalResonance":10,"vocabularyPrecision":10,"narrativeFlow":10,
                    "originalityVoice":10,"technicalExecution":10}},
                "issues": [], "aiPatterns": [],
                "fourRequirementsFound": {{"characterSpecificThought":false,"preciseObservation":false,
                    "musicalSentence":false,"expectationBreak":false}},
                "beforeScore": {before}, "afterScore": {after}{fix_fields}
            }}"#
        )
    }

    #[tokio::test]
    async fn threshold_met_immediately_skips_fix_passes() {
        let backend = Arc::new(ScriptedScorerBackend {
            responses: Mutex::new(vec![review_json(95, 95, None)]),
        });
        let scorer = Scorer::new(backend);
        let mut session = SessionState::new("s1", "Already excellent prose with no defects at all.");
        let outcome = run(&scorer, &mut session, 90, MAX_PASSES_BULK, ScoreContext::default())
            .await
            .unwrap();
        assert_eq!(outcome.passes_run, 1);
        assert_eq!(outcome.final_score, 95);
        assert_eq!(session.iteration_history.len(), 1);
        assert!(session.iteration_history[0].accepted);
    }

    #[tokio::test]
    async fn word_drift_rejects_candidate() {
        let original = "He started to walk toward the gate in the cold evening air.";
        let bloated = "He started to walk toward the gate in the cold evening air while thinking about many many many many many many other unrelated things entirely.";
        let backend = Arc::new(ScriptedScorerBackend {
            responses: Mutex::new(vec![
                review_json(60, 85, Some(bloated)),
                review_json(60, 60, None),
            ]),
        });
        let scorer = Scorer::new(backend);
        let mut session = SessionState::new("s1", original);
        let outcome = run(&scorer, &mut session, 90, 2, ScoreContext::default()).await.unwrap();
        assert_eq!(outcome.final_text, original);
        assert!(session.iteration_history[0].reason.as_deref() == Some("word_drift"));
    }

    /// A later pass's honest rescore drops more than the variance margin
    /// below the seeded baseline with no fix attached; the loop must bail
    /// outright rather than keep iterating. The pre-loop rescore still
    /// records its own iteration; the bailed pass never reaches the
    /// no-fix/fix branch at all, so it adds none of its own.
    #[tokio::test]
    async fn variance_guard_bails_whole_loop_on_no_fix_pass() {
        let draft = "A steady paragraph of competent, unremarkable prose about a quiet evening.";
        let backend = Arc::new(ScriptedScorerBackend {
            responses: Mutex::new(vec![review_json(88, 88, None), review_json(83, 83, None)]),
        });
        let scorer = Scorer::new(backend);
        let mut session = SessionState::new("s1", draft);
        let outcome = run(&scorer, &mut session, 95, 5, ScoreContext::default()).await.unwrap();
        assert_eq!(outcome.final_text, draft);
        assert_eq!(outcome.final_score, 88);
        assert_eq!(outcome.passes_run, 2);
        assert!(outcome.stopped_early);
        assert_eq!(session.iteration_history.len(), 1);
    }
}
