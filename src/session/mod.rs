//! In-memory session state (§4.I), wrapped the way `state::VersionedState`
//! wraps its channels: a version counter bumped only when `best_text`
//! actually changes, so the engine and event bus can detect real progress
//! without diffing the whole session by hand.

use crate::channels::errors::ErrorEvent;
use crate::channels::{Channel, ErrorsChannel, ExtrasChannel};
use crate::scorer::{IntentLedger, ScoreReview};

/// Per-chunk, per-session generation state. One `SessionState` lives for
/// the duration of a single `chunk_controller::run` call.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_key: String,
    pub current_text: String,
    pub best_text: String,
    pub best_score: u8,
    pub best_review: Option<ScoreReview>,
    pub previous_fixes: Vec<String>,
    pub attempted_fixes: Vec<String>,
    pub consecutive_no_fix: u32,
    pub iteration_history: Vec<IterationRecord>,
    pub cancelled: bool,
    errors: ErrorsChannel,
    /// Caches the chunk's `IntentLedger` (§4.D) as free-form JSON so it
    /// survives across micro-fix passes without another model call.
    extras: ExtrasChannel,
    best_text_version: u32,
}

/// One micro-fix pass's outcome, kept for audit and for the Rewrite
/// Action's convergence check (§4.H).
#[derive(Debug, Clone, PartialEq)]
pub struct IterationRecord {
    pub iteration_num: u32,
    pub before_score: u8,
    pub after_score: u8,
    pub accepted: bool,
    /// True only when the scorer itself returned no `microFixedProse` at
    /// all. Distinct from `accepted`: a proposed fix that `validate_candidate`
    /// rejects (word-drift, regression, new hard defects) is also
    /// `!accepted`, but it is not a "no fix" pass for `consecutive_no_fix`
    /// purposes (§4.F only counts passes where nothing was even proposed).
    pub no_fix_proposed: bool,
    pub reason: Option<String>,
}

impl SessionState {
    #[must_use]
    pub fn new(session_key: impl Into<String>, initial_text: impl Into<String>) -> Self {
        let initial_text = initial_text.into();
        Self {
            session_key: session_key.into(),
            current_text: initial_text.clone(),
            best_text: initial_text,
            best_score: 0,
            best_review: None,
            previous_fixes: Vec::new(),
            attempted_fixes: Vec::new(),
            consecutive_no_fix: 0,
            iteration_history: Vec::new(),
            cancelled: false,
            errors: ErrorsChannel::default(),
            extras: ExtrasChannel::default(),
            best_text_version: 0,
        }
    }

    /// Bumps the version only if `candidate_text`/`candidate_score` is a
    /// genuine improvement over `best_text`/`best_score` (Invariant 1: monotone
    /// non-decreasing `best_score`; Invariant 2: never replace with a worse text).
    pub fn try_commit_best(&mut self, candidate_text: String, candidate_score: u8, review: ScoreReview) -> bool {
        if candidate_score < self.best_score {
            return false;
        }
        self.best_text = candidate_text;
        self.best_score = candidate_score;
        self.best_review = Some(review);
        self.best_text_version += 1;
        true
    }

    #[must_use]
    pub fn best_text_version(&self) -> u32 {
        self.best_text_version
    }

    pub fn record_error(&mut self, event: ErrorEvent) {
        self.errors.get_mut().push(event);
    }

    #[must_use]
    pub fn errors(&self) -> Vec<ErrorEvent> {
        self.errors.snapshot()
    }

    /// Cache `ledger` on the Extra channel, replacing any previously cached
    /// value (only one intent ledger is ever live per chunk, §4.D).
    pub fn cache_intent_ledger(&mut self, ledger: &IntentLedger) {
        let value = serde_json::to_value(ledger).expect("IntentLedger always serializes to JSON");
        let items = self.extras.get_mut();
        items.clear();
        items.push(value);
        self.extras.set_version(self.extras.version() + 1);
    }

    /// The chunk's cached intent ledger, if `cache_intent_ledger` has been
    /// called. `None` if it was never generated or the cached value somehow
    /// doesn't round-trip as an `IntentLedger`.
    #[must_use]
    pub fn cached_intent_ledger(&self) -> Option<IntentLedger> {
        self.extras
            .snapshot()
            .into_iter()
            .next()
            .and_then(|value| serde_json::from_value(value).ok())
    }

    pub fn record_iteration(&mut self, record: IterationRecord) {
        if record.accepted {
            self.consecutive_no_fix = 0;
        } else if record.no_fix_proposed {
            self.consecutive_no_fix += 1;
        }
        self.iteration_history.push(record);
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review(score: u8) -> ScoreReview {
        ScoreReview {
            score,
            before_score: score,
            ..Default::default()
        }
    }

    #[test]
    fn cached_intent_ledger_round_trips() {
        let mut session = SessionState::new("s1", "draft");
        assert!(session.cached_intent_ledger().is_none());

        let ledger = IntentLedger {
            pov_type: "third-limited".to_string(),
            tense: "past".to_string(),
            core_intent: "Mara decides to leave before dawn.".to_string(),
        };
        session.cache_intent_ledger(&ledger);
        assert_eq!(session.cached_intent_ledger(), Some(ledger.clone()));

        let replaced = IntentLedger {
            core_intent: "Mara changes her mind.".to_string(),
            ..ledger
        };
        session.cache_intent_ledger(&replaced);
        assert_eq!(session.cached_intent_ledger(), Some(replaced));
    }

    #[test]
    fn try_commit_best_rejects_lower_score() {
        let mut session = SessionState::new("s1", "draft one");
        assert!(session.try_commit_best("draft two".to_string(), 80, review(80)));
        assert_eq!(session.best_text_version(), 1);
        assert!(!session.try_commit_best("draft three".to_string(), 70, review(70)));
        assert_eq!(session.best_text, "draft two");
        assert_eq!(session.best_text_version(), 1);
    }

    #[test]
    fn consecutive_no_fix_resets_on_accept() {
        let mut session = SessionState::new("s1", "draft");
        session.record_iteration(IterationRecord {
            iteration_num: 1,
            before_score: 80,
            after_score: 80,
            accepted: false,
            no_fix_proposed: true,
            reason: None,
        });
        session.record_iteration(IterationRecord {
            iteration_num: 2,
            before_score: 80,
            after_score: 80,
            accepted: false,
            no_fix_proposed: true,
            reason: None,
        });
        assert_eq!(session.consecutive_no_fix, 2);
        session.record_iteration(IterationRecord {
            iteration_num: 3,
            before_score: 80,
            after_score: 85,
            accepted: true,
            no_fix_proposed: false,
            reason: None,
        });
        assert_eq!(session.consecutive_no_fix, 0);
    }

    #[test]
    fn rejected_proposed_fix_does_not_count_as_no_fix() {
        let mut session = SessionState::new("s1", "draft");
        session.record_iteration(IterationRecord {
            iteration_num: 1,
            before_score: 80,
            after_score: 80,
            accepted: false,
            no_fix_proposed: false,
            reason: Some("regression".to_string()),
        });
        session.record_iteration(IterationRecord {
            iteration_num: 2,
            before_score: 80,
            after_score: 80,
            accepted: false,
            no_fix_proposed: false,
            reason: Some("word_drift".to_string()),
        });
        assert_eq!(session.consecutive_no_fix, 0);
    }
}
