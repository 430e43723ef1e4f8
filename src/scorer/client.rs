use std::sync::Arc;

use tracing::instrument;

use crate::llm::{CallOptions, LlmBackend};

use super::parser::parse_score_review;
use super::types::{IntentLedger, IntentLedgerContext, ScoreContext, ScoreReview};
use super::ScorerError;

/// Wraps an [`LlmBackend`] with the Scorer/Micro-Fixer's strict JSON
/// contract (§4.D): one call that both scores a passage and, unless
/// scoring-only was requested, proposes a single surgical fix.
pub struct Scorer {
    backend: Arc<dyn LlmBackend>,
}

impl Scorer {
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self { backend }
    }

    /// Score `text` and, unless this is the final pass or the text already
    /// meets threshold, propose one micro-fix.
    #[instrument(skip(self, text, ctx), err)]
    pub async fn score_and_fix(&self, text: &str, ctx: &ScoreContext) -> Result<ScoreReview, ScorerError> {
        let system = build_system_prompt(ctx);
        let user = build_user_prompt(text, ctx);
        let raw = self
            .backend
            .call(
                &[
                    crate::message::Message::system(&system),
                    crate::message::Message::user(&user),
                ],
                &CallOptions {
                    max_tokens: 2048,
                    temperature: 0.3,
                },
            )
            .await?;
        let review = parse_score_review(&raw)?;
        Ok(review)
    }

    /// Whole-text score with no fix request, used by the Finalize state
    /// (§4.E) and by the Rewrite Action's rescore (§4.H).
    #[instrument(skip(self, text), err)]
    pub async fn score(&self, text: &str) -> Result<ScoreReview, ScorerError> {
        let mut ctx = ScoreContext::default();
        ctx.iteration_num = 1;
        ctx.max_iterations = 1;
        self.score_and_fix(text, &ctx).await
    }

    /// Establish POV, tense, and a locked core intent for a chunk, once,
    /// before the Micro-Fix Loop runs (§4.D).
    #[instrument(skip(self, ctx), err)]
    pub async fn generate_intent_ledger(&self, ctx: &IntentLedgerContext) -> Result<IntentLedger, ScorerError> {
        let system = "You establish narrative commitments for a chapter before drafting. \
            Respond with only a JSON object: {\"povType\": ..., \"tense\": ..., \"coreIntent\": ...}.";
        let user = format!(
            "Chapter title: {}\nPlot: {}\nOutline: {}\nCharacters: {}\nExisting prose so far:\n{}",
            ctx.chapter_title, ctx.plot, ctx.chapter_outline, ctx.characters, ctx.existing_prose
        );
        let raw = self
            .backend
            .call(
                &[
                    crate::message::Message::system(system),
                    crate::message::Message::user(&user),
                ],
                &CallOptions {
                    max_tokens: 256,
                    temperature: 0.2,
                },
            )
            .await?;
        let object = super::parser::extract_json_object(&raw).ok_or(super::parser::ParseError::NoObjectFound)?;
        let ledger: IntentLedger = serde_json::from_str(object).map_err(super::parser::ParseError::from)?;
        Ok(ledger)
    }
}

fn build_system_prompt(ctx: &ScoreContext) -> String {
    let final_pass_note = if ctx.is_final_pass() {
        "This is the final pass: score only, do not propose a fix."
    } else {
        "Propose exactly one surgical fix targeting the highest-impact defect, or none if the passage already meets threshold."
    };
    format!(
        "You are a prose quality scorer and micro-fixer for long-form fiction. \
        Score honestly on a 0-100 scale across eight named subscores summing to 100. \
        {final_pass_note} \
        Quality threshold: {}. Iteration {} of {}. \
        Genre: {}. Voice: {}. \
        {} \
        Respond with only a JSON object matching the documented schema, no prose, no code fences.",
        ctx.threshold, ctx.iteration_num, ctx.max_iterations, ctx.genre, ctx.voice, ctx.negative_prompt
    )
}

fn build_user_prompt(text: &str, ctx: &ScoreContext) -> String {
    let mut prompt = String::new();
    prompt.push_str("Passage to score:\n");
    prompt.push_str(text);
    prompt.push_str("\n\n");
    if !ctx.previous_fixes.is_empty() {
        prompt.push_str("Fixes already accepted this chunk (do not repeat):\n");
        for fix in &ctx.previous_fixes {
            prompt.push_str("- ");
            prompt.push_str(fix);
            prompt.push('\n');
        }
    }
    if !ctx.attempted_fixes.is_empty() {
        prompt.push_str("Fixes already attempted and rejected (do not retry these strategies):\n");
        for fix in &ctx.attempted_fixes {
            prompt.push_str("- ");
            prompt.push_str(fix);
            prompt.push('\n');
        }
    }
    if !ctx.lint_defects.is_empty() {
        prompt.push_str("Deterministic linter found these hard defects; prefer fixing these first:\n");
        for defect in &ctx.lint_defects {
            prompt.push_str("- ");
            prompt.push_str(&defect.text);
            prompt.push('\n');
        }
    }
    if let Some(ledger) = &ctx.intent_ledger {
        prompt.push_str(&format!(
            "Locked intent: POV={}, tense={}, core intent={}\n",
            ledger.pov_type, ledger.tense, ledger.core_intent
        ));
    }
    if let Some(rewrite) = &ctx.rewrite_context {
        prompt.push_str(&format!(
            "This is a rewrite rescore. Previous score: {}, previous issue count: {}.\n",
            rewrite.previous_score, rewrite.previous_issue_count
        ));
    }
    if !ctx.ai_instructions.is_empty() {
        prompt.push_str("Additional author instructions: ");
        prompt.push_str(&ctx.ai_instructions);
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use tokio::sync::mpsc;

    struct ScriptedBackend {
        response: String,
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn call(
            &self,
            _messages: &[crate::message::Message],
            _opts: &CallOptions,
        ) -> Result<String, crate::llm::LlmError> {
            Ok(self.response.clone())
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

    #[tokio::test]
    async fn score_and_fix_parses_response() {
        let response = r#"{
            "score": 80, "label": "Good",
            "subscores": {"sentenceVariety":12,"dialogueAuthenticity":12,"sensoryDetail":12,
                "emotionalResonance":12,"vocabularyPrecision":8,"narrativeFlow":8,
                "originalityVoice":8,"technicalExecution":8},
            "issues": [], "aiPatterns": [],
            "fourRequirementsFound": {"characterSpecificThought":false,"preciseObservation":false,
                "musicalSentence":false,"expectationBreak":false},
            "beforeScore": 80
        }"#;
        let scorer = Scorer::new(Arc::new(ScriptedBackend { response: response.to_string() }));
        let ctx = ScoreContext { threshold: 90, iteration_num: 1, max_iterations: 5, ..Default::default() };
        let review = scorer.score_and_fix("some text", &ctx).await.unwrap();
        assert_eq!(review.before_score, 80);
    }
}
