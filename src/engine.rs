//! Top-level facade wiring configuration, the LLM client, scorer, error
//! store, and event bus into the operations a caller actually drives:
//! chunk-by-chunk generation, write-to-goal cascades, multi-agent
//! orchestration, and targeted rewrites. Grounded on the teacher's `App`
//! builder (`app.rs`): a small struct assembled once via chained `with_*`
//! methods, then reused across many runs.

use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;
use tracing::{info, instrument};

use crate::chunk_controller::{self, ChunkControllerError, FinalizeReport, GenerationRequest};
use crate::config::EngineConfig;
use crate::error_store::ErrorStore;
use crate::event_bus::EventBus;
use crate::llm::{LlmBackend, LlmClient};
use crate::orchestrator::{self, AgentProfile, OrchestratorError};
use crate::rewrite::{self, RewriteError, RewriteOutcome, RewriteScope, RewriteState};
use crate::scorer::Scorer;

#[derive(Debug, Error, Diagnostic)]
pub enum EngineError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    ChunkController(#[from] ChunkControllerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Orchestrator(#[from] OrchestratorError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Rewrite(#[from] RewriteError),
}

/// The engine's assembled collaborators: one LLM backend shared by the
/// client and scorer, an error store, and an optional event bus wired into
/// the client's emitter.
pub struct Engine {
    config: EngineConfig,
    backend: Arc<dyn LlmBackend>,
    llm: Arc<LlmClient>,
    scorer: Scorer,
    error_store: ErrorStore,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig, backend: Arc<dyn LlmBackend>) -> Self {
        let llm = Arc::new(LlmClient::new(backend.clone()));
        let scorer = Scorer::new(backend.clone());
        Self {
            config,
            backend,
            llm,
            scorer,
            error_store: ErrorStore::default(),
        }
    }

    /// Wire an [`EventBus`]'s emitter into the LLM client so stream deltas,
    /// chunk events, and errors broadcast to every configured sink.
    #[must_use]
    pub fn with_event_bus(mut self, event_bus: &EventBus) -> Self {
        let emitter = event_bus.get_emitter();
        self.llm = Arc::new(LlmClient::new(self.backend.clone()).with_emitter(emitter));
        self
    }

    /// Replace the default in-memory error store, e.g. with a
    /// `SqliteErrorStoreBackend`-backed one for cross-process persistence.
    #[must_use]
    pub fn with_error_store(mut self, error_store: ErrorStore) -> Self {
        self.error_store = error_store;
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drive one bounded generation session to completion (§4.E).
    #[instrument(skip(self, request))]
    pub async fn run_session(&self, session_key: &str, request: &GenerationRequest) -> Result<FinalizeReport, EngineError> {
        let report = chunk_controller::run_session(&self.llm, &self.scorer, &self.error_store, session_key, request).await?;
        Ok(report)
    }

    /// Write-to-goal cascade (§4.E): keep scheduling bounded sessions,
    /// each capped at 2 000 new words, until the running total is within
    /// `config.write_to_goal_overshoot` of `project_goal`. The final
    /// scheduled session sets `conclude_story` so the model wraps up the
    /// narrative rather than continuing indefinitely.
    #[instrument(skip(self, request), fields(project_goal))]
    pub async fn run_to_project_goal(
        &self,
        session_key: &str,
        mut request: GenerationRequest,
        project_goal: u32,
    ) -> Result<FinalizeReport, EngineError> {
        const WRITE_TO_GOAL_CHUNK_CAP: u32 = 2000;

        loop {
            let report = self.run_session(session_key, &request).await?;
            let total_words = chunk_controller::word_count(&report.text) as u32;
            let overshoot_floor = (f64::from(project_goal) * (1.0 - self.config.write_to_goal_overshoot)) as u32;

            if total_words >= overshoot_floor {
                info!(total_words, project_goal, "write-to-goal target reached");
                return Ok(report);
            }

            let remaining = project_goal.saturating_sub(total_words);
            let next_target = remaining.min(WRITE_TO_GOAL_CHUNK_CAP);
            let conclude = next_target >= remaining;
            info!(total_words, remaining, next_target, conclude, "scheduling another write-to-goal session");

            request = GenerationRequest {
                word_target: next_target,
                existing_content: report.text,
                conclude_story: conclude,
                ..request
            };
        }
    }

    /// Run the multi-agent orchestrated path (§4.G): fan out `agent_count`
    /// voices in parallel and stitch the best paragraph from each into one
    /// chimera draft, then run it through the Micro-Fix Loop exactly like a
    /// single-agent chunk draft.
    #[instrument(skip(self, system_base, user_prompt))]
    pub async fn run_orchestrated_draft(
        &self,
        author_palette: &[String],
        system_base: &str,
        user_prompt: &str,
        max_tokens: u32,
    ) -> Result<String, EngineError> {
        let roster: Vec<AgentProfile> = orchestrator::build_roster(author_palette, self.config.agent_count as usize);
        let draft = orchestrator::run(self.llm.clone(), &roster, system_base, user_prompt, max_tokens).await?;
        Ok(draft)
    }

    /// Run one Rewrite Action pass (§4.H) against an existing review.
    #[instrument(skip(self, state, snapshot_text, review))]
    pub async fn run_rewrite(
        &self,
        state: &mut RewriteState,
        snapshot_text: &str,
        review: &crate::scorer::ScoreReview,
        scope: &RewriteScope,
        voice: &str,
        genre: &str,
    ) -> Result<RewriteOutcome, EngineError> {
        let outcome = rewrite::run_rewrite(&self.llm, &self.scorer, state, snapshot_text, review, scope, voice, genre).await?;
        Ok(outcome)
    }
}
