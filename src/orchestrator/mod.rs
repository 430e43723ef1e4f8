//! Multi-Agent Orchestrator (§4.G, optional path): runs `agent_count` author
//! voices in parallel, each producing a full candidate draft, then stitches
//! the best paragraph from each position into one "chimera" draft with
//! smoothed transitions. The stitched draft is handed to the Micro-Fix Loop
//! unchanged, same as a single-agent chunk draft.

mod chimera;
mod roster;

pub use chimera::{StitchOutcome, stitch};
pub use roster::{AgentProfile, WILDCARD_PROFILES, build_roster};

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use miette::Diagnostic;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::llm::{CallOptions, LlmClient, LlmError};

/// Candidates are staggered by this much to soften simultaneous rate-limit
/// pressure on the provider (§4.G step 2).
const STAGGER: Duration = Duration::from_millis(300);

#[derive(Debug, Error, Diagnostic)]
pub enum OrchestratorError {
    #[error("no agent in the roster produced a usable draft")]
    #[diagnostic(code(ipgre::orchestrator::no_candidates))]
    NoCandidates,
}

/// One agent's full candidate draft, or `None` if that agent's call failed
/// even after the client's built-in rate-limit retry.
#[derive(Clone, Debug)]
pub struct Candidate {
    pub agent_name: String,
    pub text: String,
}

/// Launch every agent in `roster` in parallel (staggered by [`STAGGER`]),
/// each with its own temperature and voice prompt layered onto
/// `system_base`, and join on all completions. Per-agent failures are
/// dropped rather than failing the whole fan-out; [`OrchestratorError::NoCandidates`]
/// is only returned if every agent failed.
#[instrument(skip(llm, roster, system_base, user_prompt), fields(agent_count = roster.len()))]
pub async fn generate_candidates(
    llm: Arc<LlmClient>,
    roster: &[AgentProfile],
    system_base: &str,
    user_prompt: &str,
    max_tokens: u32,
) -> Result<Vec<Candidate>, OrchestratorError> {
    let tasks = roster.iter().enumerate().map(|(i, profile)| {
        let llm = Arc::clone(&llm);
        let system = format!("{system_base}\n\nVoice direction: {}", profile.voice_prompt);
        let user = user_prompt.to_string();
        let name = profile.name.clone();
        let temperature = profile.temperature;
        let delay = STAGGER * i as u32;
        async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = llm
                .call(&system, &user, CallOptions {
                    max_tokens,
                    temperature,
                })
                .await;
            (name, result)
        }
    });

    let results = join_all(tasks).await;
    let mut candidates = Vec::with_capacity(results.len());
    for (agent_name, result) in results {
        match result {
            Ok(text) if !text.trim().is_empty() => candidates.push(Candidate { agent_name, text }),
            Ok(_) => warn!(agent_name, "agent returned empty draft, dropping"),
            Err(e) => warn!(agent_name, error = %e, "agent draft failed, dropping"),
        }
    }

    if candidates.is_empty() {
        return Err(OrchestratorError::NoCandidates);
    }
    info!(produced = candidates.len(), requested = roster.len(), "fan-out complete");
    Ok(candidates)
}

/// Run the full orchestrated path: fan out, then stitch into one chimera
/// draft with smoothed transitions (§4.G).
#[instrument(skip(llm, roster, system_base, user_prompt))]
pub async fn run(
    llm: Arc<LlmClient>,
    roster: &[AgentProfile],
    system_base: &str,
    user_prompt: &str,
    max_tokens: u32,
) -> Result<String, OrchestratorError> {
    let candidates = generate_candidates(llm.clone(), roster, system_base, user_prompt, max_tokens).await?;
    let outcome = stitch(&llm, candidates).await;
    Ok(outcome.text)
}

pub(crate) fn llm_error_is_retryable(e: &LlmError) -> bool {
    matches!(e, LlmError::RateLimited)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmBackend;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use tokio::sync::mpsc;

    struct RosterBackend {
        calls: AtomicU32,
    }

    #[async_trait]
    impl LlmBackend for RosterBackend {
        async fn call(&self, messages: &[crate::message::Message], _opts: &CallOptions) -> Result<String, LlmError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let voice = messages[0].content.clone();
            if voice.contains("restraint") {
                return Ok(String::new());
            }
            Ok(format!("Draft from: {voice}"))
        }

        async fn generate_stream(
            &self,
            _messages: &[crate::message::Message],
            _max_tokens: u32,
            _cancelled: Arc<AtomicBool>,
            _tx: mpsc::Sender<crate::llm::StreamDelta>,
        ) -> Result<(), LlmError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn generate_candidates_drops_empty_and_failed_agents() {
        let backend = Arc::new(RosterBackend { calls: AtomicU32::new(0) });
        let llm = Arc::new(LlmClient::new(backend));
        let roster = build_roster(&["Voice A".to_string()], 3);
        let candidates = generate_candidates(llm, &roster, "base", "continue", 512)
            .await
            .unwrap();
        assert!(candidates.len() <= roster.len());
        assert!(candidates.iter().all(|c| !c.text.is_empty()));
    }

    struct AlwaysFailBackend;

    #[async_trait]
    impl LlmBackend for AlwaysFailBackend {
        async fn call(&self, _messages: &[crate::message::Message], _opts: &CallOptions) -> Result<String, LlmError> {
            Err(LlmError::ApiError("boom".to_string()))
        }

        async fn generate_stream(
            &self,
            _messages: &[crate::message::Message],
            _max_tokens: u32,
            _cancelled: Arc<AtomicBool>,
            _tx: mpsc::Sender<crate::llm::StreamDelta>,
        ) -> Result<(), LlmError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn generate_candidates_errors_when_all_agents_fail() {
        let llm = Arc::new(LlmClient::new(Arc::new(AlwaysFailBackend)));
        let roster = build_roster(&[], 2);
        let result = generate_candidates(llm, &roster, "base", "continue", 512).await;
        assert!(matches!(result, Err(OrchestratorError::NoCandidates)));
    }

    #[test]
    fn retryable_classification() {
        assert!(llm_error_is_retryable(&LlmError::RateLimited));
        assert!(!llm_error_is_retryable(&LlmError::ApiError("x".to_string())));
    }
}
