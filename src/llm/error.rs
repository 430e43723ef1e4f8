use miette::Diagnostic;
use thiserror::Error;

/// Errors surfaced by the LLM client. See §7: `RateLimited` and `ApiError`
/// are the only variants the Chunk Controller shows the user; `Cancelled`
/// unwinds silently.
#[derive(Debug, Error, Diagnostic)]
pub enum LlmError {
    /// HTTP 429 (or an equivalent provider error code) on the retry attempt.
    #[error("rate limited after retry")]
    #[diagnostic(code(ipgre::llm::rate_limited), help("wait and retry the generation session later"))]
    RateLimited,

    /// Any other model/provider failure.
    #[error("LLM API error: {0}")]
    #[diagnostic(code(ipgre::llm::api_error))]
    ApiError(String),

    /// The response body could not be decoded as UTF-8 text or valid SSE.
    #[error("failed to parse LLM response: {0}")]
    #[diagnostic(code(ipgre::llm::parse_failure))]
    ParseFailure(String),

    /// The caller cancelled the in-flight request before it completed.
    #[error("generation cancelled")]
    #[diagnostic(code(ipgre::llm::cancelled))]
    Cancelled,
}
