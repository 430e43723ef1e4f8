//! Scorer / Micro-Fixer: a single LLM call that both scores a passage and,
//! unless scoring alone was requested, proposes one surgical fix.

mod client;
mod parser;
mod types;

pub use client::Scorer;
pub use parser::ParseError;
pub use types::{
    AiPattern, FixCategory, FourRequirementsFound, IntentLedger, IntentLedgerContext, Issue,
    IssueSeverity, RewriteScoreContext, ScoreContext, ScoreReview, Subscores,
};

use miette::Diagnostic;
use thiserror::Error;

/// Errors the scorer can surface. `ParseFailure` is treated by the caller
/// (the Micro-Fix Loop) as "scoring failed this iteration" rather than a
/// fatal error (§7).
#[derive(Debug, Error, Diagnostic)]
pub enum ScorerError {
    #[error("scorer LLM call failed: {0}")]
    #[diagnostic(code(ipgre::scorer::llm))]
    Llm(#[from] crate::llm::LlmError),

    #[error("scorer response could not be parsed: {0}")]
    #[diagnostic(code(ipgre::scorer::parse_failure))]
    ParseFailure(#[from] ParseError),
}
