//! Engine configuration: the tunables enumerated in the generation
//! request and the Configuration table, loaded from the environment with
//! typed defaults, matching the teacher's `resolve_sqlite_db_name` idiom of
//! `dotenvy::dotenv().ok()` followed by `std::env::var(..).unwrap_or_else`.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Narrative point of view the chunk controller asks the LLM to hold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Voice {
    FirstPerson,
    ThirdLimited,
    ThirdOmniscient,
    ThirdObjective,
    SecondPerson,
    DeepPov,
    Unreliable,
    MultiplePov,
    StreamOfConsciousness,
    Epistolary,
    Auto,
}

impl FromStr for Voice {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "first-person" => Voice::FirstPerson,
            "third-limited" => Voice::ThirdLimited,
            "third-omniscient" => Voice::ThirdOmniscient,
            "third-objective" => Voice::ThirdObjective,
            "second-person" => Voice::SecondPerson,
            "deep-pov" => Voice::DeepPov,
            "unreliable" => Voice::Unreliable,
            "multiple-pov" => Voice::MultiplePov,
            "stream-of-consciousness" => Voice::StreamOfConsciousness,
            "epistolary" => Voice::Epistolary,
            "auto" => Voice::Auto,
            other => return Err(format!("unknown voice: {other}")),
        })
    }
}

/// Prose density descriptor. `poetry_level` (1..5) maps to one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum PoetryLevel {
    Spare = 1,
    Lean = 2,
    Balanced = 3,
    Lush = 4,
    Ornate = 5,
}

impl PoetryLevel {
    /// Clamp a raw `1..=5` integer to a valid level, defaulting out-of-range
    /// values to `Balanced` the way a UI slider would.
    #[must_use]
    pub fn from_level(level: u8) -> Self {
        match level {
            1 => Self::Spare,
            2 => Self::Lean,
            4 => Self::Lush,
            5 => Self::Ornate,
            _ => Self::Balanced,
        }
    }

    /// Style descriptor injected into the scorer/generator system prompt.
    #[must_use]
    pub fn descriptor(self) -> &'static str {
        match self {
            Self::Spare => "spare, clipped sentences; minimal figurative language",
            Self::Lean => "lean prose with occasional, restrained imagery",
            Self::Balanced => "balanced prose: clear narrative drive with selective imagery",
            Self::Lush => "lush, sensory-rich prose with layered imagery",
            Self::Ornate => "ornate, densely figurative prose; maximal sensory texture",
        }
    }
}

/// Top-level engine configuration: the Configuration table from the
/// specification, loaded once at startup.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Threshold at which the Micro-Fix Loop exits successfully (50..100).
    pub quality_threshold: u8,
    /// Prose density (1..5), see [`PoetryLevel`].
    pub poetry_level: u8,
    /// Multi-agent fan-out width (1..10).
    pub agent_count: u8,
    /// Whether per-chapter continuity GO/NO-GO judging runs.
    pub chapter_agents_enabled: bool,
    /// Fraction of `project_goal` within which write-to-goal mode stops
    /// scheduling further sessions. Expressed as a fraction, e.g. `0.03`.
    pub write_to_goal_overshoot: f64,
    /// API base URL for the Messages-style chat-completion endpoint.
    pub llm_api_base: String,
    /// API key sent via the request header.
    pub llm_api_key: Option<String>,
    /// Model identifier sent in each request.
    pub llm_model: String,
    /// Normal-mode chunk size in words.
    pub chunk_size_words: u32,
    /// Iterative single-paragraph mode chunk size in words.
    pub iterative_chunk_size_words: u32,
    /// Max micro-fix passes per chunk in bulk-generation mode.
    pub max_fix_passes_bulk: u32,
    /// Max micro-fix passes per chunk in iterative-write mode.
    pub max_fix_passes_iterative: u32,
}

impl EngineConfig {
    /// Load configuration from `.env` (if present) and the process
    /// environment, falling back to documented defaults for every field.
    #[must_use]
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            quality_threshold: env_parsed("IPGRE_QUALITY_THRESHOLD", 90),
            poetry_level: env_parsed("IPGRE_POETRY_LEVEL", 3),
            agent_count: env_parsed("IPGRE_AGENT_COUNT", 1),
            chapter_agents_enabled: env_parsed("IPGRE_CHAPTER_AGENTS_ENABLED", false),
            write_to_goal_overshoot: env_parsed("IPGRE_WRITE_TO_GOAL_OVERSHOOT", 0.03),
            llm_api_base: std::env::var("IPGRE_LLM_API_BASE")
                .unwrap_or_else(|_| "https://api.anthropic.com/v1/messages".to_string()),
            llm_api_key: std::env::var("IPGRE_LLM_API_KEY").ok(),
            llm_model: std::env::var("IPGRE_LLM_MODEL")
                .unwrap_or_else(|_| "claude-sonnet-4-5".to_string()),
            chunk_size_words: env_parsed("IPGRE_CHUNK_SIZE_WORDS", 1000),
            iterative_chunk_size_words: env_parsed("IPGRE_ITERATIVE_CHUNK_SIZE_WORDS", 100),
            max_fix_passes_bulk: env_parsed("IPGRE_MAX_FIX_PASSES_BULK", 8),
            max_fix_passes_iterative: env_parsed("IPGRE_MAX_FIX_PASSES_ITERATIVE", 5),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            quality_threshold: 90,
            poetry_level: 3,
            agent_count: 1,
            chapter_agents_enabled: false,
            write_to_goal_overshoot: 0.03,
            llm_api_base: "https://api.anthropic.com/v1/messages".to_string(),
            llm_api_key: None,
            llm_model: "claude-sonnet-4-5".to_string(),
            chunk_size_words: 1000,
            iterative_chunk_size_words: 100,
            max_fix_passes_bulk: 8,
            max_fix_passes_iterative: 5,
        }
    }
}

fn env_parsed<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
