use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::{FormatterMode, PlainFormatter, TelemetryFormatter};

/// Represents an error event with scope, error details, tags, and context.
///
/// # JSON Serialization Format
///
/// `ErrorEvent` serializes to JSON with the following structure:
///
/// ```json
/// {
///   "when": "2025-11-02T10:30:00Z",
///   "scope": {
///     "scope": "llm",
///     "session": "sess-1",
///     "step": 3
///   },
///   "error": {
///     "message": "rate limited",
///     "cause": null,
///     "details": {}
///   },
///   "tags": ["retryable"],
///   "context": {}
/// }
/// ```
///
/// The `scope` field uses a tagged union format with a discriminator field named `"scope"`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorEvent {
    #[serde(default = "chrono::Utc::now")]
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub scope: ErrorScope,
    #[serde(default)]
    pub error: LadderError,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl ErrorEvent {
    /// Create a linter-scoped error event (parse/regex-engine failure during lint).
    pub fn linter(chunk: u64, error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Linter { chunk },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create an LLM-client-scoped error event.
    pub fn llm<S: Into<String>>(session: S, step: u64, error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Llm {
                session: session.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a scorer-scoped error event.
    pub fn scorer<S: Into<String>>(session: S, step: u64, error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Scorer {
                session: session.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a chunk-controller-scoped error event.
    pub fn chunk_controller<S: Into<String>>(session: S, chunk: u64, error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::ChunkController {
                session: session.into(),
                chunk,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a micro-fix-loop-scoped error event.
    pub fn micro_fix<S: Into<String>>(session: S, chunk: u64, pass: u32, error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::MicroFix {
                session: session.into(),
                chunk,
                pass,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create an orchestrator-scoped error event (one parallel agent's failure).
    pub fn orchestrator<S: Into<String>, A: Into<String>>(session: S, agent: A, error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Orchestrator {
                session: session.into(),
                agent: agent.into(),
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create an engine-scoped error event (no finer-grained scope applies).
    pub fn engine(error: LadderError) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Engine,
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ErrorScope {
    Linter {
        chunk: u64,
    },
    Llm {
        session: String,
        step: u64,
    },
    Scorer {
        session: String,
        step: u64,
    },
    ChunkController {
        session: String,
        chunk: u64,
    },
    MicroFix {
        session: String,
        chunk: u64,
        pass: u32,
    },
    Orchestrator {
        session: String,
        agent: String,
    },
    #[default]
    Engine,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LadderError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<LadderError>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Default for LadderError {
    fn default() -> Self {
        LadderError {
            message: String::new(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for LadderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for LadderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &dyn std::error::Error)
    }
}

impl LadderError {
    pub fn msg<M: Into<String>>(m: M) -> Self {
        LadderError {
            message: m.into(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_cause(mut self, cause: LadderError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// Format error events with explicit color mode control.
pub fn pretty_print_with_mode(events: &[ErrorEvent], mode: FormatterMode) -> String {
    let formatter = PlainFormatter::with_mode(mode);
    let renders = formatter.render_errors(events);
    let mut out = String::new();
    for (idx, render) in renders.into_iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        for line in render.lines {
            out.push_str(&line);
        }
    }
    out
}

/// Format error events as human-readable text with auto-detected color support.
pub fn pretty_print(events: &[ErrorEvent]) -> String {
    pretty_print_with_mode(events, FormatterMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_round_trips_through_json() {
        let event = ErrorEvent::llm("sess-1", 3, LadderError::msg("rate limited"))
            .with_tag("retryable");
        let json = serde_json::to_string(&event).unwrap();
        let back: ErrorEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
        assert!(json.contains("\"scope\":\"llm\""));
    }

    #[test]
    fn pretty_print_plain_has_no_ansi() {
        let events = vec![ErrorEvent::engine(LadderError::msg("boom"))];
        let plain = pretty_print_with_mode(&events, FormatterMode::Plain);
        assert!(!plain.contains('\x1b'));
        let colored = pretty_print_with_mode(&events, FormatterMode::Colored);
        assert!(colored.contains('\x1b'));
    }
}
