//! # IPGRE: Iterative Prose Generation & Refinement Engine
//!
//! IPGRE drives a large-language-model through draft generation, deterministic
//! linting, model-scored evaluation, targeted micro-fixes, and cross-session
//! error learning to produce long-form fiction that reliably meets a
//! configured quality threshold.
//!
//! ## Core Concepts
//!
//! - [`linter`] — pure, deterministic prose checks (banned phrases, budgets,
//!   tricolon/kicker density, paragraph variance, Four Requirements).
//! - [`llm`] — streaming and non-streaming calls against a Messages-style
//!   chat-completion endpoint, with cancellation and rate-limit retry.
//! - [`scorer`] — the single model call that scores a passage and proposes
//!   one surgical micro-fix.
//! - [`error_store`] — a persistent, fingerprinted bag of recurring defects
//!   used to build a negative prompt.
//! - [`session`] — in-memory generation state for one chunk's micro-fix loop.
//! - [`micro_fix`] — the score → fix → validate loop (the heart of the engine).
//! - [`chunk_controller`] — drives a word target to completion across chunks.
//! - [`orchestrator`] — optional multi-agent "chimera" composition.
//! - [`rewrite`] — user-triggered targeted rewrites of an existing review.
//! - [`engine`] — the top-level facade wiring the above together.
//!
//! ## Quick Start
//!
//! ```
//! use ipgre::config::EngineConfig;
//!
//! let config = EngineConfig::default();
//! assert_eq!(config.quality_threshold, 90);
//! ```
//!
//! ### Linting a passage
//!
//! ```
//! use ipgre::linter::lint;
//!
//! let report = lint("Mara crossed the frozen yard and counted the windows twice.");
//! assert_eq!(report.stats.hard_defects, 0);
//! ```
//!
//! ### Building messages for the LLM client
//!
//! ```
//! use ipgre::message::Message;
//!
//! let system = Message::system("You are a prose drafting engine.");
//! let user = Message::user("Continue the scene.");
//! assert!(system.has_role(Message::SYSTEM));
//! assert!(user.has_role(Message::USER));
//! ```
//!
//! ## Module Guide
//!
//! - [`config`] - engine configuration and tunables
//! - [`message`] - chat message type shared by the LLM client and scorer
//! - [`linter`] - deterministic prose linter
//! - [`llm`] - streaming/non-streaming LLM client
//! - [`scorer`] - scorer / micro-fixer
//! - [`error_store`] - cross-session error pattern store
//! - [`session`] - per-chunk generation state
//! - [`micro_fix`] - the micro-fix loop
//! - [`chunk_controller`] - the chunk-by-chunk generation state machine
//! - [`orchestrator`] - multi-agent chimera composition
//! - [`rewrite`] - user-triggered targeted rewrite action
//! - [`engine`] - top-level facade
//! - [`channels`] - versioned session-scoped containers (errors, extras)
//! - [`event_bus`] - event broadcasting and sinks for observability/streaming
//! - [`telemetry`] - human-readable event/error formatting
//! - [`types`] - small shared types
//! - [`utils`] - JSON helpers shared by the scorer's parser and error store

pub mod channels;
pub mod chunk_controller;
pub mod config;
pub mod engine;
pub mod error_store;
pub mod event_bus;
pub mod linter;
pub mod llm;
pub mod message;
pub mod micro_fix;
pub mod orchestrator;
pub mod rewrite;
pub mod scorer;
pub mod session;
pub mod telemetry;
pub mod types;
pub mod utils;
