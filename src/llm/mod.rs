//! Streaming and non-streaming calls against a Messages-style chat
//! completion endpoint, with cancellation and rate-limit retry.
//!
//! Every delta the client forwards (streaming or not) has em/en dashes and
//! double/triple hyphens stripped before it reaches a caller, per §4.B: the
//! prose that ever touches the editor or the linter never contains a raw
//! dash.

mod backend;
mod client;
mod error;

pub use backend::{CallOptions, HttpLlmBackend, LlmBackend, StreamDelta};
pub use client::{LlmClient, StreamHandle};
pub use error::LlmError;
