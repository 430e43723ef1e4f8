//! Core shared types for the engine's versioned channels.
//!
//! These mirror the channel-versioning idiom used throughout the engine:
//! any container that tracks a monotonically increasing version bumped
//! only when its contents actually change.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies the kind of data a versioned [`crate::channels::Channel`] holds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    /// Structured [`crate::channels::errors::ErrorEvent`] history for a session.
    Errors,
    /// Free-form JSON metadata (intent ledger cache, rewrite history, etc).
    Extra,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Errors => write!(f, "errors"),
            Self::Extra => write!(f, "extra"),
        }
    }
}
