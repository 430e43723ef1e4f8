//! Versioned containers shared by [`crate::session`] and [`crate::engine`].
//!
//! A `Channel` tracks its own version counter, bumped only when its content
//! actually changes. The engine uses this to detect "did anything really
//! change this step" without diffing the whole session state by hand.

pub mod errors;

use serde::{Deserialize, Serialize};

use crate::types::ChannelType;
use errors::ErrorEvent;

/// A versioned container of items. Implementors must only bump their
/// version when `get_mut()` is used to actually change the contents.
pub trait Channel<T> {
    fn get_channel_type(&self) -> ChannelType;
    fn persistent(&self) -> bool;
    fn version(&self) -> u32;
    fn set_version(&mut self, version: u32);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn get_mut(&mut self) -> &mut Vec<T>;
    fn snapshot(&self) -> Vec<T>
    where
        T: Clone;
}

/// Session-scoped error history: every [`ErrorEvent`] raised while
/// generating, independent of the cross-session [`crate::error_store`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct ErrorsChannel {
    items: Vec<ErrorEvent>,
    version: u32,
}

impl ErrorsChannel {
    pub fn new(items: Vec<ErrorEvent>, version: u32) -> Self {
        Self { items, version }
    }
}

impl Channel<ErrorEvent> for ErrorsChannel {
    fn get_channel_type(&self) -> ChannelType {
        ChannelType::Errors
    }

    fn persistent(&self) -> bool {
        true
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn get_mut(&mut self) -> &mut Vec<ErrorEvent> {
        &mut self.items
    }

    fn snapshot(&self) -> Vec<ErrorEvent> {
        self.items.clone()
    }
}

/// Free-form JSON metadata channel: intent ledgers, rewrite convergence
/// history, and other small bookkeeping values that don't warrant their
/// own struct field on [`crate::session::SessionState`].
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ExtrasChannel {
    items: Vec<serde_json::Value>,
    version: u32,
}

impl ExtrasChannel {
    pub fn new(items: Vec<serde_json::Value>, version: u32) -> Self {
        Self { items, version }
    }
}

impl Channel<serde_json::Value> for ExtrasChannel {
    fn get_channel_type(&self) -> ChannelType {
        ChannelType::Extra
    }

    fn persistent(&self) -> bool {
        false
    }

    fn version(&self) -> u32 {
        self.version
    }

    fn set_version(&mut self, version: u32) {
        self.version = version;
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn get_mut(&mut self) -> &mut Vec<serde_json::Value> {
        &mut self.items
    }

    fn snapshot(&self) -> Vec<serde_json::Value> {
        self.items.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_channel_basics() {
        let mut ch = ErrorsChannel::default();
        assert_eq!(ch.get_channel_type(), ChannelType::Errors);
        assert!(ch.persistent());
        assert_eq!(ch.version(), 0);
        assert!(ch.is_empty());

        ch.get_mut()
            .push(ErrorEvent::engine(errors::LadderError::msg("boom")));
        ch.set_version(ch.version() + 1);
        assert_eq!(ch.len(), 1);
        assert_eq!(ch.version(), 1);
        assert_eq!(ch.snapshot().len(), 1);
    }

    #[test]
    fn errors_channel_new_constructor() {
        let events = vec![ErrorEvent::engine(errors::LadderError::msg("x"))];
        let ch = ErrorsChannel::new(events.clone(), 3);
        assert_eq!(ch.version(), 3);
        assert_eq!(ch.snapshot(), events);
    }
}
