//! Messages the host can post to a worker.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Leave the waiting phase and activate now.
    SkipWaiting,
}

impl ControlMessage {
    /// Recognized commands only; anything else is `None`.
    pub fn parse(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }

    pub fn to_value(self) -> Value {
        serde_json::json!(self)
    }
}

/// What a worker did with a posted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    SkipWaiting,
    Ignored,
}
