//! Events that can occur in a conversation

use super::state::{AuthFlow, Location, User};
use serde::{Deserialize, Serialize};

/// How the inbound text should be interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageKind {
    /// Free text typed by the user
    #[default]
    PlainText,
    /// Reply to a list or button; the text is the option id
    StructuredChoice,
}

/// Result of an `authenticate` oracle call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Granted(User),
    /// The oracle answered and rejected the credentials
    Denied,
    /// The oracle failed or timed out
    Unavailable,
}

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // User events
    Inbound {
        text: String,
        kind: MessageKind,
    },

    // Oracle events
    AuthCompleted {
        flow: AuthFlow,
        outcome: AuthOutcome,
    },
    /// `location` is `None` both when the oracle has no fix and when it failed
    LocateCompleted {
        vehicle_id: String,
        location: Option<Location>,
    },
    BlockCompleted {
        vehicle_id: String,
        blocked: bool,
        success: bool,
    },
}

impl Event {
    pub fn text(text: impl Into<String>) -> Self {
        Event::Inbound {
            text: text.into(),
            kind: MessageKind::PlainText,
        }
    }

    pub fn choice(option_id: impl Into<String>) -> Self {
        Event::Inbound {
            text: option_id.into(),
            kind: MessageKind::StructuredChoice,
        }
    }

    /// Stable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::Inbound { .. } => "inbound",
            Event::AuthCompleted { .. } => "auth_completed",
            Event::LocateCompleted { .. } => "locate_completed",
            Event::BlockCompleted { .. } => "block_completed",
        }
    }
}
