//! Effects produced by state transitions

use super::state::AuthFlow;
use serde::Serialize;
use std::fmt;

/// A selectable option in a button or list message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChoiceOption {
    pub id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ChoiceOption {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A titled group of rows in a list message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListSection {
    pub title: String,
    pub rows: Vec<ChoiceOption>,
}

/// User-typed secret; never printed by `Debug`
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret([redacted])")
    }
}

/// Effects to be executed after state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Send a plain text message
    SendText { body: String },

    /// Send a message with up to three reply buttons
    SendButtons {
        body: String,
        options: Vec<ChoiceOption>,
    },

    /// Send a single-choice list
    SendList {
        body: String,
        button_label: String,
        sections: Vec<ListSection>,
    },

    /// Ask the oracle to authenticate; answered with `Event::AuthCompleted`
    Authenticate {
        identifier: String,
        secret: Secret,
        flow: AuthFlow,
    },

    /// Ask the oracle for a position; answered with `Event::LocateCompleted`
    Locate { vehicle_id: String, token: String },

    /// Ask the oracle to (un)block; answered with `Event::BlockCompleted`
    SetBlocked {
        vehicle_id: String,
        token: String,
        blocked: bool,
    },

    /// Destroy the session and its dedup record
    EndSession,
}

impl Effect {
    pub fn text(body: impl Into<String>) -> Self {
        Effect::SendText { body: body.into() }
    }

    pub fn buttons(body: impl Into<String>, options: Vec<ChoiceOption>) -> Self {
        Effect::SendButtons {
            body: body.into(),
            options,
        }
    }

    pub fn list(
        body: impl Into<String>,
        button_label: impl Into<String>,
        sections: Vec<ListSection>,
    ) -> Self {
        Effect::SendList {
            body: body.into(),
            button_label: button_label.into(),
            sections,
        }
    }

    /// Stable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Effect::SendText { .. } => "send_text",
            Effect::SendButtons { .. } => "send_buttons",
            Effect::SendList { .. } => "send_list",
            Effect::Authenticate { .. } => "authenticate",
            Effect::Locate { .. } => "locate",
            Effect::SetBlocked { .. } => "set_blocked",
            Effect::EndSession => "end_session",
        }
    }
}
