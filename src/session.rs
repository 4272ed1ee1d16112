//! Per-user sessions
//!
//! The [`SessionStore`] owns every live session together with the
//! [`DedupGuard`] of recently handled message ids, behind a single lock.

mod dedup;
mod store;

pub use dedup::{DedupGuard, DEFAULT_DEDUP_CAPACITY};
pub use store::{SessionStore, DEFAULT_IDLE_TIMEOUT_MINUTES};

use crate::conversation::{ConvState, User, Vehicle};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Conversation state of one end user plus its activity clock
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    /// Channel address (phone number) of the end user
    pub user_id: String,
    pub state: ConvState,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            state: ConvState::Initial,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn user(&self) -> Option<&User> {
        self.state.user()
    }

    pub fn pending_identifier(&self) -> Option<&str> {
        self.state.pending_identifier()
    }

    pub fn selected_vehicle(&self) -> Option<&Vehicle> {
        self.state.selected_vehicle()
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }
}
