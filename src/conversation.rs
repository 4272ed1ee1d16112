//! Conversation state machine
//!
//! Pure transitions over a per-user [`ConvState`]. Oracle calls and outbound
//! messages are returned as [`Effect`]s; the dispatcher executes them and
//! feeds oracle outcomes back in as [`Event`]s.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{ChoiceOption, Effect, ListSection, Secret};
pub use event::{AuthOutcome, Event, MessageKind};
pub use state::{
    AuthFlow, ConvContext, ConvState, Location, User, Vehicle, DEFAULT_IDENTIFIER_LENGTH,
};
pub use transition::{transition, TransitionError, TransitionResult};
