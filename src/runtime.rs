//! Runtime for executing conversation turns
//!
//! The dispatcher owns the I/O: it feeds inbound messages through the pure
//! state machine and carries out the resulting effects against an [`Oracle`]
//! and a [`Gateway`].

mod dispatcher;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use dispatcher::{
    Dispatcher, DispatcherConfig, InboundMessage, TurnError, TurnOutcome, DEFAULT_ORACLE_TIMEOUT,
};
pub use traits::*;

use std::sync::Arc;

/// Type alias for the production dispatcher with boxed collaborators
pub type ProductionDispatcher = Dispatcher<Arc<dyn Oracle>, Arc<dyn Gateway>>;
