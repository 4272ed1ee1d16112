//! Turn dispatcher
//!
//! Runs one inbound message through dedup, the session store and the state
//! machine, executing effects until no event is left.

use super::traits::{Gateway, Oracle};
use crate::conversation::{
    transition, AuthFlow, AuthOutcome, ConvContext, Effect, Event, MessageKind, TransitionError,
    DEFAULT_IDENTIFIER_LENGTH,
};
use crate::gateway::GatewayError;
use crate::oracle::OracleError;
use crate::session::SessionStore;
use futures::FutureExt;
use std::any::Any;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;

/// Default bound on a single oracle call
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(10);

/// One inbound message as handed over by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub user_id: String,
    /// Transport message id; `None` or empty disables deduplication
    pub message_id: Option<String>,
    pub kind: MessageKind,
    pub text: String,
}

impl InboundMessage {
    pub fn new(
        user_id: impl Into<String>,
        message_id: Option<String>,
        kind: MessageKind,
        text: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            message_id,
            kind,
            text: text.into(),
        }
    }

    fn dedup_key(&self) -> Option<&str> {
        self.message_id.as_deref().filter(|id| !id.is_empty())
    }
}

/// How a call to [`Dispatcher::process`] ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Handled,
    /// Message id already seen; nothing was done
    Duplicate,
    /// The turn failed; the error was logged and swallowed
    Failed,
}

#[derive(Debug, Error)]
pub enum TurnError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

/// Tuning that does not change per turn
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub auth_flow: AuthFlow,
    pub identifier_length: usize,
    pub oracle_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            auth_flow: AuthFlow::default(),
            identifier_length: DEFAULT_IDENTIFIER_LENGTH,
            oracle_timeout: DEFAULT_ORACLE_TIMEOUT,
        }
    }
}

/// Processes inbound messages, one turn at a time per user
pub struct Dispatcher<O, G>
where
    O: Oracle,
    G: Gateway,
{
    store: Arc<SessionStore>,
    oracle: O,
    gateway: G,
    config: DispatcherConfig,
    /// Per-user turn locks, created on demand and never removed
    turn_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl<O, G> Dispatcher<O, G>
where
    O: Oracle,
    G: Gateway,
{
    pub fn new(store: Arc<SessionStore>, oracle: O, gateway: G, config: DispatcherConfig) -> Self {
        Self {
            store,
            oracle,
            gateway,
            config,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Live session count for health checks
    pub fn active_sessions(&self) -> usize {
        self.store.active_count()
    }

    /// Handle one inbound message. Never fails: errors and panics inside the
    /// turn are logged and reported as [`TurnOutcome::Failed`].
    pub async fn process(&self, message: InboundMessage) -> TurnOutcome {
        let user_id = message.user_id.clone();
        match AssertUnwindSafe(self.run_turn(message)).catch_unwind().await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(e)) => {
                tracing::error!(%user_id, error = %e, "Turn failed");
                TurnOutcome::Failed
            }
            Err(panic) => {
                let panic = panic_message(panic.as_ref());
                tracing::error!(%user_id, %panic, "Turn panicked");
                TurnOutcome::Failed
            }
        }
    }

    fn turn_lock(&self, user_id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .turn_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        locks.entry(user_id.to_string()).or_default().clone()
    }

    async fn run_turn(&self, message: InboundMessage) -> Result<TurnOutcome, TurnError> {
        let lock = self.turn_lock(&message.user_id);
        let _turn = lock.lock().await;

        // The id is marked before the state machine runs, so a redelivery
        // is dropped even if this turn fails
        let message_id = message.dedup_key().map(str::to_string);
        let Some(mut session) = self
            .store
            .begin_turn(&message.user_id, message_id.as_deref())
        else {
            tracing::info!(
                user_id = %message.user_id,
                message_id = message_id.as_deref().unwrap_or_default(),
                "Duplicate delivery dropped"
            );
            return Ok(TurnOutcome::Duplicate);
        };
        let context = ConvContext::new(
            &message.user_id,
            self.config.auth_flow,
            self.config.identifier_length,
        );
        tracing::debug!(
            user_id = %message.user_id,
            state = session.state.name(),
            kind = ?message.kind,
            "Inbound message"
        );

        let mut events = VecDeque::from([Event::Inbound {
            text: message.text,
            kind: message.kind,
        }]);
        let mut ended = false;

        while let Some(event) = events.pop_front() {
            let event_name = event.name();
            let result = transition(&session.state, &context, event)?;
            tracing::debug!(
                user_id = %context.user_id,
                from = session.state.name(),
                to = result.new_state.name(),
                event = event_name,
                "Transition"
            );
            session.state = result.new_state;

            for effect in result.effects {
                if matches!(effect, Effect::EndSession) {
                    self.store.end(&context.user_id, message_id.as_deref());
                    ended = true;
                    continue;
                }
                if let Some(next) = self.execute_effect(&context.user_id, effect).await {
                    events.push_back(next);
                }
            }
        }

        if !ended {
            self.store.put(session);
        }
        Ok(TurnOutcome::Handled)
    }

    /// Run one effect; oracle calls answer with the event to feed back
    async fn execute_effect(&self, user_id: &str, effect: Effect) -> Option<Event> {
        let name = effect.name();
        match effect {
            Effect::SendText { body } => {
                deliver(user_id, name, self.gateway.send_text(user_id, &body)).await;
                None
            }
            Effect::SendButtons { body, options } => {
                deliver(user_id, name, self.gateway.send_buttons(user_id, &body, &options)).await;
                None
            }
            Effect::SendList {
                body,
                button_label,
                sections,
            } => {
                let send = self
                    .gateway
                    .send_list(user_id, &body, &button_label, &sections);
                deliver(user_id, name, send).await;
                None
            }
            Effect::Authenticate {
                identifier,
                secret,
                flow,
            } => {
                let call = self.oracle.authenticate(&identifier, secret.expose(), flow);
                let outcome = match self.call_oracle(user_id, name, call).await {
                    Ok(Some(user)) => AuthOutcome::Granted(user),
                    Ok(None) => AuthOutcome::Denied,
                    Err(_) => AuthOutcome::Unavailable,
                };
                tracing::info!(
                    %user_id,
                    %flow,
                    granted = matches!(outcome, AuthOutcome::Granted(_)),
                    "Authentication finished"
                );
                Some(Event::AuthCompleted { flow, outcome })
            }
            Effect::Locate { vehicle_id, token } => {
                let call = self.oracle.locate(&vehicle_id, &token);
                let location = self.call_oracle(user_id, name, call).await.ok().flatten();
                Some(Event::LocateCompleted {
                    vehicle_id,
                    location,
                })
            }
            Effect::SetBlocked {
                vehicle_id,
                token,
                blocked,
            } => {
                let call = self.oracle.set_blocked(&vehicle_id, &token, blocked);
                let success = self.call_oracle(user_id, name, call).await.unwrap_or(false);
                tracing::info!(%user_id, %vehicle_id, blocked, success, "Block command finished");
                Some(Event::BlockCompleted {
                    vehicle_id,
                    blocked,
                    success,
                })
            }
            Effect::EndSession => None,
        }
    }

    /// Bound an oracle call by the configured timeout
    async fn call_oracle<T>(
        &self,
        user_id: &str,
        operation: &'static str,
        call: impl Future<Output = Result<T, OracleError>>,
    ) -> Result<T, OracleError> {
        let limit = self.config.oracle_timeout;
        let result = tokio::time::timeout(limit, call)
            .await
            .unwrap_or_else(|_| {
                Err(OracleError::timeout(format!(
                    "{operation} timed out after {limit:?}"
                )))
            });
        if let Err(e) = &result {
            tracing::warn!(%user_id, operation, kind = ?e.kind, error = %e, "Oracle call failed");
        }
        result
    }
}

/// Send one outbound message; failures are logged and do not stop the turn
async fn deliver(
    user_id: &str,
    operation: &'static str,
    send: impl Future<Output = Result<(), GatewayError>>,
) {
    if let Err(e) = send.await {
        tracing::warn!(%user_id, operation, error = %e, "Outbound message failed");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
