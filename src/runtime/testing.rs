//! Mock implementations for testing
//!
//! These mocks enable integration testing of the dispatcher without real I/O.

use super::traits::*;
use crate::conversation::{AuthFlow, ChoiceOption, ListSection, Location, User};
use crate::gateway::GatewayError;
use crate::oracle::OracleError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

// ============================================================================
// Mock Oracle
// ============================================================================

/// Oracle backed by fixed accounts, with switchable failures and latency
#[allow(dead_code)]
#[derive(Default)]
pub struct MockOracle {
    /// identifier -> (secret, user)
    accounts: HashMap<String, (String, User)>,
    /// channel address -> identifier
    channels: HashMap<String, String>,
    locations: HashMap<String, Location>,
    failing: AtomicBool,
    delay: Mutex<Option<Duration>>,
    /// Record of all calls, e.g. `set_blocked V001 true`
    pub calls: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl MockOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_account(
        mut self,
        identifier: impl Into<String>,
        secret: impl Into<String>,
        user: User,
    ) -> Self {
        self.accounts
            .insert(identifier.into(), (secret.into(), user));
        self
    }

    pub fn with_channel(
        mut self,
        address: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        self.channels.insert(address.into(), identifier.into());
        self
    }

    pub fn with_location(mut self, vehicle_id: impl Into<String>, location: Location) -> Self {
        self.locations.insert(vehicle_id.into(), location);
        self
    }

    /// Make every following call fail with a network error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every following call
    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    pub fn recorded_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count_calls(&self, operation: &str) -> usize {
        self.recorded_calls()
            .iter()
            .filter(|c| c.split_whitespace().next() == Some(operation))
            .count()
    }

    async fn enter(&self, call: String) -> Result<(), OracleError> {
        self.calls.lock().unwrap().push(call);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(OracleError::network("mock backend down"));
        }
        Ok(())
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn authenticate(
        &self,
        identifier: &str,
        secret: &str,
        flow: AuthFlow,
    ) -> Result<Option<User>, OracleError> {
        self.enter(format!("authenticate {identifier} {flow}")).await?;
        let user = match flow {
            AuthFlow::Credentials => self
                .accounts
                .get(identifier)
                .filter(|(expected, _)| expected == secret)
                .map(|(_, user)| user.clone()),
            AuthFlow::ChannelAddress => self
                .channels
                .get(identifier)
                .and_then(|id| self.accounts.get(id))
                .map(|(_, user)| user.clone()),
        };
        Ok(user)
    }

    async fn locate(&self, vehicle_id: &str, _token: &str) -> Result<Option<Location>, OracleError> {
        self.enter(format!("locate {vehicle_id}")).await?;
        Ok(self.locations.get(vehicle_id).cloned())
    }

    async fn set_blocked(
        &self,
        vehicle_id: &str,
        _token: &str,
        blocked: bool,
    ) -> Result<bool, OracleError> {
        self.enter(format!("set_blocked {vehicle_id} {blocked}")).await?;
        Ok(true)
    }
}

// ============================================================================
// Recording Gateway
// ============================================================================

/// One message handed to the gateway
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text {
        to: String,
        body: String,
    },
    Buttons {
        to: String,
        body: String,
        options: Vec<ChoiceOption>,
    },
    List {
        to: String,
        body: String,
        button_label: String,
        sections: Vec<ListSection>,
    },
}

#[allow(dead_code)]
impl Outbound {
    pub fn body(&self) -> &str {
        match self {
            Outbound::Text { body, .. }
            | Outbound::Buttons { body, .. }
            | Outbound::List { body, .. } => body,
        }
    }

    /// Button ids or list row ids, in order
    pub fn option_ids(&self) -> Vec<&str> {
        match self {
            Outbound::Text { .. } => vec![],
            Outbound::Buttons { options, .. } => options.iter().map(|o| o.id.as_str()).collect(),
            Outbound::List { sections, .. } => sections
                .iter()
                .flat_map(|s| &s.rows)
                .map(|r| r.id.as_str())
                .collect(),
        }
    }
}

/// Gateway that records every message instead of sending it
#[allow(dead_code)]
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<Outbound>>,
    failing: AtomicBool,
}

#[allow(dead_code)]
impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record messages but report every send as failed
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<Outbound> {
        self.sent.lock().unwrap().clone()
    }

    /// Drain recorded messages
    pub fn take(&self) -> Vec<Outbound> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    fn push(&self, message: Outbound) -> Result<(), GatewayError> {
        self.sent.lock().unwrap().push(message);
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::Rejected {
                status: 500,
                body: "mock gateway down".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Gateway for RecordingGateway {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), GatewayError> {
        self.push(Outbound::Text {
            to: to.to_string(),
            body: body.to_string(),
        })
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        options: &[ChoiceOption],
    ) -> Result<(), GatewayError> {
        self.push(Outbound::Buttons {
            to: to.to_string(),
            body: body.to_string(),
            options: options.to_vec(),
        })
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<(), GatewayError> {
        self.push(Outbound::List {
            to: to.to_string(),
            body: body.to_string(),
            button_label: button_label.to_string(),
            sections: sections.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{ConvState, MessageKind, Vehicle};
    use crate::runtime::{Dispatcher, DispatcherConfig, InboundMessage, TurnOutcome};
    use crate::session::SessionStore;
    use std::sync::Arc;

    const USER: &str = "5511999990000";
    const ID: &str = "12345678900";
    const SECRET: &str = "rightpass";

    type TestDispatcher = Dispatcher<Arc<MockOracle>, Arc<RecordingGateway>>;

    struct Harness {
        dispatcher: TestDispatcher,
        oracle: Arc<MockOracle>,
        gateway: Arc<RecordingGateway>,
        next_id: usize,
    }

    impl Harness {
        fn new(oracle: MockOracle) -> Self {
            Self::with_config(oracle, DispatcherConfig::default())
        }

        fn with_config(oracle: MockOracle, config: DispatcherConfig) -> Self {
            Self::with_store(oracle, SessionStore::default(), config)
        }

        fn with_store(oracle: MockOracle, store: SessionStore, config: DispatcherConfig) -> Self {
            let oracle = Arc::new(oracle);
            let gateway = Arc::new(RecordingGateway::new());
            let dispatcher = Dispatcher::new(
                Arc::new(store),
                oracle.clone(),
                gateway.clone(),
                config,
            );
            Self {
                dispatcher,
                oracle,
                gateway,
                next_id: 0,
            }
        }

        fn message(&mut self, kind: MessageKind, text: &str) -> InboundMessage {
            self.next_id += 1;
            InboundMessage::new(USER, Some(format!("wamid.{}", self.next_id)), kind, text)
        }

        async fn say(&mut self, text: &str) -> TurnOutcome {
            let message = self.message(MessageKind::PlainText, text);
            self.dispatcher.process(message).await
        }

        async fn pick(&mut self, option_id: &str) -> TurnOutcome {
            let message = self.message(MessageKind::StructuredChoice, option_id);
            self.dispatcher.process(message).await
        }

        async fn login(&mut self) {
            self.say("hi").await;
            self.say(ID).await;
            self.say(SECRET).await;
        }

        fn state(&self) -> ConvState {
            self.dispatcher.store().get(USER).state
        }

        fn last_body(&self) -> String {
            self.gateway
                .sent()
                .last()
                .map(|m| m.body().to_string())
                .unwrap_or_default()
        }
    }

    fn two_vehicle_user() -> User {
        User::new(
            "Test User",
            "tok-1",
            vec![
                Vehicle::new("V001", "ABC-1234", "Honda CG 160"),
                Vehicle::new("V002", "XYZ-5678", "Yamaha Factor 150"),
            ],
        )
    }

    fn fleet_oracle() -> MockOracle {
        MockOracle::new().with_account(ID, SECRET, two_vehicle_user())
    }

    fn paulista() -> Location {
        Location {
            lat: -23.550_52,
            lon: -46.633_308,
            address: "Av. Paulista, 1000 - Sao Paulo, SP".to_string(),
            speed_kph: 0.0,
            updated_at: "2024-01-15 14:30:00".to_string(),
        }
    }

    fn is_blocked(state: &ConvState) -> bool {
        state.selected_vehicle().is_some_and(|v| v.is_blocked)
    }

    #[tokio::test]
    async fn test_credentials_login_end_to_end() {
        let mut h = Harness::new(fleet_oracle());

        assert_eq!(h.say("hi").await, TurnOutcome::Handled);
        assert_eq!(h.state(), ConvState::AwaitingIdentifier);
        assert!(h.last_body().starts_with("Welcome"));

        h.say(ID).await;
        assert_eq!(h.state().pending_identifier(), Some(ID));

        h.say("wrongpass").await;
        assert_eq!(h.state(), ConvState::AwaitingIdentifier);
        assert!(h.last_body().contains("incorrect"));

        h.say(ID).await;
        assert!(matches!(h.state(), ConvState::AwaitingSecret { .. }));

        h.gateway.take();
        h.say(SECRET).await;
        let state = h.state();
        assert!(matches!(state, ConvState::Authenticated { .. }));
        assert!(state.user().unwrap().introduction_shown);

        let sent = h.gateway.take();
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Outbound::List { .. }));
        assert_eq!(sent[0].option_ids(), vec!["V001", "V002"]);
        assert!(sent[0].body().starts_with("Hello, Test User!"));
        assert_eq!(h.oracle.count_calls("authenticate"), 2);
    }

    #[tokio::test]
    async fn test_invalid_identifier_reprompts() {
        let mut h = Harness::new(fleet_oracle());
        h.say("hi").await;
        h.say("1234").await;
        assert_eq!(h.state(), ConvState::AwaitingIdentifier);
        assert!(h.last_body().starts_with("Invalid identifier"));

        h.say("123.456.789-00").await;
        assert_eq!(h.state().pending_identifier(), Some(ID));
        assert_eq!(h.oracle.count_calls("authenticate"), 0);
    }

    #[tokio::test]
    async fn test_redelivery_is_dropped() {
        let mut h = Harness::new(fleet_oracle());
        h.login().await;
        h.pick("V001").await;
        h.gateway.take();

        let block = h.message(MessageKind::PlainText, "block");
        assert_eq!(h.dispatcher.process(block.clone()).await, TurnOutcome::Handled);
        let first = h.gateway.take();
        assert_eq!(h.dispatcher.process(block).await, TurnOutcome::Duplicate);

        assert!(h.gateway.sent().is_empty());
        assert_eq!(first.len(), 2);
        assert_eq!(h.oracle.count_calls("set_blocked"), 1);
    }

    #[tokio::test]
    async fn test_redelivery_after_idle_expiry_is_dropped() {
        let store = SessionStore::new(chrono::Duration::milliseconds(50), 100);
        let mut h = Harness::with_store(fleet_oracle(), store, DispatcherConfig::default());
        h.say("hi").await;
        h.say(ID).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        h.gateway.take();

        // The first message after expiry opens a fresh session and must stay
        // recorded in it
        let hello = h.message(MessageKind::PlainText, "hi");
        assert_eq!(h.dispatcher.process(hello.clone()).await, TurnOutcome::Handled);
        assert_eq!(h.dispatcher.process(hello).await, TurnOutcome::Duplicate);

        let sent = h.gateway.take();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].body().starts_with("Welcome"));
    }

    #[tokio::test]
    async fn test_logout_redelivery_is_dropped() {
        let mut h = Harness::new(fleet_oracle());
        h.login().await;
        h.gateway.take();

        let logout = h.message(MessageKind::PlainText, "logout");
        assert_eq!(h.dispatcher.process(logout.clone()).await, TurnOutcome::Handled);
        assert_eq!(h.dispatcher.process(logout).await, TurnOutcome::Duplicate);

        assert_eq!(h.gateway.sent().len(), 1);
        assert_eq!(h.dispatcher.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_redelivery_runs_once() {
        let mut h = Harness::new(fleet_oracle());
        h.login().await;
        h.pick("V001").await;
        h.oracle.set_delay(Some(Duration::from_millis(20)));

        let block = h.message(MessageKind::PlainText, "block");
        let (a, b) = tokio::join!(
            h.dispatcher.process(block.clone()),
            h.dispatcher.process(block)
        );

        let mut outcomes = vec![a, b];
        outcomes.sort_by_key(|o| *o == TurnOutcome::Duplicate);
        assert_eq!(outcomes, vec![TurnOutcome::Handled, TurnOutcome::Duplicate]);
        assert_eq!(h.oracle.count_calls("set_blocked"), 1);
    }

    #[tokio::test]
    async fn test_missing_message_id_is_never_deduplicated() {
        let h = Harness::new(fleet_oracle());
        for message_id in [None, Some(String::new()), None] {
            let message = InboundMessage::new(USER, message_id, MessageKind::PlainText, "hi");
            assert_eq!(h.dispatcher.process(message).await, TurnOutcome::Handled);
        }
        // hi -> welcome, then two rejected identifiers
        assert_eq!(h.gateway.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_single_vehicle_is_auto_selected() {
        let solo = User::new("Solo", "tok-2", vec![Vehicle::new("V010", "DEF-0001", "Fiat Uno")]);
        let mut h = Harness::new(MockOracle::new().with_account(ID, SECRET, solo));
        h.login().await;

        assert_eq!(h.state().selected_vehicle().unwrap().id, "V010");
        let sent = h.gateway.sent();
        assert!(sent.iter().all(|m| !matches!(m, Outbound::List { .. })));
        assert_eq!(
            sent.last().unwrap().option_ids(),
            vec!["locate", "block", "logout"]
        );
    }

    #[tokio::test]
    async fn test_block_unblock_round_trip() {
        let mut h = Harness::new(fleet_oracle());
        h.login().await;
        h.pick("V002").await;
        assert!(!is_blocked(&h.state()));
        h.gateway.take();

        h.say("block").await;
        assert!(is_blocked(&h.state()));
        let blocked = h.gateway.take();
        assert_eq!(blocked[1].option_ids(), vec!["locate", "unblock", "menu"]);

        h.say("u").await;
        assert!(!is_blocked(&h.state()));
        let unblocked = h.gateway.take();

        assert!(blocked[0].body().starts_with("Block command sent to vehicle XYZ-5678"));
        assert!(unblocked[0].body().starts_with("Unblock command sent to vehicle XYZ-5678"));
        assert_ne!(blocked[0].body(), unblocked[0].body());
        assert_eq!(
            h.oracle.recorded_calls()[1..],
            ["set_blocked V002 true", "set_blocked V002 false"]
        );
    }

    #[tokio::test]
    async fn test_locate_reports_position() {
        let mut h = Harness::new(fleet_oracle().with_location("V001", paulista()));
        h.login().await;
        h.say("ABC1234").await;
        h.gateway.take();

        h.say("location").await;
        let sent = h.gateway.take();
        assert!(sent[0].body().contains("Av. Paulista, 1000"));
        assert!(sent[0].body().contains("https://maps.google.com/?q=-23.55052,-46.633308"));
        assert!(matches!(sent[1], Outbound::Buttons { .. }));
        assert_eq!(h.state().selected_vehicle().unwrap().id, "V001");
    }

    #[tokio::test]
    async fn test_oracle_failure_keeps_state() {
        let mut h = Harness::new(fleet_oracle());
        h.login().await;
        h.pick("V001").await;
        let before = h.state();

        h.oracle.set_failing(true);
        assert_eq!(h.say("block").await, TurnOutcome::Handled);
        assert_eq!(h.state(), before);
        let sent = h.gateway.sent();
        assert_eq!(
            sent[sent.len() - 2].body(),
            "Could not block the vehicle. Please try again."
        );

        h.say("locate").await;
        assert_eq!(h.state(), before);
    }

    #[tokio::test]
    async fn test_oracle_timeout_counts_as_failure() {
        let config = DispatcherConfig {
            oracle_timeout: Duration::from_millis(30),
            ..DispatcherConfig::default()
        };
        let mut h = Harness::with_config(fleet_oracle(), config);
        h.say("hi").await;
        h.say(ID).await;

        h.oracle.set_delay(Some(Duration::from_secs(5)));
        assert_eq!(h.say(SECRET).await, TurnOutcome::Handled);
        assert_eq!(h.state(), ConvState::AwaitingIdentifier);
        assert!(h.last_body().contains("could not check your credentials"));
    }

    #[tokio::test]
    async fn test_logout_ends_session() {
        let mut h = Harness::new(fleet_oracle());
        h.login().await;
        assert_eq!(h.dispatcher.active_sessions(), 1);

        h.say("  LOGOUT ").await;
        assert_eq!(h.dispatcher.active_sessions(), 0);
        assert!(h.last_body().starts_with("Session ended"));

        h.say("hello again").await;
        assert_eq!(h.state(), ConvState::AwaitingIdentifier);
    }

    #[tokio::test]
    async fn test_gateway_failure_does_not_abort_turn() {
        let mut h = Harness::new(fleet_oracle());
        h.gateway.set_failing(true);
        assert_eq!(h.say("hi").await, TurnOutcome::Handled);
        h.say(ID).await;
        h.say(SECRET).await;
        assert!(h.state().is_authenticated());
    }

    #[tokio::test]
    async fn test_channel_address_login() {
        let config = DispatcherConfig {
            auth_flow: AuthFlow::ChannelAddress,
            ..DispatcherConfig::default()
        };
        let oracle = fleet_oracle().with_channel(USER, ID);
        let mut h = Harness::with_config(oracle, config);

        h.say("oi").await;
        assert!(matches!(h.state(), ConvState::Authenticated { .. }));
        assert_eq!(
            h.oracle.recorded_calls(),
            vec![format!("authenticate {USER} channel_address")]
        );
    }

    #[tokio::test]
    async fn test_channel_address_falls_back_to_credentials() {
        let config = DispatcherConfig {
            auth_flow: AuthFlow::ChannelAddress,
            ..DispatcherConfig::default()
        };
        let mut h = Harness::with_config(fleet_oracle(), config);

        h.say("oi").await;
        assert_eq!(h.state(), ConvState::AwaitingIdentifier);
        h.say(ID).await;
        h.say(SECRET).await;
        assert!(h.state().is_authenticated());
    }

    struct PanickingOracle;

    #[async_trait]
    impl Oracle for PanickingOracle {
        async fn authenticate(
            &self,
            _identifier: &str,
            _secret: &str,
            _flow: AuthFlow,
        ) -> Result<Option<User>, OracleError> {
            panic!("backend exploded");
        }

        async fn locate(&self, _: &str, _: &str) -> Result<Option<Location>, OracleError> {
            panic!("backend exploded");
        }

        async fn set_blocked(&self, _: &str, _: &str, _: bool) -> Result<bool, OracleError> {
            panic!("backend exploded");
        }
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let gateway = Arc::new(RecordingGateway::new());
        let dispatcher = Dispatcher::new(
            Arc::new(SessionStore::default()),
            PanickingOracle,
            gateway.clone(),
            DispatcherConfig::default(),
        );
        let say = |id: &str, text: &str| {
            InboundMessage::new(USER, Some(id.to_string()), MessageKind::PlainText, text)
        };

        dispatcher.process(say("m1", "hi")).await;
        dispatcher.process(say("m2", ID)).await;
        assert_eq!(dispatcher.process(say("m3", SECRET)).await, TurnOutcome::Failed);

        // The failed turn left the session where it was, and the user's lock
        // is free again
        let session = dispatcher.store().get(USER);
        assert_eq!(session.pending_identifier(), Some(ID));
        assert_eq!(dispatcher.process(say("m3", SECRET)).await, TurnOutcome::Duplicate);
        assert_eq!(dispatcher.process(say("m4", "logout")).await, TurnOutcome::Handled);
        assert!(gateway.sent().last().unwrap().body().starts_with("Session ended"));
    }
}
