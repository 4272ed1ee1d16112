//! Property-based tests for the state machine
//!
//! These tests drive whole conversations with random inputs and a scripted
//! oracle, and check the invariants after every step.

use super::*;
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

const IDENTIFIER: &str = "12345678900";
const PASSWORD: &str = "rightpass";

fn test_context() -> ConvContext {
    ConvContext::new("5511999990000", AuthFlow::Credentials, 11)
}

/// Oracle behaviour for one simulated conversation
#[derive(Debug, Clone)]
struct Script {
    user: User,
    oracle_up: bool,
}

impl Script {
    /// Answer an oracle effect the way a backend would
    fn answer(&self, effect: &Effect) -> Option<Event> {
        match effect {
            Effect::Authenticate {
                identifier,
                secret,
                flow,
            } => {
                let outcome = if !self.oracle_up {
                    AuthOutcome::Unavailable
                } else if identifier == IDENTIFIER && secret.expose() == PASSWORD {
                    AuthOutcome::Granted(self.user.clone())
                } else {
                    AuthOutcome::Denied
                };
                Some(Event::AuthCompleted {
                    flow: *flow,
                    outcome,
                })
            }
            Effect::Locate { vehicle_id, .. } => Some(Event::LocateCompleted {
                vehicle_id: vehicle_id.clone(),
                location: None,
            }),
            Effect::SetBlocked {
                vehicle_id,
                blocked,
                ..
            } => Some(Event::BlockCompleted {
                vehicle_id: vehicle_id.clone(),
                blocked: *blocked,
                success: self.oracle_up,
            }),
            _ => None,
        }
    }
}

/// One turn: the inbound event plus any oracle replies it triggers
fn drive(script: &Script, state: &ConvState, event: Event) -> (ConvState, Vec<Effect>) {
    let mut state = state.clone();
    let mut effects = Vec::new();
    let mut pending = vec![event];
    while let Some(event) = pending.pop() {
        let result = transition(&state, &test_context(), event)
            .unwrap_or_else(|e| panic!("transition failed from {state:?}: {e}"));
        state = result.new_state;
        for effect in result.effects {
            if let Some(reply) = script.answer(&effect) {
                pending.push(reply);
            }
            effects.push(effect);
        }
    }
    (state, effects)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_vehicle(index: usize) -> impl Strategy<Value = Vehicle> {
    ("[A-Z]{3}-[0-9]{4}", "[A-Za-z]{3,8}", any::<bool>()).prop_map(
        move |(plate, model, is_blocked)| Vehicle {
            id: format!("V{index:03}"),
            plate,
            model,
            is_blocked,
        },
    )
}

fn arb_user() -> impl Strategy<Value = User> {
    (0usize..4)
        .prop_flat_map(|count| (0..count).map(arb_vehicle).collect::<Vec<_>>())
        .prop_map(|vehicles| User::new("Prop User", "tok", vehicles))
}

fn arb_inbound() -> impl Strategy<Value = Event> {
    prop_oneof![
        Just(Event::text(IDENTIFIER)),
        Just(Event::text(PASSWORD)),
        Just(Event::text("wrongpass")),
        Just(Event::text("123")),
        Just(Event::text("locate")),
        Just(Event::text("block")),
        Just(Event::text("unblock")),
        Just(Event::choice("block")),
        Just(Event::text("back")),
        Just(Event::choice("menu")),
        Just(Event::text("logout")),
        (0usize..5).prop_map(|i| Event::choice(format!("V{i:03}"))),
        "[a-z ]{0,12}".prop_map(Event::text),
    ]
}

fn arb_script() -> impl Strategy<Value = Script> {
    (arb_user(), prop::bool::weighted(0.8)).prop_map(|(user, oracle_up)| Script { user, oracle_up })
}

// ============================================================================
// State Validity Checkers
// ============================================================================

fn is_valid_state(state: &ConvState) -> bool {
    match state {
        ConvState::VehicleSelected { user, vehicle_id } => user.vehicle(vehicle_id).is_some(),
        ConvState::AwaitingSecret { identifier } => {
            identifier.len() == 11 && identifier.chars().all(|c| c.is_ascii_digit())
        }
        _ => true,
    }
}

fn greeting_count(effects: &[Effect]) -> usize {
    effects
        .iter()
        .filter(|e| match e {
            Effect::SendText { body }
            | Effect::SendButtons { body, .. }
            | Effect::SendList { body, .. } => body.starts_with("Hello, "),
            _ => false,
        })
        .count()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    // Invariant 1: a selected vehicle is always one of the user's vehicles
    #[test]
    fn prop_states_stay_valid(
        script in arb_script(),
        inputs in proptest::collection::vec(arb_inbound(), 1..25)
    ) {
        let mut state = ConvState::Initial;
        for event in inputs {
            let (next, _) = drive(&script, &state, event);
            prop_assert!(is_valid_state(&next), "invalid state reached: {:?}", next);
            state = next;
        }
    }

    // Invariant 2: the greeting is sent at most once per session
    #[test]
    fn prop_greeting_at_most_once_per_session(
        script in arb_script(),
        inputs in proptest::collection::vec(arb_inbound(), 1..25)
    ) {
        let mut state = ConvState::Initial;
        let mut greetings = 0;
        for event in inputs {
            let (next, effects) = drive(&script, &state, event);
            if effects.contains(&Effect::EndSession) {
                greetings = 0;
            } else {
                greetings += greeting_count(&effects);
            }
            prop_assert!(greetings <= 1, "greeting repeated in one session");
            state = next;
        }
    }

    // Invariant 3: never more than three buttons, list rows keyed by vehicle id
    #[test]
    fn prop_outbound_shapes(
        script in arb_script(),
        inputs in proptest::collection::vec(arb_inbound(), 1..25)
    ) {
        let mut state = ConvState::Initial;
        for event in inputs {
            let (next, effects) = drive(&script, &state, event);
            for effect in &effects {
                match effect {
                    Effect::SendButtons { options, .. } => prop_assert!(options.len() <= 3),
                    Effect::SendList { sections, .. } => {
                        for row in sections.iter().flat_map(|s| &s.rows) {
                            prop_assert!(script.user.vehicle(&row.id).is_some());
                        }
                    }
                    _ => {}
                }
            }
            state = next;
        }
    }

    // Invariant 4: logout ends the session from any reachable state
    #[test]
    fn prop_logout_always_ends_session(
        script in arb_script(),
        inputs in proptest::collection::vec(arb_inbound(), 0..15)
    ) {
        let mut state = ConvState::Initial;
        for event in inputs {
            state = drive(&script, &state, event).0;
        }
        let result = transition(&state, &test_context(), Event::text("LOGOUT")).unwrap();
        prop_assert_eq!(result.new_state, ConvState::Initial);
        prop_assert_eq!(&result.effects[0], &Effect::EndSession);
    }

    // Invariant 5: oracle failures leave vehicle states untouched
    #[test]
    fn prop_failed_block_keeps_state(user in arb_user(), blocked in any::<bool>()) {
        prop_assume!(!user.vehicles.is_empty());
        let vehicle_id = user.vehicles[0].id.clone();
        let state = ConvState::select(user, &vehicle_id).unwrap();
        let result = transition(
            &state,
            &test_context(),
            Event::BlockCompleted { vehicle_id, blocked, success: false },
        ).unwrap();
        prop_assert_eq!(result.new_state, state);
    }

    // Invariant 6: only logout leaves an authenticated session
    #[test]
    fn prop_authenticated_never_drops_user(
        script in arb_script(),
        inputs in proptest::collection::vec(arb_inbound(), 1..25)
    ) {
        let mut state = ConvState::Initial;
        for event in inputs {
            let is_logout = matches!(&event, Event::Inbound { text, .. } if text == "logout");
            let (next, _) = drive(&script, &state, event);
            if state.is_authenticated() && !is_logout {
                prop_assert!(next.is_authenticated(), "lost user: {:?} -> {:?}", state, next);
            }
            state = next;
        }
    }
}
