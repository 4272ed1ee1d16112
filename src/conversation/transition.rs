//! Pure state transition function
//!
//! Given the current state and one event, decide the next state and the
//! effects to run. No I/O happens here: oracle calls are requested through
//! effects and their outcomes come back as events.

use super::effect::{ChoiceOption, Effect, ListSection, Secret};
use super::event::{AuthOutcome, Event, MessageKind};
use super::state::{AuthFlow, ConvContext, ConvState, Location, User, Vehicle};
use thiserror::Error;

const FAREWELL: &str = "Session ended.\n\nSend any message to start again.";

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConvState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConvState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("No transition from {state} on {event}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
}

/// Commands understood once a vehicle is selected. Button ids use the
/// canonical spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Locate,
    Block,
    Unblock,
    Back,
    Menu,
    Logout,
}

impl Command {
    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "locate" | "location" | "loc" | "l" => Some(Command::Locate),
            "block" | "b" => Some(Command::Block),
            "unblock" | "u" => Some(Command::Unblock),
            "back" => Some(Command::Back),
            "menu" => Some(Command::Menu),
            "logout" => Some(Command::Logout),
            _ => None,
        }
    }
}

/// Pure transition function
pub fn transition(
    state: &ConvState,
    context: &ConvContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    // Logout is the only transition valid from every state
    if let Event::Inbound { text, .. } = &event {
        if Command::parse(text) == Some(Command::Logout) {
            return Ok(logout());
        }
    }

    match (state, event) {
        // ============================================================
        // Login
        // ============================================================
        (ConvState::Initial, Event::Inbound { .. }) => Ok(start(context)),

        (
            ConvState::Initial,
            Event::AuthCompleted {
                flow: AuthFlow::ChannelAddress,
                outcome: AuthOutcome::Granted(user),
            },
        ) => Ok(show_vehicles(user)),

        // Silent login failed: fall back to typed credentials
        (
            ConvState::Initial,
            Event::AuthCompleted {
                flow: AuthFlow::ChannelAddress,
                ..
            },
        ) => Ok(welcome(context)),

        (ConvState::AwaitingIdentifier, Event::Inbound { text, .. }) => {
            Ok(accept_identifier(context, &text))
        }

        (ConvState::AwaitingSecret { identifier }, Event::Inbound { text, .. }) => {
            Ok(TransitionResult::new(state.clone()).with_effect(Effect::Authenticate {
                identifier: identifier.clone(),
                secret: Secret::new(text.trim()),
                flow: AuthFlow::Credentials,
            }))
        }

        (
            ConvState::AwaitingSecret { .. },
            Event::AuthCompleted {
                flow: AuthFlow::Credentials,
                outcome,
            },
        ) => Ok(finish_login(context, outcome)),

        // ============================================================
        // Vehicle selection
        // ============================================================
        (ConvState::Authenticated { user }, Event::Inbound { text, kind }) => {
            Ok(choose_vehicle(user, &text, kind))
        }

        (ConvState::VehicleSelected { user, vehicle_id }, Event::Inbound { text, .. }) => {
            Ok(vehicle_command(user, vehicle_id, &text))
        }

        // ============================================================
        // Oracle replies for the selected vehicle
        // ============================================================
        (
            ConvState::VehicleSelected { user, vehicle_id },
            Event::LocateCompleted {
                vehicle_id: located,
                location,
            },
        ) if located == *vehicle_id => Ok(report_location(user, vehicle_id, location.as_ref())),

        (
            ConvState::VehicleSelected { user, vehicle_id },
            Event::BlockCompleted {
                vehicle_id: target,
                blocked,
                success,
            },
        ) if target == *vehicle_id => Ok(finish_block(user, vehicle_id, blocked, success)),

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (state, event) => Err(TransitionError::InvalidTransition {
            state: state.name(),
            event: event.name(),
        }),
    }
}

// ============================================================================
// Login helpers
// ============================================================================

fn logout() -> TransitionResult {
    TransitionResult::new(ConvState::Initial)
        .with_effect(Effect::EndSession)
        .with_effect(Effect::text(FAREWELL))
}

fn start(context: &ConvContext) -> TransitionResult {
    match context.auth_flow {
        AuthFlow::Credentials => welcome(context),
        AuthFlow::ChannelAddress => {
            TransitionResult::new(ConvState::Initial).with_effect(Effect::Authenticate {
                identifier: context.user_id.clone(),
                secret: Secret::new(""),
                flow: AuthFlow::ChannelAddress,
            })
        }
    }
}

fn welcome(context: &ConvContext) -> TransitionResult {
    TransitionResult::new(ConvState::AwaitingIdentifier).with_effect(Effect::text(format!(
        "Welcome to the vehicle tracking service!\n\n\
         To continue, type your identifier ({} digits):",
        context.identifier_length
    )))
}

/// Strip separator punctuation and accept exactly `length` ASCII digits
pub(crate) fn normalize_identifier(text: &str, length: usize) -> Option<String> {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '.' | '-' | '/') && !c.is_whitespace())
        .collect();
    let valid = cleaned.chars().all(|c| c.is_ascii_digit()) && cleaned.len() == length;
    valid.then_some(cleaned)
}

fn accept_identifier(context: &ConvContext, text: &str) -> TransitionResult {
    match normalize_identifier(text, context.identifier_length) {
        Some(identifier) => TransitionResult::new(ConvState::AwaitingSecret { identifier })
            .with_effect(Effect::text("Now type your password:")),
        None => TransitionResult::new(ConvState::AwaitingIdentifier).with_effect(Effect::text(
            format!(
                "Invalid identifier. Type only the {} digits of your identifier:",
                context.identifier_length
            ),
        )),
    }
}

fn finish_login(context: &ConvContext, outcome: AuthOutcome) -> TransitionResult {
    let notice = match outcome {
        AuthOutcome::Granted(user) => return show_vehicles(user),
        AuthOutcome::Denied => "Identifier or password incorrect.",
        AuthOutcome::Unavailable => "We could not check your credentials right now.",
    };
    TransitionResult::new(ConvState::AwaitingIdentifier).with_effect(Effect::text(format!(
        "{notice}\n\nType your identifier ({} digits) to try again:",
        context.identifier_length
    )))
}

// ============================================================================
// Rendering
// ============================================================================

/// Greeting prefix, emitted once per session
fn take_greeting(user: &mut User) -> String {
    if user.introduction_shown {
        String::new()
    } else {
        user.introduction_shown = true;
        format!("Hello, {}!\n\n", user.name)
    }
}

/// Vehicle list policy: nothing to pick, auto-select the only vehicle, or a
/// single-choice list keyed by vehicle id
fn show_vehicles(mut user: User) -> TransitionResult {
    let greeting = take_greeting(&mut user);

    if let [only] = user.vehicles.as_slice() {
        let vehicle_id = only.id.clone();
        return vehicle_menu(user, &vehicle_id, &greeting);
    }

    if user.vehicles.is_empty() {
        return TransitionResult::new(ConvState::Authenticated { user }).with_effect(
            Effect::text(format!(
                "{greeting}There are no vehicles linked to your account."
            )),
        );
    }

    let rows = user
        .vehicles
        .iter()
        .map(|v| ChoiceOption::new(&v.id, &v.plate).with_description(&v.model))
        .collect();
    let list = Effect::list(
        format!("{greeting}Select a vehicle to see its options:"),
        "Vehicles",
        vec![ListSection {
            title: "Your vehicles".to_string(),
            rows,
        }],
    );
    TransitionResult::new(ConvState::Authenticated { user }).with_effect(list)
}

/// Select `vehicle_id` and render its options. Falls back to the vehicle
/// list if the user does not own it.
fn vehicle_menu(user: User, vehicle_id: &str, greeting: &str) -> TransitionResult {
    match ConvState::select(user, vehicle_id) {
        Ok(state) => {
            let options = state
                .user()
                .zip(state.selected_vehicle())
                .map(|(user, vehicle)| {
                    vehicle_options(vehicle, user.has_many_vehicles(), greeting)
                });
            TransitionResult::new(state).with_effects(options)
        }
        Err(user) => show_vehicles(user),
    }
}

fn vehicle_options(vehicle: &Vehicle, many_vehicles: bool, greeting: &str) -> Effect {
    let toggle = if vehicle.is_blocked {
        ChoiceOption::new("unblock", "Unblock")
    } else {
        ChoiceOption::new("block", "Block")
    };
    let exit = if many_vehicles {
        ChoiceOption::new("menu", "Other vehicles")
    } else {
        ChoiceOption::new("logout", "Log out")
    };
    Effect::buttons(
        format!(
            "{greeting}Vehicle: {}\nModel: {}\nStatus: {}\n\nChoose an option:",
            vehicle.plate,
            vehicle.model,
            vehicle.status_label()
        ),
        vec![ChoiceOption::new("locate", "Location"), toggle, exit],
    )
}

/// Send `notice`, then re-render the options of the selected vehicle
fn with_menu(user: User, vehicle_id: &str, notice: Effect) -> TransitionResult {
    let menu = vehicle_menu(user, vehicle_id, "");
    TransitionResult::new(menu.new_state)
        .with_effect(notice)
        .with_effects(menu.effects)
}

// ============================================================================
// Vehicle helpers
// ============================================================================

/// Identifier match wins; plate/model text is only a fallback for free text
pub(crate) fn resolve_vehicle<'a>(
    user: &'a User,
    text: &str,
    kind: MessageKind,
) -> Option<&'a Vehicle> {
    let wanted = text.trim();
    if wanted.is_empty() {
        return None;
    }
    let by_id = user.vehicles.iter().find(|v| v.id == wanted);
    match kind {
        MessageKind::StructuredChoice => by_id,
        MessageKind::PlainText => {
            by_id.or_else(|| user.vehicles.iter().find(|v| matches_label(v, wanted)))
        }
    }
}

fn matches_label(vehicle: &Vehicle, text: &str) -> bool {
    vehicle.model.to_lowercase() == text.to_lowercase()
        || normalize_plate(&vehicle.plate) == normalize_plate(text)
}

fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

fn choose_vehicle(user: &User, text: &str, kind: MessageKind) -> TransitionResult {
    if let Some(vehicle) = resolve_vehicle(user, text, kind) {
        let vehicle_id = vehicle.id.clone();
        return vehicle_menu(user.clone(), &vehicle_id, "");
    }

    let listing = show_vehicles(user.clone());
    if matches!(Command::parse(text), Some(Command::Menu | Command::Back)) {
        return listing;
    }
    TransitionResult::new(listing.new_state)
        .with_effect(Effect::text(
            "Vehicle not found. Choose one of your vehicles from the list.",
        ))
        .with_effects(listing.effects)
}

fn vehicle_command(user: &User, vehicle_id: &str, text: &str) -> TransitionResult {
    let unchanged = || ConvState::VehicleSelected {
        user: user.clone(),
        vehicle_id: vehicle_id.to_string(),
    };
    let set_blocked = |blocked| Effect::SetBlocked {
        vehicle_id: vehicle_id.to_string(),
        token: user.token.clone(),
        blocked,
    };

    match Command::parse(text) {
        Some(Command::Locate) => TransitionResult::new(unchanged()).with_effect(Effect::Locate {
            vehicle_id: vehicle_id.to_string(),
            token: user.token.clone(),
        }),
        Some(Command::Block) => TransitionResult::new(unchanged()).with_effect(set_blocked(true)),
        Some(Command::Unblock) => {
            TransitionResult::new(unchanged()).with_effect(set_blocked(false))
        }
        Some(Command::Menu) if user.has_many_vehicles() => show_vehicles(user.clone()),
        Some(Command::Back | Command::Menu) => vehicle_menu(user.clone(), vehicle_id, ""),
        Some(Command::Logout) | None => {
            TransitionResult::new(unchanged()).with_effect(Effect::text(not_understood(user)))
        }
    }
}

/// Hint listing the commands the vehicle options offer
fn not_understood(user: &User) -> String {
    let commands = if user.has_many_vehicles() {
        "*locate*, *block*, *unblock*, *back*, *menu* or *logout*"
    } else {
        "*locate*, *block*, *unblock*, *back* or *logout*"
    };
    format!("Sorry, I did not understand that.\n\nReply {commands}.")
}

fn report_location(user: &User, vehicle_id: &str, location: Option<&Location>) -> TransitionResult {
    let plate = user.vehicle(vehicle_id).map_or(vehicle_id, |v| v.plate.as_str());
    let report = match location {
        Some(location) => format!(
            "Location of {plate}:\n\nAddress: {}\nSpeed: {:.0} km/h\nLast update: {}\n\nMap: {}",
            location.address,
            location.speed_kph,
            location.updated_at,
            location.map_link()
        ),
        None => "Could not get the vehicle location. Please try again.".to_string(),
    };
    with_menu(user.clone(), vehicle_id, Effect::text(report))
}

fn finish_block(user: &User, vehicle_id: &str, blocked: bool, success: bool) -> TransitionResult {
    let (verb, done) = if blocked {
        ("block", "blocked")
    } else {
        ("unblock", "unblocked")
    };
    let mut user = user.clone();
    let notice = match user.vehicle_mut(vehicle_id) {
        Some(vehicle) if success => {
            vehicle.is_blocked = blocked;
            format!(
                "{} command sent to vehicle {}.\nWe will let you know as soon as it is {done}.",
                capitalize(verb),
                vehicle.plate
            )
        }
        _ => format!("Could not {verb} the vehicle. Please try again."),
    };
    with_menu(user, vehicle_id, Effect::text(notice))
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars
        .next()
        .map(|first| first.to_uppercase().chain(chars).collect::<String>())
        .unwrap_or_default()
}
