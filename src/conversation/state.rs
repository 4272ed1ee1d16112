//! Conversation state types

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Account Data
// ============================================================================

/// A tracked vehicle owned by a [`User`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: String,
    pub plate: String,
    pub model: String,
    #[serde(default)]
    pub is_blocked: bool,
}

impl Vehicle {
    pub fn new(id: impl Into<String>, plate: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            plate: plate.into(),
            model: model.into(),
            is_blocked: false,
        }
    }

    /// Human readable status for option menus
    pub fn status_label(&self) -> &'static str {
        if self.is_blocked {
            "Blocked"
        } else {
            "Active"
        }
    }
}

/// An authenticated account, as returned by the oracle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub token: String,
    #[serde(default)]
    pub vehicles: Vec<Vehicle>,
    /// Whether the greeting line was already sent in this session
    #[serde(default)]
    pub introduction_shown: bool,
}

impl User {
    pub fn new(name: impl Into<String>, token: impl Into<String>, vehicles: Vec<Vehicle>) -> Self {
        Self {
            name: name.into(),
            token: token.into(),
            vehicles,
            introduction_shown: false,
        }
    }

    pub fn vehicle(&self, vehicle_id: &str) -> Option<&Vehicle> {
        self.vehicles.iter().find(|v| v.id == vehicle_id)
    }

    pub fn vehicle_mut(&mut self, vehicle_id: &str) -> Option<&mut Vehicle> {
        self.vehicles.iter_mut().find(|v| v.id == vehicle_id)
    }

    /// Users with a single vehicle never see the vehicle list
    pub fn has_many_vehicles(&self) -> bool {
        self.vehicles.len() > 1
    }
}

/// Last known position of a vehicle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
    pub address: String,
    pub speed_kph: f64,
    pub updated_at: String,
}

impl Location {
    pub fn map_link(&self) -> String {
        format!("https://maps.google.com/?q={},{}", self.lat, self.lon)
    }
}

// ============================================================================
// Authentication Flow
// ============================================================================

/// How unauthenticated sessions obtain a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthFlow {
    /// Ask for a typed identifier and secret
    #[default]
    Credentials,
    /// Log in silently using the channel address, falling back to credentials
    ChannelAddress,
}

impl AuthFlow {
    pub fn as_str(self) -> &'static str {
        match self {
            AuthFlow::Credentials => "credentials",
            AuthFlow::ChannelAddress => "channel_address",
        }
    }
}

impl fmt::Display for AuthFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthFlow {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credentials" => Ok(AuthFlow::Credentials),
            "channel_address" | "channel" => Ok(AuthFlow::ChannelAddress),
            other => Err(format!("unknown auth flow: {other}")),
        }
    }
}

// ============================================================================
// Conversation State
// ============================================================================

/// Conversation state of one end user
///
/// Authenticated variants own the [`User`]; the selected vehicle is stored by
/// id and only ever set after a successful lookup in `user.vehicles`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConvState {
    /// No message handled yet
    #[default]
    Initial,

    /// Waiting for the user to type their identifier
    AwaitingIdentifier,

    /// Identifier accepted, waiting for the secret
    AwaitingSecret { identifier: String },

    /// Logged in, no vehicle selected
    Authenticated { user: User },

    /// Logged in with a vehicle selected
    VehicleSelected { user: User, vehicle_id: String },
}

impl ConvState {
    /// Stable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            ConvState::Initial => "initial",
            ConvState::AwaitingIdentifier => "awaiting_identifier",
            ConvState::AwaitingSecret { .. } => "awaiting_secret",
            ConvState::Authenticated { .. } => "authenticated",
            ConvState::VehicleSelected { .. } => "vehicle_selected",
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            ConvState::Authenticated { user } | ConvState::VehicleSelected { user, .. } => {
                Some(user)
            }
            _ => None,
        }
    }

    pub fn pending_identifier(&self) -> Option<&str> {
        match self {
            ConvState::AwaitingSecret { identifier } => Some(identifier),
            _ => None,
        }
    }

    pub fn selected_vehicle(&self) -> Option<&Vehicle> {
        match self {
            ConvState::VehicleSelected { user, vehicle_id } => user.vehicle(vehicle_id),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    /// Select a vehicle owned by `user`. Hands the user back if it has no
    /// vehicle with that id.
    pub fn select(user: User, vehicle_id: &str) -> Result<Self, User> {
        match user.vehicle(vehicle_id) {
            Some(vehicle) => {
                let vehicle_id = vehicle.id.clone();
                Ok(ConvState::VehicleSelected { user, vehicle_id })
            }
            None => Err(user),
        }
    }
}

/// Default number of digits in a typed identifier
pub const DEFAULT_IDENTIFIER_LENGTH: usize = 11;

/// Context for a turn (immutable configuration)
#[derive(Debug, Clone)]
pub struct ConvContext {
    /// Channel address of the end user
    pub user_id: String,
    pub auth_flow: AuthFlow,
    pub identifier_length: usize,
}

impl ConvContext {
    pub fn new(user_id: impl Into<String>, auth_flow: AuthFlow, identifier_length: usize) -> Self {
        Self {
            user_id: user_id.into(),
            auth_flow,
            identifier_length,
        }
    }
}
