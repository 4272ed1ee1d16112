//! In-memory oracle for local development and demos

use super::OracleError;
use crate::conversation::{AuthFlow, Location, User, Vehicle};
use crate::runtime::Oracle;
use async_trait::async_trait;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct FixtureAccount {
    secret: String,
    user: User,
}

/// Fixed accounts and positions; block commands always succeed for known
/// vehicles
#[derive(Debug, Clone, Default)]
pub struct FixtureOracle {
    /// identifier -> account
    accounts: HashMap<String, FixtureAccount>,
    /// channel address -> identifier
    channels: HashMap<String, String>,
    locations: HashMap<String, Location>,
}

impl FixtureOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// The demo account: identifier `12345678900`, password `123456`, two
    /// motorcycles in Sao Paulo
    pub fn demo() -> Self {
        let user = User::new(
            "Usuario Teste",
            "fixture-12345678900",
            vec![
                Vehicle::new("V001", "ABC-1234", "Honda CG 160"),
                Vehicle::new("V002", "XYZ-5678", "Yamaha Factor 150"),
            ],
        );
        Self::new()
            .with_account("12345678900", "123456", user)
            .with_location(
                "V001",
                Location {
                    lat: -23.550_520,
                    lon: -46.633_308,
                    address: "Av. Paulista, 1000 - Sao Paulo, SP".to_string(),
                    speed_kph: 0.0,
                    updated_at: "2024-01-15 14:30:00".to_string(),
                },
            )
            .with_location(
                "V002",
                Location {
                    lat: -23.561_414,
                    lon: -46.656_167,
                    address: "Rua Augusta, 500 - Sao Paulo, SP".to_string(),
                    speed_kph: 35.0,
                    updated_at: "2024-01-15 14:28:00".to_string(),
                },
            )
    }

    pub fn with_account(
        mut self,
        identifier: impl Into<String>,
        secret: impl Into<String>,
        user: User,
    ) -> Self {
        self.accounts.insert(
            identifier.into(),
            FixtureAccount {
                secret: secret.into(),
                user,
            },
        );
        self
    }

    /// Let `address` log in silently as `identifier`
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

    fn owns_vehicle(&self, token: &str, vehicle_id: &str) -> bool {
        self.accounts
            .values()
            .any(|a| a.user.token == token && a.user.vehicle(vehicle_id).is_some())
    }
}

#[async_trait]
impl Oracle for FixtureOracle {
    async fn authenticate(
        &self,
        identifier: &str,
        secret: &str,
        flow: AuthFlow,
    ) -> Result<Option<User>, OracleError> {
        let account = match flow {
            AuthFlow::Credentials => self
                .accounts
                .get(identifier)
                .filter(|account| account.secret == secret),
            AuthFlow::ChannelAddress => self
                .channels
                .get(identifier)
                .and_then(|id| self.accounts.get(id)),
        };
        match account {
            Some(account) => {
                tracing::info!(%flow, "Fixture login accepted");
                Ok(Some(account.user.clone()))
            }
            None => {
                tracing::warn!(%flow, "Fixture login rejected");
                Ok(None)
            }
        }
    }

    async fn locate(&self, vehicle_id: &str, token: &str) -> Result<Option<Location>, OracleError> {
        if !self.owns_vehicle(token, vehicle_id) {
            return Ok(None);
        }
        Ok(self.locations.get(vehicle_id).cloned())
    }

    async fn set_blocked(
        &self,
        vehicle_id: &str,
        token: &str,
        blocked: bool,
    ) -> Result<bool, OracleError> {
        let known = self.owns_vehicle(token, vehicle_id);
        tracing::info!(vehicle_id, blocked, known, "Fixture block command");
        Ok(known)
    }
}
