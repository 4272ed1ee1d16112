//! HTTP client for the tracker backend

use super::OracleError;
use crate::conversation::{AuthFlow, Location, User, Vehicle};
use crate::runtime::Oracle;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Tracker backend over JSON/HTTP
///
/// - `POST {base}/auth/login` with `{identifier, secret, flow}`
/// - `GET {base}/vehicles/{id}/location`
/// - `POST {base}/vehicles/{id}/block` and `.../unblock`
pub struct TrackerApiOracle {
    client: Client,
    base_url: String,
}

impl TrackerApiOracle {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OracleError::unknown(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn classify_error(status: StatusCode, body: &str) -> OracleError {
        match status.as_u16() {
            500..=599 => OracleError::server_error(format!("Server error {status}: {body}")),
            _ => OracleError::unknown(format!("HTTP {status}: {body}")),
        }
    }
}

#[async_trait]
impl Oracle for TrackerApiOracle {
    async fn authenticate(
        &self,
        identifier: &str,
        secret: &str,
        flow: AuthFlow,
    ) -> Result<Option<User>, OracleError> {
        let response = self
            .client
            .post(self.url("auth/login"))
            .json(&LoginRequest {
                identifier,
                secret,
                flow,
            })
            .send()
            .await?;

        let status = response.status();
        // Unknown identifier or wrong secret
        if matches!(status.as_u16(), 401 | 403 | 404) {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status, &body));
        }

        let login: LoginResponse = response.json().await?;
        Ok(Some(login.into()))
    }

    async fn locate(&self, vehicle_id: &str, token: &str) -> Result<Option<Location>, OracleError> {
        let response = self
            .client
            .get(self.url(&format!("vehicles/{vehicle_id}/location")))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status, &body));
        }

        let location: LocationResponse = response.json().await?;
        Ok(Some(location.into()))
    }

    async fn set_blocked(
        &self,
        vehicle_id: &str,
        token: &str,
        blocked: bool,
    ) -> Result<bool, OracleError> {
        let action = if blocked { "block" } else { "unblock" };
        let response = self
            .client
            .post(self.url(&format!("vehicles/{vehicle_id}/{action}")))
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status.is_server_error() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status, &body));
        }
        if !status.is_success() {
            tracing::warn!(vehicle_id, action, %status, "Tracker refused command");
        }
        Ok(status.is_success())
    }
}

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    identifier: &'a str,
    secret: &'a str,
    flow: AuthFlow,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    name: String,
    token: String,
    #[serde(default)]
    vehicles: Vec<VehicleResponse>,
}

#[derive(Debug, Deserialize)]
struct VehicleResponse {
    id: String,
    plate: String,
    model: String,
    /// `active` or `blocked`
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
struct LocationResponse {
    latitude: f64,
    longitude: f64,
    #[serde(default)]
    address: String,
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    last_update: String,
}

impl From<LoginResponse> for User {
    fn from(login: LoginResponse) -> Self {
        let vehicles = login
            .vehicles
            .into_iter()
            .map(|v| Vehicle {
                is_blocked: v.status.eq_ignore_ascii_case("blocked"),
                ..Vehicle::new(v.id, v.plate, v.model)
            })
            .collect();
        User::new(login.name, login.token, vehicles)
    }
}

impl From<LocationResponse> for Location {
    fn from(location: LocationResponse) -> Self {
        Location {
            lat: location.latitude,
            lon: location.longitude,
            address: location.address,
            speed_kph: location.speed,
            updated_at: location.last_update,
        }
    }
}
