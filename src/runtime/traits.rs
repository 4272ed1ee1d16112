//! Trait abstractions for runtime I/O
//!
//! These traits let the dispatcher run against mock collaborators in tests.

use crate::conversation::{AuthFlow, ChoiceOption, ListSection, Location, User};
use crate::gateway::GatewayError;
use crate::oracle::OracleError;
use async_trait::async_trait;
use std::sync::Arc;

/// The identity/vehicle backend
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Look up a user. `Ok(None)` means the backend rejected the credentials.
    async fn authenticate(
        &self,
        identifier: &str,
        secret: &str,
        flow: AuthFlow,
    ) -> Result<Option<User>, OracleError>;

    /// Last known position. `Ok(None)` when the backend has no fix.
    async fn locate(&self, vehicle_id: &str, token: &str) -> Result<Option<Location>, OracleError>;

    /// Send a block or unblock command. `Ok(false)` when the backend refused it.
    async fn set_blocked(
        &self,
        vehicle_id: &str,
        token: &str,
        blocked: bool,
    ) -> Result<bool, OracleError>;
}

/// The outbound messaging channel
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), GatewayError>;

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        options: &[ChoiceOption],
    ) -> Result<(), GatewayError>;

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<(), GatewayError>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: Oracle + ?Sized> Oracle for Arc<T> {
    async fn authenticate(
        &self,
        identifier: &str,
        secret: &str,
        flow: AuthFlow,
    ) -> Result<Option<User>, OracleError> {
        (**self).authenticate(identifier, secret, flow).await
    }

    async fn locate(&self, vehicle_id: &str, token: &str) -> Result<Option<Location>, OracleError> {
        (**self).locate(vehicle_id, token).await
    }

    async fn set_blocked(
        &self,
        vehicle_id: &str,
        token: &str,
        blocked: bool,
    ) -> Result<bool, OracleError> {
        (**self).set_blocked(vehicle_id, token, blocked).await
    }
}

#[async_trait]
impl<T: Gateway + ?Sized> Gateway for Arc<T> {
    async fn send_text(&self, to: &str, body: &str) -> Result<(), GatewayError> {
        (**self).send_text(to, body).await
    }

    async fn send_buttons(
        &self,
        to: &str,
        body: &str,
        options: &[ChoiceOption],
    ) -> Result<(), GatewayError> {
        (**self).send_buttons(to, body, options).await
    }

    async fn send_list(
        &self,
        to: &str,
        body: &str,
        button_label: &str,
        sections: &[ListSection],
    ) -> Result<(), GatewayError> {
        (**self).send_list(to, body, button_label, sections).await
    }
}
