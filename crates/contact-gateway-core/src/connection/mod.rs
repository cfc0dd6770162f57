//! Collaborator connection contract.
//!
//! The contact provider is driven by an external automation program. This
//! module defines what the rest of the crate needs from it: a stream of
//! lifecycle events, a way to (re)start it, and the number lookup itself.

pub mod bridge;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::broadcast;

pub use bridge::BridgeConnection;

/// Lifecycle events raised by a collaborator connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// No usable credential; a fresh challenge must be scanned
    ChallengeIssued { token: String },
    /// The connection is usable (fresh approval or restored credential)
    Authenticated,
    /// A restored credential was rejected by the provider
    AuthenticationFailed { reason: String },
    /// An established connection dropped
    Disconnected { reason: String },
}

impl ConnectionEvent {
    /// Short name for logging
    pub fn kind(&self) -> &'static str {
        match self {
            ConnectionEvent::ChallengeIssued { .. } => "challenge_issued",
            ConnectionEvent::Authenticated => "authenticated",
            ConnectionEvent::AuthenticationFailed { .. } => "authentication_failed",
            ConnectionEvent::Disconnected { .. } => "disconnected",
        }
    }
}

/// Profile object returned by the collaborator.
///
/// Only the projected fields are typed; anything else the collaborator
/// sends is kept in `extra` and never leaves the process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Error raised by a collaborator lookup
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct SearchError {
    /// Human-readable message from the collaborator
    pub message: String,
    /// Profile the collaborator produced before failing, if any
    pub partial: Option<Profile>,
}

impl SearchError {
    /// Error without a partial profile
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            partial: None,
        }
    }

    /// Error that still carries a usable profile
    pub fn with_partial(message: impl Into<String>, partial: Profile) -> Self {
        Self {
            message: message.into(),
            partial: Some(partial),
        }
    }
}

/// A connection to the contact-lookup collaborator
#[async_trait]
pub trait ContactConnection: Send + Sync {
    /// Subscribe to lifecycle events.
    ///
    /// Events sent before the call are not replayed.
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;

    /// Start the connection, or restart it if already running
    async fn initialize(&self) -> anyhow::Result<()>;

    /// Look up `number` in the region `country_code`
    async fn search_number(&self, country_code: &str, number: &str)
        -> Result<Profile, SearchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_keeps_unknown_fields() {
        let json = r#"{
            "name": "Budi",
            "phone_number": "+628123",
            "provider": "Telkomsel",
            "tags": ["kantor"]
        }"#;
        let profile: Profile = serde_json::from_str(json).unwrap();
        assert_eq!(profile.name.as_deref(), Some("Budi"));
        assert_eq!(profile.provider.as_deref(), Some("Telkomsel"));
        assert!(profile.extra.contains_key("tags"));
    }

    #[test]
    fn test_profile_missing_fields_are_none() {
        let profile: Profile = serde_json::from_str(r#"{"name": "Sari"}"#).unwrap();
        assert_eq!(profile.phone_number, None);
        assert_eq!(profile.provider, None);
    }

    #[test]
    fn test_search_error_display_is_message() {
        let err = SearchError::new("Cannot read properties of null (reading 'x')");
        assert_eq!(err.to_string(), "Cannot read properties of null (reading 'x')");
        assert!(err.partial.is_none());
    }
}
