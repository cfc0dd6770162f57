//! Wire protocol between the gateway and the bridge process.
//!
//! Newline-delimited JSON (ndjson) over the child's stdin/stdout.
//! Requests carry an `id`; the bridge answers each with a response carrying
//! the same `id`. Lifecycle events have no `id` and are tagged by `event`.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::{ConnectionEvent, Profile};

/// Request sent to the bridge (downstream)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    /// Sequential id used to correlate the response
    pub id: u64,
    /// Method name (`initialize` or `search_number`)
    pub method: String,
    /// Method parameters
    pub params: Value,
}

impl Request {
    /// Build an `initialize` request
    pub fn initialize(id: u64, params: &InitializeParams) -> Result<Self> {
        Ok(Self {
            id,
            method: "initialize".to_string(),
            params: serde_json::to_value(params)?,
        })
    }

    /// Build a `search_number` request
    pub fn search_number(id: u64, country_code: &str, number: &str) -> Self {
        Self {
            id,
            method: "search_number".to_string(),
            params: serde_json::json!({
                "country_code": country_code,
                "number": number,
            }),
        }
    }
}

/// Parameters of the `initialize` request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializeParams {
    /// Session identifier for the provider's local auth strategy
    pub client_id: String,
    /// Directory where the bridge persists credential material
    pub data_path: String,
    /// Run the automated browser headless
    pub headless: bool,
    /// Extra browser flags
    pub browser_args: Vec<String>,
}

/// Response to a request (upstream)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Id of the request being answered
    pub id: u64,
    /// Success payload (mutually exclusive with `error`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Failure payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

/// Failure details reported by the bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
    /// Profile fetched before the failure, if the collaborator got that far
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partial: Option<Profile>,
}

/// Lifecycle event (upstream, no `id`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
    /// Fresh QR challenge to scan
    Qr { data: String },
    /// Client is authenticated and usable
    Ready,
    /// Restored session was rejected
    AuthFailure {
        #[serde(default)]
        message: String,
    },
    /// Connection lost
    Disconnected {
        #[serde(default)]
        reason: String,
    },
}

impl From<BridgeEvent> for ConnectionEvent {
    fn from(event: BridgeEvent) -> Self {
        match event {
            BridgeEvent::Qr { data } => ConnectionEvent::ChallengeIssued { token: data },
            BridgeEvent::Ready => ConnectionEvent::Authenticated,
            BridgeEvent::AuthFailure { message } => {
                ConnectionEvent::AuthenticationFailed { reason: message }
            }
            BridgeEvent::Disconnected { reason } => ConnectionEvent::Disconnected { reason },
        }
    }
}

/// Any message read from the bridge.
///
/// Responses are told apart from events by the presence of `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BridgeMessage {
    Response(Response),
    Event(BridgeEvent),
}

/// Encode a message as ndjson (JSON + newline)
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    let mut json = serde_json::to_vec(msg)?;
    json.push(b'\n');
    Ok(json)
}

/// Decode a message from a JSON line
pub fn decode<T: DeserializeOwned>(line: &[u8]) -> Result<T> {
    Ok(serde_json::from_slice(line)?)
}
