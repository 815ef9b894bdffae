//! Wire protocol between a peer (central) and the module.
//!
//! Mirrors what a BLE stack would deliver: a connection, reads of the
//! descriptor characteristic, and writes to it. Byte payloads are base64 in
//! JSON so arbitrary (including non-UTF-8) writes survive the trip.

use serde::{Deserialize, Serialize};

use crate::command::{CommandOutcome, CommandResult};

/// Identifies one peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Messages from peer to module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerRequest {
    Connect {
        /// Free-form peer label, for logs only.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer: Option<String>,
    },

    Read,

    Write {
        #[serde(with = "base64_bytes")]
        value: Vec<u8>,
    },

    Disconnect,
}

/// Messages from module to peer. One per request, in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeerResponse {
    Connected {
        session: SessionId,
        device_name: String,
    },

    Value {
        #[serde(with = "base64_bytes")]
        value: Vec<u8>,
        /// Trailing capabilities were dropped to fit the value capacity.
        truncated: bool,
    },

    WriteResult {
        outcome: CommandOutcome,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<String>,
    },

    Disconnected,

    /// Request was not valid in the current session state.
    Error {
        message: String,
    },
}

impl PeerResponse {
    pub fn write_result(result: &CommandResult) -> Self {
        Self::WriteResult {
            outcome: result.outcome(),
            detail: result.detail(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
