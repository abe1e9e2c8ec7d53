//! Transport address types.
//!
//! Remote registrations carry their transport address in serialized form;
//! the discovery layer parses it before handing the entry's next hop to the
//! routing table. The address family is a closed, tagged enum — adding a
//! transport means adding a variant, not registering a constructor in a
//! global type registry.

use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Address of a provider endpoint, per transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransportAddress {
    /// Provider reachable via an MQTT broker topic.
    #[serde(rename_all = "camelCase")]
    Mqtt {
        /// URI of the broker the provider listens on.
        broker_uri: String,
        /// Topic the provider subscribes to.
        topic: String,
    },

    /// Provider reachable via a WebSocket endpoint.
    #[serde(rename_all = "camelCase")]
    WebSocket {
        /// Endpoint host.
        host: String,
        /// Endpoint port.
        port: u16,
        /// Whether the endpoint requires TLS.
        secure: bool,
    },

    /// Provider living in the same process.
    #[serde(rename_all = "camelCase")]
    InProcess {
        /// In-process endpoint id.
        id: String,
    },
}

impl TransportAddress {
    /// Serialize the address to its wire representation.
    pub fn to_json(&self) -> Result<String, DiscoveryError> {
        serde_json::to_string(self).map_err(|e| DiscoveryError::InvalidAddress(e.to_string()))
    }

    /// Parse an address from its wire representation.
    pub fn from_json(serialized: &str) -> Result<Self, DiscoveryError> {
        serde_json::from_str(serialized).map_err(|e| DiscoveryError::InvalidAddress(e.to_string()))
    }
}
