//! Client configuration.

use std::time::Duration;

use clashlink_protocol::{DEFAULT_MAX_FRAME_SIZE, Framing, PROTOCOL_VERSION, ProtocolVersion};
use clashlink_session::QueuePolicy;
use serde::{Deserialize, Serialize};

/// Everything the client needs to know before it connects.
///
/// Every field has a default, so a config file only has to name what it
/// changes:
///
/// ```
/// use clashlink::ClientConfig;
///
/// let config: ClientConfig =
///     serde_json::from_str(r#"{ "server_addr": "10.0.0.5:7777" }"#).unwrap();
/// assert_eq!(config.nick, "player");
/// assert_eq!(config.handshake_timeout_secs, 60);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server endpoint as `host:port`.
    pub server_addr: String,
    /// Nick sent in the handshake.
    pub nick: String,
    /// Version declared in the handshake.
    pub protocol_version: ProtocolVersion,
    /// How long to wait for the server to accept or reject us.
    pub handshake_timeout_secs: u64,
    pub framing: Framing,
    /// Largest frame accepted before the stream is treated as corrupt.
    pub max_frame_size: usize,
    /// Bytes read from the socket per receive call.
    pub recv_chunk_size: usize,
    pub queue_policy: QueuePolicy,
}

impl ClientConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:7777".to_string(),
            nick: "player".to_string(),
            protocol_version: PROTOCOL_VERSION,
            handshake_timeout_secs: 60,
            framing: Framing::Delimited,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            recv_chunk_size: 4096,
            queue_policy: QueuePolicy::Unbounded,
        }
    }
}
