// Player registrations.

use serde::{Deserialize, Serialize};

/// A player's registration in a draft, bound to one live connection.
///
/// Registrations are keyed by `(draft_id, connection_id)`. A player who
/// disconnects and reconnects arrives on a new connection handle and gets a
/// new registration; the stale one is marked disconnected when a broadcast
/// finds it gone, not mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Player {
    pub draft_id: String,
    /// Display name chosen by the client.
    pub name: String,
    /// Opaque transport handle for the player's live connection. Owned by the
    /// transport layer; may stop resolving at any time.
    pub connection_id: String,
    /// Cleared when the transport reports the connection gone or the socket
    /// closes cleanly. Disconnected registrations are skipped by broadcasts.
    pub is_connected: bool,
}

impl Player {
    /// A freshly joined, connected player.
    pub fn connected(draft_id: &str, name: &str, connection_id: &str) -> Self {
        Player {
            draft_id: draft_id.to_string(),
            name: name.to_string(),
            connection_id: connection_id.to_string(),
            is_connected: true,
        }
    }
}
