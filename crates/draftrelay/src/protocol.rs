// Inbound client frames (raw JSON text over the WebSocket edge).

use serde::Deserialize;

/// A request frame from a connected client, tagged by `action`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ClientRequest {
    /// Join a draft under a display name. The connection handle comes from
    /// the transport layer, never from the client.
    #[serde(rename_all = "camelCase")]
    CreatePlayer {
        draft_id: String,
        new_player: NewPlayer,
    },

    /// Submit a pick. The overall order is assigned server-side.
    #[serde(rename_all = "camelCase")]
    SubmitPick {
        draft_id: String,
        name: String,
        pick: PickBody,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NewPlayer {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PickBody {
    pub selection: String,
}

/// Parse one text frame. Unknown actions and malformed bodies are an error
/// for the submitting connection only; they never disturb other clients.
pub fn parse_request(text: &str) -> Result<ClientRequest, serde_json::Error> {
    serde_json::from_str(text)
}
