// Draft-state-change events and their wire encoding.

use serde::Serialize;

use crate::draft::pick::Pick;
use crate::draft::player::Player;
use crate::store::{ConnectionRegistry, StoreError};

/// The event kind tag as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EventType {
    PlayerAdded,
    PickSubmitted,
}

/// A draft-state-change event pushed to every live connection of a draft.
///
/// Each variant carries the full roster snapshot read *after* the store write
/// that triggered the event, so a client that missed intermediate events can
/// reconcile from any single one.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftEvent {
    PlayerAdded {
        players: Vec<Player>,
        new_player: Player,
    },
    PickSubmitted {
        players: Vec<Player>,
        new_pick: Pick,
    },
}

/// The flattened wire form consumed by clients. `NewPlayer` and `NewPick` are
/// explicit nulls rather than omitted keys; clients switch on `EventType`.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireEvent<'a> {
    event_type: EventType,
    players: &'a [Player],
    new_player: Option<&'a Player>,
    new_pick: Option<&'a Pick>,
}

impl DraftEvent {
    pub fn event_type(&self) -> EventType {
        match self {
            DraftEvent::PlayerAdded { .. } => EventType::PlayerAdded,
            DraftEvent::PickSubmitted { .. } => EventType::PickSubmitted,
        }
    }

    /// The roster snapshot embedded in the event.
    pub fn players(&self) -> &[Player] {
        match self {
            DraftEvent::PlayerAdded { players, .. } => players,
            DraftEvent::PickSubmitted { players, .. } => players,
        }
    }

    pub fn draft_id(&self) -> &str {
        match self {
            DraftEvent::PlayerAdded { new_player, .. } => &new_player.draft_id,
            DraftEvent::PickSubmitted { new_pick, .. } => &new_pick.draft_id,
        }
    }

    /// Serialize to the wire payload handed to the broadcaster.
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        let wire = match self {
            DraftEvent::PlayerAdded { players, new_player } => WireEvent {
                event_type: EventType::PlayerAdded,
                players,
                new_player: Some(new_player),
                new_pick: None,
            },
            DraftEvent::PickSubmitted { players, new_pick } => WireEvent {
                event_type: EventType::PickSubmitted,
                players,
                new_player: None,
                new_pick: Some(new_pick),
            },
        };
        serde_json::to_vec(&wire)
    }
}

/// Assemble a PlayerAdded event for a player whose registration was just
/// written. The roster is re-read here, after the write, so the snapshot
/// includes the new player.
pub async fn player_added(
    registry: &dyn ConnectionRegistry,
    new_player: Player,
) -> Result<DraftEvent, StoreError> {
    let players = registry.players(&new_player.draft_id).await?;
    Ok(DraftEvent::PlayerAdded { players, new_player })
}

/// Assemble a PickSubmitted event for a pick that was just durably appended.
/// Same post-write roster contract as [`player_added`].
pub async fn pick_submitted(
    registry: &dyn ConnectionRegistry,
    new_pick: Pick,
) -> Result<DraftEvent, StoreError> {
    let players = registry.players(&new_pick.draft_id).await?;
    Ok(DraftEvent::PickSubmitted { players, new_pick })
}
