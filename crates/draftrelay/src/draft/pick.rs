// Pick records and their pre-assignment form.

use serde::{Deserialize, Serialize};

/// A recorded pick: one player's selection, tagged with its position in the
/// draft's overall sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Pick {
    /// The draft this pick belongs to.
    pub draft_id: String,
    /// 1-based position in the draft's overall sequence. Strictly increasing
    /// and gapless within a draft; assigned by the sequence assigner, never
    /// chosen by the client.
    pub overall_order: u32,
    /// The player who made the pick.
    pub player_id: String,
    /// The selection value (opaque to this service).
    pub selection: String,
}

/// A pick as submitted by a client, before an overall order has been claimed
/// for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickRequest {
    pub draft_id: String,
    pub player_id: String,
    pub selection: String,
}

impl PickRequest {
    /// Materialize the request into a [`Pick`] at the given order slot.
    pub fn with_order(&self, overall_order: u32) -> Pick {
        Pick {
            draft_id: self.draft_id.clone(),
            overall_order,
            player_id: self.player_id.clone(),
            selection: self.selection.clone(),
        }
    }
}
