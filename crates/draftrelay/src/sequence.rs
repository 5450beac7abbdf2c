// Overall-order assignment for submitted picks.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::draft::pick::{Pick, PickRequest};
use crate::store::{AppendError, PickLedger, StoreError};

/// How many read-assign-append attempts a submission gets before giving up.
/// Each conflict means another writer claimed the slot first, so the retry
/// re-reads and lands one past the new maximum; three attempts is enough
/// unless the ledger is being hammered by a pathological writer.
pub const MAX_ORDER_RETRIES: u32 = 3;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Every attempt lost the order race. Callers treat this the same as a
    /// store failure: the submission fails wholesale and nothing is
    /// broadcast.
    #[error("could not claim an order for draft {draft_id} after {attempts} attempts")]
    OrdersExhausted { draft_id: String, attempts: u32 },
}

/// Assigns each submitted pick a globally unique, strictly increasing
/// overall order within its draft.
///
/// Two concurrent callers can read the same maximum and compute the same
/// next order; the ledger's conditional append rejects the loser with
/// `OrderConflict` and the loop retries with a fresh read. The winning
/// append is the durable record of the pick; there is no separate write.
#[derive(Clone)]
pub struct SequenceAssigner {
    ledger: Arc<dyn PickLedger>,
}

impl SequenceAssigner {
    pub fn new(ledger: Arc<dyn PickLedger>) -> Self {
        Self { ledger }
    }

    /// The next free overall order for the draft: current maximum + 1, so an
    /// empty draft assigns 1. This is a point-in-time read; only a
    /// successful conditional append makes the number yours.
    pub async fn next_order(&self, draft_id: &str) -> Result<u32, StoreError> {
        Ok(self.ledger.max_order(draft_id).await? + 1)
    }

    /// Claim an order for the request and durably append the resulting pick.
    pub async fn assign(&self, request: &PickRequest) -> Result<Pick, SequenceError> {
        for attempt in 1..=MAX_ORDER_RETRIES {
            let order = self.next_order(&request.draft_id).await?;
            let pick = request.with_order(order);

            match self.ledger.append(&pick).await {
                Ok(()) => return Ok(pick),
                Err(AppendError::OrderConflict { draft_id, order }) => {
                    debug!(
                        "order {order} for draft {draft_id} lost the race \
                         (attempt {attempt}/{MAX_ORDER_RETRIES}), retrying"
                    );
                }
                Err(AppendError::Store(e)) => return Err(e.into()),
            }
        }

        Err(SequenceError::OrdersExhausted {
            draft_id: request.draft_id.clone(),
            attempts: MAX_ORDER_RETRIES,
        })
    }
}
