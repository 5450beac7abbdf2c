// Request handlers for the two submission paths: player join and pick
// submission.
//
// A submission succeeds once its own record is durably stored. The broadcast
// that follows is best-effort notification: any failure past the durable
// write (roster snapshot, payload encoding, registry lookup inside publish)
// degrades to a logged warning and an empty delivery report, because a later
// event's roster snapshot lets clients reconcile anyway.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::broadcast::{Broadcaster, DeliveryReport};
use crate::draft::event::{self, DraftEvent};
use crate::draft::pick::{Pick, PickRequest};
use crate::draft::player::Player;
use crate::sequence::{SequenceAssigner, SequenceError};
use crate::store::{ConnectionRegistry, PickLedger, StoreError};
use crate::transport::Transport;

/// A submission failed before anything was durably recorded. Nothing was
/// broadcast.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),
}

/// Result of a successful join.
#[derive(Debug)]
pub struct JoinOutcome {
    pub player: Player,
    pub delivery: DeliveryReport,
}

/// Result of a successful pick submission.
#[derive(Debug)]
pub struct SubmitOutcome {
    pub pick: Pick,
    pub delivery: DeliveryReport,
}

/// The submission paths, wired to the store and transport collaborators.
/// Cheap to clone; every invocation re-reads state from the store, so there
/// is no in-process draft state to keep coherent across requests.
#[derive(Clone)]
pub struct DraftHandlers {
    assigner: SequenceAssigner,
    registry: Arc<dyn ConnectionRegistry>,
    broadcaster: Broadcaster,
}

impl DraftHandlers {
    pub fn new(
        ledger: Arc<dyn PickLedger>,
        registry: Arc<dyn ConnectionRegistry>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            assigner: SequenceAssigner::new(ledger),
            registry: registry.clone(),
            broadcaster: Broadcaster::new(registry, transport),
        }
    }

    /// Register (or re-register) a player and announce the join to every
    /// live connection of the draft.
    pub async fn create_player(
        &self,
        draft_id: &str,
        name: &str,
        connection_id: &str,
    ) -> Result<JoinOutcome, SubmitError> {
        let player = Player::connected(draft_id, name, connection_id);
        self.registry.put(&player).await?;
        info!("player {name} registered for draft {draft_id} on {connection_id}");

        let delivery = match event::player_added(self.registry.as_ref(), player.clone()).await {
            Ok(event) => self.broadcast(&event).await,
            Err(e) => {
                warn!("player {name} recorded but roster snapshot failed: {e}");
                DeliveryReport::default()
            }
        };

        Ok(JoinOutcome { player, delivery })
    }

    /// Assign an order to the pick, record it durably, and announce it.
    pub async fn submit_pick(
        &self,
        draft_id: &str,
        player_id: &str,
        selection: &str,
    ) -> Result<SubmitOutcome, SubmitError> {
        let request = PickRequest {
            draft_id: draft_id.to_string(),
            player_id: player_id.to_string(),
            selection: selection.to_string(),
        };

        let pick = self.assigner.assign(&request).await?;
        info!(
            "pick {} recorded for draft {draft_id}: {player_id} -> {selection}",
            pick.overall_order
        );

        let delivery = match event::pick_submitted(self.registry.as_ref(), pick.clone()).await {
            Ok(event) => self.broadcast(&event).await,
            Err(e) => {
                warn!(
                    "pick {} recorded but roster snapshot failed: {e}",
                    pick.overall_order
                );
                DeliveryReport::default()
            }
        };

        Ok(SubmitOutcome { pick, delivery })
    }

    async fn broadcast(&self, event: &DraftEvent) -> DeliveryReport {
        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("failed to encode event for draft {}: {e}", event.draft_id());
                return DeliveryReport::default();
            }
        };

        match self.broadcaster.publish(event.draft_id(), &payload).await {
            Ok(report) => report,
            Err(e) => {
                warn!("broadcast for draft {} failed: {e}", event.draft_id());
                DeliveryReport::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use crate::broadcast::Delivery;
    use crate::store::{AppendError, Database};
    use crate::transport::PushError;

    const DRAFT: &str = "d1";

    /// Transport stub recording every push; outcome scripted per connection.
    #[derive(Default)]
    struct StubTransport {
        outcomes: Mutex<HashMap<String, &'static str>>,
        pushes: Mutex<Vec<(String, Vec<u8>)>>,
    }

    impl StubTransport {
        fn arc() -> Arc<Self> {
            Arc::new(Self::default())
        }

        fn gone(&self, connection_id: &str) {
            self.outcomes
                .lock()
                .unwrap()
                .insert(connection_id.to_string(), "gone");
        }

        fn pushes(&self) -> Vec<(String, Vec<u8>)> {
            self.pushes.lock().unwrap().clone()
        }

        fn payload_json(&self, index: usize) -> serde_json::Value {
            serde_json::from_slice(&self.pushes()[index].1).unwrap()
        }
    }

    #[async_trait]
    impl Transport for StubTransport {
        async fn push(&self, connection_id: &str, payload: &[u8]) -> Result<(), PushError> {
            self.pushes
                .lock()
                .unwrap()
                .push((connection_id.to_string(), payload.to_vec()));
            match self.outcomes.lock().unwrap().get(connection_id).copied() {
                Some("gone") => Err(PushError::Gone),
                Some(_) => Err(PushError::Transient("stubbed".to_string())),
                None => Ok(()),
            }
        }
    }

    /// Ledger that always fails, for the abort-before-broadcast path.
    struct DownLedger;

    #[async_trait]
    impl PickLedger for DownLedger {
        async fn max_order(&self, _draft_id: &str) -> Result<u32, StoreError> {
            Err(StoreError::Unavailable("ledger offline".to_string()))
        }

        async fn append(&self, _pick: &Pick) -> Result<(), AppendError> {
            Err(AppendError::Store(StoreError::Unavailable(
                "ledger offline".to_string(),
            )))
        }

        async fn picks(&self, _draft_id: &str) -> Result<Vec<Pick>, StoreError> {
            Err(StoreError::Unavailable("ledger offline".to_string()))
        }
    }

    fn handlers_with(
        db: &Arc<Database>,
        transport: &Arc<StubTransport>,
    ) -> DraftHandlers {
        DraftHandlers::new(db.clone(), db.clone(), transport.clone())
    }

    // ------------------------------------------------------------------
    // create_player
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn join_broadcasts_roster_including_the_new_player() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let transport = StubTransport::arc();
        let handlers = handlers_with(&db, &transport);

        handlers
            .create_player(DRAFT, "alice", "conn-1")
            .await
            .unwrap();
        let outcome = handlers
            .create_player(DRAFT, "bob", "conn-2")
            .await
            .unwrap();

        assert_eq!(outcome.delivery.delivered(), 2);

        // The last push carries bob's join with both players in the roster.
        let pushes = transport.pushes();
        let event = transport.payload_json(pushes.len() - 1);
        assert_eq!(event["EventType"], "PlayerAdded");
        assert_eq!(event["NewPlayer"]["Name"], "bob");
        let names: Vec<&str> = event["Players"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["Name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"alice"));
        assert!(names.contains(&"bob"));
    }

    #[tokio::test]
    async fn rejoining_on_a_new_connection_keeps_one_row_per_handle() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let transport = StubTransport::arc();
        let handlers = handlers_with(&db, &transport);

        handlers
            .create_player(DRAFT, "alice", "conn-1")
            .await
            .unwrap();
        let outcome = handlers
            .create_player(DRAFT, "alice", "conn-2")
            .await
            .unwrap();

        // Old registration still present (pruning happens when a broadcast
        // finds it gone), so the roster has two registrations for alice.
        let roster = outcome.delivery.targets();
        assert_eq!(roster, 2);
    }

    // ------------------------------------------------------------------
    // submit_pick
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn first_pick_gets_order_one_and_is_announced() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let transport = StubTransport::arc();
        let handlers = handlers_with(&db, &transport);

        handlers
            .create_player(DRAFT, "alice", "conn-1")
            .await
            .unwrap();
        let outcome = handlers
            .submit_pick(DRAFT, "alice", "Mike Trout")
            .await
            .unwrap();

        assert_eq!(outcome.pick.overall_order, 1);
        assert_eq!(outcome.delivery.delivered(), 1);

        let pushes = transport.pushes();
        let event = transport.payload_json(pushes.len() - 1);
        assert_eq!(event["EventType"], "PickSubmitted");
        assert_eq!(event["NewPick"]["OverallOrder"], 1);
        assert_eq!(event["NewPick"]["Selection"], "Mike Trout");
        assert!(event["NewPlayer"].is_null());
    }

    #[tokio::test]
    async fn ledger_failure_aborts_with_nothing_pushed() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let transport = StubTransport::arc();
        let handlers = DraftHandlers::new(Arc::new(DownLedger), db, transport.clone());

        let err = handlers
            .submit_pick(DRAFT, "alice", "Mike Trout")
            .await
            .unwrap_err();
        assert!(matches!(err, SubmitError::Sequence(_)));
        assert!(transport.pushes().is_empty());
    }

    #[tokio::test]
    async fn gone_connection_is_pruned_during_the_announcement() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let transport = StubTransport::arc();
        let handlers = handlers_with(&db, &transport);

        handlers
            .create_player(DRAFT, "alice", "conn-1")
            .await
            .unwrap();
        handlers
            .create_player(DRAFT, "ghost", "conn-2")
            .await
            .unwrap();
        transport.gone("conn-2");

        let outcome = handlers
            .submit_pick(DRAFT, "alice", "Mike Trout")
            .await
            .unwrap();

        assert_eq!(outcome.delivery.status("conn-1"), Some(Delivery::Delivered));
        assert_eq!(outcome.delivery.status("conn-2"), Some(Delivery::Gone));

        // The registry self-healed: the next announcement skips the ghost.
        let next = handlers
            .submit_pick(DRAFT, "alice", "Aaron Judge")
            .await
            .unwrap();
        assert_eq!(next.delivery.targets(), 1);
        assert_eq!(next.delivery.status("conn-1"), Some(Delivery::Delivered));
    }

    #[tokio::test]
    async fn submission_succeeds_even_when_every_push_fails() {
        let db = Arc::new(Database::open(":memory:").unwrap());
        let transport = StubTransport::arc();
        transport
            .outcomes
            .lock()
            .unwrap()
            .insert("conn-1".to_string(), "flaky");
        let handlers = handlers_with(&db, &transport);

        handlers
            .create_player(DRAFT, "alice", "conn-1")
            .await
            .unwrap();
        let outcome = handlers
            .submit_pick(DRAFT, "alice", "Mike Trout")
            .await
            .unwrap();

        // Durably recorded; the broadcast outcome is advisory.
        assert_eq!(outcome.pick.overall_order, 1);
        assert_eq!(outcome.delivery.delivered(), 0);
        assert_eq!(
            outcome.delivery.status("conn-1"),
            Some(Delivery::TransientError)
        );
        assert_eq!(PickLedger::picks(db.as_ref(), DRAFT).await.unwrap().len(), 1);
    }
}
