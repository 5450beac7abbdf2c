// Fan-out of event payloads to every live connection of a draft.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::store::{ConnectionRegistry, StoreError};
use crate::transport::{PushError, Transport};

/// Per-target outcome of a broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The connection no longer exists; its registration was pruned.
    Gone,
    /// The push failed for a non-terminal reason; logged, not retried.
    TransientError,
}

/// What happened to each connection a broadcast targeted. Partial delivery
/// failures live here; they never fail the publish call itself.
#[derive(Debug, Default)]
pub struct DeliveryReport {
    entries: Vec<(String, Delivery)>,
}

impl DeliveryReport {
    fn record(&mut self, connection_id: &str, delivery: Delivery) {
        self.entries.push((connection_id.to_string(), delivery));
    }

    /// Per-target outcomes, in attempt order.
    pub fn entries(&self) -> &[(String, Delivery)] {
        &self.entries
    }

    /// The outcome for one connection, if it was targeted.
    pub fn status(&self, connection_id: &str) -> Option<Delivery> {
        self.entries
            .iter()
            .find(|(id, _)| id == connection_id)
            .map(|(_, delivery)| *delivery)
    }

    /// How many targets were attempted.
    pub fn targets(&self) -> usize {
        self.entries.len()
    }

    /// How many targets received the payload.
    pub fn delivered(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, d)| *d == Delivery::Delivered)
            .count()
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    /// The registry lookup itself failed; no deliveries were attempted.
    #[error("connection registry unavailable: {0}")]
    RegistryUnavailable(#[source] StoreError),
}

/// Delivers one payload to every connected registration of a draft.
///
/// Deliveries are independent: one target's failure never blocks or skips
/// another, and nothing is retried within a single publish. Targets the
/// transport reports gone are pruned from the registry so future broadcasts
/// skip them; the registry self-heals as connections silently die.
#[derive(Clone)]
pub struct Broadcaster {
    registry: Arc<dyn ConnectionRegistry>,
    transport: Arc<dyn Transport>,
}

impl Broadcaster {
    pub fn new(registry: Arc<dyn ConnectionRegistry>, transport: Arc<dyn Transport>) -> Self {
        Self {
            registry,
            transport,
        }
    }

    pub async fn publish(
        &self,
        draft_id: &str,
        payload: &[u8],
    ) -> Result<DeliveryReport, PublishError> {
        let players = self
            .registry
            .players(draft_id)
            .await
            .map_err(PublishError::RegistryUnavailable)?;

        let mut report = DeliveryReport::default();

        for player in players.iter().filter(|p| p.is_connected) {
            match self.transport.push(&player.connection_id, payload).await {
                Ok(()) => report.record(&player.connection_id, Delivery::Delivered),
                Err(PushError::Gone) => {
                    info!(
                        "connection {} for draft {draft_id} is gone, pruning registration",
                        player.connection_id
                    );
                    // Best-effort: a prune failure must not abort the
                    // broadcast.
                    if let Err(e) = self.registry.mark_disconnected(&player.connection_id).await {
                        warn!(
                            "failed to prune gone connection {}: {e}",
                            player.connection_id
                        );
                    }
                    report.record(&player.connection_id, Delivery::Gone);
                }
                Err(PushError::Transient(reason)) => {
                    warn!("push to {} failed: {reason}", player.connection_id);
                    report.record(&player.connection_id, Delivery::TransientError);
                }
            }
        }

        Ok(report)
    }
}
