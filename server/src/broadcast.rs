//! Fan-out of server messages to every registered client

use crate::client_manager::{Frame, QueueError, SharedRegistry};
use log::{debug, warn};
use shared::{encode, ProtocolError, ServerMessage};

/// Pushes one message to every client in the registry
///
/// A broadcast works from a point-in-time ID snapshot. Each ID is looked up
/// again right before sending, so clients that left in the meantime are
/// skipped. A client whose writer task has stopped is removed from the
/// registry, and a client whose queue is full is removed and evicted. The
/// broadcast carries on with the rest either way.
#[derive(Clone)]
pub struct Broadcaster {
    registry: SharedRegistry,
}

impl Broadcaster {
    pub fn new(registry: SharedRegistry) -> Self {
        Self { registry }
    }

    /// Encodes `message` once and queues it for every client, tagged with
    /// the canvas `version` it was taken at.
    /// Returns how many clients it was queued for.
    pub async fn send_all(
        &self,
        version: u64,
        message: &ServerMessage,
    ) -> Result<usize, ProtocolError> {
        let frame = Frame {
            version,
            bytes: encode(message)?.into(),
        };
        Ok(self.send_frame_to_all(frame).await)
    }

    pub async fn send_frame_to_all(&self, frame: Frame) -> usize {
        let ids = self.registry.read().await.snapshot_ids();
        let mut delivered = 0;

        for id in ids {
            let handle = match self.registry.read().await.get(id) {
                Some(handle) => handle.clone(),
                None => continue,
            };

            match handle.send_frame(frame.clone()) {
                Ok(()) => delivered += 1,
                Err(QueueError::Full(_)) => {
                    warn!("Client {} is not keeping up, evicting", id);
                    self.registry.write().await.remove(id);
                    handle.evict();
                }
                Err(QueueError::Gone(_)) => {
                    warn!("Client {} has disconnected (broadcast)", id);
                    self.registry.write().await.remove(id);
                }
            }
        }

        debug!(
            "Broadcast {} bytes (version {}) to {} clients",
            frame.bytes.len(),
            frame.version,
            delivered
        );
        delivered
    }
}
