//! Registry of connected clients and their outbound queues
//!
//! This module tracks which clients are currently connected and how to reach
//! them:
//! - Client identity (server-assigned ID, peer address, connect time)
//! - A bounded send handle feeding the client's dedicated writer task
//! - Point-in-time ID snapshots so broadcasts can iterate safely while
//!   connections come and go
//!
//! The registry itself is a plain map. Sharing happens through
//! [`SharedRegistry`], and membership only changes under its write lock.

use log::info;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Notify, RwLock};

pub type SharedRegistry = Arc<RwLock<ClientRegistry>>;

/// An encoded snapshot frame, shared between every client it is queued for
#[derive(Debug, Clone)]
pub struct Frame {
    /// Canvas version the snapshot was taken at
    pub version: u64,
    pub bytes: Arc<[u8]>,
}

/// Work items for a client's writer task
#[derive(Debug, Clone)]
pub enum Outgoing {
    Frame(Frame),
    /// Send the closed message, then shut the connection down
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum QueueError {
    /// The queue is at capacity: the peer is not reading fast enough
    #[error("client {0} is not keeping up")]
    Full(u64),
    /// The client's writer task has exited
    #[error("client {0} has disconnected")]
    Gone(u64),
}

/// Creates the handle/queue pair for a new client
///
/// At most `capacity` items wait in the queue. The handle side never blocks:
/// a full queue is reported as [`QueueError::Full`] and the caller decides
/// whether to evict.
pub fn client_channel(id: u64, addr: SocketAddr, capacity: usize) -> (ClientHandle, ClientQueue) {
    let (sender, receiver) = mpsc::channel(capacity);
    let evicted = Arc::new(Notify::new());
    let handle = ClientHandle {
        id,
        addr,
        connected_at: Instant::now(),
        sender,
        evicted: Arc::clone(&evicted),
    };
    (handle, ClientQueue { receiver, evicted })
}

/// How the server reaches one connected client
///
/// Cloning a handle is cheap: it only clones the queue sender. Queuing never
/// waits on the network, the client's writer task performs the socket write.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    /// Unique client identifier assigned by the server
    pub id: u64,
    /// Peer address, kept for logging
    pub addr: SocketAddr,
    /// When the connection was accepted
    pub connected_at: Instant,
    sender: mpsc::Sender<Outgoing>,
    evicted: Arc<Notify>,
}

impl ClientHandle {
    pub fn send_frame(&self, frame: Frame) -> Result<(), QueueError> {
        self.push(Outgoing::Frame(frame))
    }

    /// Asks the writer task to send the closed message and stop
    pub fn close(&self) -> Result<(), QueueError> {
        self.push(Outgoing::Close)
    }

    /// Stops the writer task without draining the queue, even if it is
    /// blocked writing to the socket
    pub fn evict(&self) {
        self.evicted.notify_one();
    }

    fn push(&self, item: Outgoing) -> Result<(), QueueError> {
        self.sender.try_send(item).map_err(|e| match e {
            TrySendError::Full(_) => QueueError::Full(self.id),
            TrySendError::Closed(_) => QueueError::Gone(self.id),
        })
    }
}

/// Receiving side of a client's queue, owned by its writer task
#[derive(Debug)]
pub struct ClientQueue {
    receiver: mpsc::Receiver<Outgoing>,
    evicted: Arc<Notify>,
}

impl ClientQueue {
    /// Next item to write, or `None` once the client has been evicted or
    /// every handle is gone
    pub async fn recv(&mut self) -> Option<Outgoing> {
        tokio::select! {
            biased;
            _ = self.evicted.notified() => None,
            item = self.receiver.recv() => item,
        }
    }

    /// Resolves once [`ClientHandle::evict`] has been called
    pub async fn evicted(&self) {
        self.evicted.notified().await
    }
}

/// All currently connected clients, keyed by ID
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<u64, ClientHandle>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_shared(self) -> SharedRegistry {
        Arc::new(RwLock::new(self))
    }

    /// Registers a client under `id`
    ///
    /// IDs are never reused by the server, so an existing entry under the
    /// same ID is replaced and returned rather than silently kept.
    pub fn add(&mut self, id: u64, handle: ClientHandle) -> Option<ClientHandle> {
        info!("Client {} registered from {}", id, handle.addr);
        self.clients.insert(id, handle)
    }

    /// Removes a client from the registry
    ///
    /// Returns true if the client was found and removed, false if it was
    /// already gone. Disconnect cleanup and broadcast failure cleanup race
    /// each other, so removing an absent ID is not an error.
    pub fn remove(&mut self, id: u64) -> bool {
        if let Some(client) = self.clients.remove(&id) {
            info!(
                "Client {} removed after {:.1}s",
                id,
                client.connected_at.elapsed().as_secs_f32()
            );
            true
        } else {
            false
        }
    }

    pub fn get(&self, id: u64) -> Option<&ClientHandle> {
        self.clients.get(&id)
    }

    /// Point-in-time copy of the registered IDs, in ascending order
    ///
    /// The returned vector does not borrow the registry, so callers can
    /// release the lock and iterate while other tasks add or remove clients.
    pub fn snapshot_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.clients.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Returns the number of currently connected clients
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    /// Returns true if no clients are currently connected
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
