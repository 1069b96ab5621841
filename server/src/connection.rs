//! Per-client connection lifecycle
//!
//! Each accepted connection is split in two halves:
//! - The read half is owned by a [`ConnectionHandler`], which decodes
//!   commands and applies them to the canvas
//! - The write half is owned by a writer task ([`run_writer`]) that drains
//!   the client's outbound queue
//!
//! A handler moves through `Open -> Closing -> Closed`. It leaves `Open` on
//! an explicit close command, on any framing, payload or stream error, or
//! when its writer task stops early. While `Closing` it removes the client
//! from the registry, asks the writer to send the closed message, and waits
//! for the writer to finish. Once `Closed` no further I/O happens on the
//! connection.

use crate::broadcast::Broadcaster;
use crate::canvas::{CanvasError, SharedCanvas};
use crate::client_manager::{ClientHandle, ClientQueue, Outgoing, QueueError, SharedRegistry};
use log::{debug, info, warn};
use shared::{decode_with_limit, encode, Command, Grid, ProtocolError, ServerMessage};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closing,
    Closed,
}

/// Why a handler left the receive loop
#[derive(Debug)]
pub enum CloseReason {
    Requested,
    Protocol(ProtocolError),
    /// The writer task stopped first: the peer stopped reading or its
    /// socket failed
    WriterStopped,
}

/// Owns one client's receive loop
pub struct ConnectionHandler<R> {
    client: ClientHandle,
    reader: R,
    writer_task: Option<JoinHandle<()>>,
    canvas: SharedCanvas,
    registry: SharedRegistry,
    broadcaster: Broadcaster,
    max_frame_len: usize,
    state: ConnectionState,
}

impl<R> ConnectionHandler<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(
        client: ClientHandle,
        reader: R,
        writer_task: JoinHandle<()>,
        canvas: SharedCanvas,
        registry: SharedRegistry,
        max_frame_len: usize,
    ) -> Self {
        let broadcaster = Broadcaster::new(registry.clone());
        Self {
            client,
            reader,
            writer_task: Some(writer_task),
            canvas,
            registry,
            broadcaster,
            max_frame_len,
            state: ConnectionState::Open,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Runs the connection to completion and returns why it closed
    pub async fn run(mut self) -> CloseReason {
        let reason = self.receive_loop().await;
        match &reason {
            CloseReason::Requested => info!("Client {} requested close", self.client.id),
            CloseReason::Protocol(ProtocolError::PeerDisconnected) => {
                info!("Client {} disconnected", self.client.id)
            }
            CloseReason::Protocol(e) => warn!("Closing client {}: {}", self.client.id, e),
            CloseReason::WriterStopped => {
                info!("Client {} stopped receiving, closing", self.client.id)
            }
        }
        self.close().await;
        reason
    }

    async fn receive_loop(&mut self) -> CloseReason {
        while self.state == ConnectionState::Open {
            let read = decode_with_limit::<Command, _>(&mut self.reader, self.max_frame_len);
            let next = match self.writer_task.as_mut() {
                Some(writer) => tokio::select! {
                    result = read => Some(result),
                    _ = writer => None,
                },
                None => Some(read.await),
            };

            let command = match next {
                Some(Ok(command)) => command,
                Some(Err(e)) => {
                    self.state = ConnectionState::Closing;
                    return CloseReason::Protocol(e);
                }
                None => {
                    self.writer_task = None;
                    self.state = ConnectionState::Closing;
                    return CloseReason::WriterStopped;
                }
            };
            self.dispatch(command).await;
        }
        CloseReason::Requested
    }

    /// Applies one command. Paints and joins end in a broadcast of the
    /// current canvas, a close moves the handler to `Closing`.
    pub async fn dispatch(&mut self, command: Command) {
        match command {
            Command::Paint { x, y, color } => {
                let (version, snapshot) = {
                    let mut canvas = self.canvas.lock().await;
                    if let Err(CanvasError::OutOfBounds { .. }) = canvas.paint(x, y, color) {
                        debug!(
                            "Client {} painted outside the canvas at ({}, {}), ignoring",
                            self.client.id, x, y
                        );
                    }
                    (canvas.version(), canvas.snapshot())
                };
                self.broadcast(version, snapshot).await;
            }
            Command::Join => {
                debug!("Client {} joined", self.client.id);
                let (version, snapshot) = {
                    let canvas = self.canvas.lock().await;
                    (canvas.version(), canvas.snapshot())
                };
                self.broadcast(version, snapshot).await;
            }
            Command::Close => {
                self.state = ConnectionState::Closing;
            }
        }
    }

    async fn broadcast(&self, version: u64, grid: Grid) {
        let message = ServerMessage::Snapshot(grid);
        if let Err(e) = self.broadcaster.send_all(version, &message).await {
            warn!("Failed to encode snapshot: {}", e);
        }
    }

    async fn close(&mut self) {
        self.state = ConnectionState::Closing;
        self.registry.write().await.remove(self.client.id);

        match self.client.close() {
            Ok(()) => {}
            Err(QueueError::Full(_)) => {
                debug!(
                    "Client {} queue is full, dropping it without a closed message",
                    self.client.id
                );
                self.client.evict();
            }
            Err(QueueError::Gone(_)) => debug!(
                "Client {} writer already stopped, skipping closed message",
                self.client.id
            ),
        }
        if let Some(task) = self.writer_task.take() {
            if let Err(e) = task.await {
                warn!("Writer task for client {} panicked: {}", self.client.id, e);
            }
        }

        self.state = ConnectionState::Closed;
        info!("Connection to client {} closed", self.client.id);
    }
}

/// Drains a client's outbound queue into the write half of its socket
///
/// Frames are written in queue order, except that a frame tagged with an
/// older canvas version than one already written is dropped: snapshots
/// from different handlers can be queued out of order, and the client must
/// never see the board go back in time.
///
/// A write failure removes the client from the registry and stops the task.
/// Eviction stops the task at once, even mid-write. An [`Outgoing::Close`]
/// item sends the closed message (best effort), shuts the write half down
/// and stops the task, so nothing is written after it.
pub async fn run_writer<W>(
    client_id: u64,
    mut writer: W,
    mut queue: ClientQueue,
    registry: SharedRegistry,
) where
    W: AsyncWrite + Unpin,
{
    let mut written_version: Option<u64> = None;

    while let Some(item) = queue.recv().await {
        match item {
            Outgoing::Frame(frame) => {
                if matches!(written_version, Some(v) if frame.version < v) {
                    debug!(
                        "Dropping stale snapshot v{} for client {}",
                        frame.version, client_id
                    );
                    continue;
                }
                let result = tokio::select! {
                    result = writer.write_all(&frame.bytes) => result,
                    _ = queue.evicted() => {
                        debug!("Client {} evicted mid-write", client_id);
                        return;
                    }
                };
                if let Err(e) = result {
                    warn!(
                        "Client {} has disconnected (send): {}",
                        client_id,
                        ProtocolError::from(e)
                    );
                    registry.write().await.remove(client_id);
                    return;
                }
                written_version = Some(frame.version);
            }
            Outgoing::Close => {
                if let Err(e) = send_closed(&mut writer).await {
                    warn!("Failed to send closed message to client {}: {}", client_id, e);
                }
                break;
            }
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of client {} write half failed: {}", client_id, e);
    }
}

async fn send_closed<W>(writer: &mut W) -> Result<(), ProtocolError>
where
    W: AsyncWrite + Unpin,
{
    let frame = encode(&ServerMessage::Closed)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}
