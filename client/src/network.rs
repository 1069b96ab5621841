use log::{debug, info};
use shared::{
    decode_with_limit, encode, Color, Command, Grid, ProtocolError, ServerMessage,
    DEFAULT_MAX_FRAME_LEN,
};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

/// A connection to the canvas server
pub struct CanvasClient {
    sender: CommandSender,
    receiver: SnapshotReceiver,
}

impl CanvasClient {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ProtocolError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        info!("Connected to {}", stream.peer_addr()?);
        Ok(Self::from_stream(stream))
    }

    pub fn from_stream(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self {
            sender: CommandSender { writer },
            receiver: SnapshotReceiver {
                reader,
                max_frame_len: DEFAULT_MAX_FRAME_LEN,
            },
        }
    }

    pub async fn send(&mut self, command: &Command) -> Result<(), ProtocolError> {
        self.sender.send(command).await
    }

    /// Announces this client; the server answers with a board broadcast
    pub async fn join(&mut self) -> Result<(), ProtocolError> {
        self.sender.join().await
    }

    pub async fn paint(&mut self, x: i64, y: i64, color: Color) -> Result<(), ProtocolError> {
        self.sender.paint(x, y, color).await
    }

    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        self.sender.close().await
    }

    pub async fn next_message(&mut self) -> Result<ServerMessage, ProtocolError> {
        self.receiver.next_message().await
    }

    /// Next board from the server, or `None` once the server has closed
    /// the connection
    pub async fn next_snapshot(&mut self) -> Result<Option<Grid>, ProtocolError> {
        self.receiver.next_snapshot().await
    }

    pub fn into_split(self) -> (CommandSender, SnapshotReceiver) {
        (self.sender, self.receiver)
    }
}

/// Write half of a [`CanvasClient`]
pub struct CommandSender {
    writer: OwnedWriteHalf,
}

impl CommandSender {
    pub async fn send(&mut self, command: &Command) -> Result<(), ProtocolError> {
        let frame = encode(command)?;
        self.writer.write_all(&frame).await?;
        debug!("Sent {:?} ({} bytes)", command, frame.len());
        Ok(())
    }

    pub async fn join(&mut self) -> Result<(), ProtocolError> {
        self.send(&Command::Join).await
    }

    pub async fn paint(&mut self, x: i64, y: i64, color: Color) -> Result<(), ProtocolError> {
        self.send(&Command::Paint { x, y, color }).await
    }

    pub async fn close(&mut self) -> Result<(), ProtocolError> {
        self.send(&Command::Close).await
    }
}

/// Read half of a [`CanvasClient`]
pub struct SnapshotReceiver {
    reader: OwnedReadHalf,
    max_frame_len: usize,
}

impl SnapshotReceiver {
    pub async fn next_message(&mut self) -> Result<ServerMessage, ProtocolError> {
        decode_with_limit(&mut self.reader, self.max_frame_len).await
    }

    pub async fn next_snapshot(&mut self) -> Result<Option<Grid>, ProtocolError> {
        match self.next_message().await? {
            ServerMessage::Snapshot(grid) => Ok(Some(grid)),
            ServerMessage::Closed => {
                info!("Server closed the connection");
                Ok(None)
            }
        }
    }
}
