//! Server network layer: listening socket and accept loop

use crate::canvas::{Canvas, SharedCanvas};
use crate::client_manager::{client_channel, ClientRegistry, SharedRegistry};
use crate::config::ServerConfig;
use crate::connection::{run_writer, ConnectionHandler};
use log::{debug, error, info, warn};
use shared::{encode, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Accepts connections and hands each one to its own handler task
pub struct Server {
    listener: TcpListener,
    config: ServerConfig,
    canvas: SharedCanvas,
    registry: SharedRegistry,
    next_client_id: u64,
}

impl Server {
    /// Binds the listening socket. Failing here is fatal: the server cannot
    /// serve anyone.
    pub async fn bind(config: ServerConfig) -> Result<Self, ServerError> {
        config.validate().map_err(ServerError::InvalidConfig)?;

        let addr = config.address();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        info!(
            "Server listening on {} with a {}x{} canvas",
            listener.local_addr().map(|a| a.to_string()).unwrap_or(addr),
            config.width,
            config.height
        );

        Ok(Server {
            listener,
            canvas: Canvas::new(config.width, config.height).into_shared(),
            registry: ClientRegistry::new().into_shared(),
            config,
            next_client_id: 1,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn canvas(&self) -> SharedCanvas {
        Arc::clone(&self.canvas)
    }

    pub fn registry(&self) -> SharedRegistry {
        Arc::clone(&self.registry)
    }

    /// Main accept loop. Never returns; errors on individual connections
    /// are logged and the loop carries on.
    pub async fn run(mut self) {
        info!("Server accepting connections");
        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => self.accept_client(stream, addr).await,
                Err(e) => {
                    error!("Error accepting connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                }
            }
        }
    }

    async fn accept_client(&mut self, stream: TcpStream, addr: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }

        let client_count = self.registry.read().await.len();
        if client_count >= self.config.max_clients {
            warn!(
                "Rejecting connection from {}: server full ({} clients)",
                addr, client_count
            );
            tokio::spawn(reject(stream));
            return;
        }

        let client_id = self.next_client_id;
        let Some(next_id) = client_id.checked_add(1) else {
            error!("Client IDs exhausted, rejecting connection from {}", addr);
            tokio::spawn(reject(stream));
            return;
        };
        self.next_client_id = next_id;
        info!("New client {} from {}", client_id, addr);

        let (reader, writer) = stream.into_split();
        let (handle, queue) = client_channel(client_id, addr, self.config.queue_capacity);

        self.registry.write().await.add(client_id, handle.clone());

        let writer_task = tokio::spawn(run_writer(
            client_id,
            writer,
            queue,
            Arc::clone(&self.registry),
        ));
        let handler = ConnectionHandler::new(
            handle,
            reader,
            writer_task,
            Arc::clone(&self.canvas),
            Arc::clone(&self.registry),
            self.config.max_frame_len,
        );
        tokio::spawn(async move {
            let reason = handler.run().await;
            debug!("Client {} handler finished: {:?}", client_id, reason);
        });
    }
}

/// Tells a client it cannot join and drops the connection
async fn reject(mut stream: TcpStream) {
    let result = async {
        let frame = encode(&ServerMessage::Closed)?;
        stream.write_all(&frame).await?;
        stream.shutdown().await?;
        Ok::<(), shared::ProtocolError>(())
    }
    .await;
    if let Err(e) = result {
        debug!("Failed to notify rejected client: {}", e);
    }
}
