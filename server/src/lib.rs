//! # Canvas Server Library
//!
//! This library provides the authoritative server for the shared pixel
//! canvas. It owns the one true copy of the board, applies paint commands
//! from any number of connected clients, and pushes the full board to every
//! client after each change.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Canvas
//! The server holds a fixed-size grid of colors. Clients never edit the
//! board directly; they send paint commands and render whatever snapshot
//! the server sends back.
//!
//! ### Client Management
//! Handles the complete lifecycle of client connections:
//! - Connection acceptance and ID assignment (IDs are never reused)
//! - Command decoding and dispatch
//! - Disconnection handling and registry cleanup
//! - Capacity limits for concurrent connections
//!
//! ### Snapshot Broadcasting
//! Every paint (valid or not) and every join ends in a broadcast of the
//! whole board to all registered clients.
//!
//! ## Architecture Design
//!
//! ### Task Per Connection
//! The accept loop runs on its own task and never touches client I/O. Each
//! accepted connection gets a handler task that owns the read half and a
//! writer task that owns the write half. A slow or stalled peer only ever
//! blocks its own writer task. Each client's queue is bounded; a client
//! that lets it fill up is evicted instead of buffering without limit.
//!
//! ### Lock, Copy, Unlock, Send
//! The canvas and the client registry each sit behind their own lock and
//! are never held at the same time. A snapshot is copied out under the
//! canvas lock, the lock is released, and only then is the copy encoded and
//! queued for clients. Every snapshot carries the canvas version it was
//! taken at, and a writer never sends an older version after a newer one.
//!
//! ### Length-Prefixed JSON
//! Messages travel as a 5 byte little-endian length followed by a UTF-8
//! JSON payload. See the `shared` crate for the message shapes.
//!
//! ## Module Organization
//!
//! - `canvas`: the grid, bounds-checked painting and snapshots
//! - `client_manager`: the registry of connected clients and their queues
//! - `broadcast`: fan-out of one message to every registered client
//! - `connection`: per-client receive loop, close handling and writer task
//! - `network`: listening socket and accept loop
//! - `config`: startup parameters
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig {
//!         host: "0.0.0.0".to_string(),
//!         port: 8080,
//!         ..ServerConfig::default()
//!     };
//!
//!     // Binding is the only fatal step; after this, misbehaving clients
//!     // only ever take down their own connection.
//!     let server = Server::bind(config).await?;
//!     server.run().await;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Known Gaps
//!
//! There is no heartbeat or read timeout. A peer that stops sending without
//! closing its socket keeps its handler alive until the operating system
//! reports the connection as dead.

pub mod broadcast;
pub mod canvas;
pub mod client_manager;
pub mod config;
pub mod connection;
pub mod network;
