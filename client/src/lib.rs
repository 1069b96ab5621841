//! # Canvas Client Library
//!
//! This library is the client side of the shared pixel canvas. It gives a
//! presentation layer the only two operations it needs from the core:
//! send a command, and receive a canvas snapshot. Drawing the board is left
//! to whoever consumes the snapshots.
//!
//! ## Module Organization
//!
//! ### Network Module (`network`)
//! Connection handling and message exchange with the server:
//! - TCP connection setup
//! - Command framing and sending (`join`, `paint`, `close`)
//! - Snapshot and closed message decoding
//! - Splitting a connection into independent send and receive halves
//!
//! ### Board Module (`board`)
//! A read-only view over the most recent snapshot: dimensions, cell
//! lookup, and simple statistics for display.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::network::CanvasClient;
//! use shared::Color;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut client = CanvasClient::connect("127.0.0.1:8080").await?;
//!
//!     client.join().await?;
//!     client.paint(0, 0, Color::RED).await?;
//!
//!     while let Some(grid) = client.next_snapshot().await? {
//!         println!("top-left is now {}", grid[0][0]);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod network;
