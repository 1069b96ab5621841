//! Integration tests for the shared canvas server and client
//!
//! These tests run a real server on an ephemeral port and talk to it over
//! TCP, either through the client library or with hand-built frames.

use client::network::CanvasClient;
use serde_json::{json, Value};
use server::client_manager::SharedRegistry;
use server::config::ServerConfig;
use server::network::Server;
use shared::{decode, encode, Color, Grid, ServerMessage, DEFAULT_COLOR};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

/// WIRE PROTOCOL TESTS
mod protocol_tests {
    use super::*;

    /// Tests that raw JSON frames in the documented shapes are understood
    #[tokio::test]
    async fn raw_json_paint_and_close() {
        let (addr, _) = start_server(ServerConfig::default()).await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        let paint = json!({"comando": "pintar", "x": 2, "y": 1, "color": [0, 0, 255]});
        stream.write_all(&raw_frame(&paint)).await.unwrap();

        let reply: Value = decode(&mut stream).await.unwrap();
        let board = reply["tablero"].as_array().expect("snapshot keyed as tablero");
        assert_eq!(board.len(), 50);
        assert_eq!(board[1][2], json!("#0000ff"));
        assert_eq!(board[0][0], json!("#ffffff"));

        stream
            .write_all(&raw_frame(&json!({"comando": "cerrar"})))
            .await
            .unwrap();
        let reply: Value = decode(&mut stream).await.unwrap();
        assert_eq!(reply, json!({"cerrar": true}));

        let eof: Result<Value, _> = decode(&mut stream).await;
        assert!(matches!(eof, Err(shared::ProtocolError::PeerDisconnected)));
    }

    /// Tests that a garbage payload only closes the offending connection
    #[tokio::test]
    async fn malformed_payload_is_isolated() {
        let (addr, _) = start_server(ServerConfig::default()).await;
        let mut good = joined_client(addr).await;
        let mut bad = TcpStream::connect(addr).await.unwrap();

        let mut frame = 9u64.to_le_bytes()[..5].to_vec();
        frame.extend_from_slice(b"not json!");
        bad.write_all(&frame).await.unwrap();
        let reply: ServerMessage = decode(&mut bad).await.unwrap();
        assert_eq!(reply, ServerMessage::Closed);

        good.paint(5, 5, Color::GREEN).await.unwrap();
        let grid = wait_for(&mut good, |g| g[5][5] == Color::GREEN).await;
        assert_eq!(grid[5][5], Color::GREEN);
    }

    /// Tests that a frame declaring more bytes than it delivers closes the
    /// connection instead of hanging the server
    #[tokio::test]
    async fn truncated_frame_is_isolated() {
        let (addr, registry) = start_server(ServerConfig::default()).await;
        let mut good = joined_client(addr).await;

        let mut bad = TcpStream::connect(addr).await.unwrap();
        bad.write_all(&[64, 0, 0, 0, 0, b'{', b'"']).await.unwrap();
        bad.shutdown().await.unwrap();
        let reply: ServerMessage = timeout(WAIT, decode(&mut bad)).await.unwrap().unwrap();
        assert_eq!(reply, ServerMessage::Closed);

        wait_until_registered(&registry, 1).await;
        good.paint(0, 1, Color::BLACK).await.unwrap();
        wait_for(&mut good, |g| g[1][0] == Color::BLACK).await;
    }

    /// Tests that oversized length prefixes are refused
    #[tokio::test]
    async fn oversized_frame_is_refused() {
        let (addr, _) = start_server(ServerConfig {
            max_frame_len: 128,
            ..ServerConfig::default()
        })
        .await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        stream.write_all(&[0, 1, 0, 0, 0]).await.unwrap();
        let reply: ServerMessage = timeout(WAIT, decode(&mut stream)).await.unwrap().unwrap();
        assert_eq!(reply, ServerMessage::Closed);
    }
}

/// CANVAS SCENARIO TESTS
mod scenario_tests {
    use super::*;

    /// Tests a single paint on a fresh 50x50 board
    #[tokio::test]
    async fn paint_origin_red() {
        let (addr, _) = start_server(ServerConfig::default()).await;
        let mut client = CanvasClient::connect(addr).await.unwrap();

        client.paint(0, 0, Color::RED).await.unwrap();
        let grid = next_grid(&mut client).await;

        assert_eq!(grid.len(), 50);
        assert_eq!(grid[0][0], Color::RED);
        for (y, row) in grid.iter().enumerate() {
            assert_eq!(row.len(), 50);
            for (x, cell) in row.iter().enumerate() {
                if (x, y) != (0, 0) {
                    assert_eq!(*cell, DEFAULT_COLOR, "cell ({}, {}) changed", x, y);
                }
            }
        }
    }

    /// Tests that two clients each see the other's paint
    #[tokio::test]
    async fn two_clients_see_both_paints() {
        let (addr, registry) = start_server(ServerConfig::default()).await;
        let mut a = joined_client(addr).await;
        let mut b = joined_client(addr).await;
        wait_until_registered(&registry, 2).await;

        a.paint(1, 1, Color::RED).await.unwrap();
        wait_for(&mut a, |g| g[1][1] == Color::RED).await;
        b.paint(2, 2, Color::BLUE).await.unwrap();

        let both = |g: &Grid| g[1][1] == Color::RED && g[2][2] == Color::BLUE;
        let seen_by_a = wait_for(&mut a, both).await;
        let seen_by_b = wait_for(&mut b, both).await;
        assert_eq!(seen_by_a, seen_by_b);
    }

    /// Tests the close handshake and that the remaining client keeps going
    #[tokio::test]
    async fn close_leaves_others_connected() {
        let (addr, registry) = start_server(ServerConfig::default()).await;
        let mut leaving = joined_client(addr).await;
        let mut staying = joined_client(addr).await;
        wait_until_registered(&registry, 2).await;

        leaving.close().await.unwrap();
        loop {
            match timeout(WAIT, leaving.next_message()).await.unwrap().unwrap() {
                ServerMessage::Closed => break,
                ServerMessage::Snapshot(_) => continue,
            }
        }
        assert!(leaving.next_message().await.is_err());
        wait_until_registered(&registry, 1).await;

        staying.paint(10, 20, Color::GREEN).await.unwrap();
        let grid = wait_for(&mut staying, |g| g[20][10] == Color::GREEN).await;
        assert_eq!(grid[20][10], Color::GREEN);
    }

    /// Tests that an abruptly severed client is dropped from the registry
    /// while others continue to receive broadcasts
    #[tokio::test]
    async fn severed_client_is_removed() {
        let (addr, registry) = start_server(ServerConfig::default()).await;
        let severed = TcpStream::connect(addr).await.unwrap();
        let mut survivor = joined_client(addr).await;
        wait_until_registered(&registry, 2).await;

        drop(severed);
        wait_until_registered(&registry, 1).await;

        survivor.paint(49, 49, Color::RED).await.unwrap();
        let grid = wait_for(&mut survivor, |g| g[49][49] == Color::RED).await;
        assert_eq!(grid[49][49], Color::RED);
    }

    /// Tests that out-of-bounds paints are ignored but still answered
    #[tokio::test]
    async fn out_of_bounds_paint_is_ignored() {
        let (addr, _) = start_server(ServerConfig::default()).await;
        let mut client = CanvasClient::connect(addr).await.unwrap();

        for (x, y) in [(50, 0), (0, 50), (-1, 3), (3, -1)] {
            client.paint(x, y, Color::RED).await.unwrap();
            let grid = next_grid(&mut client).await;
            assert!(grid.iter().flatten().all(|c| *c == DEFAULT_COLOR));
        }

        client.paint(3, 3, Color::RED).await.unwrap();
        let grid = next_grid(&mut client).await;
        assert_eq!(grid[3][3], Color::RED);
    }
}

/// CONCURRENCY TESTS
mod concurrency_tests {
    use super::*;

    /// Tests that concurrent paints at disjoint cells are never lost
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_disjoint_paints_all_visible() {
        let (addr, _) = start_server(ServerConfig::default()).await;
        let clients = 8usize;
        let paints_per_client = 10usize;

        let mut tasks = Vec::new();
        for id in 0..clients {
            tasks.push(tokio::spawn(async move {
                let client = CanvasClient::connect(addr).await.unwrap();
                let (mut sender, mut receiver) = client.into_split();

                let drain = tokio::spawn(async move {
                    loop {
                        match receiver.next_message().await {
                            Ok(ServerMessage::Snapshot(_)) => continue,
                            _ => break,
                        }
                    }
                });

                for i in 0..paints_per_client {
                    let color = Color::new(id as u8, i as u8, 7);
                    sender.paint(i as i64, id as i64, color).await.unwrap();
                }
                sender.close().await.unwrap();
                timeout(WAIT, drain).await.unwrap().unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let mut observer = joined_client_raw(addr).await;
        let grid = next_grid(&mut observer).await;
        for id in 0..clients {
            for i in 0..paints_per_client {
                assert_eq!(grid[id][i], Color::new(id as u8, i as u8, 7));
            }
        }
    }

    /// Tests that a connected watcher never sees the board lose paints
    /// while several clients paint at the same time
    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn watcher_never_sees_paints_disappear() {
        let (addr, registry) = start_server(ServerConfig {
            width: 20,
            height: 10,
            queue_capacity: 1024,
            ..ServerConfig::default()
        })
        .await;
        let mut watcher = joined_client(addr).await;
        wait_until_registered(&registry, 1).await;

        let painters = 5i64;
        let rows_each = 2i64;
        let total = (painters * rows_each * 20) as usize;

        let mut tasks = Vec::new();
        for painter in 0..painters {
            tasks.push(tokio::spawn(async move {
                let client = CanvasClient::connect(addr).await.unwrap();
                let (mut sender, mut receiver) = client.into_split();
                let drain = tokio::spawn(async move {
                    while let Ok(ServerMessage::Snapshot(_)) = receiver.next_message().await {}
                });

                for row in 0..rows_each {
                    for x in 0..20 {
                        let y = painter * rows_each + row;
                        sender.paint(x, y, Color::BLACK).await.unwrap();
                    }
                }
                sender.close().await.unwrap();
                timeout(WAIT, drain).await.unwrap().unwrap();
            }));
        }

        let mut last = 0;
        while last < total {
            let grid = next_grid(&mut watcher).await;
            let painted = grid.iter().flatten().filter(|c| **c != DEFAULT_COLOR).count();
            assert!(painted >= last, "board went from {} to {} cells", last, painted);
            last = painted;
        }
        for task in tasks {
            task.await.unwrap();
        }
    }

    /// Tests that a client which stops reading is dropped instead of
    /// buffering snapshots forever, and that others keep being served
    #[tokio::test]
    async fn stalled_reader_is_dropped() {
        let (addr, registry) = start_server(ServerConfig {
            width: 200,
            height: 200,
            queue_capacity: 2,
            ..ServerConfig::default()
        })
        .await;

        let mut stalled = TcpStream::connect(addr).await.unwrap();
        stalled.write_all(&raw_frame(&json!({"comando": "nuevo"}))).await.unwrap();
        wait_until_registered(&registry, 1).await;

        let mut active = joined_client(addr).await;
        wait_until_registered(&registry, 2).await;

        let mut painted = 0;
        while registry.read().await.len() > 1 {
            assert!(painted < 500, "stalled client was never dropped");
            active.paint(painted % 200, painted / 200, Color::BLACK).await.unwrap();
            next_grid(&mut active).await;
            painted += 1;
        }

        active.paint(199, 199, Color::RED).await.unwrap();
        wait_for(&mut active, |g| g[199][199] == Color::RED).await;
        assert_eq!(registry.read().await.len(), 1);
        drop(stalled);
    }

    /// Tests that connections beyond the limit are turned away
    #[tokio::test]
    async fn connection_limit_enforced() {
        let (addr, registry) = start_server(ServerConfig {
            max_clients: 2,
            ..ServerConfig::default()
        })
        .await;
        let mut a = joined_client(addr).await;
        let _b = joined_client(addr).await;
        wait_until_registered(&registry, 2).await;

        let mut extra = CanvasClient::connect(addr).await.unwrap();
        let reply = timeout(WAIT, extra.next_message()).await.unwrap().unwrap();
        assert_eq!(reply, ServerMessage::Closed);

        a.paint(0, 0, Color::BLUE).await.unwrap();
        wait_for(&mut a, |g| g[0][0] == Color::BLUE).await;
    }
}

// HELPER FUNCTIONS

async fn start_server(config: ServerConfig) -> (SocketAddr, SharedRegistry) {
    let server = Server::bind(ServerConfig { port: 0, ..config })
        .await
        .expect("server should bind to an ephemeral port");
    let addr = server.local_addr().unwrap();
    let registry = server.registry();
    tokio::spawn(server.run());
    (addr, registry)
}

/// Connects, joins and consumes the join snapshot
async fn joined_client(addr: SocketAddr) -> CanvasClient {
    let mut client = joined_client_raw(addr).await;
    next_grid(&mut client).await;
    client
}

async fn joined_client_raw(addr: SocketAddr) -> CanvasClient {
    let mut client = CanvasClient::connect(addr).await.unwrap();
    client.join().await.unwrap();
    client
}

async fn next_grid(client: &mut CanvasClient) -> Grid {
    timeout(WAIT, client.next_snapshot())
        .await
        .expect("timed out waiting for a snapshot")
        .unwrap()
        .expect("server closed the connection")
}

/// Reads snapshots until one satisfies `done`
async fn wait_for<F>(client: &mut CanvasClient, done: F) -> Grid
where
    F: Fn(&Grid) -> bool,
{
    loop {
        let grid = next_grid(client).await;
        if done(&grid) {
            return grid;
        }
    }
}

async fn wait_until_registered(registry: &SharedRegistry, count: usize) {
    timeout(WAIT, async {
        while registry.read().await.len() != count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("registry never reached the expected size");
}

fn raw_frame(payload: &Value) -> Vec<u8> {
    let body = serde_json::to_vec(payload).unwrap();
    let mut frame = (body.len() as u64).to_le_bytes()[..5].to_vec();
    frame.extend_from_slice(&body);
    frame
}

#[test]
fn raw_frame_matches_encoder() {
    let by_hand = raw_frame(&json!({"comando": "cerrar"}));
    let encoded = encode(&shared::Command::Close).unwrap();
    assert_eq!(by_hand, encoded);
}
