use clap::Parser;
use client::board::Board;
use client::network::CanvasClient;
use log::{info, warn};
use rand::Rng;
use shared::Color;

/// One `x,y,color` paint request from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PaintSpec {
    x: i64,
    y: i64,
    color: Color,
}

fn parse_paint(s: &str) -> Result<PaintSpec, String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [x, y, color] = parts.as_slice() else {
        return Err(format!("expected x,y,#rrggbb but got '{}'", s));
    };
    Ok(PaintSpec {
        x: x.parse().map_err(|e| format!("invalid x '{}': {}", x, e))?,
        y: y.parse().map_err(|e| format!("invalid y '{}': {}", y, e))?,
        color: color.parse()?,
    })
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:8080")]
    server: String,

    /// Pixel to paint as x,y,#rrggbb (repeatable)
    #[arg(short = 'p', long = "paint", value_parser = parse_paint)]
    paints: Vec<PaintSpec>,

    /// Paint this many random pixels with random colors
    #[arg(short = 'r', long, default_value = "0")]
    random: usize,

    /// Keep printing snapshots until the server closes or Ctrl+C
    #[arg(short = 'w', long)]
    watch: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("Connecting to: {}", args.server);
    let mut client = CanvasClient::connect(args.server.as_str()).await?;

    client.join().await?;
    let mut board = match client.next_snapshot().await? {
        Some(grid) => Board::new(grid),
        None => {
            warn!("Server refused the connection");
            return Ok(());
        }
    };
    println!("{}", board.summary());

    let mut requests = args.paints.clone();
    let mut rng = rand::thread_rng();
    for _ in 0..args.random {
        if board.width() == 0 || board.height() == 0 {
            break;
        }
        requests.push(PaintSpec {
            x: rng.gen_range(0..board.width()) as i64,
            y: rng.gen_range(0..board.height()) as i64,
            color: Color::new(rng.gen(), rng.gen(), rng.gen()),
        });
    }

    for request in requests {
        client.paint(request.x, request.y, request.color).await?;
        // Other clients' paints are broadcast too; wait for ours to show up.
        loop {
            match client.next_snapshot().await? {
                Some(grid) => board = Board::new(grid),
                None => return Ok(()),
            }
            if board.shows_paint(request.x, request.y, request.color) {
                break;
            }
        }
        println!(
            "painted ({}, {}) {} -> {}",
            request.x,
            request.y,
            request.color,
            board.summary()
        );
    }

    if args.watch {
        loop {
            tokio::select! {
                snapshot = client.next_snapshot() => match snapshot? {
                    Some(grid) => {
                        board = Board::new(grid);
                        println!("{}", board.summary());
                    }
                    None => return Ok(()),
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, closing");
                    break;
                }
            }
        }
    }

    client.close().await?;
    while client.next_snapshot().await?.is_some() {}
    info!("Disconnected");

    Ok(())
}
