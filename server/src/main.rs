use clap::Parser;
use log::{error, info};
use server::config::ServerConfig;
use server::network::Server;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Canvas width in pixels
    #[arg(short = 'W', long, default_value_t = shared::CANVAS_WIDTH)]
    width: usize,

    /// Canvas height in pixels (no short flag to avoid conflict with --help)
    #[arg(long, default_value_t = shared::CANVAS_HEIGHT)]
    height: usize,

    /// Maximum number of concurrent clients
    #[arg(short, long, default_value = "32")]
    max_clients: usize,

    /// Largest accepted message payload in bytes
    #[arg(long, default_value_t = shared::DEFAULT_MAX_FRAME_LEN)]
    max_frame_len: usize,

    /// Snapshots that may wait for one client before it is dropped
    #[arg(short, long, default_value = "64")]
    queue_capacity: usize,
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            width: args.width,
            height: args.height,
            max_clients: args.max_clients,
            max_frame_len: args.max_frame_len,
            queue_capacity: args.queue_capacity,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let config = ServerConfig::from(args);

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(e) => {
            error!("Failed to start server: {}", e);
            return Err(e.into());
        }
    };

    tokio::select! {
        _ = server.run() => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Received Ctrl+C, shutting down");
        }
    }

    Ok(())
}
