use clap::Parser;
use client::config::{Endpoint, SessionConfig};
use client::directory::DirectoryClient;
use client::network::Client;
use client::session::SessionState;
use client::ClientError;
use log::{debug, info};
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Game server as host:port; fetched from the directory when omitted
    #[arg(short = 's', long)]
    server: Option<Endpoint>,

    /// Pick a random directory entry instead of the first
    #[arg(short = 'r', long)]
    random: bool,

    /// Print the server directory as JSON and exit
    #[arg(long)]
    list_servers: bool,

    /// Nickname shown in game
    #[arg(short = 'n', long, default_value = "snek")]
    nickname: String,

    /// Skin id
    #[arg(long, default_value = "15")]
    skin: u8,

    /// Protocol version announced at spawn
    #[arg(short = 'p', long, default_value = "11")]
    protocol_version: u16,

    /// Heading in degrees to steer after spawning
    #[arg(long)]
    heading: Option<f32>,

    /// Boost after spawning
    #[arg(short = 'b', long)]
    boost: bool,

    /// Seconds to stay connected, 0 waits for Ctrl+C
    #[arg(short = 'd', long, default_value = "0")]
    duration: u64,
}

async fn pick_server(random: bool) -> Result<Endpoint, ClientError> {
    let directory = DirectoryClient::new()?;
    let servers = directory.fetch_servers().await?;

    let server = if random {
        servers.choose(&mut rand::thread_rng())
    } else {
        servers.first()
    }
    .ok_or(ClientError::EmptyDirectory)?;

    info!("Selected server {} (cluster {})", server, server.cluster_id);
    Endpoint::try_from(server)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    if args.list_servers {
        let servers = DirectoryClient::new()?.fetch_servers().await?;
        println!("{}", serde_json::to_string_pretty(&servers)?);
        return Ok(());
    }

    let endpoint = match args.server {
        Some(endpoint) => endpoint,
        None => pick_server(args.random).await?,
    };

    let mut client = Client::new(SessionConfig {
        endpoint,
        nickname: args.nickname,
        skin_id: args.skin,
        protocol_version: args.protocol_version,
    })?;

    let forwarded = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&forwarded);
    client.on_packet(move |packet| {
        counter.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Gameplay packet '{}' ({} bytes)",
            packet.tag.as_char(),
            packet.payload.len()
        );
    });

    client.connect().await?;

    tokio::select! {
        result = client.wait_for_state(SessionState::Spawned) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted before spawning");
            client.disconnect().await?;
            return Ok(());
        }
    }
    info!("Spawned as {}", client.config().nickname);

    if let Some(heading) = args.heading {
        client.move_to(heading)?;
    }
    if args.boost {
        client.boost(true)?;
    }

    let duration = args.duration;
    let stay = async move {
        if duration > 0 {
            tokio::time::sleep(Duration::from_secs(duration)).await;
        } else {
            let _ = tokio::signal::ctrl_c().await;
        }
    };

    tokio::select! {
        _ = stay => {
            if let Some(latency) = client.latency() {
                info!("Last keep-alive round trip: {:?}", latency);
            }
            client.disconnect().await?;
        }
        result = client.closed() => result?,
    }

    info!(
        "Session over, {} gameplay packets received",
        forwarded.load(Ordering::Relaxed)
    );

    Ok(())
}
