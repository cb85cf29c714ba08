//! Entry point for the transmitter half: polls the candidate queue once
//! per slot half and replies to the best match.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ft8op::config::{self, Cli};
use ft8op::model::Mode;
use ft8op::state::{RedisStateStore, SharedState};
use ft8op::store::MongoCandidateStore;
use ft8op::transmitter::Transmitter;
use tokio::net::UdpSocket;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> ft8op::AppResult<()> {
    ft8op::tracing_init::init_tracing();

    let cli = Cli::parse();
    let cfg = config::load(&cli)?;

    let state = Arc::new(SharedState::new(Box::new(RedisStateStore::connect(&cfg.redis_url).await?)));

    let mongo_client = mongodb::Client::with_uri_str(&cfg.mongo_url)
        .await
        .map_err(|e| ft8op::error::AppError::Io { source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()) })?;
    let db = mongo_client.database(&cfg.mongo_database);
    let blacklist_collection = format!("black_{}", cfg.qrz_username);
    let store = Arc::new(MongoCandidateStore::new(&db, &blacklist_collection));

    while !state.receiver_started().await.unwrap_or(false) {
        tokio::time::sleep(Duration::from_millis(500)).await;
    }

    let socket = UdpSocket::bind(("0.0.0.0", 0)).await.map_err(|source| ft8op::error::AppError::Io { source })?;
    let host_addr = format!("{}:{}", state.ip().await?, state.port().await?);

    let transmitter = Transmitter { state: state.clone(), store, initial_frequency: 1500 };

    info!("transmitter started, waiting for slot boundaries");

    loop {
        if state.closed().await.unwrap_or(false) {
            info!("host closed, exiting");
            break;
        }

        let mode = Mode::from_str(&state.mode().await.unwrap_or_default()).unwrap_or(Mode::Ft8);
        let (_full, half) = mode.timing();
        sleep_until_half_slot_boundary(half).await;

        let outcome = transmitter.transmitting().await;
        for packet in outcome.outbound {
            if let Err(e) = socket.send_to(&packet.encode(), &host_addr).await {
                warn!(error = %e, "failed to send outbound packet");
            }
        }
    }

    Ok(())
}

/// Sleeps until just before the next half-slot boundary so the reply is
/// issued close to WSJT-X's own transmit window.
async fn sleep_until_half_slot_boundary(half_period_s: f64) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64();
    let into_period = now % half_period_s;
    let remaining = (half_period_s - into_period).max(0.05);
    tokio::time::sleep(Duration::from_secs_f64(remaining)).await;
}
