//! Entry point for the receiver half: classifies inbound WSJT-X decodes
//! and maintains the candidate queue the transmitter binary polls.

use std::sync::Arc;

use clap::Parser;
use ft8op::config::{self, Cli};
use ft8op::geo::{CachedGeoLookup, PrefixTableLookup};
use ft8op::operator_files::{CallsignExceptions, DxccException, PriorityCountries, ReceiverExceptions, ValidCallsigns, VipDxcc};
use ft8op::receiver::Receiver;
use ft8op::state::{RedisStateStore, SharedState};
use ft8op::store::{CandidateStore, MongoCandidateStore};
use tokio::net::UdpSocket;
use tracing::{error, info, warn};

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

    let geo = Arc::new(CachedGeoLookup::new(PrefixTableLookup::new(Default::default()), 4096));

    let callsign_exceptions = CallsignExceptions::load(&cfg.callsign_exceptions_path)?;
    let receiver_exceptions = ReceiverExceptions::load(&cfg.receiver_exceptions_path)?;
    let priority_countries = PriorityCountries::load(&cfg.priority_countries_path)?;
    let vip_dxcc = VipDxcc::load(&cfg.vip_dxcc_path)?;
    let valid_callsigns = ValidCallsigns::load(&cfg.valid_callsigns_path)?;
    let dxcc_exception = DxccException::load(&cfg.dxcc_exception_path)?;

    let my_callsign = state.my_callsign().await?;

    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs_f64();
    let _ = store.release_stale_log_script(now - 15.0 * 60.0).await;
    if let Some(path) = &cfg.log_file_path {
        match std::fs::read_to_string(path) {
            Ok(adif) => match ft8op::log_ingest::ingest_log(store.as_ref(), geo.as_ref(), &adif, cfg.work_on_unconfirmed_qso, now).await {
                Ok(count) => info!(count, "ingested log file at startup"),
                Err(e) => warn!(error = %e, "failed to parse log file"),
            },
            Err(e) => warn!(error = %e, path = %path.display(), "failed to read log file"),
        }
    }

    let mut receiver = Receiver {
        state: state.clone(),
        store,
        geo,
        callsign_exceptions,
        receiver_exceptions,
        priority_countries,
        vip_dxcc,
        valid_callsigns,
        dxcc_exception,
        my_callsign,
        min_db: cfg.min_db,
        new_grid: cfg.new_grid,
        new_dxcc: cfg.new_dxcc,
        grid_higher_than_cq: cfg.grid_higher_than_cq,
        num_inactive_before_cut: cfg.num_inactive_before_cut,
        num_tries_call_busy: cfg.num_tries_call_busy,
        num_tries_call_busy_vip: cfg.num_tries_call_busy_vip,
        num_inactive_before_cut_vip: cfg.num_inactive_before_cut_vip,
        max_tries: cfg.max_tries,
        max_tries_vip: cfg.max_tries_vip,
        max_transmit_count: cfg.max_transmit_count(),
        num_disable_transmit: cfg.num_disable_transmit,
        expired_time: cfg.expired_time,
        release_from_spam_time: cfg.release_from_spam_time,
    };

    let socket = UdpSocket::bind(("0.0.0.0", cfg.listen_port))
        .await
        .map_err(|source| ft8op::error::AppError::Io { source })?;
    if let Some(group) = &cfg.multicast_group {
        if let Ok(addr) = group.parse() {
            let _ = socket.join_multicast_v4(addr, std::net::Ipv4Addr::UNSPECIFIED);
        } else {
            warn!(%group, "ignoring unparseable multicast group");
        }
    }

    state.set_receiver_started(true).await?;
    info!(port = cfg.listen_port, "receiver listening");

    let mut buf = [0u8; 4096];
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down on ctrl-c");
                break;
            }
            received = socket.recv_from(&mut buf) => {
                let (len, peer) = match received {
                    Ok(v) => v,
                    Err(e) => {
                        error!(error = %e, "udp recv failed");
                        continue;
                    }
                };
                match receiver.process_datagram(&buf[..len]).await {
                    Ok(outcome) => {
                        for packet in outcome.outbound {
                            let _ = socket.send_to(&packet.encode(), peer).await;
                        }
                        if outcome.should_close {
                            info!("host requested close");
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, %peer, "failed to decode datagram"),
                }
            }
        }
    }

    Ok(())
}
