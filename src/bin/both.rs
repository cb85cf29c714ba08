//! Runs the receiver and transmitter as two supervised tasks in one
//! process, sharing the same KV and document stores. The two halves are
//! independent Python scripts in the original; here they're tokio tasks
//! coordinating through the same crash-durable shared state instead of
//! two OS processes and a socket each.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use ft8op::config::{self, Cli};
use ft8op::geo::{CachedGeoLookup, PrefixTableLookup};
use ft8op::model::Mode;
use ft8op::operator_files::{CallsignExceptions, DxccException, PriorityCountries, ReceiverExceptions, ValidCallsigns, VipDxcc};
use ft8op::receiver::Receiver;
use ft8op::state::{RedisStateStore, SharedState};
use ft8op::store::{CandidateStore, MongoCandidateStore};
use ft8op::transmitter::Transmitter;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
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

    let socket = Arc::new(
        UdpSocket::bind(("0.0.0.0", cfg.listen_port))
            .await
            .map_err(|source| ft8op::error::AppError::Io { source })?,
    );

    let shutdown = CancellationToken::new();

    let receiver_task = {
        let state = state.clone();
        let store = store.clone();
        let socket = socket.clone();
        let shutdown = shutdown.clone();
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

        let min_db = cfg.min_db;
        let new_grid = cfg.new_grid;
        let new_dxcc = cfg.new_dxcc;
        let grid_higher_than_cq = cfg.grid_higher_than_cq;
        let num_inactive_before_cut = cfg.num_inactive_before_cut;
        let num_tries_call_busy = cfg.num_tries_call_busy;
        let num_tries_call_busy_vip = cfg.num_tries_call_busy_vip;
        let num_inactive_before_cut_vip = cfg.num_inactive_before_cut_vip;
        let max_tries = cfg.max_tries;
        let max_tries_vip = cfg.max_tries_vip;
        let max_transmit_count = cfg.max_transmit_count();
        let num_disable_transmit = cfg.num_disable_transmit;
        let expired_time = cfg.expired_time;
        let release_from_spam_time = cfg.release_from_spam_time;

        tokio::spawn(async move {
            let mut receiver = Receiver {
                state,
                store,
                geo,
                callsign_exceptions,
                receiver_exceptions,
                priority_countries,
                vip_dxcc,
                valid_callsigns,
                dxcc_exception,
                my_callsign,
                min_db,
                new_grid,
                new_dxcc,
                grid_higher_than_cq,
                num_inactive_before_cut,
                num_tries_call_busy,
                num_tries_call_busy_vip,
                num_inactive_before_cut_vip,
                max_tries,
                max_tries_vip,
                max_transmit_count,
                num_disable_transmit,
                expired_time,
                release_from_spam_time,
            };
            let mut buf = [0u8; 4096];
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = socket.recv_from(&mut buf) => {
                        let (len, peer) = match received {
                            Ok(v) => v,
                            Err(e) => { error!(error = %e, "udp recv failed"); continue; }
                        };
                        match receiver.process_datagram(&buf[..len]).await {
                            Ok(outcome) => {
                                for packet in outcome.outbound {
                                    let _ = socket.send_to(&packet.encode(), peer).await;
                                }
                                if outcome.should_close {
                                    shutdown.cancel();
                                    break;
                                }
                            }
                            Err(e) => warn!(error = %e, %peer, "failed to decode datagram"),
                        }
                    }
                }
            }
        })
    };

    let transmitter_task = {
        let state = state.clone();
        let store = store.clone();
        let shutdown = shutdown.clone();

        tokio::spawn(async move {
            while !state.receiver_started().await.unwrap_or(false) && !shutdown.is_cancelled() {
                tokio::time::sleep(Duration::from_millis(500)).await;
            }

            let transmit_socket = match UdpSocket::bind(("0.0.0.0", 0)).await {
                Ok(s) => s,
                Err(e) => {
                    error!(error = %e, "failed to bind transmitter socket");
                    return;
                }
            };
            let transmitter = Transmitter { state: state.clone(), store, initial_frequency: 1500 };

            loop {
                if shutdown.is_cancelled() || state.closed().await.unwrap_or(false) {
                    break;
                }

                let mode = Mode::from_str(&state.mode().await.unwrap_or_default()).unwrap_or(Mode::Ft8);
                let (_full, half) = mode.timing();
                tokio::time::sleep(Duration::from_secs_f64(half)).await;

                let host_addr = format!("{}:{}", state.ip().await.unwrap_or_default(), state.port().await.unwrap_or(0));
                let outcome = transmitter.transmitting().await;
                for packet in outcome.outbound {
                    if let Err(e) = transmit_socket.send_to(&packet.encode(), &host_addr).await {
                        warn!(error = %e, "failed to send outbound packet");
                    }
                }
            }
        })
    };

    state.set_receiver_started(true).await?;
    info!(port = cfg.listen_port, "receiver+transmitter listening");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down on ctrl-c");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }

    let _ = tokio::join!(receiver_task, transmitter_task);
    Ok(())
}
