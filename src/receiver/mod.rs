//! The receiver loop: classifies every inbound WSJT-X packet, maintains
//! the candidate queue the transmitter polls, and recognizes when a QSO
//! has completed so it can log it and retire the row.
//!
//! Grounded on `receiver.py`'s `process_wsjt` dispatch.

mod cutoffs;
mod guards;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, info, warn};

use crate::adif::read_from_string;
use crate::geo::{GeoLookup, LookupOutcome};
use crate::model::{BlacklistEntry, Candidate, CandidateType, GridHint, MessageHistory, Mode};
use crate::operator_files::{CallsignExceptions, DxccException, PriorityCountries, ReceiverExceptions, ValidCallsigns, VipDxcc};
use crate::state::SharedState;
use crate::store::{CandidateKey, CandidateStore};
use crate::textmsg::{self, ParsedMessage};
use crate::wire::{InboundPacket, OutboundPacket};

pub use cutoffs::SlotCutoffs;

fn now_unix() -> f64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs_f64()
}

/// Everything the receiver needs to act on one datagram: the shared KV
/// store, the document store, geolocation, and the small reference files
/// it consults on every decode.
pub struct Receiver<S: CandidateStore, G: GeoLookup> {
    pub state: Arc<SharedState>,
    pub store: Arc<S>,
    pub geo: Arc<G>,
    pub callsign_exceptions: CallsignExceptions,
    pub receiver_exceptions: ReceiverExceptions,
    pub priority_countries: PriorityCountries,
    pub vip_dxcc: VipDxcc,
    pub valid_callsigns: ValidCallsigns,
    pub dxcc_exception: DxccException,
    pub my_callsign: String,
    pub min_db: i64,
    pub new_grid: bool,
    pub new_dxcc: bool,
    pub grid_higher_than_cq: bool,
    pub num_inactive_before_cut: i64,
    pub num_tries_call_busy: i64,
    pub num_tries_call_busy_vip: Option<i64>,
    pub num_inactive_before_cut_vip: Option<i64>,
    pub max_tries: i64,
    pub max_tries_vip: Option<i64>,
    pub max_transmit_count: i64,
    pub num_disable_transmit: i64,
    pub expired_time: f64,
    pub release_from_spam_time: f64,
}

/// Outcome of processing one datagram: outbound packets to send, if any.
#[derive(Debug, Default)]
pub struct ProcessOutcome {
    pub outbound: Vec<OutboundPacket>,
    pub should_close: bool,
}

impl<S: CandidateStore, G: GeoLookup> Receiver<S, G> {
    pub async fn process_datagram(&mut self, datagram: &[u8]) -> Result<ProcessOutcome, crate::wire::WireError> {
        let packet = InboundPacket::decode(datagram)?;
        Ok(self.process_packet(packet).await)
    }

    async fn process_packet(&mut self, packet: InboundPacket) -> ProcessOutcome {
        match packet {
            InboundPacket::Heartbeat { .. } => {
                let _ = self.state.set_closed(false).await;
                let _ = self.callsign_exceptions.reload();
                let _ = self.receiver_exceptions.reload();
                ProcessOutcome::default()
            }
            InboundPacket::Status {
                frequency, mode, dx_call, transmitting, tx_enabled, decoding, rx_df, tx_df, tx_even, last_tx_msg, ..
            } => self.handle_status(frequency, mode, dx_call, transmitting, tx_enabled, decoding, rx_df, tx_df, tx_even, last_tx_msg).await,
            InboundPacket::Decode { .. } => {
                // Field extraction is done in `handle_decode`; the match
                // arm exists to keep the dispatch exhaustive and legible.
                self.dispatch_decode(packet).await
            }
            InboundPacket::QsoLogged { .. } => ProcessOutcome::default(),
            InboundPacket::LoggedAdif { adif, .. } => match adif {
                Some(adif) => self.handle_logged_adif(&adif).await,
                None => ProcessOutcome::default(),
            },
            InboundPacket::Close { .. } => ProcessOutcome { outbound: Vec::new(), should_close: true },
            InboundPacket::Clear { .. } | InboundPacket::Dropped(_) => ProcessOutcome::default(),
        }
    }

    /// `Status` updates connection parameters and, on the done-transmitting
    /// edge, runs the cutoff sweep, resets the per-parity frequency lists,
    /// and fires the R73-completion/blacklist path. A band or mode change
    /// drops every candidate and history row for the prior (band, mode),
    /// since they no longer describe who is reachable.
    #[allow(clippy::too_many_arguments)]
    async fn handle_status(
        &mut self,
        frequency: u64,
        mode: Option<String>,
        dx_call: Option<String>,
        transmitting: bool,
        tx_enabled: bool,
        decoding: bool,
        rx_df: u32,
        tx_df: u32,
        tx_even: bool,
        last_tx_msg: Option<String>,
    ) -> ProcessOutcome {
        let new_band = crate::band::Band::from_frequency_hz(frequency).meters();
        let old_band = self.state.band().await.unwrap_or(0);
        let old_mode = Mode::from_str(&self.state.mode().await.unwrap_or_default());

        if let Some(mode) = &mode {
            let _ = self.state.set_mode(mode).await;
        }
        let _ = self.state.set_band(new_band).await;

        let new_mode = mode.as_deref().and_then(Mode::from_str).or(old_mode);
        let band_changed = old_band != 0 && old_band != new_band;
        let mode_changed = old_mode.is_some() && old_mode != new_mode;
        if (band_changed || mode_changed) && old_mode.is_some() {
            let _ = self.store.clear_band_mode(old_band, old_mode.unwrap()).await;
        }

        if let Some(dx) = dx_call {
            let _ = self.state.set_dx_callsign(&dx).await;
        }
        let _ = self.state.set_tx_enabled(tx_enabled).await;
        let _ = self.state.set_decoding(decoding).await;
        let _ = self.state.set_rxdf(rx_df as i64).await;
        let _ = self.state.set_txdf(tx_df as i64).await;
        let _ = self.state.set_tx_even(tx_even).await;
        let _ = self.state.set_closed(false).await;

        let was_transmitting = self.state.transmitting().await.unwrap_or(false);
        let _ = self.state.set_transmitting(transmitting).await;
        let done_transmitting = was_transmitting && !transmitting;
        let starting_transmission = !was_transmitting && transmitting;

        if starting_transmission {
            self.on_starting_transmission(new_band, new_mode.unwrap_or(Mode::Ft8), last_tx_msg).await;
        }

        let outbound = if done_transmitting { self.on_done_transmitting().await } else { Vec::new() };

        info!(mode = ?mode, transmitting, band_changed, mode_changed, "status update");
        ProcessOutcome { outbound, should_close: false }
    }

    /// Fires on the rising edge of `transmitting`: updates `current_callsign`
    /// from the sent text's addressee, advances the attempt counters (reset
    /// to 1 on a new (type, addressee), otherwise incremented), and applies
    /// the three retirement cutoffs to the candidate being addressed.
    async fn on_starting_transmission(&mut self, band: i64, mode: Mode, last_tx_msg: Option<String>) {
        let Some(sent_text) = last_tx_msg else { return };
        let Ok(parsed) = textmsg::parse(&sent_text) else { return };
        let Some(addressee) = &parsed.to else { return };

        let _ = self.state.set_current_callsign(&addressee.full).await;

        let previous_sent = self.state.last_tx().await.unwrap_or_default();
        let same_exchange = textmsg::parse(&previous_sent)
            .ok()
            .map(|prev| prev.candidate_type == parsed.candidate_type && prev.to.as_ref().map(|t| &t.full) == Some(&addressee.full))
            .unwrap_or(false);

        let tries = if same_exchange { self.state.tries().await.unwrap_or(0) + 1 } else { 1 };
        let inactive_count = if same_exchange { self.state.inactive_count().await.unwrap_or(0) + 1 } else { 1 };
        let transmit_counter = if same_exchange { self.state.transmit_counter().await.unwrap_or(0) + 1 } else { 1 };
        let _ = self.state.set_tries(tries).await;
        let _ = self.state.set_inactive_count(inactive_count).await;
        let _ = self.state.set_transmit_counter(transmit_counter).await;
        let _ = self.state.set_last_tx(&sent_text).await;

        let key = CandidateKey { callsign: addressee.full.clone(), band, mode };
        let Ok(Some(mut candidate)) = self.store.take_candidate(&key).await else { return };

        let effective_max_tries = if candidate.is_vip_dxcc { self.max_tries_vip.unwrap_or(self.max_tries) } else { self.max_tries };
        let tries_threshold = if candidate.tries > 0 { candidate.tries } else { effective_max_tries };
        let transmit_threshold = if candidate.max_transmit_count > 0 { candidate.max_transmit_count } else { 2 * effective_max_tries };

        if tries >= tries_threshold {
            candidate.tried = true;
            let _ = self.state.set_tries(0).await;
            let _ = self.state.set_inactive_count(0).await;
        } else if candidate.num_inactive_before_cut > 0 && inactive_count > candidate.num_inactive_before_cut {
            candidate.expired = true;
            let _ = self.state.set_tries(0).await;
            let _ = self.state.set_inactive_count(0).await;
            let _ = self.state.set_transmit_counter(0).await;
        } else if transmit_counter >= transmit_threshold {
            candidate.tried = true;
            candidate.is_spam = true;
            let _ = self.state.set_tries(0).await;
            let _ = self.state.set_inactive_count(0).await;
            let _ = self.state.set_transmit_counter(0).await;
        }

        let _ = self.store.upsert_candidate(&key, candidate).await;
    }

    /// Fires once per transmit cycle, on the falling edge of `transmitting`.
    /// Sweeps expired/spam-release cutoffs, resets the frequency lists to
    /// the full band, and logs a just-completed R73 exchange.
    async fn on_done_transmitting(&mut self) -> Vec<OutboundPacket> {
        let band = self.state.band().await.unwrap_or(0);
        let mode = Mode::from_str(&self.state.mode().await.unwrap_or_default()).unwrap_or(Mode::Ft8);
        let now = now_unix();
        let (_full, half) = mode.timing();

        let expired_before = now - self.expired_time + half + 2.0;
        let release_spam_before = now - self.release_from_spam_time + half + 2.0;
        let _ = self.store.apply_cutoffs(band, mode, expired_before, release_spam_before).await;

        let _ = self.state.set_even_frequencies(&[crate::transmitter::MIN_FREQUENCY, crate::transmitter::MAX_FREQUENCY]).await;
        let _ = self.state.set_odd_frequencies(&[crate::transmitter::MIN_FREQUENCY, crate::transmitter::MAX_FREQUENCY]).await;
        let _ = self.callsign_exceptions.reload();
        let _ = self.receiver_exceptions.reload();

        let mut outbound = self.complete_r73_exchange(band, mode, now).await;

        if self.num_disable_transmit > 0 {
            let counter = (self.state.enable_transmit_counter().await.unwrap_or(0) + 1) % self.num_disable_transmit;
            let _ = self.state.set_enable_transmit_counter(counter).await;
            if counter == 0 {
                outbound.push(OutboundPacket::disable_transmit());
            }
        }
        outbound.push(OutboundPacket::enable_monitoring());
        outbound
    }

    /// When the last sent message was an R73 and the exchange just closed,
    /// log the QSO with the host and upsert the inferred blacklist entry.
    async fn complete_r73_exchange(&mut self, band: i64, mode: Mode, now: f64) -> Vec<OutboundPacket> {
        let current_callsign = self.state.current_callsign().await.unwrap_or_default();
        if current_callsign.is_empty() {
            return Vec::new();
        }
        let key = CandidateKey { callsign: current_callsign.clone(), band, mode };
        let Ok(Some(candidate)) = self.store.take_candidate(&key).await else { return Vec::new() };

        if candidate.next_tx != CandidateType::R73 {
            let _ = self.store.upsert_candidate(&key, candidate).await;
            return Vec::new();
        }

        if self.store.blacklist_entry(&candidate.callsign, band, mode).await.ok().flatten().is_some() {
            return Vec::new();
        }

        let entry = BlacklistEntry {
            callsign: candidate.callsign.clone(),
            band,
            mode,
            confirmed: true,
            log_script: true,
            from_script: true,
            timestamp: now,
            grid: candidate.grid.clone(),
            country: candidate.country.clone(),
            continent: candidate.continent.clone(),
            dxcc: candidate.dxcc,
            state: None,
            county: None,
            qso_id: None,
        };
        let _ = self.store.upsert_blacklist_entry(entry).await;
        vec![OutboundPacket::log_qso()]
    }

    async fn dispatch_decode(&mut self, packet: InboundPacket) -> ProcessOutcome {
        let (time_ms, snr, delta_time, delta_frequency, message, is_new) = match packet {
            InboundPacket::Decode { time_ms, snr, delta_time, delta_frequency, message, new, .. } => {
                (time_ms, snr, delta_time, delta_frequency, message, new)
            }
            _ => return ProcessOutcome::default(),
        };
        if !is_new {
            return ProcessOutcome::default();
        }
        let Some(message) = message else { return ProcessOutcome::default() };

        let parsed = match textmsg::parse(&message) {
            Ok(p) => p,
            Err(_) => {
                debug!(%message, "no cascade pattern matched, dropping");
                return ProcessOutcome::default();
            }
        };

        let band = self.state.band().await.unwrap_or(0);
        let mode = Mode::from_str(&self.state.mode().await.unwrap_or_default()).unwrap_or(Mode::Ft8);
        let key = CandidateKey { callsign: parsed.callsign.full.clone(), band, mode };

        let previous = self.store.take_candidate(&key).await.ok().flatten();

        if let Some(outcome) = guards::reemerging_or_spam(&parsed, previous.as_ref(), self.my_callsign.as_str()) {
            if let Some(candidate) = outcome.reinsert {
                let _ = self.store.upsert_candidate(&key, candidate).await;
            }
            return ProcessOutcome::default();
        }

        let addressed_to_us = parsed.addressed_to(&self.my_callsign);
        // A CQ has no addressee; an R73 overheard between two other
        // stations means that station is now free, so it is queued the
        // same way a fresh CQ would be.
        let treat_as_cq = parsed.candidate_type == CandidateType::Cq
            || (parsed.candidate_type == CandidateType::R73 && !addressed_to_us);

        let geo = match self.geo.lookup(&parsed.callsign.full).await {
            LookupOutcome::Ok(info) => Some(info),
            LookupOutcome::NotFound => None,
            LookupOutcome::Transient(reason) => {
                warn!(reason = %reason, callsign = %parsed.callsign.full, "geolocation lookup failed transiently");
                None
            }
        };

        if treat_as_cq {
            if !self.filter_cq(&parsed, snr, &geo, &previous).await {
                return ProcessOutcome::default();
            }
        } else if !addressed_to_us {
            // Overhearing someone else's exchange: only worth queuing as a
            // busy-call fallback if we are configured to chase busy
            // stations and this isn't one we've promised never to bother.
            if self.num_tries_call_busy <= 0 || self.receiver_exceptions.contains(&parsed.to.as_ref().map(|t| t.full.as_str()).unwrap_or_default()) {
                return ProcessOutcome::default();
            }
            if !self.filter_cq(&parsed, snr, &geo, &previous).await {
                return ProcessOutcome::default();
            }
        } else if !self.valid_callsigns.contains(&parsed.callsign.full) {
            return ProcessOutcome::default();
        }

        let candidate = self
            .build_candidate(&parsed, &message, time_ms, snr, delta_time, delta_frequency, &geo, addressed_to_us, treat_as_cq, &previous)
            .await;

        let _ = self.store.upsert_history(MessageHistory {
            callsign: candidate.callsign.clone(),
            band,
            mode,
            grid: candidate.grid.clone(),
            country: candidate.country.clone(),
            continent: candidate.continent.clone(),
            dxcc: candidate.dxcc,
            is_valid: candidate.is_valid,
            is_new_callsign: candidate.is_new_callsign,
            is_new_dxcc: candidate.is_new_dxcc,
        }).await;

        if parsed.candidate_type == CandidateType::Cq {
            if let Some(grid) = &parsed.grid {
                let _ = self.store.upsert_grid_hint(GridHint { callsign: candidate.callsign.clone(), grid: grid.clone() }).await;
            }
        }

        let _ = self.store.upsert_candidate(&key, candidate).await;
        ProcessOutcome::default()
    }

    #[allow(clippy::too_many_arguments)]
    async fn build_candidate(
        &self,
        parsed: &ParsedMessage,
        message: &str,
        time_ms: u32,
        snr: i32,
        delta_time: f64,
        delta_frequency: u32,
        geo: &Option<crate::geo::GeoInfo>,
        addressed_to_us: bool,
        treat_as_cq: bool,
        previous: &Option<Candidate>,
    ) -> Candidate {
        let band = self.state.band().await.unwrap_or(0);
        let mode = Mode::from_str(&self.state.mode().await.unwrap_or_default()).unwrap_or(Mode::Ft8);
        let (full, half) = mode.timing();
        let slot_seconds = (time_ms as f64 / 1000.0) % full;
        let is_even = slot_seconds < half;

        let dxcc = geo.as_ref().map(|g| g.dxcc);
        let is_new_dxcc = dxcc.map(|d| !self.is_known_dxcc(d, previous)).unwrap_or(false);
        let is_vip_dxcc = dxcc.map(|d| self.vip_dxcc.contains(d)).unwrap_or(false);
        let bonus = dxcc.map(|d| self.priority_countries.bonus(d)).unwrap_or(0.0);

        let next_tx = if addressed_to_us {
            parsed.candidate_type.next_when_addressed_to_us()
        } else {
            parsed.candidate_type
        };

        // Importance reflects how urgent a reply to *this* message is: a
        // fresh CQ (or someone else's completed R73) always starts at the
        // base tier; a message addressed to us escalates with the
        // exchange; one addressed to someone else we might still chase is
        // worth less unless grids are explicitly weighted above CQs.
        let importance = if treat_as_cq {
            CandidateType::Cq.base_importance() + bonus
        } else if addressed_to_us {
            parsed.candidate_type.base_importance() + bonus
        } else if self.grid_higher_than_cq && parsed.candidate_type == CandidateType::Grid {
            1.5 + bonus
        } else {
            1.0 + bonus
        };

        // Preserve a spam flag carried over from the same exchange as long
        // as the predicted next transmission hasn't changed; a new
        // direction in the conversation deserves a fresh chance.
        let is_spam = previous.as_ref().map(|p| p.is_spam && p.next_tx == next_tx).unwrap_or(false);

        let tries = if !treat_as_cq && !addressed_to_us {
            self.num_tries_call_busy_vip.filter(|_| is_vip_dxcc).unwrap_or(self.num_tries_call_busy)
        } else {
            0
        };

        let num_inactive_before_cut =
            if is_vip_dxcc { self.num_inactive_before_cut_vip.unwrap_or(self.num_inactive_before_cut) } else { self.num_inactive_before_cut };

        Candidate {
            callsign: parsed.callsign.full.clone(),
            prefixed_callsign: parsed.callsign.base.clone(),
            band,
            mode,
            message: message.to_string(),
            candidate_type: parsed.candidate_type,
            next_tx,
            snr,
            time_ms,
            delta_time,
            delta_frequency,
            grid: parsed.grid.clone().or_else(|| geo.as_ref().and_then(|g| g.grid.clone())),
            country: geo.as_ref().map(|g| g.country.clone()),
            continent: geo.as_ref().map(|g| g.continent.clone()),
            dxcc,
            addressed_to_us,
            is_new_callsign: previous.is_none(),
            is_new_dxcc,
            is_vip_dxcc,
            is_valid: true,
            skip_grid: true,
            importance,
            tries,
            max_transmit_count: self.max_transmit_count,
            num_inactive_before_cut,
            expired: false,
            tried: false,
            is_reemerging: false,
            is_spam,
            is_even,
            timestamp: now_unix(),
        }
    }

    fn is_known_dxcc(&self, _dxcc: i64, previous: &Option<Candidate>) -> bool {
        previous.as_ref().and_then(|c| c.dxcc).is_some()
    }

    /// Decides whether a CQ (or an overheard, now-free station) is worth
    /// adding to the queue: a signal strong enough to work, not on the
    /// callsign-exception list or the DXCC-exception list, not barred by
    /// the message's own `extra` directive, and either a brand-new
    /// callsign or a new grid/DXCC we still need. When the validity source
    /// rejects the callsign outright it is appended to the exception file
    /// so future decodes of the same noise short-circuit immediately.
    async fn filter_cq(&mut self, parsed: &ParsedMessage, snr: i32, geo: &Option<crate::geo::GeoInfo>, previous: &Option<Candidate>) -> bool {
        if (snr as i64) < self.min_db {
            return false;
        }
        if self.callsign_exceptions.contains(&parsed.callsign.full) {
            return false;
        }
        if !self.valid_callsigns.contains(&parsed.callsign.full) {
            let _ = self.callsign_exceptions.add(&parsed.callsign.full);
            return false;
        }

        let dxcc = geo.as_ref().map(|g| g.dxcc);
        if let Some(d) = dxcc {
            if self.dxcc_exception.contains(d) {
                return false;
            }
        }

        // `extra` carries a CQ's directional qualifier (`DX`, `POTA`, an
        // intended continent, ...). A station calling only its own
        // continent (anything but `OC`) or specifically excluding
        // Indonesia from a DX call isn't calling us.
        if let Some(extra) = &parsed.extra {
            let country = geo.as_ref().map(|g| g.country.as_str()).unwrap_or("");
            if (extra == "DX" && country == "Indonesia") || extra != "OC" {
                return false;
            }
        }

        let is_new_callsign = previous.is_none();
        let is_new_dxcc = dxcc.map(|d| !self.is_known_dxcc(d, previous)).unwrap_or(false);
        let wants_new_grid = self.new_grid && parsed.grid.is_some();

        is_new_callsign || (is_new_dxcc && self.new_dxcc) || wants_new_grid
    }

    /// Reconciles the host's authoritative "logged ADIF" event against
    /// our own R73-inferred blacklist row: only the first record in the
    /// payload is meaningful here (the host sends one per logged QSO),
    /// and only its `QSOID` is adopted — the rest of the row stays as our
    /// own inference recorded it.
    async fn handle_logged_adif(&mut self, adif: &str) -> ProcessOutcome {
        let records = match read_from_string(adif) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "failed to parse ADIF payload");
                return ProcessOutcome::default();
            }
        };

        let Some(record) = records.into_iter().next() else { return ProcessOutcome::default() };
        let Some(callsign) = record.callsign() else { return ProcessOutcome::default() };
        let Some(qso_id) = record.qso_id_from_dates() else { return ProcessOutcome::default() };

        let band = self.state.band().await.unwrap_or(0);
        let mode = Mode::from_str(&self.state.mode().await.unwrap_or_default()).unwrap_or(Mode::Ft8);

        if let Ok(Some(mut entry)) = self.store.blacklist_entry(callsign, band, mode).await {
            if entry.log_script {
                entry.qso_id = Some(qso_id);
                let _ = self.store.upsert_blacklist_entry(entry).await;
            }
        }
        ProcessOutcome::default()
    }
}
