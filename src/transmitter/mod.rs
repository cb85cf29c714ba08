//! The transmitter loop: picks one candidate per slot half, decides
//! whether to hold frequency or move, and replies.
//!
//! Grounded on `transmitter.py`'s `replying`/`transmitting`/`init`.

use std::sync::Arc;

use tracing::info;

use crate::model::{Candidate, Mode};
use crate::state::SharedState;
use crate::store::CandidateStore;
use crate::wire::OutboundPacket;

/// WSJT-X's audio passband bounds, in Hz offset from the dial frequency.
/// Both frequency lists reset to exactly these two values whenever a
/// transmission finishes, so the next best-frequency search always has
/// the full span to work with.
pub const MIN_FREQUENCY: i64 = 300;
pub const MAX_FREQUENCY: i64 = 2900;

pub struct Transmitter<S: CandidateStore> {
    pub state: Arc<SharedState>,
    pub store: Arc<S>,
    pub initial_frequency: i64,
}

/// What the transmitter decided to do this slot half.
#[derive(Debug, Default)]
pub struct TransmitOutcome {
    pub outbound: Vec<OutboundPacket>,
}

impl<S: CandidateStore> Transmitter<S> {
    /// Widest-gap midpoint over a sorted, deduplicated frequency list —
    /// picks a frequency unlikely to collide with another station already
    /// using the band.
    pub fn calculate_best_frequency(frequencies: &[i64]) -> i64 {
        let mut sorted: Vec<i64> = frequencies.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() < 2 {
            return (MIN_FREQUENCY + MAX_FREQUENCY) / 2;
        }
        let mut best_gap = 0;
        let mut best_mid = (MIN_FREQUENCY + MAX_FREQUENCY) / 2;
        for pair in sorted.windows(2) {
            let gap = pair[1] - pair[0];
            if gap > best_gap {
                best_gap = gap;
                best_mid = (pair[0] + pair[1]) / 2;
            }
        }
        best_mid
    }

    /// Picks the midpoint closest to `initial_frequency`, reverting back
    /// toward where we started a QSO rather than drifting across the band
    /// with every reply.
    pub fn calculate_best_close_frequency(frequencies: &[i64], initial_frequency: i64) -> i64 {
        let mut sorted: Vec<i64> = frequencies.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if sorted.len() < 2 {
            return if (initial_frequency - MIN_FREQUENCY).abs() <= (initial_frequency - MAX_FREQUENCY).abs() {
                MIN_FREQUENCY
            } else {
                MAX_FREQUENCY
            };
        }
        sorted
            .windows(2)
            .map(|pair| (pair[0] + pair[1]) / 2)
            .min_by_key(|mid| (mid - initial_frequency).abs())
            .unwrap_or(initial_frequency)
    }

    /// Decides whether this reply needs a freshly chosen frequency or can
    /// keep using the last one: mirrors the `max_tries_change_freq` /
    /// `last_tx_type == nextTx` / callsign-change logic in `transmitter.py`.
    fn should_renew_frequency(
        &self,
        candidate: &Candidate,
        tries: i64,
        max_tries_change_freq: Option<i64>,
        last_tx_type: Option<crate::model::CandidateType>,
        current_callsign: &str,
    ) -> bool {
        if let Some(change_freq) = max_tries_change_freq {
            return change_freq > 0 && tries % change_freq == 0;
        }
        if current_callsign != candidate.callsign {
            return true;
        }
        last_tx_type != Some(candidate.next_tx)
    }

    /// One iteration of the post-transmit-phase poll: find the best
    /// candidate for the current band/mode/parity and reply to it.
    pub async fn transmitting(&self) -> TransmitOutcome {
        let transmit_phase = self.state.transmit_phase().await.unwrap_or(false);
        if transmit_phase {
            let _ = self.state.set_transmit_phase(false).await;
            return TransmitOutcome { outbound: vec![OutboundPacket::enable_monitoring()] };
        }

        let band = self.state.band().await.unwrap_or(0);
        let mode = Mode::from_str(&self.state.mode().await.unwrap_or_default()).unwrap_or(Mode::Ft8);
        let tx_even = self.state.tx_even().await.unwrap_or(true);

        let Ok(Some(candidate)) = self.store.best_candidate(band, mode, Some(tx_even)).await else {
            return TransmitOutcome::default();
        };

        self.replying(&candidate).await
    }

    /// Selects a frequency for `candidate` and issues the reply.
    async fn replying(&self, candidate: &Candidate) -> TransmitOutcome {
        let tries = self.state.tries().await.unwrap_or(0);
        let max_tries_change_freq = {
            let raw = self.state.max_tries_change_freq().await.unwrap_or(0);
            if raw > 0 { Some(raw) } else { None }
        };
        let last_tx = self.state.last_tx().await.unwrap_or_default();
        let last_tx_type = crate::textmsg::parse(&last_tx).ok().map(|p| p.candidate_type);
        let current_callsign = self.state.current_callsign().await.unwrap_or_default();

        let renew = self.should_renew_frequency(candidate, tries, max_tries_change_freq, last_tx_type, &current_callsign);

        let frequencies = if candidate.is_even {
            self.state.even_frequencies().await.unwrap_or_default()
        } else {
            self.state.odd_frequencies().await.unwrap_or_default()
        };

        let best_frequency = if renew {
            Self::calculate_best_frequency(&frequencies)
        } else {
            Self::calculate_best_close_frequency(&frequencies, self.initial_frequency)
        };

        let _ = self.state.set_current_callsign(&candidate.callsign).await;
        let _ = self.state.set_transmit_phase(true).await;

        info!(callsign = %candidate.callsign, frequency = best_frequency, "replying to candidate");

        let mut outbound = Vec::new();

        let tx_even = self.state.tx_even().await.unwrap_or(true);
        if tx_even == candidate.is_even {
            outbound.push(OutboundPacket::change_transmit_sequence(!candidate.is_even));
        }

        if !self.state.tx_enabled().await.unwrap_or(false) {
            outbound.push(OutboundPacket::enable_transmit());
        }

        outbound.push(OutboundPacket::Reply {
            time_ms: candidate.time_ms,
            snr: candidate.snr,
            delta_time: candidate.delta_time,
            delta_frequency: candidate.delta_frequency,
            mode: candidate.mode.as_str().to_string(),
            message: candidate.message.clone(),
        });

        outbound.push(OutboundPacket::change_frequency(best_frequency.max(0) as u32));

        TransmitOutcome { outbound }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widest_gap_picks_open_space() {
        let freqs = [MIN_FREQUENCY, 1000, 1050, MAX_FREQUENCY];
        let best = Transmitter::<crate::store::InMemoryCandidateStore>::calculate_best_frequency(&freqs);
        assert_eq!(best, (1050 + MAX_FREQUENCY) / 2);
    }

    #[test]
    fn close_frequency_prefers_midpoint_near_initial() {
        let freqs = [MIN_FREQUENCY, 1500, MAX_FREQUENCY];
        let best = Transmitter::<crate::store::InMemoryCandidateStore>::calculate_best_close_frequency(&freqs, 1600);
        let expected_low = (MIN_FREQUENCY + 1500) / 2;
        let expected_high = (1500 + MAX_FREQUENCY) / 2;
        assert!(best == expected_low || best == expected_high);
        assert!((best - 1600).abs() <= (expected_low - 1600).abs().max((expected_high - 1600).abs()));
    }

    #[test]
    fn single_frequency_falls_back_to_band_midpoint() {
        let best = Transmitter::<crate::store::InMemoryCandidateStore>::calculate_best_frequency(&[1500]);
        assert_eq!(best, (MIN_FREQUENCY + MAX_FREQUENCY) / 2);
    }
}
