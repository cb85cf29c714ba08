//! Shared data model for candidates, history, and the natural keys that
//! both stores index on.

use serde::{Deserialize, Serialize};

use crate::band::Band;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mode {
    Ft8,
    Ft4,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Ft8 => "FT8",
            Mode::Ft4 => "FT4",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "FT8" => Some(Mode::Ft8),
            "FT4" => Some(Mode::Ft4),
            _ => None,
        }
    }

    /// `(full_period_s, half_period_s)` the slot timing discipline uses.
    pub fn timing(self) -> (f64, f64) {
        match self {
            Mode::Ft8 => (30.0, 15.0),
            Mode::Ft4 => (15.0, 7.5),
        }
    }
}

/// The five cascading text-message categories, in tie-break priority
/// order (`CQ` matches first, `RSNR` last).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CandidateType {
    Cq,
    R73,
    Grid,
    Snr,
    Rsnr,
}

impl CandidateType {
    /// The type a reply to this candidate would advance the exchange to,
    /// when the message is addressed to us. Mirrors `NEXT_TRANSMIT`.
    pub fn next_when_addressed_to_us(self) -> CandidateType {
        match self {
            CandidateType::Grid => CandidateType::Snr,
            CandidateType::Snr => CandidateType::Rsnr,
            CandidateType::Rsnr => CandidateType::R73,
            CandidateType::R73 => CandidateType::R73,
            CandidateType::Cq => CandidateType::Snr,
        }
    }

    /// Relative scheduling importance when the candidate is not addressed
    /// to us (CQ) vs. the escalating tiers once a QSO is under way.
    pub fn base_importance(self) -> f64 {
        match self {
            CandidateType::Cq => 1.0,
            CandidateType::Grid => 1.0,
            CandidateType::Snr => 2.0,
            CandidateType::Rsnr => 3.0,
            CandidateType::R73 => 4.0,
        }
    }
}

/// A parsed callsign, kept whole (prefix/suffix intact) for display and
/// logging, with the base call split out for hashing/validity lookups.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Callsign {
    pub full: String,
    pub prefix: Option<String>,
    pub base: String,
    pub suffix: Option<String>,
}

impl Callsign {
    pub fn plain(call: &str) -> Self {
        Callsign { full: call.to_string(), prefix: None, base: call.to_string(), suffix: None }
    }
}

/// A single candidate QSO partner: one inbound decode on one band/mode,
/// the operator's natural key for the `calls` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub callsign: String,
    pub prefixed_callsign: String,
    pub band: i64,
    pub mode: Mode,
    pub message: String,
    pub candidate_type: CandidateType,
    pub next_tx: CandidateType,
    pub snr: i32,
    pub time_ms: u32,
    pub delta_time: f64,
    pub delta_frequency: u32,
    pub grid: Option<String>,
    pub country: Option<String>,
    pub continent: Option<String>,
    pub dxcc: Option<i64>,
    pub addressed_to_us: bool,
    pub is_new_callsign: bool,
    pub is_new_dxcc: bool,
    pub is_vip_dxcc: bool,
    pub is_valid: bool,
    pub skip_grid: bool,
    pub importance: f64,
    pub tries: i64,
    pub max_transmit_count: i64,
    pub num_inactive_before_cut: i64,
    pub expired: bool,
    pub tried: bool,
    pub is_reemerging: bool,
    pub is_spam: bool,
    pub is_even: bool,
    pub timestamp: f64,
}

impl Candidate {
    pub fn band_tag(&self) -> Band {
        Band::from_meters(self.band)
    }
}

/// The `message` collection: last-seen state per callsign even after its
/// candidate row is consumed, so a returning CQ can skip re-resolving
/// geolocation/grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageHistory {
    pub callsign: String,
    pub band: i64,
    pub mode: Mode,
    pub grid: Option<String>,
    pub country: Option<String>,
    pub continent: Option<String>,
    pub dxcc: Option<i64>,
    pub is_valid: bool,
    pub is_new_callsign: bool,
    pub is_new_dxcc: bool,
}

/// The `grid` collection: last grid square heard from a callsign,
/// independent of band/mode, used when a later exchange omits the grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridHint {
    pub callsign: String,
    pub grid: String,
}

/// The `black_<username>` collection: QSOs this operator no longer needs
/// to work, whether logged by a real confirmation or by this script's own
/// R73 completion path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlacklistEntry {
    pub callsign: String,
    pub band: i64,
    pub mode: Mode,
    pub confirmed: bool,
    pub log_script: bool,
    pub from_script: bool,
    pub timestamp: f64,
    pub grid: Option<String>,
    pub country: Option<String>,
    pub continent: Option<String>,
    pub dxcc: Option<i64>,
    pub state: Option<String>,
    pub county: Option<String>,
    pub qso_id: Option<String>,
}
