//! Classifies a decoded FT8/FT4 text payload into one of five message
//! shapes (`CQ`, `R73`, `GRID`, `SNR`, `RSNR`) using the same cascading
//! regex match WSJT-X-adjacent tooling uses: try each pattern in a fixed
//! order and take the first match.

use lazy_static::lazy_static;
use regex::Regex;
use snafu::Snafu;

use crate::model::{Callsign, CandidateType};

const CALL_CORE: &str = r"\d?[A-Z]{1,2}\d(?:[A-Z]{1,4}|\d{3}|\d{1,3}[A-Z])[A-Z]{0,5}";

fn callsign_pattern() -> String {
    format!(
        r"(?P<callsign>(?P<prefixed_callsign>(?:(?P<prefix>[A-Z0-9]{{1,4}})/)?(?:{core}))(?:/(?P<suffix>[A-Z0-9]{{1,4}}))?(?:/(?P<suffix2>[A-Z0-9]{{1,4}}))?(?:(?P<suffix3>-\d{{1,3}}))?",
        core = CALL_CORE
    )
}

fn receiver_pattern() -> String {
    format!(
        r"(?P<to>(?P<prefixed_to>(?:(?P<prefix_to>[A-Z0-9]{{1,4}})/)?(?:(?:{core})|\.\.\.))(?:/(?P<suffix_to>[A-Z0-9]{{1,4}}))?(?:/(?P<suffix2_to>[A-Z0-9]{{1,4}}))?(?:(?P<suffix3_to>-\d{{1,3}}))?)",
        core = CALL_CORE
    )
}

lazy_static! {
    static ref CQ_RE: Regex = Regex::new(&format!(
        r"^<?CQ>?(?: <?(?P<extra>.*)>?)? <?{call}>?(?: <?(?P<grid>[A-Z]{{2}}[0-9]{{2}})>?)?$",
        call = callsign_pattern()
    ))
    .unwrap();
    static ref R73_RE: Regex = Regex::new(&format!(
        r"^<?{to}>? <?{call}>? (?P<r73>RRR|R*73)$",
        to = receiver_pattern(),
        call = callsign_pattern()
    ))
    .unwrap();
    static ref GRID_RE: Regex = Regex::new(&format!(
        r"^<?{to}>? <?{call}>? <?(?P<grid>[A-Z]{{2}}[0-9]{{2}})>?$",
        to = receiver_pattern(),
        call = callsign_pattern()
    ))
    .unwrap();
    static ref SNR_RE: Regex = Regex::new(&format!(
        r"^<?{to}>? <?{call}>? (?P<snr>0|[-+]\d+)$",
        to = receiver_pattern(),
        call = callsign_pattern()
    ))
    .unwrap();
    static ref RSNR_RE: Regex = Regex::new(&format!(
        r"^<?{to}>? <?{call}>? R(?P<snr>0|[-+]\d+)$",
        to = receiver_pattern(),
        call = callsign_pattern()
    ))
    .unwrap();
}

#[derive(Debug, Snafu)]
pub enum ParseError {
    #[snafu(display("message '{message}' did not match any known pattern"))]
    NoMatch { message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedMessage {
    pub candidate_type: CandidateType,
    pub callsign: Callsign,
    /// Absent only for `CQ` (a CQ has no addressee).
    pub to: Option<Callsign>,
    pub extra: Option<String>,
    pub grid: Option<String>,
    pub snr: Option<i32>,
    pub r73_token: Option<String>,
}

impl ParsedMessage {
    /// `true` when this message is directed at `my_callsign`.
    pub fn addressed_to(&self, my_callsign: &str) -> bool {
        self.to.as_ref().map(|c| c.full == my_callsign).unwrap_or(false)
    }
}

fn callsign_from_captures(caps: &regex::Captures, suffix: &str) -> Callsign {
    let group = |name: &str| -> Option<String> {
        caps.name(&format!("{name}{suffix}")).map(|m| m.as_str().to_string())
    };
    let full = caps.name(&format!("callsign{suffix}")).or_else(|| caps.name(&format!("to{suffix}")))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    Callsign {
        full,
        prefix: group("prefix"),
        base: group("prefixed_callsign").unwrap_or_default(),
        suffix: group("suffix"),
    }
}

/// Parses the free-text payload of a `Decode`/`EnqueueDecode` packet.
pub fn parse(message: &str) -> Result<ParsedMessage, ParseError> {
    let trimmed = message.trim();

    if let Some(caps) = CQ_RE.captures(trimmed) {
        return Ok(ParsedMessage {
            candidate_type: CandidateType::Cq,
            callsign: callsign_from_captures(&caps, ""),
            to: None,
            extra: caps.name("extra").map(|m| m.as_str().to_string()),
            grid: caps.name("grid").map(|m| m.as_str().to_string()),
            snr: None,
            r73_token: None,
        });
    }

    if let Some(caps) = R73_RE.captures(trimmed) {
        return Ok(ParsedMessage {
            candidate_type: CandidateType::R73,
            callsign: callsign_from_captures(&caps, ""),
            to: Some(callsign_from_captures(&caps, "_to")),
            extra: None,
            grid: None,
            snr: None,
            r73_token: caps.name("r73").map(|m| m.as_str().to_string()),
        });
    }

    if let Some(caps) = GRID_RE.captures(trimmed) {
        return Ok(ParsedMessage {
            candidate_type: CandidateType::Grid,
            callsign: callsign_from_captures(&caps, ""),
            to: Some(callsign_from_captures(&caps, "_to")),
            extra: None,
            grid: caps.name("grid").map(|m| m.as_str().to_string()),
            snr: None,
            r73_token: None,
        });
    }

    if let Some(caps) = SNR_RE.captures(trimmed) {
        return Ok(ParsedMessage {
            candidate_type: CandidateType::Snr,
            callsign: callsign_from_captures(&caps, ""),
            to: Some(callsign_from_captures(&caps, "_to")),
            extra: None,
            grid: None,
            snr: caps.name("snr").and_then(|m| m.as_str().parse().ok()),
            r73_token: None,
        });
    }

    if let Some(caps) = RSNR_RE.captures(trimmed) {
        return Ok(ParsedMessage {
            candidate_type: CandidateType::Rsnr,
            callsign: callsign_from_captures(&caps, ""),
            to: Some(callsign_from_captures(&caps, "_to")),
            extra: None,
            grid: None,
            snr: caps.name("snr").and_then(|m| m.as_str().parse().ok()),
            r73_token: None,
        });
    }

    Err(ParseError::NoMatch { message: message.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_cq() {
        let msg = parse("CQ K1ABC FN42").unwrap();
        assert_eq!(msg.candidate_type, CandidateType::Cq);
        assert_eq!(msg.callsign.full, "K1ABC");
        assert_eq!(msg.grid.as_deref(), Some("FN42"));
    }

    #[test]
    fn parses_directed_cq_with_extra() {
        let msg = parse("CQ DX K1ABC FN42").unwrap();
        assert_eq!(msg.candidate_type, CandidateType::Cq);
        assert_eq!(msg.extra.as_deref(), Some("DX"));
    }

    #[test]
    fn parses_grid_reply() {
        let msg = parse("K1ABC W9XYZ EM10").unwrap();
        assert_eq!(msg.candidate_type, CandidateType::Grid);
        assert_eq!(msg.to.unwrap().full, "K1ABC");
        assert_eq!(msg.callsign.full, "W9XYZ");
        assert_eq!(msg.grid.as_deref(), Some("EM10"));
    }

    #[test]
    fn parses_snr_report() {
        let msg = parse("K1ABC W9XYZ -12").unwrap();
        assert_eq!(msg.candidate_type, CandidateType::Snr);
        assert_eq!(msg.snr, Some(-12));
    }

    #[test]
    fn parses_rsnr_report() {
        let msg = parse("K1ABC W9XYZ R-12").unwrap();
        assert_eq!(msg.candidate_type, CandidateType::Rsnr);
        assert_eq!(msg.snr, Some(-12));
    }

    #[test]
    fn parses_r73() {
        let msg = parse("K1ABC W9XYZ RR73").unwrap();
        assert_eq!(msg.candidate_type, CandidateType::R73);
        assert_eq!(msg.r73_token.as_deref(), Some("RR73"));
    }

    #[test]
    fn snr_wins_tie_break_over_rsnr_when_no_r_prefix() {
        let msg = parse("K1ABC W9XYZ -01").unwrap();
        assert_eq!(msg.candidate_type, CandidateType::Snr);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("not a valid ft8 message at all").is_err());
    }

    #[test]
    fn addressed_to_checks_my_callsign() {
        let msg = parse("K1ABC W9XYZ -12").unwrap();
        assert!(msg.addressed_to("K1ABC"));
        assert!(!msg.addressed_to("W9XYZ"));
    }
}
