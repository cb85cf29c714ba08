//! ADIF log ingest: parses the tag-length-value records WSJT-X (and full
//! logbook exports) send in `LoggedAdif`/bulk-import payloads, and decides
//! which QSOs count as confirmed.
//!
//! Grounded on `adif_parser.py`'s `read_from_string`/`is_confirmed`.

use std::collections::HashMap;

use snafu::Snafu;

#[derive(Debug, Snafu)]
pub enum AdifError {
    #[snafu(display("truncated ADIF tag at byte {offset}"))]
    Truncated { offset: usize },
    #[snafu(display("ADIF tag at byte {offset} has a non-numeric length"))]
    BadLength { offset: usize },
}

/// One parsed QSO record: field name (upper-cased) to raw value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AdifRecord {
    pub fields: HashMap<String, String>,
}

impl AdifRecord {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields.get(&name.to_uppercase()).map(|s| s.as_str())
    }

    /// A QSO counts as confirmed if the logging app already marked it so,
    /// or if both directions of an LoTW QSL have cleared.
    pub fn is_confirmed(&self) -> bool {
        let qrz_status = self.get("APP_QRZLOG_STATUS").unwrap_or("C");
        if qrz_status == "C" {
            return true;
        }
        self.get("LOTW_QSL_SENT") == Some("Y") && self.get("LOTW_QSL_RCVD") == Some("Y")
    }

    pub fn callsign(&self) -> Option<&str> {
        self.get("CALL")
    }

    pub fn band(&self) -> Option<&str> {
        self.get("BAND")
    }

    pub fn mode(&self) -> Option<&str> {
        self.get("MODE")
    }

    pub fn grid(&self) -> Option<&str> {
        self.get("GRIDSQUARE")
    }

    pub fn qso_id(&self) -> Option<&str> {
        self.get("APP_QRZLOG_LOGID").or_else(|| self.get("QSO_ID"))
    }

    /// `BAND` as a meters integer (`"20m"` -> `20`). Grounded on
    /// `adif_parser.py`'s `string_band_to_number` fallback, narrowed to
    /// the meter bands this store's natural key represents.
    pub fn band_meters(&self) -> Option<i64> {
        let raw = self.band()?;
        let trimmed = raw.strip_suffix(['m', 'M'])?;
        trimmed.parse::<f64>().ok().map(|v| v.round() as i64)
    }

    /// The composed QSOID `{QSO_DATE}{TIME_ON[:4]}-{QSO_DATE_OFF}{TIME_OFF[:4]}`,
    /// as both `adif_parser.py`'s bulk import and `receiver.py`'s
    /// `WSADIF` reconciliation build it.
    pub fn qso_id_from_dates(&self) -> Option<String> {
        let qso_date = self.get("QSO_DATE")?;
        let time_on = self.get("TIME_ON")?;
        let qso_date_off = self.get("QSO_DATE_OFF").unwrap_or(qso_date);
        let time_off = self.get("TIME_OFF").unwrap_or(time_on);
        let time_on4 = &time_on[..time_on.len().min(4)];
        let time_off4 = &time_off[..time_off.len().min(4)];
        Some(format!("{qso_date}{time_on4}-{qso_date_off}{time_off4}"))
    }

    /// UTC epoch seconds for `{QSO_DATE_OFF}{TIME_OFF[:4]}`, as
    /// `adif_parser.py`'s `datetime.strptime(..., '%Y%m%d%H%M%z')` computes.
    pub fn logged_timestamp(&self) -> Option<f64> {
        let qso_date_off = self.get("QSO_DATE_OFF")?;
        let time_off = self.get("TIME_OFF")?;
        let time_off4 = &time_off[..time_off.len().min(4)];
        let combined = format!("{qso_date_off}{time_off4}");
        chrono::NaiveDateTime::parse_from_str(&combined, "%Y%m%d%H%M")
            .ok()
            .map(|dt| dt.and_utc().timestamp() as f64)
    }
}

/// Parses a full ADIF payload (an optional header up to `<eoh>`, then zero
/// or more `<eor>`-terminated records).
pub fn read_from_string(adif: &str) -> Result<Vec<AdifRecord>, AdifError> {
    let bytes = adif.as_bytes();
    let body_start = skip_header(bytes);

    let mut records = Vec::new();
    let mut record = AdifRecord::default();
    let mut pos = body_start;

    while pos < bytes.len() {
        match bytes[pos] {
            b'<' => {
                let (tag_end, name, len, type_char) = parse_tag(bytes, pos)?;
                if name.eq_ignore_ascii_case("eor") {
                    records.push(std::mem::take(&mut record));
                    pos = tag_end;
                    continue;
                }
                if name.eq_ignore_ascii_case("eoh") {
                    pos = tag_end;
                    continue;
                }
                let value_start = tag_end;
                let value_end = (value_start + len).min(bytes.len());
                let value = decode_value(bytes, value_start, value_end);
                if !matches!(type_char, Some('\0')) {
                    record.fields.insert(name.to_uppercase(), value);
                }
                pos = value_end;
            }
            _ => pos += 1,
        }
    }

    Ok(records)
}

fn skip_header(bytes: &[u8]) -> usize {
    let lowered = bytes.to_ascii_lowercase();
    match find_subslice(&lowered, b"<eoh>") {
        Some(idx) => idx + 5,
        None => 0,
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Parses one `<NAME:LEN[:TYPE]>` tag starting at `pos`. Returns
/// `(end_of_tag, name, len, type_char)`.
fn parse_tag(bytes: &[u8], pos: usize) -> Result<(usize, String, usize, Option<char>), AdifError> {
    let close = bytes[pos..]
        .iter()
        .position(|&b| b == b'>')
        .map(|i| pos + i)
        .ok_or(AdifError::Truncated { offset: pos })?;
    let inner = std::str::from_utf8(&bytes[pos + 1..close]).unwrap_or("");
    let mut parts = inner.split(':');
    let name = parts.next().unwrap_or("").to_string();
    let len = match parts.next() {
        Some(s) => s.trim().parse().map_err(|_| AdifError::BadLength { offset: pos })?,
        None => 0,
    };
    let type_char = parts.next().and_then(|s| s.chars().next());
    Ok((close + 1, name, len, type_char))
}

/// Decodes `bytes[start..end]` as UTF-8. Falls back to decoding the rest
/// of the buffer and truncating to the declared byte length when the
/// exact slice boundary lands inside a multi-byte character.
fn decode_value(bytes: &[u8], start: usize, end: usize) -> String {
    match std::str::from_utf8(&bytes[start..end]) {
        Ok(s) => s.to_string(),
        Err(_) => {
            let rest = String::from_utf8_lossy(&bytes[start..]);
            rest.chars().take(end - start).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_record() {
        let adif = "<call:5>K1ABC<band:3>20m<mode:3>FT8<eor>";
        let records = read_from_string(adif).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].callsign(), Some("K1ABC"));
        assert_eq!(records[0].band(), Some("20m"));
    }

    #[test]
    fn header_is_skipped() {
        let adif = "some header text<eoh><call:5>K1ABC<eor>";
        let records = read_from_string(adif).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].callsign(), Some("K1ABC"));
    }

    #[test]
    fn multiple_records_parse_independently() {
        let adif = "<call:5>K1ABC<eor><call:5>W9XYZ<eor>";
        let records = read_from_string(adif).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].callsign(), Some("W9XYZ"));
    }

    #[test]
    fn confirmed_by_default_qrz_status() {
        let record = read_from_string("<call:5>K1ABC<eor>").unwrap().remove(0);
        assert!(record.is_confirmed());
    }

    #[test]
    fn confirmed_requires_both_lotw_directions() {
        let record = read_from_string(
            "<call:5>K1ABC<app_qrzlog_status:1>N<lotw_qsl_sent:1>Y<lotw_qsl_rcvd:1>N<eor>",
        )
        .unwrap()
        .remove(0);
        assert!(!record.is_confirmed());
    }

    #[test]
    fn band_meters_strips_trailing_m() {
        let record = read_from_string("<call:5>K1ABC<band:3>20m<eor>").unwrap().remove(0);
        assert_eq!(record.band_meters(), Some(20));
    }

    #[test]
    fn qso_id_from_dates_composes_date_and_four_digit_times() {
        let adif = "<call:5>K1ABC<qso_date:8>20240101<time_on:6>120000\
<qso_date_off:8>20240101<time_off:6>120130<eor>";
        let record = read_from_string(adif).unwrap().remove(0);
        assert_eq!(record.qso_id_from_dates().as_deref(), Some("202401011200-202401011201"));
    }

    #[test]
    fn logged_timestamp_parses_qso_date_off_and_time_off() {
        let adif = "<call:5>K1ABC<qso_date_off:8>20240101<time_off:4>1200<eor>";
        let record = read_from_string(adif).unwrap().remove(0);
        assert!(record.logged_timestamp().is_some());
    }

    #[test]
    fn confirmed_when_lotw_clears_both_ways() {
        let record = read_from_string(
            "<call:5>K1ABC<app_qrzlog_status:1>N<lotw_qsl_sent:1>Y<lotw_qsl_rcvd:1>Y<eor>",
        )
        .unwrap()
        .remove(0);
        assert!(record.is_confirmed());
    }
}
