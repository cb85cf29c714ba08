//! Small on-disk reference lists the receiver consults on every decode:
//! callsigns to never call, callsigns to never answer, a priority-country
//! table, VIP DXCCs, and a validity source used to reject malformed
//! copies. Grounded on `receiver.py`'s module-level `callsign_exc`,
//! `receiver_exc`, `priority_country`, `vip_dxcc`, and `valid_callsign`
//! loaders, all of which are plain line- or CSV-oriented files reread
//! whenever the operator reports it finished transmitting.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum OperatorFilesError {
    #[snafu(display("failed to read {}: {source}", path.display()))]
    Read { path: PathBuf, source: std::io::Error },
    #[snafu(display("failed to parse {} as CSV: {source}", path.display()))]
    Csv { path: PathBuf, source: csv::Error },
}

fn read_lines(path: &Path) -> Result<Vec<String>, OperatorFilesError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path).context(ReadSnafu { path: path.to_path_buf() })?;
    Ok(text
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .collect())
}

/// Callsigns this operator has decided never to call first, loaded from
/// and appended to as `validate_callsign` turns up new rejections.
#[derive(Debug, Clone, Default)]
pub struct CallsignExceptions {
    path: PathBuf,
    entries: HashSet<String>,
}

impl CallsignExceptions {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, OperatorFilesError> {
        let path = path.into();
        let entries = read_lines(&path)?.into_iter().map(|s| s.to_uppercase()).collect();
        Ok(CallsignExceptions { path, entries })
    }

    pub fn reload(&mut self) -> Result<(), OperatorFilesError> {
        self.entries = read_lines(&self.path)?.into_iter().map(|s| s.to_uppercase()).collect();
        Ok(())
    }

    pub fn contains(&self, callsign: &str) -> bool {
        self.entries.contains(&callsign.to_uppercase())
    }

    /// Appends a newly-rejected callsign to both the in-memory set and the
    /// backing file, so it survives the next reload.
    pub fn add(&mut self, callsign: &str) -> Result<(), OperatorFilesError> {
        let upper = callsign.to_uppercase();
        if self.entries.insert(upper.clone()) {
            use std::io::Write;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .context(ReadSnafu { path: self.path.clone() })?;
            writeln!(file, "{upper}").context(ReadSnafu { path: self.path.clone() })?;
        }
        Ok(())
    }
}

/// Callsigns this operator never replies to even when addressed directly
/// (jammers, known bad actors, accidental loopback of our own signal).
#[derive(Debug, Clone, Default)]
pub struct ReceiverExceptions {
    path: PathBuf,
    entries: HashSet<String>,
}

impl ReceiverExceptions {
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, OperatorFilesError> {
        let path = path.into();
        let entries = read_lines(&path)?.into_iter().map(|s| s.to_uppercase()).collect();
        Ok(ReceiverExceptions { path, entries })
    }

    pub fn reload(&mut self) -> Result<(), OperatorFilesError> {
        self.entries = read_lines(&self.path)?.into_iter().map(|s| s.to_uppercase()).collect();
        Ok(())
    }

    pub fn contains(&self, callsign: &str) -> bool {
        self.entries.contains(&callsign.to_uppercase())
    }
}

/// DXCC entity code to a priority bonus added on top of a candidate's
/// base importance, letting the operator bias toward entities it still
/// needs for an award.
#[derive(Debug, Clone, Default)]
pub struct PriorityCountries {
    bonuses: HashMap<i64, f64>,
}

impl PriorityCountries {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OperatorFilesError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(PriorityCountries::default());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .context(CsvSnafu { path: path.to_path_buf() })?;
        let mut bonuses = HashMap::new();
        for record in reader.records() {
            let record = record.context(CsvSnafu { path: path.to_path_buf() })?;
            if let (Some(dxcc), Some(bonus)) = (record.get(0), record.get(1)) {
                if let (Ok(dxcc), Ok(bonus)) = (dxcc.trim().parse(), bonus.trim().parse()) {
                    bonuses.insert(dxcc, bonus);
                }
            }
        }
        Ok(PriorityCountries { bonuses })
    }

    pub fn bonus(&self, dxcc: i64) -> f64 {
        self.bonuses.get(&dxcc).copied().unwrap_or(0.0)
    }
}

/// DXCC entities flagged as always worth working regardless of whether
/// the callsign itself is new.
#[derive(Debug, Clone, Default)]
pub struct VipDxcc {
    entries: HashSet<i64>,
}

impl VipDxcc {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OperatorFilesError> {
        let entries = read_lines(path.as_ref())?
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        Ok(VipDxcc { entries })
    }

    pub fn contains(&self, dxcc: i64) -> bool {
        self.entries.contains(&dxcc)
    }
}

/// DXCC entities this operator refuses to work regardless of how any
/// other `filter_cq` check comes out. Grounded on `receiver.py`'s
/// module-level `DXCC_EXCEPTION` set.
#[derive(Debug, Clone, Default)]
pub struct DxccException {
    entries: HashSet<i64>,
}

impl DxccException {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OperatorFilesError> {
        let entries = read_lines(path.as_ref())?
            .into_iter()
            .filter_map(|s| s.parse().ok())
            .collect();
        Ok(DxccException { entries })
    }

    pub fn contains(&self, dxcc: i64) -> bool {
        self.entries.contains(&dxcc)
    }
}

/// The full set of known-valid callsigns, used to reject decodes that are
/// plausible-looking noise rather than a real station.
#[derive(Debug, Clone, Default)]
pub struct ValidCallsigns {
    entries: HashSet<String>,
}

impl ValidCallsigns {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OperatorFilesError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(ValidCallsigns::default());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .context(CsvSnafu { path: path.to_path_buf() })?;
        let mut entries = HashSet::new();
        for record in reader.records() {
            let record = record.context(CsvSnafu { path: path.to_path_buf() })?;
            if let Some(call) = record.get(0) {
                entries.insert(call.trim().to_uppercase());
            }
        }
        Ok(ValidCallsigns { entries })
    }

    pub fn contains(&self, callsign: &str) -> bool {
        self.entries.is_empty() || self.entries.contains(&callsign.to_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_file(contents: &str) -> tempfile_path::TempPath {
        tempfile_path::TempPath::with_contents(contents)
    }

    // Minimal scratch-file helper so these tests don't need the `tempfile`
    // crate just for a couple of throwaway files.
    mod tempfile_path {
        use std::path::{Path, PathBuf};

        pub struct TempPath(PathBuf);

        impl TempPath {
            pub fn with_contents(contents: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("ft8op-test-{}-{:p}", std::process::id(), contents));
                std::fs::write(&path, contents).unwrap();
                TempPath(path)
            }
        }

        impl AsRef<Path> for TempPath {
            fn as_ref(&self) -> &Path {
                &self.0
            }
        }

        impl Drop for TempPath {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.0);
            }
        }
    }

    #[test]
    fn callsign_exceptions_match_case_insensitively() {
        let file = temp_file("k1abc\nW9XYZ\n");
        let exc = CallsignExceptions::load(file.as_ref()).unwrap();
        assert!(exc.contains("K1ABC"));
        assert!(exc.contains("w9xyz"));
        assert!(!exc.contains("N0AAA"));
    }

    #[test]
    fn callsign_exceptions_add_persists_to_file() {
        let file = temp_file("K1ABC\n");
        let mut exc = CallsignExceptions::load(file.as_ref()).unwrap();
        exc.add("W9XYZ").unwrap();
        assert!(exc.contains("W9XYZ"));

        let reloaded = CallsignExceptions::load(file.as_ref()).unwrap();
        assert!(reloaded.contains("W9XYZ"));
    }

    #[test]
    fn priority_countries_parse_csv_pairs() {
        let file = temp_file("291,1.5\n339,0.5\n");
        let table = PriorityCountries::load(file.as_ref()).unwrap();
        assert_eq!(table.bonus(291), 1.5);
        assert_eq!(table.bonus(999), 0.0);
    }

    #[test]
    fn valid_callsigns_empty_file_allows_everything() {
        let table = ValidCallsigns::load(Path::new("/nonexistent-path-for-test")).unwrap();
        assert!(table.contains("K1ABC"));
    }
}
