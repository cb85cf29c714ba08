//! Runtime configuration: radio-host connection details, shared-state and
//! document-store URLs, and the tunables the receiver/transmitter loops
//! read out of `states.py`'s configurable-params section
//! (`num_inactive_before_cut`, `max_tries`, `sort_by`, `min_db`, ...).
//!
//! Layered the way the teacher's own binaries are invoked: environment
//! variables (optionally loaded from a `.env` file) provide defaults,
//! `clap` flags override them for one-off runs.

use std::path::PathBuf;

use clap::Parser;
use serde::Deserialize;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
pub enum ConfigError {
    #[snafu(display("failed to load .env file: {source}"))]
    DotEnv { source: dotenvy::Error },
    #[snafu(display("failed to build configuration: {source}"))]
    Build { source: config::ConfigError },
    #[snafu(display("failed to deserialize configuration: {source}"))]
    Deserialize { source: config::ConfigError },
    #[snafu(display("{message}"))]
    Invalid { message: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// UDP port this process listens on for the radio host's datagrams.
    pub listen_port: u16,
    pub multicast_group: Option<String>,

    pub redis_url: String,
    pub mongo_url: String,
    pub mongo_database: String,
    pub qrz_username: String,

    pub min_db: i64,
    pub new_grid: bool,
    pub new_dxcc: bool,
    pub grid_higher_than_cq: bool,
    pub num_inactive_before_cut: i64,
    pub num_inactive_before_cut_vip: Option<i64>,
    pub num_tries_call_busy: i64,
    pub num_tries_call_busy_vip: Option<i64>,
    pub num_disable_transmit: i64,
    pub max_tries: i64,
    pub max_tries_vip: Option<i64>,
    pub max_tries_change_freq: Option<i64>,
    pub expired_time: f64,
    pub release_from_spam_time: f64,

    pub work_on_unconfirmed_qso: bool,
    pub num_days_log: Option<i64>,
    /// Local ADIF log file ingested once at startup. The logbook HTTP
    /// fetch this mirrors in the original is not reproduced; this path is
    /// the one ingest entry point this operator drives itself.
    pub log_file_path: Option<PathBuf>,

    pub callsign_exceptions_path: PathBuf,
    pub receiver_exceptions_path: PathBuf,
    pub priority_countries_path: PathBuf,
    pub vip_dxcc_path: PathBuf,
    pub valid_callsigns_path: PathBuf,
    pub dxcc_exception_path: PathBuf,
}

impl Config {
    /// Checks the cross-field constraints spec.md lists: the cutoffs must
    /// form a sane escalation ladder and the per-row spam ceiling is
    /// always a multiple of `max_tries`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_tries <= 0 {
            return Err(ConfigError::Invalid { message: "max_tries must be positive".to_string() });
        }
        if self.num_inactive_before_cut <= 0 {
            return Err(ConfigError::Invalid {
                message: "num_inactive_before_cut must be positive".to_string(),
            });
        }
        if let Some(change_freq) = self.max_tries_change_freq {
            if change_freq <= 0 {
                return Err(ConfigError::Invalid {
                    message: "max_tries_change_freq must be positive when set".to_string(),
                });
            }
        }
        if let Some(days) = self.num_days_log {
            if days <= 0 {
                return Err(ConfigError::Invalid { message: "num_days_log must be positive when set".to_string() });
            }
        }
        if self.expired_time <= 0.0 {
            return Err(ConfigError::Invalid { message: "expired_time must be positive".to_string() });
        }
        if self.release_from_spam_time <= 0.0 {
            return Err(ConfigError::Invalid { message: "release_from_spam_time must be positive".to_string() });
        }
        Ok(())
    }

    pub fn max_transmit_count(&self) -> i64 {
        2 * self.max_tries
    }
}

/// CLI overrides layered on top of environment-sourced configuration.
/// Every field is optional so an unset flag falls through to `FT8OP_*`
/// or the `.env` file.
#[derive(Debug, Parser)]
#[command(name = "ft8op", about = "Automated FT8/FT4 operator")]
pub struct Cli {
    #[arg(long, env = "FT8OP_LISTEN_PORT")]
    pub listen_port: Option<u16>,

    #[arg(long, env = "FT8OP_MULTICAST_GROUP")]
    pub multicast_group: Option<String>,

    #[arg(long, env = "FT8OP_REDIS_URL")]
    pub redis_url: Option<String>,

    #[arg(long, env = "FT8OP_MONGO_URL")]
    pub mongo_url: Option<String>,

    #[arg(long, env = "FT8OP_MONGO_DATABASE")]
    pub mongo_database: Option<String>,

    #[arg(long, env = "FT8OP_QRZ_USERNAME")]
    pub qrz_username: Option<String>,

    #[arg(long, env = "FT8OP_ENV_FILE")]
    pub env_file: Option<PathBuf>,
}

/// Loads `.env` (if present, or at the path given by `--env-file`), then
/// layers `FT8OP_*` environment variables over built-in defaults.
pub fn load(cli: &Cli) -> Result<Config, ConfigError> {
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path).context(DotEnvSnafu)?;
        }
        None => {
            // Missing .env in the working directory is fine; only a
            // malformed one is an error.
            match dotenvy::dotenv() {
                Ok(_) | Err(dotenvy::Error::Io(_)) => {}
                Err(e) => return Err(ConfigError::DotEnv { source: e }),
            }
        }
    }

    let builder = config::Config::builder()
        .set_default("listen_port", 2237)?
        .set_default("multicast_group", None::<String>)?
        .set_default("redis_url", "redis://127.0.0.1/")?
        .set_default("mongo_url", "mongodb://127.0.0.1:27017")?
        .set_default("mongo_database", "ft8op")?
        .set_default("qrz_username", "operator")?
        .set_default("min_db", -24)?
        .set_default("new_grid", true)?
        .set_default("new_dxcc", true)?
        .set_default("grid_higher_than_cq", false)?
        .set_default("num_inactive_before_cut", 3)?
        .set_default("num_inactive_before_cut_vip", None::<i64>)?
        .set_default("num_tries_call_busy", 2)?
        .set_default("num_tries_call_busy_vip", None::<i64>)?
        .set_default("num_disable_transmit", 10)?
        .set_default("max_tries", 3)?
        .set_default("max_tries_vip", None::<i64>)?
        .set_default("max_tries_change_freq", None::<i64>)?
        .set_default("expired_time", 3600.0)?
        .set_default("release_from_spam_time", 1800.0)?
        .set_default("work_on_unconfirmed_qso", false)?
        .set_default("num_days_log", None::<i64>)?
        .set_default("log_file_path", None::<String>)?
        .set_default("callsign_exceptions_path", "callsign_exceptions.txt")?
        .set_default("receiver_exceptions_path", "receiver_exceptions.txt")?
        .set_default("priority_countries_path", "priority_countries.csv")?
        .set_default("vip_dxcc_path", "vip_dxcc.txt")?
        .set_default("valid_callsigns_path", "valid_callsigns.csv")?
        .set_default("dxcc_exception_path", "dxcc_exception.txt")?
        .add_source(config::Environment::with_prefix("FT8OP").try_parsing(true));

    let built = builder.build().context(BuildSnafu)?;
    let mut parsed: Config = built.try_deserialize().context(DeserializeSnafu)?;

    if let Some(port) = cli.listen_port {
        parsed.listen_port = port;
    }
    if cli.multicast_group.is_some() {
        parsed.multicast_group = cli.multicast_group.clone();
    }
    if let Some(url) = &cli.redis_url {
        parsed.redis_url = url.clone();
    }
    if let Some(url) = &cli.mongo_url {
        parsed.mongo_url = url.clone();
    }
    if let Some(db) = &cli.mongo_database {
        parsed.mongo_database = db.clone();
    }
    if let Some(user) = &cli.qrz_username {
        parsed.qrz_username = user.clone();
    }

    parsed.validate()?;
    Ok(parsed)
}

impl From<config::ConfigError> for ConfigError {
    fn from(source: config::ConfigError) -> Self {
        ConfigError::Build { source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        Config {
            listen_port: 2237,
            multicast_group: None,
            redis_url: "redis://127.0.0.1/".to_string(),
            mongo_url: "mongodb://127.0.0.1:27017".to_string(),
            mongo_database: "ft8op".to_string(),
            qrz_username: "operator".to_string(),
            min_db: -24,
            new_grid: true,
            new_dxcc: true,
            grid_higher_than_cq: false,
            num_inactive_before_cut: 3,
            num_inactive_before_cut_vip: None,
            num_tries_call_busy: 2,
            num_tries_call_busy_vip: None,
            num_disable_transmit: 10,
            max_tries: 3,
            max_tries_vip: None,
            max_tries_change_freq: None,
            expired_time: 3600.0,
            release_from_spam_time: 1800.0,
            work_on_unconfirmed_qso: false,
            num_days_log: None,
            log_file_path: None,
            callsign_exceptions_path: "callsign_exceptions.txt".into(),
            receiver_exceptions_path: "receiver_exceptions.txt".into(),
            priority_countries_path: "priority_countries.csv".into(),
            vip_dxcc_path: "vip_dxcc.txt".into(),
            valid_callsigns_path: "valid_callsigns.csv".into(),
            dxcc_exception_path: "dxcc_exception.txt".into(),
        }
    }

    #[test]
    fn max_transmit_count_is_double_max_tries() {
        assert_eq!(sample_config().max_transmit_count(), 6);
    }

    #[test]
    fn rejects_zero_max_tries() {
        let mut cfg = sample_config();
        cfg.max_tries = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn accepts_default_configuration() {
        assert!(sample_config().validate().is_ok());
    }
}
