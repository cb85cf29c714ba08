//! Top-level error type. Each subsystem owns a `Snafu` enum (the same
//! per-module convention used throughout this crate); [`AppError`] wraps
//! them with `#[snafu(context(false))]` so `?` converts automatically.

use snafu::Snafu;

use crate::adif::AdifError;
use crate::config::ConfigError;
use crate::geo::GeoError;
use crate::operator_files::OperatorFilesError;
use crate::state::StateError;
use crate::store::StoreError;
use crate::textmsg::ParseError;
use crate::wire::WireError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AppError {
    #[snafu(display("wire codec error: {source}"))]
    #[snafu(context(false))]
    Wire { source: WireError },

    #[snafu(display("message parse error: {source}"))]
    #[snafu(context(false))]
    Parse { source: ParseError },

    #[snafu(display("shared state error: {source}"))]
    #[snafu(context(false))]
    State { source: StateError },

    #[snafu(display("document store error: {source}"))]
    #[snafu(context(false))]
    Store { source: StoreError },

    #[snafu(display("geolocation error: {source}"))]
    #[snafu(context(false))]
    Geo { source: GeoError },

    #[snafu(display("adif error: {source}"))]
    #[snafu(context(false))]
    Adif { source: AdifError },

    #[snafu(display("configuration error: {source}"))]
    #[snafu(context(false))]
    Config { source: ConfigError },

    #[snafu(display("operator reference file error: {source}"))]
    #[snafu(context(false))]
    OperatorFiles { source: OperatorFilesError },

    #[snafu(display("io error: {source}"))]
    Io { source: std::io::Error },
}

pub type AppResult<T> = Result<T, AppError>;
