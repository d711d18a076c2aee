//! Error types for the logger.
//!
//! `SidError` is what every public operation returns. File parsing problems are
//! described by `DecodeError`, which knows the line and field but not the file;
//! the codec wraps it into `SidError::Decode` together with the path.

use std::{fmt, io, path::PathBuf};

use thiserror::Error;

pub type Result<T, E = SidError> = std::result::Result<T, E>;

/// The ways a resumed file can disagree with the current run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MismatchKind {
    LogType,
    Date,
    Stations,
    LogInterval,
}

impl fmt::Display for MismatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MismatchKind::LogType => "log type is not raw",
            MismatchKind::Date => "not today's file",
            MismatchKind::Stations => "station lists are different",
            MismatchKind::LogInterval => "log intervals are different",
        };
        f.write_str(s)
    }
}

#[derive(Error, Debug)]
pub enum SidError {
    #[error("configuration error in '{field}': {reason}")]
    Config { field: String, reason: String },

    #[error("cannot parse configuration {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("cannot decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("station {0} not found")]
    StationNotFound(String),

    #[error("sample index {index} out of range (0..{len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("missing header parameter '{0}'")]
    MissingParam(String),

    #[error("continuation aborted: {0}")]
    ContinuationDeclined(MismatchKind),
}

impl SidError {
    pub(crate) fn config(field: &str, reason: impl Into<String>) -> Self {
        SidError::Config {
            field: field.to_owned(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        SidError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status, distinct per failure class so a supervisor can tell them apart
    pub fn exit_code(&self) -> i32 {
        match self {
            SidError::Config { .. } | SidError::ConfigParse { .. } => 1,
            SidError::Decode { .. } => 2,
            SidError::Io { .. } => 3,
            SidError::ContinuationDeclined(kind) => match kind {
                MismatchKind::LogType => 10,
                MismatchKind::Date => 11,
                MismatchKind::Stations => 12,
                MismatchKind::LogInterval => 13,
            },
            SidError::StationNotFound(_)
            | SidError::IndexOutOfRange { .. }
            | SidError::MissingParam(_) => 4,
        }
    }
}

/// A problem found while parsing the text of a SID/SuperSID file
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("no station identifier (Stations or StationID) in header")]
    MissingStations,

    #[error("{stations} stations listed but {frequencies} frequencies")]
    StationFrequencyCount { stations: usize, frequencies: usize },

    #[error("header field '{key}' has invalid value {value:?}")]
    InvalidHeader { key: String, value: String },

    #[error("file has no data rows")]
    NoData,

    #[error("line {line}: expected {expected} fields, found {found}")]
    FieldCount {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}, column {column}: invalid value {value:?}")]
    InvalidValue {
        line: usize,
        column: usize,
        value: String,
    },

    #[error("line {line}: invalid timestamp {value:?}")]
    InvalidTimestamp { line: usize, value: String },

    #[error("station {station} has {found} samples, expected {expected}")]
    LengthMismatch {
        station: String,
        expected: usize,
        found: usize,
    },
}

/// Failure of the capture stage for one tick
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("capture device read failed: {0}")]
    Device(#[from] io::Error),

    #[error("capture source is exhausted")]
    Exhausted,

    #[error("malformed spectrum value {0:?}")]
    Malformed(String),
}
