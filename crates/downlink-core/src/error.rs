//! Error taxonomy for the downlink pipeline.
//!
//! Every failure is fatal for the run. Variants that come from the OS keep the
//! underlying `io::Error` so the operator sees the errno and its description.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Link or clock-source setup failed. Always raised before any transmission.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("clock negotiation program `{program}` could not be started: {source}")]
    ClockSpawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("clock negotiation program `{program}` failed with {status}")]
    ClockNegotiation { program: String, status: String },

    #[error("open {device} error: {source}")]
    Open {
        device: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A device control request was rejected. `op` names the request.
    #[error("{op} error: {source}")]
    Device {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("invalid link configuration: {0}")]
    Invalid(String),
}

/// An artifact could not be read into its transfer buffer.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("artifact {path} not found: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("permission denied reading artifact {path}: {source}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("read error on artifact {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("artifact {path} is empty")]
    Empty { path: PathBuf },

    #[error("cannot plan artifact {path}: {source}")]
    Plan {
        path: PathBuf,
        #[source]
        source: CatalogError,
    },
}

impl LoadError {
    /// Classify an open failure by its OS error kind.
    pub(crate) fn from_open(path: PathBuf, source: io::Error) -> Self {
        match source.kind() {
            io::ErrorKind::NotFound => Self::NotFound { path, source },
            io::ErrorKind::PermissionDenied => Self::PermissionDenied { path, source },
            _ => Self::Io { path, source },
        }
    }
}

/// A write or drain on the link failed mid-stream.
#[derive(Error, Debug)]
pub enum TransmitError {
    #[error("write error on chunk {chunk}: {source}")]
    Write {
        chunk: usize,
        #[source]
        source: io::Error,
    },

    #[error("drain error on chunk {chunk}: {source}")]
    Drain {
        chunk: usize,
        #[source]
        source: io::Error,
    },

    #[error("frame terminator error: {source}")]
    Terminator {
        #[source]
        source: io::Error,
    },
}

/// The artifact catalog is malformed.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("catalog is empty")]
    Empty,

    #[error("catalog entry {index} ({path}) has zero expected size")]
    ZeroSize { index: usize, path: PathBuf },

    #[error("catalog entry {index} has an empty path")]
    EmptyPath { index: usize },

    #[error("catalog entry {index} ({path}) expects {size} bytes, more than the {max} byte limit")]
    TooLarge {
        index: usize,
        path: PathBuf,
        size: u64,
        max: u64,
    },

    #[error("expected size {expected_size} exceeds the {max} byte buffer limit")]
    PlanTooLarge { expected_size: u64, max: u64 },

    #[error("chunk size {chunk_size} exceeds the {max} byte limit")]
    ChunkTooLarge { chunk_size: usize, max: usize },

    #[error("chunk size {chunk_size} is not a multiple of the link granularity {granularity}")]
    ChunkAlignment { chunk_size: usize, granularity: usize },

    #[error("cannot read catalog {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot parse catalog: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Umbrella error for a run.
#[derive(Error, Debug)]
pub enum DownlinkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Transmit(#[from] TransmitError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Raising or lowering control lines, or closing the link, failed.
    #[error("link {op} error: {source}")]
    Link {
        op: &'static str,
        #[source]
        source: io::Error,
    },
}

pub type Result<T> = std::result::Result<T, DownlinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_failures_are_classified() {
        let nf = LoadError::from_open("a".into(), io::Error::from(io::ErrorKind::NotFound));
        assert!(matches!(nf, LoadError::NotFound { .. }));

        let pd = LoadError::from_open("a".into(), io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(pd, LoadError::PermissionDenied { .. }));

        let other = LoadError::from_open("a".into(), io::Error::from(io::ErrorKind::Other));
        assert!(matches!(other, LoadError::Io { .. }));
    }

    #[test]
    fn messages_carry_os_error() {
        let err = TransmitError::Write {
            chunk: 499,
            source: io::Error::from_raw_os_error(5),
        };
        let msg = err.to_string();
        assert!(msg.starts_with("write error on chunk 499"));
        assert!(msg.contains("os error 5"));
    }
}
