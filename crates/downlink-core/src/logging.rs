/// Downlink logging trait for structured run logs.
///
/// The orchestrator and its stages emit one record per lifecycle step so a
/// ground operator can follow a run and check timing against the link rate.

use std::fmt;

use uuid::Uuid;

use crate::orchestrator::RunState;

/// Structured log entry for a downlink run.
#[derive(Debug, Clone)]
pub struct DownlinkLog {
    pub component: &'static str,
    pub run_id: Uuid,
    pub event: DownlinkEvent,
}

/// Events that can be logged.
#[derive(Debug, Clone)]
pub enum DownlinkEvent {
    RunStarted {
        artifacts: usize,
        expected_bytes: u64,
    },
    StateChanged {
        from: RunState,
        to: RunState,
    },
    /// Loader: buffer filled
    ArtifactLoaded {
        index: usize,
        path: String,
        bytes: usize,
        chunks: usize,
    },
    /// Transmitter: one chunk written and drained
    ChunkSent {
        chunk_idx: usize,
        accepted: usize,
    },
    /// Link accepted fewer bytes than offered
    ShortWrite {
        chunk_idx: usize,
        offered: usize,
        accepted: usize,
    },
    /// Hex preview of a sampled chunk
    ChunkSample {
        chunk_idx: usize,
        preview: String,
    },
    /// Terminator: marker written and drained
    MarkerSent {
        index: usize,
    },
    ArtifactSent {
        index: usize,
        path: String,
        bytes_accepted: u64,
        elapsed_us: i64,
        sha256: String,
    },
    Settling {
        secs: f64,
    },
    RunComplete {
        artifacts: usize,
        total_bytes: u64,
        elapsed_us: i64,
    },
    Aborted {
        index: usize,
        message: String,
    },
}

impl fmt::Display for DownlinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RunStarted { artifacts, expected_bytes } => {
                write!(f, "run_started artifacts={} expected_bytes={}", artifacts, expected_bytes)
            }
            Self::StateChanged { from, to } => {
                write!(f, "state from={:?} to={:?}", from, to)
            }
            Self::ArtifactLoaded { index, path, bytes, chunks } => {
                write!(f, "artifact_loaded idx={} path={} bytes={} chunks={}", index, path, bytes, chunks)
            }
            Self::ChunkSent { chunk_idx, accepted } => {
                write!(f, "chunk_sent idx={} accepted={}", chunk_idx, accepted)
            }
            Self::ShortWrite { chunk_idx, offered, accepted } => {
                write!(f, "short_write idx={} offered={} accepted={}", chunk_idx, offered, accepted)
            }
            Self::ChunkSample { chunk_idx, preview } => {
                write!(f, "chunk_sample idx={} bytes={}", chunk_idx, preview)
            }
            Self::MarkerSent { index } => {
                write!(f, "marker_sent idx={}", index)
            }
            Self::ArtifactSent { index, path, bytes_accepted, elapsed_us, sha256 } => {
                write!(
                    f,
                    "artifact_sent idx={} path={} bytes={} elapsed={:.2}s sha256={}",
                    index,
                    path,
                    bytes_accepted,
                    *elapsed_us as f64 / 1_000_000.0,
                    sha256
                )
            }
            Self::Settling { secs } => {
                write!(f, "settling secs={:.1}", secs)
            }
            Self::RunComplete { artifacts, total_bytes, elapsed_us } => {
                write!(
                    f,
                    "run_complete artifacts={} bytes={} elapsed={:.2}s",
                    artifacts,
                    total_bytes,
                    *elapsed_us as f64 / 1_000_000.0
                )
            }
            Self::Aborted { index, message } => {
                write!(f, "aborted idx={} error: {}", index, message)
            }
        }
    }
}

/// Implementations can write to tracing, collect for tests, or discard.
pub trait DownlinkLogger {
    fn log(&self, entry: DownlinkLog);
}

/// Logger that uses the `tracing` crate.
pub struct TracingLogger;

impl DownlinkLogger for TracingLogger {
    fn log(&self, entry: DownlinkLog) {
        // Per-chunk events and state changes are debug, everything else info
        match &entry.event {
            DownlinkEvent::ChunkSent { .. }
            | DownlinkEvent::MarkerSent { .. }
            | DownlinkEvent::StateChanged { .. } => {
                tracing::debug!(component = entry.component, run_id = %entry.run_id, "{}", entry.event);
            }
            DownlinkEvent::ShortWrite { .. } => {
                tracing::warn!(component = entry.component, run_id = %entry.run_id, "{}", entry.event);
            }
            DownlinkEvent::Aborted { .. } => {
                tracing::error!(component = entry.component, run_id = %entry.run_id, "{}", entry.event);
            }
            _ => {
                tracing::info!(component = entry.component, run_id = %entry.run_id, "{}", entry.event);
            }
        }
    }
}

/// No-op logger that discards all log entries.
pub struct NullLogger;

impl DownlinkLogger for NullLogger {
    fn log(&self, _entry: DownlinkLog) {}
}

/// A logger bound to one run id, handed to each pipeline stage.
#[derive(Clone, Copy)]
pub struct RunLog<'a> {
    logger: &'a dyn DownlinkLogger,
    run_id: Uuid,
}

impl<'a> RunLog<'a> {
    pub fn new(logger: &'a dyn DownlinkLogger, run_id: Uuid) -> Self {
        Self { logger, run_id }
    }

    /// Discarding log for callers that drive a stage directly.
    pub fn null() -> RunLog<'static> {
        RunLog {
            logger: &NullLogger,
            run_id: Uuid::nil(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn emit(&self, component: &'static str, event: DownlinkEvent) {
        self.logger.log(DownlinkLog {
            component,
            run_id: self.run_id,
            event,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_is_key_value() {
        let ev = DownlinkEvent::ArtifactSent {
            index: 0,
            path: "36image.bin".into(),
            bytes_accepted: 16_777_216,
            elapsed_us: 13_510_000,
            sha256: "ab".into(),
        };
        assert_eq!(
            ev.to_string(),
            "artifact_sent idx=0 path=36image.bin bytes=16777216 elapsed=13.51s sha256=ab"
        );
    }
}
