//! Transmission orchestrator: drives a catalog through the pipeline.
//!
//! ```text
//! Idle -> Loading -> Sending -> Terminating -> Reporting -> next | Done
//!            \__________\____________\______________________-> Aborted
//! ```
//!
//! One artifact is loaded and fully sent before the next is read. The first
//! hard error ends the run; nothing after it is attempted.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{trace, warn};
use uuid::Uuid;

use crate::artifact::{ArtifactCategory, ArtifactDescriptor, Catalog};
use crate::error::{CatalogError, DownlinkError, TransmitError};
use crate::link::Link;
use crate::loader;
use crate::logging::{DownlinkEvent, DownlinkLogger, NullLogger, RunLog, TracingLogger};
use crate::protocol::{
    self, DEFAULT_CHUNK_SIZE, DEFAULT_PAUSE_SECS, DEFAULT_SETTLE_SECS, FRAME_MARKER,
};
use crate::terminator;
use crate::timer::{self, Stopwatch};
use crate::transmitter::{self, TransmitOptions};

/// Where a run is in its per-artifact cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Loading,
    Sending,
    Terminating,
    Reporting,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Sent to the end, but the link short-wrote or the artifact outgrew its plan.
    PartialFailure,
    /// The run stopped on this artifact.
    HardFailure,
}

/// Per-artifact record.
#[derive(Debug, Clone, PartialEq)]
pub struct TransmissionResult {
    pub index: usize,
    pub path: PathBuf,
    pub category: ArtifactCategory,
    pub bytes_loaded: u64,
    /// Payload bytes accepted by the link, terminator excluded.
    pub bytes_accepted: u64,
    pub elapsed_us: i64,
    pub outcome: Outcome,
    /// Writes, marker included, that the link accepted only in part.
    pub short_writes: usize,
    /// The file held more bytes than its plan; the excess was not sent.
    pub truncated: bool,
    pub sha256: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl TransmissionResult {
    fn hard_failure(
        index: usize,
        artifact: &ArtifactDescriptor,
        bytes_loaded: u64,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            index,
            path: artifact.path.clone(),
            category: artifact.category,
            bytes_loaded,
            bytes_accepted: 0,
            elapsed_us: 0,
            outcome: Outcome::HardFailure,
            short_writes: 0,
            truncated: false,
            sha256: None,
            started_at,
        }
    }

    pub fn throughput_bps(&self) -> Option<f64> {
        timer::throughput_bps(self.bytes_accepted, self.elapsed_us)
    }
}

/// Results of a run that reached the end of the catalog.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub results: Vec<TransmissionResult>,
    /// Whole run, settling included.
    pub elapsed_us: i64,
}

impl RunReport {
    pub fn total_bytes(&self) -> u64 {
        self.results.iter().map(|r| r.bytes_accepted).sum()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.outcome == Outcome::Success)
    }
}

/// A run that stopped on a hard error.
#[derive(Debug)]
pub struct RunAborted {
    pub run_id: Uuid,
    /// Completed artifacts followed by the failing one.
    pub results: Vec<TransmissionResult>,
    /// Phase the error occurred in.
    pub state: RunState,
    pub error: DownlinkError,
}

impl fmt::Display for RunAborted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.results.last() {
            Some(last) => write!(
                f,
                "run aborted during {:?} of {}: {}",
                self.state,
                last.path.display(),
                self.error
            ),
            None => write!(f, "run aborted: {}", self.error),
        }
    }
}

impl std::error::Error for RunAborted {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub chunk_size: usize,
    /// Link held open after the last artifact so the receiver can finish
    /// processing the final frame.
    pub settle: Duration,
    /// Pause between artifacts.
    pub pause: Duration,
    pub transmit: TransmitOptions,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            settle: Duration::from_secs(DEFAULT_SETTLE_SECS),
            pause: Duration::from_secs(DEFAULT_PAUSE_SECS),
            transmit: TransmitOptions::default(),
        }
    }
}

/// Owns the link for the whole run and closes it exactly once.
pub struct Orchestrator<L: Link> {
    link: L,
    catalog: Catalog,
    config: OrchestratorConfig,
    logger: Box<dyn DownlinkLogger>,
    state: RunState,
}

pub struct OrchestratorBuilder<L: Link> {
    link: L,
    catalog: Catalog,
    config: OrchestratorConfig,
    logger: Box<dyn DownlinkLogger>,
}

impl<L: Link> OrchestratorBuilder<L> {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.config.settle = settle;
        self
    }

    pub fn pause(mut self, pause: Duration) -> Self {
        self.config.pause = pause;
        self
    }

    pub fn pad_tail(mut self, pad: bool) -> Self {
        self.config.transmit.pad_tail = pad;
        self
    }

    pub fn sample_chunk(mut self, chunk: Option<usize>) -> Self {
        self.config.transmit.sample_chunk = chunk;
        self
    }

    pub fn logger(mut self, logger: Box<dyn DownlinkLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn build(self) -> Result<Orchestrator<L>, CatalogError> {
        protocol::check_chunk_size(self.config.chunk_size)?;
        Ok(Orchestrator {
            link: self.link,
            catalog: self.catalog,
            config: self.config,
            logger: self.logger,
            state: RunState::Idle,
        })
    }
}

impl<L: Link> Orchestrator<L> {
    pub fn builder(link: L, catalog: Catalog) -> OrchestratorBuilder<L> {
        OrchestratorBuilder {
            link,
            catalog,
            config: OrchestratorConfig::default(),
            logger: Box::new(TracingLogger),
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    fn transition(&mut self, next: RunState, log: RunLog<'_>) {
        enter(&mut self.state, next, log);
    }

    /// Send every artifact in catalog order.
    pub fn run(mut self) -> Result<RunReport, RunAborted> {
        let run_id = Uuid::new_v4();
        let logger = std::mem::replace(&mut self.logger, Box::new(NullLogger));
        let log = RunLog::new(logger.as_ref(), run_id);
        let watch = Stopwatch::start();

        log.emit(
            "orchestrator",
            DownlinkEvent::RunStarted {
                artifacts: self.catalog.len(),
                expected_bytes: self.catalog.total_expected(),
            },
        );

        if let Err(source) = self.link.assert_control_signals() {
            let error = DownlinkError::Link {
                op: "assert DTR/RTS",
                source,
            };
            return Err(self.abort(log, run_id, Vec::new(), RunState::Idle, error));
        }

        let catalog = self.catalog.clone();
        let count = catalog.len();
        let mut results = Vec::with_capacity(count);

        for (index, artifact) in catalog.iter().enumerate() {
            match self.send_artifact(index, artifact, log) {
                Ok(result) => results.push(result),
                Err((failed, error)) => {
                    let failed_in = self.state;
                    log.emit(
                        "orchestrator",
                        DownlinkEvent::Aborted {
                            index,
                            message: error.to_string(),
                        },
                    );
                    results.push(failed);
                    return Err(self.abort(log, run_id, results, failed_in, error));
                }
            }

            if index + 1 < count && !self.config.pause.is_zero() {
                std::thread::sleep(self.config.pause);
            }
        }

        // Keep the link clocking so the receiver can finish the last frame
        log.emit(
            "orchestrator",
            DownlinkEvent::Settling {
                secs: self.config.settle.as_secs_f64(),
            },
        );
        if !self.config.settle.is_zero() {
            std::thread::sleep(self.config.settle);
        }

        if let Err(source) = self.link.deassert_control_signals() {
            let error = DownlinkError::Link {
                op: "negate DTR/RTS",
                source,
            };
            return Err(self.abort(log, run_id, results, RunState::Done, error));
        }

        self.transition(RunState::Done, log);
        let elapsed_us = watch.elapsed_us();
        let total_bytes = results.iter().map(|r| r.bytes_accepted).sum();
        log.emit(
            "orchestrator",
            DownlinkEvent::RunComplete {
                artifacts: results.len(),
                total_bytes,
                elapsed_us,
            },
        );

        if let Err(source) = self.link.close() {
            return Err(RunAborted {
                run_id,
                results,
                state: RunState::Done,
                error: DownlinkError::Link { op: "close", source },
            });
        }

        Ok(RunReport {
            run_id,
            results,
            elapsed_us,
        })
    }

    fn send_artifact(
        &mut self,
        index: usize,
        artifact: &ArtifactDescriptor,
        log: RunLog<'_>,
    ) -> Result<TransmissionResult, (TransmissionResult, DownlinkError)> {
        let started_at = Utc::now();

        self.transition(RunState::Loading, log);
        let buffer = loader::load(artifact, self.config.chunk_size).map_err(|e| {
            (TransmissionResult::hard_failure(index, artifact, 0, started_at), e.into())
        })?;
        log.emit(
            "loader",
            DownlinkEvent::ArtifactLoaded {
                index,
                path: artifact.path.display().to_string(),
                bytes: buffer.len(),
                chunks: buffer.chunk_count(),
            },
        );

        self.transition(RunState::Sending, log);
        let link = &mut self.link;
        let state = &mut self.state;
        let options = &self.config.transmit;
        let (sent, elapsed_us) = timer::bracket(|| -> Result<_, TransmitError> {
            let report = transmitter::transmit(&mut *link, &buffer, options, log)?;
            enter(state, RunState::Terminating, log);
            let marker = terminator::terminate(&mut *link)?;
            Ok((report, marker))
        });

        let (report, marker) = sent.map_err(|e| {
            let loaded = buffer.len() as u64;
            let failed = TransmissionResult::hard_failure(index, artifact, loaded, started_at);
            (failed, DownlinkError::from(e))
        })?;
        log.emit("terminator", DownlinkEvent::MarkerSent { index });

        self.transition(RunState::Reporting, log);
        let short_writes = report.short_writes + usize::from(marker < FRAME_MARKER.len());
        let outcome = if short_writes > 0 || buffer.is_truncated() {
            Outcome::PartialFailure
        } else {
            Outcome::Success
        };

        log.emit(
            "orchestrator",
            DownlinkEvent::ArtifactSent {
                index,
                path: artifact.path.display().to_string(),
                bytes_accepted: report.bytes_accepted,
                elapsed_us,
                sha256: report.sha256.clone(),
            },
        );

        Ok(TransmissionResult {
            index,
            path: artifact.path.clone(),
            category: artifact.category,
            bytes_loaded: buffer.len() as u64,
            bytes_accepted: report.bytes_accepted,
            elapsed_us,
            outcome,
            short_writes,
            truncated: buffer.is_truncated(),
            sha256: Some(report.sha256),
            started_at,
        })
    }

    /// Lower the control lines and close the link after a hard error.
    fn abort(
        mut self,
        log: RunLog<'_>,
        run_id: Uuid,
        results: Vec<TransmissionResult>,
        state: RunState,
        error: DownlinkError,
    ) -> RunAborted {
        self.transition(RunState::Aborted, log);
        if let Err(e) = self.link.deassert_control_signals() {
            warn!("negate DTR/RTS error: {}", e);
        }
        if let Err(e) = self.link.close() {
            warn!("close error: {}", e);
        }
        RunAborted {
            run_id,
            results,
            state,
            error,
        }
    }
}

fn enter(state: &mut RunState, next: RunState, log: RunLog<'_>) {
    trace!(from = ?*state, to = ?next, "Run state");
    log.emit(
        "orchestrator",
        DownlinkEvent::StateChanged {
            from: *state,
            to: next,
        },
    );
    *state = next;
}
