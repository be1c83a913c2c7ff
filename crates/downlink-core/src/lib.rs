//! Downlink core: chunked artifact transmission over a synchronous link.
//!
//! Sends a catalog of large science artifacts at the link's fixed bitrate:
//! - Loader: reads one artifact into a plan-sized buffer, raw bytes only
//! - Transmitter: fixed-size writes, each drained before the next
//! - Terminator: `smart` marker after every payload
//! - Timer: per-artifact elapsed time for throughput checks
//! - Orchestrator: runs the catalog in order, stops on the first hard error

pub mod artifact;
pub mod clock;
pub mod error;
pub mod link;
pub mod loader;
pub mod logging;
pub mod orchestrator;
pub mod protocol;
pub mod sim;
#[cfg(target_os = "linux")]
pub mod synclink;
pub mod terminator;
pub mod timer;
pub mod transmitter;

// Re-export key types for convenience.
pub use artifact::{ArtifactCategory, ArtifactDescriptor, Catalog, CatalogBuilder, SizePolicy};
pub use clock::{ClockNegotiator, ExternalProgram, NoNegotiation};
pub use error::{CatalogError, ConfigError, DownlinkError, LoadError, TransmitError};
pub use link::{Link, LinkConfig, LinkOpener, bring_up};
pub use loader::{FilledBuffer, load};
pub use logging::{DownlinkEvent, DownlinkLog, DownlinkLogger, NullLogger, RunLog, TracingLogger};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, OrchestratorConfig, Outcome, RunAborted, RunReport,
    RunState, TransmissionResult,
};
pub use protocol::{
    ChunkPlan, DEFAULT_BITRATE, DEFAULT_CHUNK_SIZE, DEFAULT_DEVICE, DEFAULT_PAUSE_SECS,
    DEFAULT_SETTLE_SECS, FRAME_MARKER, LINK_GRANULARITY, MAX_ARTIFACT_SIZE, MAX_CHUNK_SIZE,
};
pub use terminator::terminate;
pub use transmitter::{TransmitOptions, TransmitReport, transmit};
