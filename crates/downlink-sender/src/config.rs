use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::Parser;

use downlink_core::{
    Catalog, DEFAULT_BITRATE, DEFAULT_CHUNK_SIZE, DEFAULT_DEVICE, DEFAULT_PAUSE_SECS,
    DEFAULT_SETTLE_SECS, LinkConfig, OrchestratorConfig, SizePolicy, TransmitOptions,
};

/// sendtm - downlink science artifacts over a SyncLink synchronous serial port
#[derive(Parser, Debug)]
#[command(name = "sendtm")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Serial device of the SyncLink adapter
    #[arg(env = "SENDTM_DEVICE", default_value = DEFAULT_DEVICE)]
    pub device: PathBuf,

    /// JSON catalog: [{"path", "expected_size", "category"}, ...]
    #[arg(long, env = "SENDTM_CATALOG", conflicts_with = "images")]
    pub catalog: Option<PathBuf>,

    /// Science image to send; each is followed by the index file
    #[arg(long = "image", requires = "index")]
    pub images: Vec<PathBuf>,

    /// Expected size of each science image in bytes
    #[arg(long, env = "SENDTM_IMAGE_SIZE", default_value_t = 16 * 1024 * 1024)]
    pub image_size: u64,

    /// Index metadata file sent after every image
    #[arg(long, env = "SENDTM_INDEX")]
    pub index: Option<PathBuf>,

    /// Expected size of the index file in bytes
    #[arg(long, env = "SENDTM_INDEX_SIZE", default_value_t = 28_672)]
    pub index_size: u64,

    /// Bytes per write/drain cycle
    #[arg(long, env = "SENDTM_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Link bitrate in bits per second
    #[arg(long, env = "SENDTM_BITRATE", default_value_t = DEFAULT_BITRATE)]
    pub bitrate: u32,

    /// Seconds to keep the link clocking after the last artifact
    #[arg(long, env = "SENDTM_SETTLE_SECS", default_value_t = DEFAULT_SETTLE_SECS)]
    pub settle_secs: u64,

    /// Seconds to pause between artifacts
    #[arg(long, env = "SENDTM_PAUSE_SECS", default_value_t = DEFAULT_PAUSE_SECS)]
    pub pause_secs: u64,

    /// Program that sets up the link's reference clock
    #[arg(long, env = "SENDTM_CLOCK_PROGRAM", default_value = "fsynth")]
    pub clock_program: String,

    /// Skip clock negotiation (data clocks supplied externally)
    #[arg(long)]
    pub no_clock: bool,

    /// Write the last chunk of each artifact at full chunk size
    #[arg(long)]
    pub pad_tail: bool,

    /// Warn when a file's size differs from its expected size
    #[arg(long)]
    pub verify_sizes: bool,

    /// Run the whole sequence against an in-memory link
    #[arg(long, env = "SENDTM_SIMULATE")]
    pub simulate: bool,

    /// Log a hex preview of this chunk (1-based) of every artifact
    #[arg(long)]
    pub sample_chunk: Option<usize>,
}

impl Args {
    pub fn size_policy(&self) -> SizePolicy {
        if self.verify_sizes {
            SizePolicy::Verify
        } else {
            SizePolicy::Trust
        }
    }

    pub fn catalog(&self) -> Result<Catalog> {
        if let Some(path) = &self.catalog {
            return Catalog::from_json_file(path, self.size_policy())
                .with_context(|| format!("loading catalog {}", path.display()));
        }
        let Some(index) = &self.index else {
            bail!("no artifacts: pass --catalog or --image with --index");
        };
        Catalog::interleaved(
            &self.images,
            self.image_size,
            index,
            self.index_size,
            self.size_policy(),
        )
        .context("building catalog")
    }

    pub fn link_config(&self) -> LinkConfig {
        LinkConfig {
            bitrate: self.bitrate,
            ..LinkConfig::default()
        }
    }

    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            chunk_size: self.chunk_size,
            settle: Duration::from_secs(self.settle_secs),
            pause: Duration::from_secs(self.pause_secs),
            transmit: TransmitOptions {
                pad_tail: self.pad_tail,
                sample_chunk: self.sample_chunk,
            },
        }
    }
}
