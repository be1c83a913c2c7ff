mod config;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use downlink_core::{
    ClockNegotiator, ExternalProgram, LinkOpener, NoNegotiation, Orchestrator, Outcome,
    RunReport, TransmissionResult, bring_up,
};

use crate::config::Args;

fn main() -> ExitCode {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sendtm=info,downlink_core=info".into()),
        )
        .init();

    // Bad argument counts exit here with usage and status 2
    let args = Args::parse();

    match run(&args) {
        Ok(report) => {
            for result in &report.results {
                print_result(result);
            }
            info!(
                "All data sent: {} artifacts, {} bytes in {:.2} seconds",
                report.results.len(),
                report.total_bytes(),
                report.elapsed_us as f64 / 1_000_000.0
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("{}", failure_message(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<RunReport> {
    if args.simulate {
        info!("Simulating link; nothing is sent to {}", args.device.display());
        return send(args, &downlink_core::sim::MemoryOpener);
    }
    send_hardware(args)
}

#[cfg(target_os = "linux")]
fn send_hardware(args: &Args) -> Result<RunReport> {
    send(args, &downlink_core::synclink::SyncLinkOpener)
}

#[cfg(not(target_os = "linux"))]
fn send_hardware(_args: &Args) -> Result<RunReport> {
    anyhow::bail!("SyncLink devices are only supported on Linux; use --simulate")
}

fn send<O: LinkOpener>(args: &Args, opener: &O) -> Result<RunReport> {
    let catalog = args.catalog()?;
    let link_config = args.link_config();

    let negotiator: Box<dyn ClockNegotiator> = if args.no_clock || args.simulate {
        Box::new(NoNegotiation)
    } else {
        Box::new(ExternalProgram::new(&args.clock_program))
    };

    let link = bring_up(negotiator.as_ref(), opener, &args.device, &link_config)?;

    let orchestrator = Orchestrator::builder(link, catalog)
        .config(args.orchestrator_config())
        .build()?;

    info!("Sending data...");
    match orchestrator.run() {
        Ok(report) => Ok(report),
        Err(aborted) => {
            for result in &aborted.results {
                print_result(result);
            }
            Err(aborted.into())
        }
    }
}

fn print_result(result: &TransmissionResult) {
    match result.outcome {
        Outcome::HardFailure => {
            info!("Aborted while sending {}", result.path.display());
        }
        _ => {
            info!(
                "Sent {} bytes of data from file {}.",
                result.bytes_accepted,
                result.path.display()
            );
            info!(
                "Time elapsed: {:.2} seconds.",
                result.elapsed_us as f64 / 1_000_000.0
            );
            if let Some(bps) = result.throughput_bps() {
                info!("Throughput: {:.2} Mbps", bps / 1_000_000.0);
            }
            if result.short_writes > 0 {
                warn!(
                    "Link accepted less than was offered on {} writes for {}",
                    result.short_writes,
                    result.path.display()
                );
            }
            if result.truncated {
                warn!(
                    "{} is larger than its expected size; only {} bytes were sent",
                    result.path.display(),
                    result.bytes_loaded
                );
            }
        }
    }
}

/// The error and its causes on one line. Causes already quoted by the error
/// above them are skipped.
fn failure_message(err: &anyhow::Error) -> String {
    let mut message = err.to_string();
    for cause in err.chain().skip(1) {
        let text = cause.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use anyhow::Context;
    use downlink_core::error::{DownlinkError, TransmitError};
    use downlink_core::{RunAborted, RunState};
    use uuid::Uuid;

    #[test]
    fn test_failure_message_quotes_os_error_once() {
        let aborted = RunAborted {
            run_id: Uuid::nil(),
            results: Vec::new(),
            state: RunState::Sending,
            error: DownlinkError::Transmit(TransmitError::Write {
                chunk: 1,
                source: io::Error::from_raw_os_error(5),
            }),
        };
        let message = failure_message(&anyhow::Error::new(aborted));
        assert!(message.starts_with("run aborted: write error on chunk 1: "));
        assert_eq!(message.matches("os error 5").count(), 1);
    }

    #[test]
    fn test_failure_message_keeps_context() {
        let err = Err::<(), _>(io::Error::from_raw_os_error(2))
            .context("loading catalog c.json")
            .unwrap_err();
        let message = failure_message(&err);
        assert!(message.starts_with("loading catalog c.json: "));
        assert_eq!(message.matches("os error 2").count(), 1);
    }
}
