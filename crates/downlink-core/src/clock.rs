//! Clock-source negotiation run before the link is opened.
//!
//! The synthesizer that feeds the link's baud rate generator is programmed by
//! a companion program. We run it to completion and check its exit status.

use std::path::Path;
use std::process::Command;

use tracing::info;

use crate::error::ConfigError;

pub trait ClockNegotiator {
    fn negotiate(&self, device: &Path) -> Result<(), ConfigError>;
}

/// Runs `program <device>` and blocks until it exits.
#[derive(Debug, Clone)]
pub struct ExternalProgram {
    program: String,
}

impl ExternalProgram {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }
}

impl Default for ExternalProgram {
    fn default() -> Self {
        Self::new("fsynth")
    }
}

impl ClockNegotiator for ExternalProgram {
    fn negotiate(&self, device: &Path) -> Result<(), ConfigError> {
        info!("{} device={}", self.program, device.display());
        let status = Command::new(&self.program)
            .arg(device)
            .status()
            .map_err(|source| ConfigError::ClockSpawn {
                program: self.program.clone(),
                source,
            })?;

        if !status.success() {
            return Err(ConfigError::ClockNegotiation {
                program: self.program.clone(),
                status: status.to_string(),
            });
        }
        Ok(())
    }
}

/// For setups where an external device supplies the data clocks.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoNegotiation;

impl ClockNegotiator for NoNegotiation {
    fn negotiate(&self, _device: &Path) -> Result<(), ConfigError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_spawn_error() {
        let clock = ExternalProgram::new("definitely-not-a-clock-program-xyz");
        let err = clock.negotiate(Path::new("/dev/null")).unwrap_err();
        assert!(matches!(err, ConfigError::ClockSpawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_is_failure() {
        let clock = ExternalProgram::new("false");
        let err = clock.negotiate(Path::new("/dev/null")).unwrap_err();
        assert!(matches!(err, ConfigError::ClockNegotiation { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_zero_exit_is_success() {
        let clock = ExternalProgram::new("true");
        assert!(clock.negotiate(Path::new("/dev/null")).is_ok());
    }
}
