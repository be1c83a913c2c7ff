//! Link boundary: the already-configured synchronous channel and how it is
//! brought up.

use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clock::ClockNegotiator;
use crate::error::ConfigError;
use crate::protocol::DEFAULT_BITRATE;

/// Blocking, full-duplex, fixed-rate channel.
///
/// `write` returns once bytes are queued; `drain` blocks until the device has
/// clocked them out. Only one owner drives a link at a time.
pub trait Link {
    /// Queue `buf`. Returns the number of bytes the link accepted.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Block until everything queued has been transmitted.
    fn drain(&mut self) -> io::Result<()>;

    /// Raise RTS and DTR.
    fn assert_control_signals(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Lower RTS and DTR.
    fn deassert_control_signals(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn enable_transmitter(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Release the link.
    fn close(self) -> io::Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

impl<L: Link + ?Sized> Link for &mut L {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (**self).write(buf)
    }

    fn drain(&mut self) -> io::Result<()> {
        (**self).drain()
    }

    fn assert_control_signals(&mut self) -> io::Result<()> {
        (**self).assert_control_signals()
    }

    fn deassert_control_signals(&mut self) -> io::Result<()> {
        (**self).deassert_control_signals()
    }

    fn enable_transmitter(&mut self) -> io::Result<()> {
        (**self).enable_transmitter()
    }
}

/// Framing mode of the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FramingMode {
    Hdlc,
    Raw,
}

/// Line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Encoding {
    Nrz,
    Nrzb,
    NrziMark,
    NrziSpace,
    BiphaseMark,
    BiphaseSpace,
    BiphaseLevel,
    DiffBiphaseLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrcPolicy {
    None,
    Ccitt16,
    Ccitt32,
}

/// Pattern sent between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdlePattern {
    Flags,
    AltZerosOnes,
    Zeros,
    Ones,
    AltMarkSpace,
    Space,
    Mark,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreamblePattern {
    None,
    Zeros,
    Flags,
    TenPattern,
    ZeroOnePattern,
    Ones,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreambleLength {
    Bits8,
    Bits16,
    Bits32,
    Bits64,
}

/// Where the transmit and receive clocks come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClockSource {
    /// Baud rate generator, driven from the synthesized reference.
    Brg,
    /// Digital PLL recovery.
    Dpll,
    RxcPin,
    TxcPin,
}

/// Device parameters applied when the link is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    pub bitrate: u32,
    pub framing: FramingMode,
    pub encoding: Encoding,
    pub crc: CrcPolicy,
    /// Deliver CRC status with each received frame.
    pub crc_return_ex: bool,
    pub idle: IdlePattern,
    pub preamble: PreamblePattern,
    pub preamble_length: PreambleLength,
    pub tx_clock: ClockSource,
    pub rx_clock: ClockSource,
    pub loopback: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            bitrate: DEFAULT_BITRATE,
            framing: FramingMode::Hdlc,
            encoding: Encoding::Nrz,
            crc: CrcPolicy::Ccitt16,
            crc_return_ex: true,
            idle: IdlePattern::AltZerosOnes,
            preamble: PreamblePattern::Ones,
            preamble_length: PreambleLength::Bits16,
            tx_clock: ClockSource::Brg,
            rx_clock: ClockSource::RxcPin,
            loopback: false,
        }
    }
}

impl LinkConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bitrate == 0 {
            return Err(ConfigError::Invalid("bitrate must be non-zero".into()));
        }
        if self.framing == FramingMode::Raw && self.crc != CrcPolicy::None {
            return Err(ConfigError::Invalid("raw framing has no CRC".into()));
        }
        Ok(())
    }
}

/// Opens and configures a link on a device path.
pub trait LinkOpener {
    type Link: Link;

    fn open(&self, device: &Path, config: &LinkConfig) -> Result<Self::Link, ConfigError>;
}

/// Negotiate the clock source, then open the link.
///
/// A negotiation failure returns before the opener is called, so the device
/// is never configured.
pub fn bring_up<N, O>(
    negotiator: &N,
    opener: &O,
    device: &Path,
    config: &LinkConfig,
) -> Result<O::Link, ConfigError>
where
    N: ClockNegotiator + ?Sized,
    O: LinkOpener + ?Sized,
{
    config.validate()?;
    negotiator.negotiate(device)?;

    info!("send HDLC data on {}", device.display());
    let mut link = opener.open(device, config)?;
    link.enable_transmitter().map_err(|source| ConfigError::Device {
        op: "enable transmitter",
        source,
    })?;
    Ok(link)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    use crate::sim::MemoryLink;

    struct FailingClock;

    impl ClockNegotiator for FailingClock {
        fn negotiate(&self, _device: &Path) -> Result<(), ConfigError> {
            Err(ConfigError::ClockNegotiation {
                program: "fsynth".into(),
                status: "exit status: 1".into(),
            })
        }
    }

    struct OkClock;

    impl ClockNegotiator for OkClock {
        fn negotiate(&self, _device: &Path) -> Result<(), ConfigError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingOpener {
        opened: Cell<usize>,
    }

    impl LinkOpener for CountingOpener {
        type Link = MemoryLink;

        fn open(&self, _device: &Path, _config: &LinkConfig) -> Result<MemoryLink, ConfigError> {
            self.opened.set(self.opened.get() + 1);
            Ok(MemoryLink::new())
        }
    }

    #[test]
    fn test_clock_failure_never_opens_link() {
        let opener = CountingOpener::default();
        let err = bring_up(&FailingClock, &opener, Path::new("/dev/ttyUSB0"), &LinkConfig::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::ClockNegotiation { .. }));
        assert_eq!(opener.opened.get(), 0);
    }

    #[test]
    fn test_bring_up_opens_once() {
        let opener = CountingOpener::default();
        let link = bring_up(&OkClock, &opener, Path::new("/dev/ttyUSB0"), &LinkConfig::default());
        assert!(link.is_ok());
        assert_eq!(opener.opened.get(), 1);
    }

    #[test]
    fn test_invalid_config_rejected_before_negotiation() {
        let opener = CountingOpener::default();
        let config = LinkConfig {
            bitrate: 0,
            ..LinkConfig::default()
        };
        let err = bring_up(&FailingClock, &opener, Path::new("/dev/x"), &config).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_default_config_matches_flight_setup() {
        let cfg = LinkConfig::default();
        assert_eq!(cfg.bitrate, 10_000_000);
        assert_eq!(cfg.framing, FramingMode::Hdlc);
        assert_eq!(cfg.idle, IdlePattern::AltZerosOnes);
        assert!(cfg.validate().is_ok());
    }
}
