//! SyncLink synchronous serial adapter on Linux.
//!
//! Bring-up sequence:
//! 1. open the tty non-blocking so a missing DCD does not stall `open`
//! 2. attach the N_HDLC line discipline
//! 3. read, modify and write back the MGSL device parameters
//! 4. set the transmit idle pattern
//! 5. switch the descriptor to blocking writes
//!
//! After that `write` queues one HDLC frame and `drain` waits on `tcdrain`.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::mem;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::{AsRawFd, IntoRawFd, RawFd};
use std::path::Path;

use libc::{c_int, c_uchar, c_ulong, c_ushort};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::link::{
    ClockSource, CrcPolicy, Encoding, FramingMode, IdlePattern, Link, LinkConfig, LinkOpener,
    PreambleLength, PreamblePattern,
};

/// HDLC line discipline number.
const N_HDLC: c_int = 13;

/// Mirror of the driver's `MGSL_PARAMS`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct MgslParams {
    mode: c_ulong,
    loopback: c_uchar,
    flags: c_ushort,
    encoding: c_uchar,
    clock_speed: c_ulong,
    addr_filter: c_uchar,
    crc_type: c_ushort,
    preamble_length: c_uchar,
    preamble: c_uchar,
    data_rate: c_ulong,
    data_bits: c_uchar,
    stop_bits: c_uchar,
    parity: c_uchar,
}

const MGSL_MODE_HDLC: c_ulong = 2;
const MGSL_MODE_RAW: c_ulong = 6;

const HDLC_FLAG_RXC_RXCPIN: c_ushort = 0x0000;
const HDLC_FLAG_RXC_DPLL: c_ushort = 0x0100;
const HDLC_FLAG_RXC_BRG: c_ushort = 0x0200;
const HDLC_FLAG_RXC_TXCPIN: c_ushort = 0x8000;
const HDLC_FLAG_TXC_TXCPIN: c_ushort = 0x0000;
const HDLC_FLAG_TXC_DPLL: c_ushort = 0x0400;
const HDLC_FLAG_TXC_BRG: c_ushort = 0x0800;
const HDLC_FLAG_TXC_RXCPIN: c_ushort = 0x0008;

const HDLC_CRC_RETURN_EX: c_ushort = 0x8000;

// Linux generic ioctl encoding: dir << 30 | size << 16 | type << 8 | nr
const IOC_NONE: c_ulong = 0;
const IOC_WRITE: c_ulong = 1;
const IOC_READ: c_ulong = 2;
const MGSL_MAGIC_IOC: c_ulong = b'm' as c_ulong;

const fn ioc(dir: c_ulong, nr: c_ulong, size: usize) -> c_ulong {
    (dir << 30) | ((size as c_ulong) << 16) | (MGSL_MAGIC_IOC << 8) | nr
}

const MGSL_IOCSPARAMS: c_ulong = ioc(IOC_WRITE, 0, mem::size_of::<MgslParams>());
const MGSL_IOCGPARAMS: c_ulong = ioc(IOC_READ, 1, mem::size_of::<MgslParams>());
const MGSL_IOCSTXIDLE: c_ulong = ioc(IOC_NONE, 2, 0);
const MGSL_IOCTXENABLE: c_ulong = ioc(IOC_NONE, 4, 0);

impl MgslParams {
    /// Overlay `config` on the parameters read back from the device.
    fn apply(&mut self, config: &LinkConfig) {
        self.mode = match config.framing {
            FramingMode::Hdlc => MGSL_MODE_HDLC,
            FramingMode::Raw => MGSL_MODE_RAW,
        };
        self.loopback = config.loopback as c_uchar;
        self.flags = rx_clock_flag(config.rx_clock) | tx_clock_flag(config.tx_clock);
        self.encoding = match config.encoding {
            Encoding::Nrz => 0,
            Encoding::Nrzb => 1,
            Encoding::NrziMark => 2,
            Encoding::NrziSpace => 3,
            Encoding::BiphaseMark => 4,
            Encoding::BiphaseSpace => 5,
            Encoding::BiphaseLevel => 6,
            Encoding::DiffBiphaseLevel => 7,
        };
        self.clock_speed = config.bitrate as c_ulong;
        self.crc_type = match config.crc {
            CrcPolicy::None => 0,
            CrcPolicy::Ccitt16 => 1,
            CrcPolicy::Ccitt32 => 2,
        };
        if config.crc_return_ex {
            self.crc_type |= HDLC_CRC_RETURN_EX;
        }
        self.preamble = match config.preamble {
            PreamblePattern::None => 0,
            PreamblePattern::Zeros => 1,
            PreamblePattern::Flags => 2,
            PreamblePattern::TenPattern => 3,
            PreamblePattern::ZeroOnePattern => 4,
            PreamblePattern::Ones => 5,
        };
        self.preamble_length = match config.preamble_length {
            PreambleLength::Bits8 => 0,
            PreambleLength::Bits16 => 1,
            PreambleLength::Bits32 => 2,
            PreambleLength::Bits64 => 3,
        };
    }
}

fn rx_clock_flag(source: ClockSource) -> c_ushort {
    match source {
        ClockSource::RxcPin => HDLC_FLAG_RXC_RXCPIN,
        ClockSource::Dpll => HDLC_FLAG_RXC_DPLL,
        ClockSource::Brg => HDLC_FLAG_RXC_BRG,
        ClockSource::TxcPin => HDLC_FLAG_RXC_TXCPIN,
    }
}

fn tx_clock_flag(source: ClockSource) -> c_ushort {
    match source {
        ClockSource::TxcPin => HDLC_FLAG_TXC_TXCPIN,
        ClockSource::Dpll => HDLC_FLAG_TXC_DPLL,
        ClockSource::Brg => HDLC_FLAG_TXC_BRG,
        ClockSource::RxcPin => HDLC_FLAG_TXC_RXCPIN,
    }
}

fn idle_value(idle: IdlePattern) -> c_int {
    match idle {
        IdlePattern::Flags => 0,
        IdlePattern::AltZerosOnes => 1,
        IdlePattern::Zeros => 2,
        IdlePattern::Ones => 3,
        IdlePattern::AltMarkSpace => 4,
        IdlePattern::Space => 5,
        IdlePattern::Mark => 6,
    }
}

fn check(rc: c_int) -> io::Result<()> {
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn device_err(op: &'static str) -> impl FnOnce(io::Error) -> ConfigError {
    move |source| ConfigError::Device { op, source }
}

/// An open, configured SyncLink port.
#[derive(Debug)]
pub struct SyncLinkPort {
    file: File,
}

impl SyncLinkPort {
    pub fn open(device: &Path, config: &LinkConfig) -> Result<Self, ConfigError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(device)
            .map_err(|source| ConfigError::Open {
                device: device.to_path_buf(),
                source,
            })?;
        let fd = file.as_raw_fd();

        let ldisc: c_int = N_HDLC;
        check(unsafe { libc::ioctl(fd, libc::TIOCSETD as _, &ldisc as *const c_int) })
            .map_err(device_err("set line discipline"))?;

        let mut params = MgslParams::default();
        check(unsafe { libc::ioctl(fd, MGSL_IOCGPARAMS as _, &mut params as *mut MgslParams) })
            .map_err(device_err("ioctl(MGSL_IOCGPARAMS)"))?;

        params.apply(config);
        debug!(?params, "SyncLink parameters");
        check(unsafe { libc::ioctl(fd, MGSL_IOCSPARAMS as _, &params as *const MgslParams) })
            .map_err(device_err("ioctl(MGSL_IOCSPARAMS)"))?;

        check(unsafe { libc::ioctl(fd, MGSL_IOCSTXIDLE as _, idle_value(config.idle)) })
            .map_err(device_err("ioctl(MGSL_IOCSTXIDLE)"))?;

        set_blocking(fd).map_err(device_err("fcntl(F_SETFL)"))?;

        info!(
            "{} configured: {} bps, {:?}, {:?}",
            device.display(),
            config.bitrate,
            config.framing,
            config.encoding
        );
        Ok(Self { file })
    }

    fn modem_lines(&self, request: c_ulong) -> io::Result<()> {
        let sigs: c_int = libc::TIOCM_RTS | libc::TIOCM_DTR;
        check(unsafe { libc::ioctl(self.file.as_raw_fd(), request as _, &sigs as *const c_int) })
    }
}

fn set_blocking(fd: RawFd) -> io::Result<()> {
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    check(flags)?;
    check(unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) })
}

impl Link for SyncLinkPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn drain(&mut self) -> io::Result<()> {
        check(unsafe { libc::tcdrain(self.file.as_raw_fd()) })
    }

    fn assert_control_signals(&mut self) -> io::Result<()> {
        info!("Turn on RTS and DTR serial outputs");
        self.modem_lines(libc::TIOCMBIS as c_ulong)
    }

    fn deassert_control_signals(&mut self) -> io::Result<()> {
        info!("Turn off RTS and DTR");
        self.modem_lines(libc::TIOCMBIC as c_ulong)
    }

    fn enable_transmitter(&mut self) -> io::Result<()> {
        let enable: c_int = 1;
        check(unsafe { libc::ioctl(self.file.as_raw_fd(), MGSL_IOCTXENABLE as _, enable) })
    }

    fn close(self) -> io::Result<()> {
        let fd = self.file.into_raw_fd();
        check(unsafe { libc::close(fd) })
    }
}

/// Opens SyncLink ports for `bring_up`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncLinkOpener;

impl LinkOpener for SyncLinkOpener {
    type Link = SyncLinkPort;

    fn open(&self, device: &Path, config: &LinkConfig) -> Result<SyncLinkPort, ConfigError> {
        SyncLinkPort::open(device, config)
    }
}
