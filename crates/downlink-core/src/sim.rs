//! In-memory link for tests and bench runs without hardware.
//!
//! Records every write and drain. Faults can be injected on the Nth write or
//! drain (1-based) and writes can be capped to simulate short writes.

use std::io;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ConfigError;
use crate::link::{Link, LinkConfig, LinkOpener};

/// What the link saw. Shared so it can be inspected after the link is closed.
#[derive(Debug, Default, Clone)]
pub struct Capture {
    /// Every accepted byte, in order.
    pub stream: Vec<u8>,
    /// Bytes offered by each write call.
    pub writes: Vec<usize>,
    pub drains: usize,
    pub signals_asserted: bool,
    pub transmitter_enabled: bool,
    pub closed: usize,
}

#[derive(Debug, Default, Clone, Copy)]
struct Faults {
    fail_write: Option<usize>,
    fail_drain: Option<usize>,
    write_cap: Option<usize>,
}

#[derive(Debug, Default)]
pub struct MemoryLink {
    capture: Arc<Mutex<Capture>>,
    faults: Faults,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `n`th write call with EIO.
    pub fn fail_write_at(mut self, n: usize) -> Self {
        self.faults.fail_write = Some(n);
        self
    }

    /// Fail the `n`th drain call with EIO.
    pub fn fail_drain_at(mut self, n: usize) -> Self {
        self.faults.fail_drain = Some(n);
        self
    }

    /// Accept at most `cap` bytes per write.
    pub fn write_cap(mut self, cap: usize) -> Self {
        self.faults.write_cap = Some(cap);
        self
    }

    /// Handle on the capture that outlives the link.
    pub fn capture(&self) -> Arc<Mutex<Capture>> {
        self.capture.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Capture> {
        // A poisoned capture only happens if a test already panicked.
        self.capture.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn eio() -> io::Error {
    io::Error::from_raw_os_error(5)
}

impl Link for MemoryLink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let faults = self.faults;
        let mut cap = self.lock();
        cap.writes.push(buf.len());
        if faults.fail_write == Some(cap.writes.len()) {
            return Err(eio());
        }
        let n = faults.write_cap.map_or(buf.len(), |c| c.min(buf.len()));
        cap.stream.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn drain(&mut self) -> io::Result<()> {
        let faults = self.faults;
        let mut cap = self.lock();
        cap.drains += 1;
        if faults.fail_drain == Some(cap.drains) {
            return Err(eio());
        }
        Ok(())
    }

    fn assert_control_signals(&mut self) -> io::Result<()> {
        self.lock().signals_asserted = true;
        Ok(())
    }

    fn deassert_control_signals(&mut self) -> io::Result<()> {
        self.lock().signals_asserted = false;
        Ok(())
    }

    fn enable_transmitter(&mut self) -> io::Result<()> {
        self.lock().transmitter_enabled = true;
        Ok(())
    }

    fn close(self) -> io::Result<()> {
        self.lock().closed += 1;
        Ok(())
    }
}

/// Opens a fresh [`MemoryLink`] for any device path.
#[derive(Debug, Default, Clone, Copy)]
pub struct MemoryOpener;

impl LinkOpener for MemoryOpener {
    type Link = MemoryLink;

    fn open(&self, _device: &Path, _config: &LinkConfig) -> Result<MemoryLink, ConfigError> {
        Ok(MemoryLink::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_writes_and_drains() {
        let mut link = MemoryLink::new();
        let cap = link.capture();
        assert_eq!(link.write(b"abc").unwrap(), 3);
        link.drain().unwrap();
        link.close().unwrap();

        let cap = cap.lock().unwrap();
        assert_eq!(cap.stream, b"abc");
        assert_eq!(cap.writes, vec![3]);
        assert_eq!(cap.drains, 1);
        assert_eq!(cap.closed, 1);
    }

    #[test]
    fn test_fault_injection() {
        let mut link = MemoryLink::new().fail_write_at(2).write_cap(2);
        assert_eq!(link.write(b"abcd").unwrap(), 2);
        let err = link.write(b"abcd").unwrap_err();
        assert_eq!(err.raw_os_error(), Some(5));
    }

    #[test]
    fn test_opener_enables_fresh_link() {
        let link = crate::link::bring_up(
            &crate::clock::NoNegotiation,
            &MemoryOpener,
            Path::new("/dev/null"),
            &LinkConfig::default(),
        )
        .unwrap();
        let cap = link.capture();
        assert!(cap.lock().unwrap().transmitter_enabled);
    }
}
