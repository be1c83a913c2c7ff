//! Frame terminator: marks the end of an artifact on the stream.
//!
//! The marker is a bare byte convention. It is neither escaped nor length
//! prefixed, so a payload containing it will confuse a receiver that
//! resynchronizes on it.

use crate::error::TransmitError;
use crate::link::Link;
use crate::protocol::FRAME_MARKER;

/// Write the marker and drain it. Returns the bytes the link accepted.
pub fn terminate<L: Link + ?Sized>(link: &mut L) -> Result<usize, TransmitError> {
    let accepted = link
        .write(FRAME_MARKER)
        .map_err(|source| TransmitError::Terminator { source })?;
    link.drain()
        .map_err(|source| TransmitError::Terminator { source })?;
    Ok(accepted.min(FRAME_MARKER.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::MemoryLink;

    #[test]
    fn test_writes_marker_then_drains() {
        let mut link = MemoryLink::new();
        let cap = link.capture();
        assert_eq!(terminate(&mut link).unwrap(), 5);

        let cap = cap.lock().unwrap();
        assert_eq!(cap.stream, b"smart");
        assert_eq!(cap.writes, vec![5]);
        assert_eq!(cap.drains, 1);
    }

    #[test]
    fn test_failure_is_terminator_error() {
        let mut link = MemoryLink::new().fail_drain_at(1);
        assert!(matches!(
            terminate(&mut link),
            Err(TransmitError::Terminator { .. })
        ));
    }
}
