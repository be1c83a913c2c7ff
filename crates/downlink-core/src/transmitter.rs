/// Chunked transmitter: write, then drain, one chunk at a time.
///
/// ```text
/// [buffer] --chunk_size--> write() --> drain() --> next chunk
///                          queued      clocked out at link bitrate
/// ```
///
/// Drain is the backpressure. The link's bitrate, not host buffering, sets
/// the pace. A failed write or drain ends the artifact and the run.

use sha2::{Digest, Sha256};

use crate::error::TransmitError;
use crate::link::Link;
use crate::loader::FilledBuffer;
use crate::logging::{DownlinkEvent, RunLog};

/// Bytes of a sampled chunk shown in the log.
const SAMPLE_PREVIEW: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct TransmitOptions {
    /// Write the last chunk at full `chunk_size`, zero-filled past the loaded
    /// data, for receivers that expect fixed-size frames.
    pub pad_tail: bool,
    /// 1-based chunk number to capture from each artifact.
    pub sample_chunk: Option<usize>,
}

/// Outcome of streaming one buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransmitReport {
    /// Sum of the link's write return values.
    pub bytes_accepted: u64,
    pub bytes_offered: u64,
    pub chunks: usize,
    pub short_writes: usize,
    /// SHA-256 of the accepted bytes, hex.
    pub sha256: String,
    pub sample: Option<Vec<u8>>,
}

/// Stream `buffer` to `link`.
///
/// Issues one write per planned chunk covering the loaded data and drains
/// after each. `bytes_accepted` counts only what the link reports.
pub fn transmit<L: Link + ?Sized>(
    link: &mut L,
    buffer: &FilledBuffer,
    options: &TransmitOptions,
    log: RunLog<'_>,
) -> Result<TransmitReport, TransmitError> {
    let chunk_size = buffer.plan().chunk_size;
    let chunks = buffer.chunk_count();
    let region = buffer.as_padded();

    let mut hasher = Sha256::new();
    let mut report = TransmitReport {
        bytes_accepted: 0,
        bytes_offered: 0,
        chunks,
        short_writes: 0,
        sha256: String::new(),
        sample: None,
    };

    for idx in 0..chunks {
        let start = idx * chunk_size;
        let end = if options.pad_tail {
            start + chunk_size
        } else {
            (start + chunk_size).min(buffer.len())
        };
        let chunk = &region[start..end];
        let chunk_no = idx + 1;

        let accepted = link
            .write(chunk)
            .map_err(|source| TransmitError::Write { chunk: chunk_no, source })?;

        // Block until the chunk is on the wire
        link.drain()
            .map_err(|source| TransmitError::Drain { chunk: chunk_no, source })?;

        let accepted = accepted.min(chunk.len());
        hasher.update(&chunk[..accepted]);
        report.bytes_offered += chunk.len() as u64;
        report.bytes_accepted += accepted as u64;

        if accepted < chunk.len() {
            report.short_writes += 1;
            log.emit(
                "transmitter",
                DownlinkEvent::ShortWrite {
                    chunk_idx: chunk_no,
                    offered: chunk.len(),
                    accepted,
                },
            );
        } else {
            log.emit(
                "transmitter",
                DownlinkEvent::ChunkSent {
                    chunk_idx: chunk_no,
                    accepted,
                },
            );
        }

        if options.sample_chunk == Some(chunk_no) {
            let preview = hex::encode(&chunk[..chunk.len().min(SAMPLE_PREVIEW)]);
            log.emit(
                "transmitter",
                DownlinkEvent::ChunkSample {
                    chunk_idx: chunk_no,
                    preview,
                },
            );
            report.sample = Some(chunk.to_vec());
        }
    }

    report.sha256 = hex::encode(hasher.finalize());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use std::path::Path;

    use crate::loader::load_from;
    use crate::protocol::ChunkPlan;
    use crate::sim::MemoryLink;

    fn buffer(bytes: Vec<u8>, expected: u64) -> FilledBuffer {
        let plan = ChunkPlan::new(expected, 64).unwrap();
        load_from(Cursor::new(bytes), Path::new("t"), plan).unwrap()
    }

    #[test]
    fn test_one_write_and_drain_per_chunk() {
        let mut link = MemoryLink::new();
        let cap = link.capture();
        let buf = buffer(vec![3u8; 256], 256);

        let report = transmit(&mut link, &buf, &TransmitOptions::default(), RunLog::null()).unwrap();
        assert_eq!(report.chunks, 4);
        assert_eq!(report.bytes_accepted, 256);

        let cap = cap.lock().unwrap();
        assert_eq!(cap.writes, vec![64; 4]);
        assert_eq!(cap.drains, 4);
        assert_eq!(cap.stream, vec![3u8; 256]);
    }

    #[test]
    fn test_tail_is_trimmed_by_default() {
        let mut link = MemoryLink::new();
        let cap = link.capture();
        let buf = buffer(vec![1u8; 100], 100);

        let report = transmit(&mut link, &buf, &TransmitOptions::default(), RunLog::null()).unwrap();
        assert_eq!(report.bytes_accepted, 100);
        assert_eq!(cap.lock().unwrap().writes, vec![64, 36]);
    }

    #[test]
    fn test_pad_tail_writes_full_chunks() {
        let mut link = MemoryLink::new();
        let cap = link.capture();
        let buf = buffer(vec![1u8; 100], 100);
        let opts = TransmitOptions {
            pad_tail: true,
            ..Default::default()
        };

        let report = transmit(&mut link, &buf, &opts, RunLog::null()).unwrap();
        assert_eq!(report.bytes_accepted, 128);
        let cap = cap.lock().unwrap();
        assert_eq!(cap.writes, vec![64, 64]);
        assert!(cap.stream[100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_short_writes_are_counted_from_return_value() {
        let mut link = MemoryLink::new().write_cap(60);
        let buf = buffer(vec![1u8; 128], 128);

        let report = transmit(&mut link, &buf, &TransmitOptions::default(), RunLog::null()).unwrap();
        assert_eq!(report.bytes_offered, 128);
        assert_eq!(report.bytes_accepted, 120);
        assert_eq!(report.short_writes, 2);
    }

    #[test]
    fn test_write_failure_stops_immediately() {
        let mut link = MemoryLink::new().fail_write_at(3);
        let cap = link.capture();
        let buf = buffer(vec![1u8; 320], 320);

        let err = transmit(&mut link, &buf, &TransmitOptions::default(), RunLog::null()).unwrap_err();
        assert!(matches!(err, TransmitError::Write { chunk: 3, .. }));
        let cap = cap.lock().unwrap();
        assert_eq!(cap.writes.len(), 3);
        assert_eq!(cap.drains, 2);
    }

    #[test]
    fn test_drain_failure_is_fatal() {
        let mut link = MemoryLink::new().fail_drain_at(1);
        let buf = buffer(vec![1u8; 128], 128);

        let err = transmit(&mut link, &buf, &TransmitOptions::default(), RunLog::null()).unwrap_err();
        assert!(matches!(err, TransmitError::Drain { chunk: 1, .. }));
    }

    #[test]
    fn test_sample_chunk_is_captured() {
        let bytes: Vec<u8> = (0..192u32).map(|i| (i / 64) as u8).collect();
        let mut link = MemoryLink::new();
        let buf = buffer(bytes, 192);
        let opts = TransmitOptions {
            sample_chunk: Some(2),
            ..Default::default()
        };

        let report = transmit(&mut link, &buf, &opts, RunLog::null()).unwrap();
        assert_eq!(report.sample, Some(vec![1u8; 64]));
    }

    #[test]
    fn test_digest_covers_accepted_bytes() {
        let mut link = MemoryLink::new();
        let buf = buffer(b"abc".to_vec(), 3);

        let report = transmit(&mut link, &buf, &TransmitOptions::default(), RunLog::null()).unwrap();
        assert_eq!(
            report.sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
