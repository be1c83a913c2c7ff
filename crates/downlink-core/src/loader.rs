//! Artifact loader: reads one artifact into a buffer sized from its plan.
//!
//! Files are read as raw bytes in `chunk_size` units. Nothing is translated or
//! split on line endings.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use tracing::{debug, warn};

use crate::artifact::ArtifactDescriptor;
use crate::error::LoadError;
use crate::protocol::ChunkPlan;

/// One artifact's content, owned for the lifetime of its transmission.
///
/// The backing storage spans the whole chunk plan and is zero-filled past
/// `len`, so full-size writes of the last chunk never leave the buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledBuffer {
    data: Vec<u8>,
    len: usize,
    plan: ChunkPlan,
    /// True when the source had more bytes than the plan covers.
    truncated: bool,
}

impl FilledBuffer {
    /// Bytes actually read from the artifact.
    pub fn filled(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Whole backing region, including zero fill.
    pub fn as_padded(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn plan(&self) -> ChunkPlan {
        self.plan
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Chunks needed to send the loaded bytes.
    pub fn chunk_count(&self) -> usize {
        self.plan.chunks_for(self.len)
    }
}

/// Load `descriptor` using `chunk_size` reads.
pub fn load(descriptor: &ArtifactDescriptor, chunk_size: usize) -> Result<FilledBuffer, LoadError> {
    let plan = ChunkPlan::new(descriptor.expected_size, chunk_size).map_err(|source| {
        LoadError::Plan {
            path: descriptor.path.clone(),
            source,
        }
    })?;

    let file = File::open(&descriptor.path)
        .map_err(|e| LoadError::from_open(descriptor.path.clone(), e))?;

    let buffer = load_from(file, &descriptor.path, plan)?;
    debug!(
        path = %descriptor.path.display(),
        bytes = buffer.len(),
        chunks = buffer.chunk_count(),
        "Artifact loaded"
    );
    Ok(buffer)
}

/// Fill a plan-sized buffer from any byte source.
pub fn load_from<R: Read>(mut source: R, path: &Path, plan: ChunkPlan) -> Result<FilledBuffer, LoadError> {
    let mut data = vec![0u8; plan.capacity()];
    let mut len = 0usize;

    for idx in 0..plan.chunk_count {
        let start = idx * plan.chunk_size;
        let chunk = &mut data[start..start + plan.chunk_size];
        let n = read_chunk(&mut source, chunk).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        len += n;
        if n < plan.chunk_size {
            break; // EOF
        }
    }

    if len == 0 {
        return Err(LoadError::Empty {
            path: path.to_path_buf(),
        });
    }

    let truncated = len == plan.capacity() && has_more(&mut source);
    if truncated {
        warn!(
            path = %path.display(),
            planned = plan.capacity(),
            "Artifact is larger than its chunk plan, tail not sent"
        );
    }

    Ok(FilledBuffer {
        data,
        len,
        plan,
        truncated,
    })
}

/// Read until `buf` is full or the source is exhausted. Returns bytes read.
fn read_chunk<R: Read>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn has_more<R: Read>(source: &mut R) -> bool {
    let mut next = [0u8; 1];
    matches!(read_chunk(source, &mut next), Ok(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn plan(expected: u64) -> ChunkPlan {
        ChunkPlan::new(expected, 64).unwrap()
    }

    #[test]
    fn test_exact_fill() {
        let bytes: Vec<u8> = (0..128u32).map(|i| i as u8).collect();
        let buf = load_from(Cursor::new(bytes.clone()), Path::new("x"), plan(128)).unwrap();
        assert_eq!(buf.filled(), &bytes[..]);
        assert_eq!(buf.chunk_count(), 2);
        assert!(!buf.is_truncated());
    }

    #[test]
    fn test_short_source_is_eof_not_error() {
        let buf = load_from(Cursor::new(vec![7u8; 100]), Path::new("x"), plan(192)).unwrap();
        assert_eq!(buf.len(), 100);
        assert_eq!(buf.chunk_count(), 2);
        assert_eq!(buf.as_padded().len(), 192);
        assert!(buf.as_padded()[100..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_empty_source_is_error() {
        let err = load_from(Cursor::new(Vec::new()), Path::new("x"), plan(64)).unwrap_err();
        assert!(matches!(err, LoadError::Empty { .. }));
    }

    #[test]
    fn test_slightly_longer_source_fits_last_chunk() {
        let buf = load_from(Cursor::new(vec![1u8; 70]), Path::new("x"), plan(65)).unwrap();
        assert_eq!(buf.len(), 70);
        assert!(!buf.is_truncated());
    }

    #[test]
    fn test_oversized_source_is_truncated() {
        let buf = load_from(Cursor::new(vec![1u8; 200]), Path::new("x"), plan(64)).unwrap();
        assert_eq!(buf.len(), 64);
        assert!(buf.is_truncated());
    }

    #[test]
    fn test_line_endings_survive() {
        let mut bytes = Vec::new();
        for _ in 0..16 {
            bytes.extend_from_slice(b"\r\n\0\x1a");
        }
        let buf = load_from(Cursor::new(bytes.clone()), Path::new("x"), plan(64)).unwrap();
        assert_eq!(buf.filled(), &bytes[..]);
    }

    /// Source that hands out at most 3 bytes per read.
    struct Trickle(Cursor<Vec<u8>>);

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(3);
            self.0.read(&mut buf[..n])
        }
    }

    #[test]
    fn test_short_reads_are_reassembled() {
        let bytes = vec![9u8; 128];
        let buf = load_from(Trickle(Cursor::new(bytes.clone())), Path::new("x"), plan(128)).unwrap();
        assert_eq!(buf.filled(), &bytes[..]);
    }

    #[test]
    fn test_oversized_plan_is_load_error() {
        use crate::artifact::{ArtifactCategory, ArtifactDescriptor};

        let descriptor = ArtifactDescriptor::new("huge.roe", u64::MAX, ArtifactCategory::ScienceImage);
        let err = load(&descriptor, 4096).unwrap_err();
        assert!(matches!(err, LoadError::Plan { .. }));
    }
}
