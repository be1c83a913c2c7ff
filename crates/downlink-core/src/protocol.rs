/// Downlink stream layout.
///
/// ```text
/// [artifact 0 payload, chunk_size writes][b"smart"]
/// [artifact 1 payload, chunk_size writes][b"smart"]
/// ...
/// ```
///
/// HDLC framing, CRC and idle fill are added by the link layer. The marker is
/// not escaped: a payload that contains it is sent as-is.

use crate::error::CatalogError;

/// Default bytes per write/drain cycle.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Minimum transfer unit of the link. Chunk sizes must be a multiple of this.
pub const LINK_GRANULARITY: usize = 64;

/// Largest chunk size accepted for one write/drain cycle.
pub const MAX_CHUNK_SIZE: usize = 1 << 20;

/// Largest expected size a catalog entry may declare. The whole artifact is
/// held in memory while it is sent.
pub const MAX_ARTIFACT_SIZE: u64 = 1 << 30;

/// Artifact boundary marker written after every payload.
pub const FRAME_MARKER: &[u8; 5] = b"smart";

/// Default link bitrate (10 Mbps).
pub const DEFAULT_BITRATE: u32 = 10_000_000;

/// Seconds the link is held open after the last artifact.
pub const DEFAULT_SETTLE_SECS: u64 = 2;

/// Seconds paused between artifacts.
pub const DEFAULT_PAUSE_SECS: u64 = 2;

/// Default serial device.
pub const DEFAULT_DEVICE: &str = "/dev/ttyUSB0";

/// Number of fixed-size writes needed to cover one artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunk_size: usize,
    pub chunk_count: usize,
}

impl ChunkPlan {
    /// Plan `ceil(expected_size / chunk_size)` chunks.
    ///
    /// Rounding up means a file that is slightly longer than its configured
    /// size is still covered up to the end of its last chunk.
    pub fn new(expected_size: u64, chunk_size: usize) -> Result<Self, CatalogError> {
        check_chunk_size(chunk_size)?;
        let too_large = || CatalogError::PlanTooLarge {
            expected_size,
            max: MAX_ARTIFACT_SIZE,
        };
        if expected_size > MAX_ARTIFACT_SIZE {
            return Err(too_large());
        }
        let chunk_count = usize::try_from(expected_size.div_ceil(chunk_size as u64))
            .map_err(|_| too_large())?;
        chunk_size.checked_mul(chunk_count).ok_or_else(too_large)?;
        Ok(Self {
            chunk_size,
            chunk_count,
        })
    }

    /// Bytes spanned by the plan; the size of the transfer buffer.
    ///
    /// Cannot overflow: `new` checks the product.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.chunk_size * self.chunk_count
    }

    /// Chunks needed to cover `len` loaded bytes, capped at the plan.
    #[inline]
    pub fn chunks_for(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size).min(self.chunk_count)
    }
}

/// Reject chunk sizes that are zero, oversized, or not aligned to the link
/// granularity.
pub fn check_chunk_size(chunk_size: usize) -> Result<(), CatalogError> {
    if chunk_size > MAX_CHUNK_SIZE {
        return Err(CatalogError::ChunkTooLarge {
            chunk_size,
            max: MAX_CHUNK_SIZE,
        });
    }
    if chunk_size == 0 || chunk_size % LINK_GRANULARITY != 0 {
        return Err(CatalogError::ChunkAlignment {
            chunk_size,
            granularity: LINK_GRANULARITY,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_exact_multiple() {
        let plan = ChunkPlan::new(16_777_216, 4096).unwrap();
        assert_eq!(plan.chunk_count, 4096);
        assert_eq!(plan.capacity(), 16_777_216);

        let plan = ChunkPlan::new(28_672, 4096).unwrap();
        assert_eq!(plan.chunk_count, 7);
    }

    #[test]
    fn test_plan_rounds_up() {
        let plan = ChunkPlan::new(4097, 4096).unwrap();
        assert_eq!(plan.chunk_count, 2);
        assert_eq!(plan.capacity(), 8192);

        let plan = ChunkPlan::new(1, 4096).unwrap();
        assert_eq!(plan.chunk_count, 1);
    }

    #[test]
    fn test_chunks_for_is_capped() {
        let plan = ChunkPlan::new(10_000, 4096).unwrap();
        assert_eq!(plan.chunks_for(0), 0);
        assert_eq!(plan.chunks_for(4096), 1);
        assert_eq!(plan.chunks_for(4097), 2);
        assert_eq!(plan.chunks_for(1 << 20), 3);
    }

    #[test]
    fn test_chunk_alignment() {
        assert!(ChunkPlan::new(100, 0).is_err());
        assert!(ChunkPlan::new(100, 1000).is_err());
        assert!(ChunkPlan::new(100, 1024).is_ok());
        assert!(ChunkPlan::new(100, LINK_GRANULARITY).is_ok());
    }

    #[test]
    fn test_plan_rejects_oversized_artifacts() {
        assert!(matches!(
            ChunkPlan::new(u64::MAX, 4096),
            Err(CatalogError::PlanTooLarge { expected_size: u64::MAX, .. })
        ));
        assert!(matches!(
            ChunkPlan::new(1 << 40, 4096),
            Err(CatalogError::PlanTooLarge { .. })
        ));

        let plan = ChunkPlan::new(MAX_ARTIFACT_SIZE, 4096).unwrap();
        assert_eq!(plan.capacity() as u64, MAX_ARTIFACT_SIZE);
    }

    #[test]
    fn test_chunk_size_upper_bound() {
        assert!(check_chunk_size(MAX_CHUNK_SIZE).is_ok());
        assert!(matches!(
            check_chunk_size(usize::MAX - 63),
            Err(CatalogError::ChunkTooLarge { .. })
        ));
    }
}
