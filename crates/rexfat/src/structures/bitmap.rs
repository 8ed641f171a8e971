//! Cluster allocation bitmap accounting
//!
//! One bit per cluster, bit 0 of byte 0 standing for cluster 2. The
//! bitmap lives in the cluster heap at the position its directory entry
//! declares.

use crate::FormatError;

use super::fat::constants::EXFAT_FIRST_CLUSTER;

/// Population count for every byte value.
const USED_BITS: [u8; 256] = {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        table[i] = (i as u8).count_ones() as u8;
        i += 1;
    }
    table
};

/// Counts the set bits of the whole buffer via the byte table.
///
/// Padding bits in the final partial byte are counted too; a well-formed
/// volume keeps them zero.
pub fn count_used_clusters(bitmap: &[u8]) -> u32 {
    bitmap
        .iter()
        .map(|byte| USED_BITS[*byte as usize] as u32)
        .sum()
}

fn is_bit_used(bitmap: &[u8], index: u32) -> bool {
    match bitmap.get((index / 8) as usize) {
        Some(byte) => byte & (1 << (index % 8)) != 0,
        // Bits past the buffer cannot be allocated from
        None => true,
    }
}

/// First-fit search for `min_length` consecutive free clusters.
///
/// The scan begins at `start` (clamped to the first data cluster) and
/// returns the first cluster of the run, or `None` when no run of that
/// length exists before the end of the heap.
pub fn find_free_run(bitmap: &[u8], cluster_count: u32, start: u32, min_length: u32) -> Option<u32> {
    let min_length = min_length.max(1);
    let end = cluster_count.checked_add(EXFAT_FIRST_CLUSTER)?;

    let mut run_start = 0;
    let mut run_len = 0u32;
    for cluster in start.max(EXFAT_FIRST_CLUSTER)..end {
        if is_bit_used(bitmap, cluster - EXFAT_FIRST_CLUSTER) {
            run_len = 0;
        } else {
            if run_len == 0 {
                run_start = cluster;
            }
            run_len += 1;
            if run_len >= min_length {
                return Some(run_start);
            }
        }
    }
    None
}

/// An owned allocation bitmap together with the cluster count it covers.
///
/// Reading a volume's bitmap copies it out of the cluster heap; the
/// buffer length is whatever the bitmap entry declared, which may fall
/// short of covering every cluster on a damaged volume. Clusters beyond
/// the buffer's coverage fail with [`FormatError::ClusterOutOfRange`].
#[derive(Debug, Clone)]
pub struct AllocationBitmap {
    data: alloc::vec::Vec<u8>,
    cluster_count: u32,
}

impl AllocationBitmap {
    pub fn from_bytes(bytes: &[u8], cluster_count: u32) -> Self {
        Self {
            data: bytes.to_vec(),
            cluster_count,
        }
    }

    /// A fully free bitmap sized for `cluster_count` clusters
    #[cfg(feature = "write")]
    pub fn new_empty(cluster_count: u32) -> Self {
        Self {
            data: alloc::vec![0u8; (cluster_count as u64).div_ceil(8) as usize],
            cluster_count,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn cluster_count(&self) -> u32 {
        self.cluster_count
    }

    pub fn used_clusters(&self) -> u32 {
        count_used_clusters(&self.data)
    }

    /// Free clusters, saturating when padding bits inflate the used
    /// count past the cluster count.
    pub fn free_clusters(&self) -> u32 {
        self.cluster_count.saturating_sub(self.used_clusters())
    }

    fn bit_index(&self, cluster: u32) -> Result<u32, FormatError> {
        if cluster < EXFAT_FIRST_CLUSTER
            || (cluster - EXFAT_FIRST_CLUSTER) >= self.cluster_count
        {
            return Err(FormatError::ClusterOutOfRange(cluster));
        }
        let index = cluster - EXFAT_FIRST_CLUSTER;
        if (index / 8) as usize >= self.data.len() {
            return Err(FormatError::ClusterOutOfRange(cluster));
        }
        Ok(index)
    }

    pub fn is_used(&self, cluster: u32) -> Result<bool, FormatError> {
        let index = self.bit_index(cluster)?;
        Ok(self.data[(index / 8) as usize] & (1 << (index % 8)) != 0)
    }

    #[cfg(feature = "write")]
    pub fn set_used(&mut self, cluster: u32) -> Result<(), FormatError> {
        let index = self.bit_index(cluster)?;
        self.data[(index / 8) as usize] |= 1 << (index % 8);
        Ok(())
    }

    #[cfg(feature = "write")]
    pub fn set_free(&mut self, cluster: u32) -> Result<(), FormatError> {
        let index = self.bit_index(cluster)?;
        self.data[(index / 8) as usize] &= !(1 << (index % 8));
        Ok(())
    }

    /// First-fit allocation search, see [`find_free_run`].
    #[cfg(feature = "write")]
    pub fn find_free_run(&self, start: u32, min_length: u32) -> Option<u32> {
        find_free_run(&self.data, self.cluster_count, start, min_length)
    }
}
