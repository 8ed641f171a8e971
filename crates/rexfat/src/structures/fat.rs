//! File Allocation Table
//!
//! exFAT keeps one FAT entry per cluster, 4 bytes little-endian, but
//! only chains that are not marked contiguous ever consult it. Entries
//! 0 and 1 hold the media descriptor pair instead of cluster links.

pub mod constants {
    pub const EXFAT_CLUSTER_FREE: u32 = 0x00000000;
    pub const EXFAT_CLUSTER_BAD: u32 = 0xFFFFFFF7;
    pub const EXFAT_MEDIA_PREFIX: u32 = 0xFFFFFFF8;
    pub const EXFAT_CLUSTER_LAST: u32 = 0xFFFFFFFF;

    /// Data clusters are numbered from 2
    pub const EXFAT_FIRST_CLUSTER: u32 = 2;
}

/// A decoded FAT entry.
///
/// Any value that is not an end or bad marker is a link; whether the
/// linked cluster actually lies inside the heap is the caller's check,
/// since the FAT itself does not know the cluster count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterRef {
    Data(u32),
    EndOfChain,
    BadCluster,
}

impl ClusterRef {
    pub fn from_raw(value: u32) -> Self {
        match value {
            constants::EXFAT_CLUSTER_LAST => Self::EndOfChain,
            constants::EXFAT_CLUSTER_BAD => Self::BadCluster,
            value => Self::Data(value),
        }
    }
}

/// An in-memory view over a FAT region.
///
/// The entries stay in their on-disk byte order; keeping them as byte
/// quads means the view can sit over any buffer without alignment
/// requirements.
#[repr(transparent)]
pub struct Fat {
    pub entries: [[u8; 4]],
}

impl Fat {
    pub fn from_bytes(bytes: &[u8]) -> &Self {
        assert!(bytes.len() % 4 == 0);
        let entries = bytemuck::cast_slice::<u8, [u8; 4]>(bytes);
        // SAFETY: 'Fat' is repr(transparent) over '[[u8; 4]]'
        // so the fat pointer is safe to cast
        unsafe { &*(entries as *const [[u8; 4]] as *const Fat) }
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> &mut Self {
        assert!(bytes.len() % 4 == 0);
        let entries = bytemuck::cast_slice_mut::<u8, [u8; 4]>(bytes);
        // SAFETY: 'Fat' is repr(transparent) over '[[u8; 4]]'
        // so the fat pointer is safe to cast
        unsafe { &mut *(entries as *mut [[u8; 4]] as *mut Fat) }
    }

    pub fn entry_count(&self) -> u32 {
        self.entries.len() as u32
    }

    /// Decodes the entry for `cluster`.
    ///
    /// Panics if `cluster` is outside the table; the view covers
    /// whatever buffer it was built over.
    pub fn entry(&self, cluster: u32) -> ClusterRef {
        ClusterRef::from_raw(u32::from_le_bytes(self.entries[cluster as usize]))
    }

    /// Writes the media descriptor pair into entries 0 and 1.
    #[cfg(feature = "write")]
    pub fn init(&mut self) {
        assert!(self.entries.len() >= 2);
        self.entries[0] = constants::EXFAT_MEDIA_PREFIX.to_le_bytes();
        self.entries[1] = constants::EXFAT_CLUSTER_LAST.to_le_bytes();
    }

    #[cfg(feature = "write")]
    pub fn set_entry(&mut self, cluster: u32, value: u32) {
        self.entries[cluster as usize] = value.to_le_bytes();
    }

    /// Links the given clusters into one chain, terminating the last.
    #[cfg(feature = "write")]
    pub fn write_chain(&mut self, clusters: &[u32]) {
        for pair in clusters.windows(2) {
            self.set_entry(pair[0], pair[1]);
        }
        if let Some(last) = clusters.last() {
            self.set_entry(*last, constants::EXFAT_CLUSTER_LAST);
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cluster_ref_decoding() {
        assert_eq!(ClusterRef::from_raw(0xFFFF_FFFF), ClusterRef::EndOfChain);
        assert_eq!(ClusterRef::from_raw(0xFFFF_FFF7), ClusterRef::BadCluster);
        assert_eq!(ClusterRef::from_raw(7), ClusterRef::Data(7));
        // Free and media descriptor values decode as links, range
        // checking is up to the chain walker
        assert_eq!(ClusterRef::from_raw(0), ClusterRef::Data(0));
        assert_eq!(
            ClusterRef::from_raw(0xFFFF_FFF8),
            ClusterRef::Data(0xFFFF_FFF8)
        );
    }

    #[test]
    fn test_entry_reads_little_endian() {
        let bytes = [0x05, 0x00, 0x00, 0x00, 0xF7, 0xFF, 0xFF, 0xFF];
        let fat = Fat::from_bytes(&bytes);
        assert_eq!(fat.entry_count(), 2);
        assert_eq!(fat.entry(0), ClusterRef::Data(5));
        assert_eq!(fat.entry(1), ClusterRef::BadCluster);
    }

    #[cfg(feature = "write")]
    #[test]
    fn test_init_writes_media_pair() {
        let mut bytes = [0u8; 16];
        let fat = Fat::from_bytes_mut(&mut bytes);
        fat.init();
        assert_eq!(fat.entry(0), ClusterRef::Data(0xFFFF_FFF8));
        assert_eq!(fat.entry(1), ClusterRef::EndOfChain);
        assert_eq!(fat.entry(2), ClusterRef::Data(0));
    }

    #[cfg(feature = "write")]
    #[test]
    fn test_write_chain() {
        let mut bytes = [0u8; 64];
        let fat = Fat::from_bytes_mut(&mut bytes);
        fat.write_chain(&[5, 6, 9]);
        assert_eq!(fat.entry(5), ClusterRef::Data(6));
        assert_eq!(fat.entry(6), ClusterRef::Data(9));
        assert_eq!(fat.entry(9), ClusterRef::EndOfChain);
        // Untouched entries stay free
        assert_eq!(fat.entry(7), ClusterRef::Data(0));
    }
}
