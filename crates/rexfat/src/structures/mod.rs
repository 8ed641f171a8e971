//! Structures for the exFAT file system
//!
//! Raw byte structures for the exFAT file system are defined in the `raw` module.
//! The `boot_sector` module decodes and validates the boot sector into a geometry record.
//! The `fat` module defines the FAT table view and cluster chain references.
//! The `bitmap` module defines the cluster allocation bitmap accounting.
//! The `directory` module defines the directory entry set engine and the entry decoders.
//! The `checksum` module holds the rolling checksums shared by all of the above.
//! Each raw structure has an info variant carrying the decoded fields in the current
//! endianness; converting between the two goes through a conversion method instead of
//! simply casting bytes.

pub mod checksum;
pub mod raw;

#[cfg(feature = "read")]
pub mod bitmap;
#[cfg(feature = "read")]
pub mod boot_sector;
#[cfg(feature = "read")]
pub mod directory;
#[cfg(feature = "read")]
pub mod fat;
#[cfg(feature = "read")]
pub mod time;

/// Layout parameters for a new exFAT volume.
///
/// These feed [`boot_sector::BootSector::create`]; the free-space layout
/// itself (where the bitmap, upcase table and root directory land) is
/// decided by the formatting tool, which overrides `root_cluster` once it
/// has placed them and writes the entries through the builders in
/// [`directory`].
#[cfg(feature = "write")]
#[derive(Debug, Clone)]
pub struct ExfatOps {
    /// Volume length in sectors
    pub volume_length: u64,
    /// First FAT offset in sectors
    pub fat_offset: u32,
    /// FAT length in sectors
    pub fat_length: u32,
    /// Cluster heap offset in sectors
    pub cluster_heap_offset: u32,
    pub cluster_count: u32,
    pub root_cluster: u32,
    pub volume_serial: u32,
    pub bytes_per_sector_shift: u8,
    pub sectors_per_cluster_shift: u8,
    pub fat_count: u8,
    pub drive_select: u8,
    pub percent_in_use: u8,
}

#[cfg(feature = "write")]
impl ExfatOps {
    #[cfg(feature = "std")]
    fn current_volume_serial(seed: u32) -> u32 {
        // We get the current time in seconds since the epoch
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        let time_part = (now.as_secs() as u32) ^ (now.as_secs().wrapping_shr(32) as u32);
        // We make it seem 'random' by xoring it with the seed
        time_part ^ seed
    }

    #[cfg(not(feature = "std"))]
    fn current_volume_serial(seed: u32) -> u32 {
        // We attempt to make it seem random
        let part_1 = seed ^ 0x12345678;
        let part_2 = part_1 ^ (part_1 >> 3);
        part_2 ^ (part_2 >> 5)
    }

    /// Computes a layout for a volume of the given length in sectors,
    /// using 512-byte sectors and the cluster size recommended for the
    /// volume size.
    pub fn recommended_config_for(volume_length: u64) -> Self {
        let bytes_per_sector_shift = 9u8;
        let sectors_per_cluster_shift =
            Self::recommended_cluster_shift(volume_length << bytes_per_sector_shift);

        let mut ops = Self {
            volume_length,
            fat_offset: 0,
            fat_length: 0,
            cluster_heap_offset: 0,
            cluster_count: 0,
            root_cluster: fat::constants::EXFAT_FIRST_CLUSTER,
            volume_serial: Self::current_volume_serial(volume_length as u32),
            bytes_per_sector_shift,
            sectors_per_cluster_shift,
            fat_count: 1,
            drive_select: 0x80,
            percent_in_use: 0,
        };
        ops.recompute_layout();
        ops
    }

    /// Recomputes the FAT and cluster heap placement from the volume
    /// length and the sector/cluster shifts.
    pub fn recompute_layout(&mut self) {
        let sector_size = 1u64 << self.bytes_per_sector_shift;
        let sectors_per_cluster = 1u64 << self.sectors_per_cluster_shift;

        // 24 sectors cover the main and backup boot regions.
        self.fat_offset = 24;
        // A first estimate of the cluster count sizes the FAT; the final
        // count is whatever fits behind the heap offset.
        let estimate = self.volume_length / sectors_per_cluster;
        let fat_bytes = (estimate + 2) * 4;
        self.fat_length = fat_bytes.div_ceil(sector_size) as u32;

        let heap_start = self.fat_offset as u64 + self.fat_length as u64;
        self.cluster_heap_offset = heap_start.next_multiple_of(sectors_per_cluster) as u32;
        self.cluster_count = (self
            .volume_length
            .saturating_sub(self.cluster_heap_offset as u64)
            / sectors_per_cluster) as u32;
    }

    fn recommended_cluster_shift(volume_bytes: u64) -> u8 {
        const GIB: u64 = 1024 * 1024 * 1024;
        // 4KiB clusters below 256MiB, 32KiB up to 32GiB, 128KiB beyond
        match volume_bytes {
            0..=0x0FFF_FFFF => 3,
            _ if volume_bytes <= 32 * GIB => 6,
            _ => 8,
        }
    }
}

#[cfg(all(test, feature = "write"))]
mod tests {
    use super::*;

    #[test]
    fn test_recommended_layout_is_consistent() {
        // 1GiB volume, 512-byte sectors
        let ops = ExfatOps::recommended_config_for(0x20_0000);
        let sectors_per_cluster = 1u64 << ops.sectors_per_cluster_shift;
        assert_eq!(ops.fat_offset, 24);
        // The FAT must hold an entry for every cluster plus the two reserved ones
        let fat_capacity = (ops.fat_length as u64) << ops.bytes_per_sector_shift;
        assert!(fat_capacity >= (ops.cluster_count as u64 + 2) * 4);
        // The heap must start past the FAT and stay cluster aligned
        assert!(ops.cluster_heap_offset as u64 >= ops.fat_offset as u64 + ops.fat_length as u64);
        assert_eq!(ops.cluster_heap_offset as u64 % sectors_per_cluster, 0);
        // Every cluster must fit inside the volume
        assert!(
            ops.cluster_heap_offset as u64 + ops.cluster_count as u64 * sectors_per_cluster
                <= ops.volume_length
        );
    }

    #[test]
    fn test_cluster_shift_by_volume_size() {
        assert_eq!(ExfatOps::recommended_cluster_shift(64 * 1024 * 1024), 3);
        assert_eq!(ExfatOps::recommended_cluster_shift(1024 * 1024 * 1024), 6);
        assert_eq!(
            ExfatOps::recommended_cluster_shift(64 * 1024 * 1024 * 1024),
            8
        );
    }
}
