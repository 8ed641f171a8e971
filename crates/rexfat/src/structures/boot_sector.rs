use bitflags::bitflags;

use crate::FormatError;

use super::fat::constants::EXFAT_FIRST_CLUSTER;
#[cfg(feature = "write")]
use super::ExfatOps;
use super::raw::boot_sector::RawBootSector;

bitflags! {
    /// VolumeFlags
    ///
    /// Runtime state of the volume. These bytes are excluded from the
    /// boot region checksum so drivers can update them in place.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VolumeFlags: u16 {
        /// Index of the active FAT and bitmap, 0 = first
        const ACTIVE_FAT = 1 << 0;
        /// The volume may be inconsistent, set while mounted dirty
        const VOLUME_DIRTY = 1 << 1;
        /// The driver has observed media failures
        const MEDIA_FAILURE = 1 << 2;
        /// Reserved, cleared when the flags are rewritten
        const CLEAR_TO_ZERO = 1 << 3;
    }
}

/// The info variant of the boot sector, which contains the validated
/// geometry of the volume in the current endianness. The alignment and
/// size is not guaranteed, so converting between raw and info structs
/// requires the use of a conversion method instead of simply casting
/// bytes.
#[derive(Debug, Clone, Copy)]
pub struct BootSectorInfo {
    /// Volume size in sectors
    pub volume_length: u64,
    /// First FAT, in sectors from the volume start
    pub fat_offset: u32,
    /// Length of each FAT in sectors
    pub fat_length: u32,
    /// Cluster heap, in sectors from the volume start
    pub cluster_heap_offset: u32,
    pub cluster_count: u32,
    pub root_cluster: u32,
    pub volume_serial: u32,
    pub volume_flags: VolumeFlags,
    pub bytes_per_sector_shift: u8,
    pub sectors_per_cluster_shift: u8,
    pub fat_count: u8,
    pub percent_in_use: u8,
}

impl BootSectorInfo {
    #[inline]
    pub fn bytes_per_sector(&self) -> u32 {
        1u32 << self.bytes_per_sector_shift
    }

    #[inline]
    pub fn sectors_per_cluster(&self) -> u32 {
        1u32 << self.sectors_per_cluster_shift
    }

    /// Cluster size in bytes. At most 32MiB, so it always fits in u32.
    #[inline]
    pub fn cluster_size(&self) -> u32 {
        1u32 << (self.bytes_per_sector_shift + self.sectors_per_cluster_shift)
    }

    /// Largest bitmap the cluster count permits, one bit per cluster.
    #[inline]
    pub fn max_bitmap_size(&self) -> u64 {
        (self.cluster_count as u64).div_ceil(8)
    }

    /// Converts a cluster index to its absolute byte offset on the
    /// device. Cluster numbering starts at 2; the heap holds
    /// `cluster_count` clusters.
    pub fn cluster_to_offset(&self, cluster: u32) -> Result<u64, FormatError> {
        if cluster < EXFAT_FIRST_CLUSTER
            || (cluster - EXFAT_FIRST_CLUSTER) as u64 >= self.cluster_count as u64
        {
            return Err(FormatError::ClusterOutOfRange(cluster));
        }
        let heap = (self.cluster_heap_offset as u64) << self.bytes_per_sector_shift;
        Ok(heap
            + (((cluster - EXFAT_FIRST_CLUSTER) as u64)
                << (self.bytes_per_sector_shift + self.sectors_per_cluster_shift)))
    }

    /// Byte offset of the FAT entry for `cluster` in the first FAT.
    /// Entries 0 and 1 are the media descriptor pair and are addressable
    /// even though no cluster carries those indices.
    pub fn fat_entry_offset(&self, cluster: u32) -> Result<u64, FormatError> {
        if cluster as u64 >= self.cluster_count as u64 + EXFAT_FIRST_CLUSTER as u64 {
            return Err(FormatError::ClusterOutOfRange(cluster));
        }
        Ok(((self.fat_offset as u64) << self.bytes_per_sector_shift) + cluster as u64 * 4)
    }
}

impl TryFrom<&RawBootSector> for BootSectorInfo {
    type Error = FormatError;

    fn try_from(raw: &RawBootSector) -> Result<Self, Self::Error> {
        if !raw.check_fs_name() {
            return Err(FormatError::BadSignature);
        }

        if !raw.check_boot_signature() {
            return Err(FormatError::BadSignature);
        }

        if !raw.check_bytes_per_sector_shift() {
            return Err(FormatError::BogusGeometry("BytesPerSectorShift"));
        }

        if !raw.check_sectors_per_cluster_shift() {
            return Err(FormatError::BogusGeometry("SectorsPerClusterShift"));
        }

        let volume_length = u64::from_le_bytes(raw.volume_length);
        let cluster_heap_offset = u32::from_le_bytes(raw.cluster_heap_offset);
        let cluster_count = u32::from_le_bytes(raw.cluster_count);
        let root_cluster = u32::from_le_bytes(raw.root_cluster);

        if cluster_count == 0 {
            return Err(FormatError::BogusGeometry("ClusterCount"));
        }

        if root_cluster < EXFAT_FIRST_CLUSTER
            || (root_cluster - EXFAT_FIRST_CLUSTER) as u64 >= cluster_count as u64
        {
            return Err(FormatError::BogusGeometry("FirstClusterOfRootDirectory"));
        }

        // Every cluster of the heap must lie inside the volume
        let heap_sectors = (cluster_count as u64) << raw.sectors_per_cluster_shift;
        if cluster_heap_offset as u64 + heap_sectors > volume_length {
            return Err(FormatError::BogusGeometry("VolumeLength"));
        }

        Ok(BootSectorInfo {
            volume_length,
            fat_offset: u32::from_le_bytes(raw.fat_offset),
            fat_length: u32::from_le_bytes(raw.fat_length),
            cluster_heap_offset,
            cluster_count,
            root_cluster,
            volume_serial: u32::from_le_bytes(raw.volume_serial),
            volume_flags: VolumeFlags::from_bits_retain(u16::from_le_bytes(raw.volume_flags)),
            bytes_per_sector_shift: raw.bytes_per_sector_shift,
            sectors_per_cluster_shift: raw.sectors_per_cluster_shift,
            fat_count: raw.fat_count,
            percent_in_use: raw.percent_in_use,
        })
    }
}

/// The first sector of the boot region, viewed in place.
#[repr(transparent)]
#[derive(Copy, Clone, bytemuck::AnyBitPattern, bytemuck::NoUninit)]
pub struct BootSector {
    data: RawBootSector,
}

impl BootSector {
    pub fn from_bytes(bytes: &[u8; 512]) -> &Self {
        bytemuck::cast_ref(bytes)
    }

    pub fn from_bytes_mut(bytes: &mut [u8; 512]) -> &mut Self {
        bytemuck::cast_mut(bytes)
    }

    /// Decodes and validates the geometry. Device bytes are untrusted,
    /// so this fails rather than panics on a malformed sector.
    pub fn info(&self) -> Result<BootSectorInfo, FormatError> {
        BootSectorInfo::try_from(&self.data)
    }

    /// Create a new exFAT boot sector from layout parameters
    #[cfg(feature = "write")]
    pub fn create(ops: &ExfatOps) -> Self {
        Self {
            data: RawBootSector {
                jump: [0xEB, 0x76, 0x90],
                fs_name: *b"EXFAT   ",
                must_be_zero: [0; 53],
                partition_offset: 0u64.to_le_bytes(),
                volume_length: ops.volume_length.to_le_bytes(),
                fat_offset: ops.fat_offset.to_le_bytes(),
                fat_length: ops.fat_length.to_le_bytes(),
                cluster_heap_offset: ops.cluster_heap_offset.to_le_bytes(),
                cluster_count: ops.cluster_count.to_le_bytes(),
                root_cluster: ops.root_cluster.to_le_bytes(),
                volume_serial: ops.volume_serial.to_le_bytes(),
                // Revision 1.00
                fs_revision: [0x00, 0x01],
                volume_flags: 0u16.to_le_bytes(),
                bytes_per_sector_shift: ops.bytes_per_sector_shift,
                sectors_per_cluster_shift: ops.sectors_per_cluster_shift,
                fat_count: ops.fat_count,
                drive_select: ops.drive_select,
                percent_in_use: ops.percent_in_use,
                reserved: [0; 7],
                boot_code: [0; 390],
                boot_signature: 0xAA55u16.to_le_bytes(),
            },
        }
    }

    pub fn copy_to_bytes(&self, bytes: &mut [u8; 512]) {
        bytes.copy_from_slice(bytemuck::bytes_of(self));
    }
}
