/// The exFAT boot sector, the first sector of the boot region.
///
/// Fields named after the exFAT specification. All multi-byte fields are
/// little-endian. The structure covers exactly 512 bytes; when the volume
/// uses larger sectors the remainder of the first sector is the excess
/// space, which carries no fields.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
pub struct RawBootSector {
    /// JumpBoot
    pub jump: [u8; 3],
    /// FileSystemName
    /// Must be "EXFAT   " (three trailing spaces)
    pub fs_name: [u8; 8],
    /// MustBeZero
    /// Overlaps the FAT12/16/32 BPB packed fields so that legacy
    /// implementations do not mistake the volume for FAT
    pub must_be_zero: [u8; 53],
    /// PartitionOffset
    /// Media-relative sector offset of the partition, 0 if unknown
    pub partition_offset: [u8; 8],
    /// VolumeLength
    /// Size of the volume in sectors
    pub volume_length: [u8; 8],
    /// FatOffset
    /// Volume-relative sector offset of the first FAT
    pub fat_offset: [u8; 4],
    /// FatLength
    /// Length of each FAT in sectors
    pub fat_length: [u8; 4],
    /// ClusterHeapOffset
    /// Volume-relative sector offset of the cluster heap
    pub cluster_heap_offset: [u8; 4],
    /// ClusterCount
    /// Number of clusters in the cluster heap
    pub cluster_count: [u8; 4],
    /// FirstClusterOfRootDirectory
    pub root_cluster: [u8; 4],
    /// VolumeSerialNumber
    pub volume_serial: [u8; 4],
    /// FileSystemRevision
    /// Minor revision in the low byte, major in the high byte
    pub fs_revision: [u8; 2],
    /// VolumeFlags
    /// Not included in the boot region checksum
    pub volume_flags: [u8; 2],
    /// BytesPerSectorShift
    /// Sector size as a power of two, 9 (512B) through 12 (4KiB)
    pub bytes_per_sector_shift: u8,
    /// SectorsPerClusterShift
    /// Cluster size in sectors as a power of two, at most
    /// 25 - BytesPerSectorShift so a cluster never exceeds 32MiB
    pub sectors_per_cluster_shift: u8,
    /// NumberOfFats
    /// 1, or 2 for TexFAT volumes
    pub fat_count: u8,
    /// DriveSelect
    /// INT 13h drive number, typically 0x80
    pub drive_select: u8,
    /// PercentInUse
    /// Rounded-down percentage of allocated clusters, 0xFF if unknown.
    /// Not included in the boot region checksum
    pub percent_in_use: u8,
    /// Reserved
    pub reserved: [u8; 7],
    /// BootCode
    pub boot_code: [u8; 390],
    /// BootSignature
    /// Must be 0xAA55
    pub boot_signature: [u8; 2],
}

impl RawBootSector {
    pub fn from_bytes(bytes: &[u8]) -> &RawBootSector {
        bytemuck::from_bytes(bytes)
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> &mut RawBootSector {
        bytemuck::from_bytes_mut(bytes)
    }

    pub fn check_fs_name(&self) -> bool {
        self.fs_name == *b"EXFAT   "
    }

    pub fn check_boot_signature(&self) -> bool {
        u16::from_le_bytes(self.boot_signature) == 0xAA55
    }

    pub fn check_bytes_per_sector_shift(&self) -> bool {
        matches!(self.bytes_per_sector_shift, 9..=12)
    }

    pub fn check_sectors_per_cluster_shift(&self) -> bool {
        self.sectors_per_cluster_shift <= 25u8.saturating_sub(self.bytes_per_sector_shift)
    }
}
