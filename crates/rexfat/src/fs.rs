//! Volume session: an opened device plus its validated geometry.
//!
//! [`Exfat`] reads the boot sector once, keeps the decoded
//! [`BootSectorInfo`], and drives every later metadata scan through it.
//! It is generic over [`DiskReader`], so the same code inspects an image
//! file, a block device, or an in-memory buffer.

use alloc::string::String;
use alloc::vec::Vec;

use crate::disk::DiskReader;
use crate::structures::bitmap::AllocationBitmap;
use crate::structures::boot_sector::{BootSector, BootSectorInfo};
use crate::structures::directory::{DentryFilter, DentrySet, Directory};
use crate::structures::fat::ClusterRef;
use crate::structures::raw::dentry::entry_type;
use crate::{ExfatError, FormatError};

/// Upper bound on the upcase table: one 16-bit mapping per BMP code
/// point.
const MAX_UPCASE_SIZE: u64 = 0x10000 * 2;

/// Cluster usage as the allocation bitmap accounts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterStats {
    pub total: u32,
    pub used: u32,
    pub free: u32,
}

/// An opened exFAT volume.
pub struct Exfat<D: DiskReader> {
    device: D,
    info: BootSectorInfo,
}

impl<D: DiskReader> core::fmt::Debug for Exfat<D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Exfat").field("info", &self.info).finish()
    }
}

impl<D: DiskReader> Exfat<D> {
    /// Reads the boot sector at offset 0, validates it, and keeps the
    /// device handle for later scans.
    pub fn open(mut device: D) -> Result<Self, ExfatError> {
        let mut sector = [0u8; 512];
        device.read_bytes(0, &mut sector)?;
        let info = BootSector::from_bytes(&sector).info()?;
        log::debug!(
            "Opened exFAT volume: {} sectors, {} clusters, root at cluster {}",
            info.volume_length,
            info.cluster_count,
            info.root_cluster
        );
        Ok(Self { device, info })
    }

    pub fn info(&self) -> &BootSectorInfo {
        &self.info
    }

    /// Gives the device handle back.
    pub fn into_device(self) -> D {
        self.device
    }

    pub fn root_directory(&self) -> Directory {
        Directory::root(&self.info)
    }

    /// The FAT entry for `cluster`, range checks included.
    pub fn next_cluster(&mut self, cluster: u32) -> Result<ClusterRef, ExfatError> {
        let offset = self.info.fat_entry_offset(cluster)?;
        let mut raw = [0u8; 4];
        self.device.read_bytes(offset, &mut raw)?;
        Ok(ClusterRef::from_raw(u32::from_le_bytes(raw)))
    }

    /// Scans the root directory for the first set `filter` accepts.
    pub fn find_root_entry<P: FnMut(&DentrySet) -> bool>(
        &mut self,
        filter: &mut DentryFilter<P>,
    ) -> Result<Option<DentrySet>, ExfatError> {
        let root = self.root_directory();
        root.find_entry(&mut self.device, &self.info, filter)
    }

    /// The volume label. `Ok(None)` when the root directory carries no
    /// label entry or the label does not decode as UTF-16.
    pub fn volume_label(&mut self) -> Result<Option<String>, ExfatError> {
        let set = self.find_root_entry(&mut DentryFilter::by_type(entry_type::VOLUME_LABEL))?;
        Ok(set.and_then(|set| set.volume_label()))
    }

    /// Loads the allocation bitmap the root directory points at.
    /// `Ok(None)` when the root carries no bitmap entry.
    ///
    /// The bitmap is read contiguously from its first cluster, which is
    /// how formatting tools lay it out.
    pub fn read_bitmap(&mut self) -> Result<Option<AllocationBitmap>, ExfatError> {
        let Some(set) =
            self.find_root_entry(&mut DentryFilter::by_type(entry_type::ALLOCATION_BITMAP))?
        else {
            return Ok(None);
        };
        let Some(descriptor) = set.bitmap_descriptor() else {
            return Ok(None);
        };

        let max = self.info.max_bitmap_size();
        if descriptor.data_length > max {
            return Err(FormatError::BitmapTooLarge {
                declared: descriptor.data_length,
                max,
            }
            .into());
        }

        let mut data = alloc::vec![0u8; descriptor.data_length as usize];
        let offset = self.info.cluster_to_offset(descriptor.first_cluster)?;
        self.device.read_bytes(offset, &mut data)?;
        Ok(Some(AllocationBitmap::from_bytes(
            &data,
            self.info.cluster_count,
        )))
    }

    /// Reads the upcase table and verifies it against the checksum its
    /// root entry stores. `Ok(None)` when the root carries no upcase
    /// entry.
    pub fn read_upcase_table(&mut self) -> Result<Option<Vec<u8>>, ExfatError> {
        let Some(set) =
            self.find_root_entry(&mut DentryFilter::by_type(entry_type::UPCASE_TABLE))?
        else {
            return Ok(None);
        };
        let Some(descriptor) = set.upcase_descriptor() else {
            return Ok(None);
        };

        if descriptor.data_length > MAX_UPCASE_SIZE {
            return Err(FormatError::BogusGeometry("UpcaseDataLength").into());
        }

        let mut data = alloc::vec![0u8; descriptor.data_length as usize];
        let offset = self.info.cluster_to_offset(descriptor.first_cluster)?;
        self.device.read_bytes(offset, &mut data)?;
        descriptor.verify_table(&data)?;
        Ok(Some(data))
    }

    /// Total, used and free clusters as the bitmap reports them.
    /// `Ok(None)` on a volume without a bitmap entry.
    pub fn cluster_stats(&mut self) -> Result<Option<ClusterStats>, ExfatError> {
        let Some(bitmap) = self.read_bitmap()? else {
            return Ok(None);
        };
        Ok(Some(ClusterStats {
            total: bitmap.cluster_count(),
            used: bitmap.used_clusters(),
            free: bitmap.free_clusters(),
        }))
    }
}

#[cfg(all(test, feature = "std"))]
mod test {
    use super::*;
    use crate::structures::ExfatOps;
    use crate::structures::checksum;
    use crate::structures::fat::{Fat, constants};
    use pretty_assertions::assert_eq;

    /// Assembles a small but complete volume: boot sector, FAT, bitmap
    /// in cluster 2, upcase table in cluster 3, root directory in
    /// cluster 4 holding the label, bitmap and upcase entries.
    fn sample_volume() -> Vec<u8> {
        let ops = ExfatOps {
            volume_length: 72,
            fat_offset: 4,
            fat_length: 2,
            cluster_heap_offset: 8,
            cluster_count: 64,
            root_cluster: 4,
            volume_serial: 0x1234_5678,
            bytes_per_sector_shift: 9,
            sectors_per_cluster_shift: 0,
            fat_count: 1,
            drive_select: 0x80,
            percent_in_use: 0,
        };
        let mut volume = vec![0u8; 72 * 512];
        BootSector::create(&ops).copy_to_bytes((&mut volume[0..512]).try_into().unwrap());

        {
            let fat = Fat::from_bytes_mut(&mut volume[4 * 512..5 * 512]);
            fat.init();
            for cluster in 2..=4 {
                fat.set_entry(cluster, constants::EXFAT_CLUSTER_LAST);
            }
        }

        // Bitmap: clusters 2, 3 and 4 allocated
        volume[8 * 512] = 0b0000_0111;

        // A recognizable stand-in for the upcase table
        let table: Vec<u8> = (0u16..8).flat_map(|unit| unit.to_le_bytes()).collect();
        let table_checksum = checksum::table_checksum(&table);
        volume[9 * 512..9 * 512 + table.len()].copy_from_slice(&table);

        let root = 10 * 512;
        let mut write = |index: usize, set: &DentrySet| {
            let bytes = set.to_bytes();
            volume[root + index * 32..root + index * 32 + bytes.len()].copy_from_slice(&bytes);
        };
        write(0, &DentrySet::build_volume_label("TEST"));
        write(1, &DentrySet::build_bitmap(2, 8));
        write(2, &DentrySet::build_upcase(3, 16, table_checksum));

        volume
    }

    #[test]
    fn test_open_decodes_geometry() {
        let volume = sample_volume();
        let fs = Exfat::open(volume.as_slice()).unwrap();
        assert_eq!(fs.info().cluster_count, 64);
        assert_eq!(fs.info().root_cluster, 4);
        assert_eq!(fs.info().volume_serial, 0x1234_5678);
        assert_eq!(fs.root_directory().first_cluster(), 4);
    }

    #[test]
    fn test_open_rejects_garbage() {
        let volume = vec![0u8; 1024];
        assert_eq!(
            Exfat::open(volume.as_slice()).unwrap_err(),
            ExfatError::Format(FormatError::BadSignature)
        );
    }

    #[test]
    fn test_volume_label() {
        let volume = sample_volume();
        let mut fs = Exfat::open(volume.as_slice()).unwrap();
        assert_eq!(fs.volume_label().unwrap(), Some(String::from("TEST")));
    }

    #[test]
    fn test_cluster_stats_from_bitmap() {
        let volume = sample_volume();
        let mut fs = Exfat::open(volume.as_slice()).unwrap();
        let stats = fs.cluster_stats().unwrap().unwrap();
        assert_eq!(
            stats,
            ClusterStats {
                total: 64,
                used: 3,
                free: 61,
            }
        );

        let bitmap = fs.read_bitmap().unwrap().unwrap();
        assert!(bitmap.is_used(2).unwrap());
        assert!(!bitmap.is_used(5).unwrap());
    }

    #[test]
    fn test_bitmap_size_limit() {
        let mut volume = sample_volume();
        // The bitmap entry sits in root record 1, DataLength at +24
        let length_at = 10 * 512 + 32 + 24;
        volume[length_at..length_at + 8].copy_from_slice(&1024u64.to_le_bytes());

        let mut fs = Exfat::open(volume.as_slice()).unwrap();
        assert_eq!(
            fs.read_bitmap().unwrap_err(),
            ExfatError::Format(FormatError::BitmapTooLarge {
                declared: 1024,
                max: 8,
            })
        );
    }

    #[test]
    fn test_upcase_verification() {
        let volume = sample_volume();
        let mut fs = Exfat::open(volume.as_slice()).unwrap();
        let table = fs.read_upcase_table().unwrap().unwrap();
        assert_eq!(table.len(), 16);
        assert_eq!(&table[0..4], &[0, 0, 1, 0]);

        // Corrupt one table byte and the stored checksum must no longer
        // match
        let mut corrupted = sample_volume();
        corrupted[9 * 512 + 5] ^= 0x40;
        let mut fs = Exfat::open(corrupted.as_slice()).unwrap();
        assert!(matches!(
            fs.read_upcase_table().unwrap_err(),
            ExfatError::Format(FormatError::ChecksumMismatch { .. })
        ));
    }

    #[test]
    fn test_next_cluster() {
        let volume = sample_volume();
        let mut fs = Exfat::open(volume.as_slice()).unwrap();
        assert_eq!(fs.next_cluster(2).unwrap(), ClusterRef::EndOfChain);
        assert_eq!(fs.next_cluster(10).unwrap(), ClusterRef::Data(0));
        assert_eq!(
            fs.next_cluster(70).unwrap_err(),
            ExfatError::Format(FormatError::ClusterOutOfRange(70))
        );
    }

    #[test]
    fn test_missing_optional_entries() {
        let ops = ExfatOps {
            volume_length: 72,
            fat_offset: 4,
            fat_length: 2,
            cluster_heap_offset: 8,
            cluster_count: 64,
            root_cluster: 4,
            volume_serial: 0,
            bytes_per_sector_shift: 9,
            sectors_per_cluster_shift: 0,
            fat_count: 1,
            drive_select: 0x80,
            percent_in_use: 0,
        };
        let mut volume = vec![0u8; 72 * 512];
        BootSector::create(&ops).copy_to_bytes((&mut volume[0..512]).try_into().unwrap());
        {
            let fat = Fat::from_bytes_mut(&mut volume[4 * 512..5 * 512]);
            fat.init();
            fat.set_entry(4, constants::EXFAT_CLUSTER_LAST);
        }

        let mut fs = Exfat::open(volume.as_slice()).unwrap();
        assert_eq!(fs.volume_label().unwrap(), None);
        assert!(fs.read_bitmap().unwrap().is_none());
        assert!(fs.read_upcase_table().unwrap().is_none());
        assert!(fs.cluster_stats().unwrap().is_none());
    }
}
