//! Directory entry set engine
//!
//! A directory is a cluster chain of 32-byte records. In-use records
//! group into sets: one primary followed by the number of secondaries
//! the primary declares, validated as a unit through a 16-bit checksum.
//! The engine walks the chain, materializes each set, and hands the
//! matching ones to the caller.
//!
//! Corruption never aborts a scan. A set that fails its checksum or
//! declares an impossible secondary count is returned marked with its
//! [`SetValidity`], so that an inspection or repair tool can look at it;
//! only I/O failures and structural dead ends (a cluster index pointing
//! outside the heap, a chain that never terminates) surface as errors.

use alloc::string::String;
use alloc::vec::Vec;

use crate::disk::DiskReader;
#[cfg(feature = "write")]
use crate::disk::DiskWriter;
use crate::{ExfatError, FormatError};

use super::boot_sector::BootSectorInfo;
use super::checksum;
use super::fat::ClusterRef;
use super::raw::dentry::{DENTRY_SIZE, RawDentry, entry_type};
#[cfg(feature = "write")]
use super::raw::dentry::{
    RawBitmapEntry, RawFileEntry, RawFileNameEntry, RawStreamEntry, RawUpcaseEntry,
    RawVolumeLabelEntry,
};
use super::time::ExfatTimestamp;

/// A primary can declare at most 18 secondaries: one stream extension
/// plus up to 17 file name entries.
pub const MAX_SECONDARY_COUNT: u8 = 18;

/// UTF-16 code units per file name entry.
pub const NAME_UNITS_PER_ENTRY: usize = 15;

bitflags::bitflags! {
    /// FileAttributes
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FileAttributes: u16 {
        const READ_ONLY = 0x0001;
        const HIDDEN = 0x0002;
        const SYSTEM = 0x0004;
        const DIRECTORY = 0x0010;
        const ARCHIVE = 0x0020;
    }
}

bitflags::bitflags! {
    /// GeneralSecondaryFlags
    #[repr(transparent)]
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GeneralSecondaryFlags: u8 {
        /// The entry's cluster and length fields are meaningful
        const ALLOCATION_POSSIBLE = 0x01;
        /// The allocation is contiguous, the FAT holds no chain for it
        const NO_FAT_CHAIN = 0x02;
    }
}

/// Validation outcome of one dentry set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetValidity {
    Valid,
    /// The stored set checksum does not match the computed one
    BadChecksum { stored: u16, computed: u16 },
    /// The primary declares more secondaries than a set can hold
    BadSecondaryCount { declared: u8 },
}

/// One primary entry plus its secondaries, copied out of the directory.
///
/// The set owns its records; it stays usable after the scan that
/// produced it has moved on.
#[derive(Debug, Clone)]
pub struct DentrySet {
    entries: Vec<RawDentry>,
    device_offset: u64,
    validity: SetValidity,
}

/// Location and size of the allocation bitmap, from its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitmapDescriptor {
    pub first_cluster: u32,
    pub data_length: u64,
}

/// Location, size and checksum of the upcase table, from its entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpcaseDescriptor {
    pub first_cluster: u32,
    pub data_length: u64,
    pub table_checksum: u32,
}

impl UpcaseDescriptor {
    /// Checks a table blob read from the heap against the stored
    /// checksum.
    pub fn verify_table(&self, table: &[u8]) -> Result<(), FormatError> {
        let computed = checksum::table_checksum(table);
        if computed != self.table_checksum {
            return Err(FormatError::ChecksumMismatch {
                stored: self.table_checksum,
                computed,
            });
        }
        Ok(())
    }
}

/// Decoded fields of a file entry.
#[derive(Debug, Clone, Copy)]
pub struct FileEntryInfo {
    pub attributes: FileAttributes,
    pub secondary_count: u8,
    pub set_checksum: u16,
    pub create_time: ExfatTimestamp,
    pub modify_time: ExfatTimestamp,
    pub access_time: ExfatTimestamp,
    /// 10ms increments refining the create timestamp, 0..=199
    pub create_time_cs: u8,
    pub modify_time_cs: u8,
}

/// Decoded fields of a stream extension entry.
#[derive(Debug, Clone, Copy)]
pub struct StreamInfo {
    pub flags: GeneralSecondaryFlags,
    /// File name length in UTF-16 code units
    pub name_length: u8,
    pub name_hash: u16,
    pub valid_data_length: u64,
    pub first_cluster: u32,
    pub data_length: u64,
}

impl StreamInfo {
    pub fn is_contiguous(&self) -> bool {
        self.flags.contains(GeneralSecondaryFlags::NO_FAT_CHAIN)
    }
}

impl DentrySet {
    pub fn entries(&self) -> &[RawDentry] {
        &self.entries
    }

    /// Type byte of the primary entry.
    pub fn entry_type(&self) -> u8 {
        self.entries
            .first()
            .map(|entry| entry.entry_type())
            .unwrap_or(entry_type::END_OF_DIRECTORY)
    }

    /// Absolute device byte offset of the primary entry. Sets built by
    /// hand carry 0 until they are written somewhere.
    pub fn device_offset(&self) -> u64 {
        self.device_offset
    }

    pub fn validity(&self) -> SetValidity {
        self.validity
    }

    pub fn is_valid(&self) -> bool {
        self.validity == SetValidity::Valid
    }

    /// The raw bytes of the whole set in directory order.
    pub fn to_bytes(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.entries).to_vec()
    }

    /// Raw CharacterCount byte of a label entry, before any validation.
    /// Inspection tools report this even when the label itself does not
    /// decode.
    pub fn label_char_count(&self) -> Option<u8> {
        let entry = self.entries.first()?;
        if entry.entry_type() != entry_type::VOLUME_LABEL {
            return None;
        }
        Some(unsafe { entry.label }.char_count)
    }

    /// Decodes a volume label entry. `None` when the set is not a label
    /// or the label is undecodable; a bad label is not fatal, the caller
    /// decides how to present it.
    pub fn volume_label(&self) -> Option<String> {
        let entry = self.entries.first()?;
        if entry.entry_type() != entry_type::VOLUME_LABEL {
            return None;
        }
        let raw = unsafe { entry.label };
        if raw.char_count > 11 {
            return None;
        }
        let units: Vec<u16> = raw.label[..raw.char_count as usize * 2]
            .chunks_exact(2)
            .map(|chunk| u16::from_le_bytes([chunk[0], chunk[1]]))
            .collect();
        char::decode_utf16(units).collect::<Result<String, _>>().ok()
    }

    pub fn bitmap_descriptor(&self) -> Option<BitmapDescriptor> {
        let entry = self.entries.first()?;
        if entry.entry_type() != entry_type::ALLOCATION_BITMAP {
            return None;
        }
        let raw = unsafe { entry.bitmap };
        Some(BitmapDescriptor {
            first_cluster: u32::from_le_bytes(raw.first_cluster),
            data_length: u64::from_le_bytes(raw.data_length),
        })
    }

    pub fn upcase_descriptor(&self) -> Option<UpcaseDescriptor> {
        let entry = self.entries.first()?;
        if entry.entry_type() != entry_type::UPCASE_TABLE {
            return None;
        }
        let raw = unsafe { entry.upcase };
        Some(UpcaseDescriptor {
            first_cluster: u32::from_le_bytes(raw.first_cluster),
            data_length: u64::from_le_bytes(raw.data_length),
            table_checksum: u32::from_le_bytes(raw.table_checksum),
        })
    }

    pub fn file_info(&self) -> Option<FileEntryInfo> {
        let entry = self.entries.first()?;
        if entry.entry_type() != entry_type::FILE {
            return None;
        }
        let raw = unsafe { entry.file };
        Some(FileEntryInfo {
            attributes: FileAttributes::from_bits_retain(u16::from_le_bytes(raw.attributes)),
            secondary_count: raw.secondary_count,
            set_checksum: u16::from_le_bytes(raw.set_checksum),
            create_time: ExfatTimestamp::from_raw(u32::from_le_bytes(raw.create_time)),
            modify_time: ExfatTimestamp::from_raw(u32::from_le_bytes(raw.modify_time)),
            access_time: ExfatTimestamp::from_raw(u32::from_le_bytes(raw.access_time)),
            create_time_cs: raw.create_time_cs,
            modify_time_cs: raw.modify_time_cs,
        })
    }

    /// The first stream extension among the secondaries.
    pub fn stream_info(&self) -> Option<StreamInfo> {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.entry_type() == entry_type::STREAM_EXTENSION)?;
        let raw = unsafe { entry.stream };
        Some(StreamInfo {
            flags: GeneralSecondaryFlags::from_bits_retain(raw.general_secondary_flags),
            name_length: raw.name_length,
            name_hash: u16::from_le_bytes(raw.name_hash),
            valid_data_length: u64::from_le_bytes(raw.valid_data_length),
            first_cluster: u32::from_le_bytes(raw.first_cluster),
            data_length: u64::from_le_bytes(raw.data_length),
        })
    }

    /// Assembles the file name from the name entries, capped to the
    /// length the stream extension declares.
    pub fn file_name(&self) -> Option<String> {
        let stream = self.stream_info()?;
        let mut units = Vec::with_capacity(stream.name_length as usize);
        for entry in &self.entries {
            if entry.entry_type() != entry_type::FILE_NAME {
                continue;
            }
            let fragment = unsafe { entry.name };
            for chunk in fragment.name.chunks_exact(2) {
                units.push(u16::from_le_bytes([chunk[0], chunk[1]]));
            }
        }
        units.truncate(stream.name_length as usize);
        char::decode_utf16(units).collect::<Result<String, _>>().ok()
    }
}

/// Selects dentry sets during a scan.
///
/// Matching is by the primary's type byte first; the optional predicate
/// then sees every type-matched set. The predicate is `FnMut`, so caller
/// context rides along in its captures, accumulation included.
pub struct DentryFilter<P = fn(&DentrySet) -> bool> {
    entry_type: u8,
    predicate: Option<P>,
}

impl DentryFilter {
    /// Matches every in-use set whose primary has the given type.
    pub fn by_type(entry_type: u8) -> Self {
        Self {
            entry_type,
            predicate: None,
        }
    }
}

impl<P: FnMut(&DentrySet) -> bool> DentryFilter<P> {
    pub fn with_predicate(entry_type: u8, predicate: P) -> Self {
        Self {
            entry_type,
            predicate: Some(predicate),
        }
    }

    fn matches(&mut self, set: &DentrySet) -> bool {
        if set.entry_type() != self.entry_type {
            return false;
        }
        match &mut self.predicate {
            Some(predicate) => predicate(set),
            None => true,
        }
    }
}

/// One directory's location in the cluster heap.
#[derive(Debug, Clone, Copy)]
pub struct Directory {
    first_cluster: u32,
    contiguous: bool,
    data_length: Option<u64>,
}

impl Directory {
    /// The root directory. It has no stream entry of its own, so it is
    /// always FAT-chained and its size comes from the chain alone.
    pub fn root(info: &BootSectorInfo) -> Self {
        Self {
            first_cluster: info.root_cluster,
            contiguous: false,
            data_length: None,
        }
    }

    /// A subdirectory located through its stream extension entry.
    pub fn from_stream(stream: &StreamInfo) -> Self {
        Self {
            first_cluster: stream.first_cluster,
            contiguous: stream.is_contiguous(),
            data_length: Some(stream.data_length),
        }
    }

    pub fn first_cluster(&self) -> u32 {
        self.first_cluster
    }

    /// Scans the directory and returns the sets `filter` accepts, at
    /// most `max_matches` of them.
    ///
    /// Every in-use primary starts a set; exactly the declared number of
    /// following records is consumed regardless of what they hold, so
    /// the stream position stays consistent even when a set fails
    /// validation. A chain that ends mid-set terminates the scan like an
    /// end-of-directory marker.
    pub fn find_entries<R: DiskReader, P: FnMut(&DentrySet) -> bool>(
        &self,
        device: &mut R,
        info: &BootSectorInfo,
        filter: &mut DentryFilter<P>,
        max_matches: Option<usize>,
    ) -> Result<Vec<DentrySet>, ExfatError> {
        let mut matches = Vec::new();
        if max_matches == Some(0) {
            return Ok(matches);
        }

        let mut cursor = EntryCursor::new(device, info, self)?;
        'scan: while let Some((offset, entry)) = cursor.next_record()? {
            if entry.is_end_of_directory() {
                break;
            }
            if !entry.is_in_use() {
                continue;
            }
            if entry.is_secondary() {
                log::trace!(
                    "Skipping stray secondary entry {:#04x} at {:#x}",
                    entry.entry_type(),
                    offset
                );
                continue;
            }

            let declared = if entry.is_benign_primary() {
                0
            } else {
                entry.secondary_count()
            };
            let mut validity = SetValidity::Valid;
            let count = if declared > MAX_SECONDARY_COUNT {
                validity = SetValidity::BadSecondaryCount { declared };
                MAX_SECONDARY_COUNT
            } else {
                declared
            };

            let mut entries = Vec::with_capacity(count as usize + 1);
            entries.push(entry);
            for _ in 0..count {
                match cursor.next_record()? {
                    Some((_, secondary)) => entries.push(secondary),
                    None => break 'scan,
                }
            }

            if validity == SetValidity::Valid && !entry.is_benign_primary() {
                let computed = checksum::entry_set_checksum(bytemuck::cast_slice(&entries));
                let stored = entry.set_checksum();
                if stored != computed {
                    log::warn!(
                        "Entry set at {:#x} fails its checksum: stored {:#06x}, computed {:#06x}",
                        offset,
                        stored,
                        computed
                    );
                    validity = SetValidity::BadChecksum { stored, computed };
                }
            }

            let set = DentrySet {
                entries,
                device_offset: offset,
                validity,
            };
            if filter.matches(&set) {
                matches.push(set);
                if max_matches.is_some_and(|max| matches.len() >= max) {
                    break;
                }
            }
        }

        Ok(matches)
    }

    /// First match only. `Ok(None)` means the directory holds no such
    /// entry, which is a normal outcome and not an error.
    pub fn find_entry<R: DiskReader, P: FnMut(&DentrySet) -> bool>(
        &self,
        device: &mut R,
        info: &BootSectorInfo,
        filter: &mut DentryFilter<P>,
    ) -> Result<Option<DentrySet>, ExfatError> {
        Ok(self.find_entries(device, info, filter, Some(1))?.pop())
    }
}

#[cfg(feature = "write")]
impl Directory {
    /// Writes `set` into the first run of unused records long enough to
    /// hold it. Returns the device offset of the primary, or `Ok(None)`
    /// when the directory has no room left.
    ///
    /// Records are written one by one because a run may straddle a
    /// cluster boundary, where device offsets stop being contiguous.
    pub fn write_entry<D: DiskReader + DiskWriter>(
        &self,
        device: &mut D,
        info: &BootSectorInfo,
        set: &DentrySet,
    ) -> Result<Option<u64>, ExfatError> {
        let needed = set.entries().len();
        let mut run: Vec<u64> = Vec::with_capacity(needed);
        {
            let mut cursor = EntryCursor::new(device, info, self)?;
            while let Some((offset, entry)) = cursor.next_record()? {
                if entry.is_end_of_directory() || !entry.is_in_use() {
                    run.push(offset);
                    if run.len() >= needed {
                        break;
                    }
                } else {
                    run.clear();
                }
            }
        }

        if run.len() < needed {
            return Ok(None);
        }
        for (record, offset) in set.entries().iter().zip(&run) {
            device.write_bytes(*offset, bytemuck::bytes_of(record))?;
        }
        Ok(Some(run[0]))
    }
}

/// Walks a directory chain record by record, one cluster buffered.
struct EntryCursor<'a, R: DiskReader> {
    device: &'a mut R,
    info: &'a BootSectorInfo,
    cluster: u32,
    contiguous: bool,
    /// Bytes left before the directory's declared size runs out
    remaining: Option<u64>,
    buffer: Vec<u8>,
    position: u32,
    /// Clusters loaded so far, the cycle bound
    visited: u32,
    exhausted: bool,
}

impl<'a, R: DiskReader> EntryCursor<'a, R> {
    fn new(
        device: &'a mut R,
        info: &'a BootSectorInfo,
        directory: &Directory,
    ) -> Result<Self, ExfatError> {
        // A declared size below one record means nothing is allocated,
        // the first cluster field is not meaningful then
        let empty = directory
            .data_length
            .is_some_and(|length| length < DENTRY_SIZE as u64);
        let mut cursor = Self {
            device,
            info,
            cluster: directory.first_cluster,
            contiguous: directory.contiguous,
            remaining: directory.data_length,
            buffer: alloc::vec![0u8; info.cluster_size() as usize],
            position: 0,
            visited: 0,
            exhausted: empty,
        };
        if !empty {
            cursor.load_cluster()?;
        }
        Ok(cursor)
    }

    fn load_cluster(&mut self) -> Result<(), ExfatError> {
        let offset = self.info.cluster_to_offset(self.cluster)?;
        self.device.read_bytes(offset, &mut self.buffer)?;
        self.visited += 1;
        self.position = 0;
        Ok(())
    }

    /// The next record and its absolute device offset, or `Ok(None)`
    /// once the chain is exhausted.
    fn next_record(&mut self) -> Result<Option<(u64, RawDentry)>, ExfatError> {
        if self.exhausted {
            return Ok(None);
        }
        if let Some(remaining) = self.remaining {
            if remaining < DENTRY_SIZE as u64 {
                self.exhausted = true;
                return Ok(None);
            }
        }
        if self.position as usize >= self.buffer.len() && !self.advance_cluster()? {
            return Ok(None);
        }

        let start = self.position as usize;
        let entry = *RawDentry::from_bytes(&self.buffer[start..start + DENTRY_SIZE]);
        let offset = self.info.cluster_to_offset(self.cluster)? + self.position as u64;
        self.position += DENTRY_SIZE as u32;
        if let Some(remaining) = &mut self.remaining {
            *remaining -= DENTRY_SIZE as u64;
        }
        Ok(Some((offset, entry)))
    }

    fn advance_cluster(&mut self) -> Result<bool, ExfatError> {
        let next = if self.contiguous {
            ClusterRef::Data(self.cluster + 1)
        } else {
            self.next_in_fat()?
        };
        match next {
            ClusterRef::Data(cluster) => {
                if self.visited >= self.info.cluster_count {
                    return Err(FormatError::ChainCycle.into());
                }
                self.cluster = cluster;
                self.load_cluster()?;
                Ok(true)
            }
            ClusterRef::EndOfChain => {
                self.exhausted = true;
                Ok(false)
            }
            ClusterRef::BadCluster => {
                log::warn!("Directory chain hits a bad cluster after {}", self.cluster);
                self.exhausted = true;
                Ok(false)
            }
        }
    }

    fn next_in_fat(&mut self) -> Result<ClusterRef, ExfatError> {
        let offset = self.info.fat_entry_offset(self.cluster)?;
        let mut raw = [0u8; 4];
        self.device.read_bytes(offset, &mut raw)?;
        Ok(ClusterRef::from_raw(u32::from_le_bytes(raw)))
    }
}

#[cfg(feature = "write")]
impl DentrySet {
    /// Builds a volume label entry set.
    ///
    /// Panics if the label exceeds the 11 UTF-16 units the entry holds.
    pub fn build_volume_label(label: &str) -> Self {
        let units: Vec<u16> = label.encode_utf16().collect();
        assert!(
            units.len() <= 11,
            "Volume label is limited to 11 UTF-16 units"
        );
        let mut raw = RawVolumeLabelEntry {
            entry_type: entry_type::VOLUME_LABEL,
            char_count: units.len() as u8,
            label: [0; 22],
            reserved: [0; 8],
        };
        for (i, unit) in units.iter().enumerate() {
            raw.label[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
        }
        Self {
            entries: alloc::vec![RawDentry { label: raw }],
            device_offset: 0,
            validity: SetValidity::Valid,
        }
    }

    /// Builds the allocation bitmap entry.
    pub fn build_bitmap(first_cluster: u32, data_length: u64) -> Self {
        let raw = RawBitmapEntry {
            entry_type: entry_type::ALLOCATION_BITMAP,
            bitmap_flags: 0,
            reserved: [0; 18],
            first_cluster: first_cluster.to_le_bytes(),
            data_length: data_length.to_le_bytes(),
        };
        Self {
            entries: alloc::vec![RawDentry { bitmap: raw }],
            device_offset: 0,
            validity: SetValidity::Valid,
        }
    }

    /// Builds the upcase table entry.
    pub fn build_upcase(first_cluster: u32, data_length: u64, table_checksum: u32) -> Self {
        let raw = RawUpcaseEntry {
            entry_type: entry_type::UPCASE_TABLE,
            reserved1: [0; 3],
            table_checksum: table_checksum.to_le_bytes(),
            reserved2: [0; 12],
            first_cluster: first_cluster.to_le_bytes(),
            data_length: data_length.to_le_bytes(),
        };
        Self {
            entries: alloc::vec![RawDentry { upcase: raw }],
            device_offset: 0,
            validity: SetValidity::Valid,
        }
    }

    /// Builds a complete file entry set: file entry, stream extension,
    /// and as many name entries as the name needs, with the set checksum
    /// computed and stored.
    ///
    /// The name hash is computed over the upcased name. Without the
    /// volume's upcase table only the ASCII range is folded, which
    /// matches what the table does for that range.
    ///
    /// Panics if the name is empty or longer than 255 UTF-16 units.
    pub fn build_file(
        name: &str,
        attributes: FileAttributes,
        time: ExfatTimestamp,
        first_cluster: u32,
        data_length: u64,
        contiguous: bool,
    ) -> Self {
        let units: Vec<u16> = name.encode_utf16().collect();
        assert!(
            !units.is_empty() && units.len() <= 255,
            "File name must be 1 to 255 UTF-16 units"
        );

        let upcased: Vec<u16> = units
            .iter()
            .map(|unit| match unit {
                u @ 0x61..=0x7A => u - 0x20,
                u => *u,
            })
            .collect();
        let name_hash = checksum::name_hash(&upcased);

        let name_entry_count = units.len().div_ceil(NAME_UNITS_PER_ENTRY);
        let secondary_count = 1 + name_entry_count as u8;

        let mut flags = GeneralSecondaryFlags::ALLOCATION_POSSIBLE;
        if contiguous {
            flags |= GeneralSecondaryFlags::NO_FAT_CHAIN;
        }

        let mut entries = Vec::with_capacity(2 + name_entry_count);
        entries.push(RawDentry {
            file: RawFileEntry {
                entry_type: entry_type::FILE,
                secondary_count,
                // Filled in below once the whole set exists
                set_checksum: [0; 2],
                attributes: attributes.bits().to_le_bytes(),
                reserved1: [0; 2],
                create_time: time.raw().to_le_bytes(),
                modify_time: time.raw().to_le_bytes(),
                access_time: time.raw().to_le_bytes(),
                create_time_cs: 0,
                modify_time_cs: 0,
                create_tz: 0,
                modify_tz: 0,
                access_tz: 0,
                reserved2: [0; 7],
            },
        });
        entries.push(RawDentry {
            stream: RawStreamEntry {
                entry_type: entry_type::STREAM_EXTENSION,
                general_secondary_flags: flags.bits(),
                reserved1: 0,
                name_length: units.len() as u8,
                name_hash: name_hash.to_le_bytes(),
                reserved2: [0; 2],
                valid_data_length: data_length.to_le_bytes(),
                reserved3: [0; 4],
                first_cluster: first_cluster.to_le_bytes(),
                data_length: data_length.to_le_bytes(),
            },
        });
        for fragment in units.chunks(NAME_UNITS_PER_ENTRY) {
            let mut name = [0u8; 30];
            for (i, unit) in fragment.iter().enumerate() {
                name[i * 2..i * 2 + 2].copy_from_slice(&unit.to_le_bytes());
            }
            entries.push(RawDentry {
                name: RawFileNameEntry {
                    entry_type: entry_type::FILE_NAME,
                    general_secondary_flags: 0,
                    name,
                },
            });
        }

        // The checksum skips its own storage bytes, so computing over
        // the zeroed field gives the final value
        let set_checksum = checksum::entry_set_checksum(bytemuck::cast_slice(&entries));
        {
            // SAFETY: every variant accepts all bit patterns, the byte
            // view is always readable and writable
            let primary = unsafe { &mut entries[0].bytes };
            primary[2..4].copy_from_slice(&set_checksum.to_le_bytes());
        }

        Self {
            entries,
            device_offset: 0,
            validity: SetValidity::Valid,
        }
    }
}

#[cfg(all(test, feature = "std"))]
mod test {
    use super::*;
    use crate::structures::boot_sector::VolumeFlags;
    use pretty_assertions::assert_eq;

    /// Tiny volume: FAT at sector 1, heap at sector 2, 512-byte
    /// clusters so one cluster holds 16 records.
    fn test_geometry(cluster_count: u32) -> BootSectorInfo {
        BootSectorInfo {
            volume_length: 2 + cluster_count as u64,
            fat_offset: 1,
            fat_length: 1,
            cluster_heap_offset: 2,
            cluster_count,
            root_cluster: 2,
            volume_serial: 0,
            volume_flags: VolumeFlags::empty(),
            bytes_per_sector_shift: 9,
            sectors_per_cluster_shift: 0,
            fat_count: 1,
            percent_in_use: 0,
        }
    }

    fn test_volume(info: &BootSectorInfo) -> Vec<u8> {
        let size = (info.cluster_heap_offset as usize + info.cluster_count as usize) * 512;
        let mut volume = vec![0u8; size];
        set_fat(&mut volume, 0, 0xFFFF_FFF8);
        set_fat(&mut volume, 1, 0xFFFF_FFFF);
        set_fat(&mut volume, info.root_cluster, 0xFFFF_FFFF);
        volume
    }

    fn set_fat(volume: &mut [u8], cluster: u32, value: u32) {
        let offset = 512 + cluster as usize * 4;
        volume[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn place(volume: &mut [u8], offset: usize, set: &DentrySet) {
        let bytes = set.to_bytes();
        volume[offset..offset + bytes.len()].copy_from_slice(&bytes);
    }

    #[test]
    fn test_finds_volume_label() {
        let info = test_geometry(8);
        let mut volume = test_volume(&info);
        place(&mut volume, 1024, &DentrySet::build_volume_label("TEST"));

        let root = Directory::root(&info);
        let found = root
            .find_entry(
                &mut volume.as_slice(),
                &info,
                &mut DentryFilter::by_type(entry_type::VOLUME_LABEL),
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.device_offset(), 1024);
        // Benign primaries carry no checksum and must not be verified
        // against the bytes where one would live
        assert_eq!(found.validity(), SetValidity::Valid);
        assert_eq!(found.volume_label(), Some(String::from("TEST")));

        let missing = root
            .find_entry(
                &mut volume.as_slice(),
                &info,
                &mut DentryFilter::by_type(entry_type::FILE),
            )
            .unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_skips_deleted_and_stray_entries() {
        let info = test_geometry(8);
        let mut volume = test_volume(&info);

        // A deleted file entry, then a stray name entry, then the label
        let mut deleted = DentrySet::build_file(
            "GONE.TXT",
            FileAttributes::ARCHIVE,
            ExfatTimestamp::from_raw(0),
            4,
            100,
            true,
        );
        for entry in &mut deleted.entries {
            let bytes = unsafe { &mut entry.bytes };
            bytes[0] &= !entry_type::IN_USE;
        }
        place(&mut volume, 1024, &deleted);
        volume[1024 + 3 * 32] = entry_type::FILE_NAME;
        place(&mut volume, 1024 + 4 * 32, &DentrySet::build_volume_label("V"));

        let root = Directory::root(&info);
        let found = root
            .find_entry(
                &mut volume.as_slice(),
                &info,
                &mut DentryFilter::by_type(entry_type::VOLUME_LABEL),
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.volume_label(), Some(String::from("V")));
        assert_eq!(found.device_offset(), 1024 + 4 * 32);
    }

    #[test]
    fn test_checksum_mismatch_is_reported_not_dropped() {
        let info = test_geometry(8);
        let mut volume = test_volume(&info);
        let set = DentrySet::build_file(
            "README.TXT",
            FileAttributes::ARCHIVE,
            ExfatTimestamp::from_raw(0),
            4,
            100,
            true,
        );
        place(&mut volume, 1024, &set);
        // Flip a byte inside the stream entry
        volume[1024 + 32 + 8] ^= 0xFF;

        let root = Directory::root(&info);
        let found = root
            .find_entry(
                &mut volume.as_slice(),
                &info,
                &mut DentryFilter::by_type(entry_type::FILE),
            )
            .unwrap()
            .unwrap();
        assert!(!found.is_valid());
        assert!(matches!(
            found.validity(),
            SetValidity::BadChecksum { .. }
        ));
        // The set still decodes
        assert_eq!(found.file_name(), Some(String::from("README.TXT")));
    }

    #[test]
    fn test_set_spanning_clusters() {
        let info = test_geometry(8);
        let mut volume = test_volume(&info);
        set_fat(&mut volume, 2, 3);
        set_fat(&mut volume, 3, 0xFFFF_FFFF);

        let set = DentrySet::build_file(
            "SPAN.DAT",
            FileAttributes::ARCHIVE,
            ExfatTimestamp::from_raw(0),
            5,
            0,
            false,
        );
        assert_eq!(set.entries().len(), 3);
        let bytes = set.to_bytes();
        // Deleted entries up to the last record of cluster 2, so the
        // scan reaches the primary there; secondaries start cluster 3
        for record in 0..15 {
            volume[1024 + record * 32] = 0x05;
        }
        volume[1024 + 15 * 32..1024 + 16 * 32].copy_from_slice(&bytes[0..32]);
        volume[1536..1536 + 64].copy_from_slice(&bytes[32..96]);

        let root = Directory::root(&info);
        let found = root
            .find_entry(
                &mut volume.as_slice(),
                &info,
                &mut DentryFilter::by_type(entry_type::FILE),
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.entries().len(), 3);
        assert_eq!(found.validity(), SetValidity::Valid);
        assert_eq!(found.file_name(), Some(String::from("SPAN.DAT")));
        assert_eq!(found.device_offset(), 1024 + 15 * 32);
    }

    #[test]
    fn test_chain_cycle_is_detected() {
        let info = test_geometry(4);
        let mut volume = test_volume(&info);
        set_fat(&mut volume, 2, 3);
        set_fat(&mut volume, 3, 2);
        // Deleted entries everywhere so the scan never sees an end marker
        for record in 0..32 {
            volume[1024 + record * 32] = 0x05;
        }

        let root = Directory::root(&info);
        let result = root.find_entries(
            &mut volume.as_slice(),
            &info,
            &mut DentryFilter::by_type(entry_type::FILE),
            None,
        );
        assert_eq!(
            result.unwrap_err(),
            ExfatError::Format(FormatError::ChainCycle)
        );
    }

    #[test]
    fn test_truncated_set_ends_scan() {
        let info = test_geometry(8);
        let mut volume = test_volume(&info);
        // A label first so we can see the scan got that far, deleted
        // entries filling the gap up to the last record
        place(&mut volume, 1024, &DentrySet::build_volume_label("OK"));
        for record in 1..15 {
            volume[1024 + record * 32] = 0x05;
        }
        // A primary in the very last record, declaring secondaries the
        // chain does not hold
        let set = DentrySet::build_file(
            "CUT.BIN",
            FileAttributes::ARCHIVE,
            ExfatTimestamp::from_raw(0),
            6,
            0,
            true,
        );
        volume[1024 + 15 * 32..1024 + 16 * 32].copy_from_slice(&set.to_bytes()[0..32]);

        let root = Directory::root(&info);
        let files = root
            .find_entries(
                &mut volume.as_slice(),
                &info,
                &mut DentryFilter::by_type(entry_type::FILE),
                None,
            )
            .unwrap();
        assert!(files.is_empty());

        let labels = root
            .find_entries(
                &mut volume.as_slice(),
                &info,
                &mut DentryFilter::by_type(entry_type::VOLUME_LABEL),
                None,
            )
            .unwrap();
        assert_eq!(labels.len(), 1);
    }

    #[test]
    fn test_oversized_secondary_count_is_clamped() {
        let info = test_geometry(8);
        let mut volume = test_volume(&info);
        set_fat(&mut volume, 2, 3);
        set_fat(&mut volume, 3, 0xFFFF_FFFF);

        volume[1024] = entry_type::FILE;
        volume[1025] = 200;
        // A label right after the 18 records the clamp consumes
        place(
            &mut volume,
            1024 + 19 * 32,
            &DentrySet::build_volume_label("AFTER"),
        );

        let root = Directory::root(&info);
        let files = root
            .find_entries(
                &mut volume.as_slice(),
                &info,
                &mut DentryFilter::by_type(entry_type::FILE),
                None,
            )
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(
            files[0].validity(),
            SetValidity::BadSecondaryCount { declared: 200 }
        );
        assert_eq!(files[0].entries().len(), 19);

        let labels = root
            .find_entries(
                &mut volume.as_slice(),
                &info,
                &mut DentryFilter::by_type(entry_type::VOLUME_LABEL),
                None,
            )
            .unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].volume_label(), Some(String::from("AFTER")));
    }

    #[test]
    fn test_filter_predicate_carries_context() {
        let info = test_geometry(8);
        let mut volume = test_volume(&info);
        let first = DentrySet::build_file(
            "A.TXT",
            FileAttributes::ARCHIVE,
            ExfatTimestamp::from_raw(0),
            4,
            10,
            true,
        );
        let second = DentrySet::build_file(
            "B.TXT",
            FileAttributes::ARCHIVE,
            ExfatTimestamp::from_raw(0),
            5,
            20,
            true,
        );
        place(&mut volume, 1024, &first);
        place(&mut volume, 1024 + first.entries().len() * 32, &second);

        let mut seen = Vec::new();
        let mut filter = DentryFilter::with_predicate(entry_type::FILE, |set: &DentrySet| {
            seen.push(set.file_name());
            set.file_name().as_deref() == Some("B.TXT")
        });
        let root = Directory::root(&info);
        let found = root
            .find_entry(&mut volume.as_slice(), &info, &mut filter)
            .unwrap()
            .unwrap();
        drop(filter);
        assert_eq!(found.file_name(), Some(String::from("B.TXT")));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn test_undecodable_label_is_none() {
        let mut set = DentrySet::build_volume_label("AB");
        {
            let bytes = unsafe { &mut set.entries[0].bytes };
            // An unpaired high surrogate
            bytes[2..4].copy_from_slice(&0xD800u16.to_le_bytes());
        }
        assert_eq!(set.volume_label(), None);

        let mut set = DentrySet::build_volume_label("AB");
        {
            let bytes = unsafe { &mut set.entries[0].bytes };
            bytes[1] = 12;
        }
        assert_eq!(set.volume_label(), None);
    }

    #[test]
    fn test_write_entry_into_free_run() {
        let info = test_geometry(8);
        let mut volume = test_volume(&info);
        place(&mut volume, 1024, &DentrySet::build_volume_label("HERE"));

        let set = DentrySet::build_file(
            "NEW.TXT",
            FileAttributes::ARCHIVE,
            ExfatTimestamp::from_raw(0),
            4,
            100,
            true,
        );
        let root = Directory::root(&info);
        let offset = {
            let mut device = volume.as_mut_slice();
            root.write_entry(&mut device, &info, &set).unwrap()
        };
        assert_eq!(offset, Some(1024 + 32));

        let found = root
            .find_entry(
                &mut volume.as_slice(),
                &info,
                &mut DentryFilter::by_type(entry_type::FILE),
            )
            .unwrap()
            .unwrap();
        assert_eq!(found.device_offset(), 1024 + 32);
        assert_eq!(found.validity(), SetValidity::Valid);
        assert_eq!(found.file_name(), Some(String::from("NEW.TXT")));
    }

    #[test]
    fn test_write_entry_full_directory() {
        let info = test_geometry(8);
        let mut volume = test_volume(&info);
        for record in 0..16 {
            place(
                &mut volume,
                1024 + record * 32,
                &DentrySet::build_volume_label("X"),
            );
        }

        let set = DentrySet::build_volume_label("Y");
        let root = Directory::root(&info);
        let mut device = volume.as_mut_slice();
        let offset = root.write_entry(&mut device, &info, &set).unwrap();
        assert_eq!(offset, None);
    }

    #[test]
    fn test_name_hash_matches_stored() {
        let set = DentrySet::build_file(
            "readme.txt",
            FileAttributes::ARCHIVE,
            ExfatTimestamp::from_raw(0),
            4,
            100,
            true,
        );
        let stream = set.stream_info().unwrap();
        let upcased: Vec<u16> = "README.TXT".encode_utf16().collect();
        assert_eq!(stream.name_hash, checksum::name_hash(&upcased));
        assert_eq!(stream.name_length, 10);
        assert_eq!(set.file_name(), Some(String::from("readme.txt")));
    }
}
