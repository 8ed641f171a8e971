//! Raw directory entry records
//!
//! Every exFAT directory entry is 32 bytes, tagged by the type byte at
//! offset 0. [`RawDentry`] is a union over the per-type layouts; reading
//! any variant is sound because all of them accept every bit pattern.

/// Directory entry type tags and the bits inside them.
pub mod entry_type {
    /// End-of-directory marker, also the state of never-used entries
    pub const END_OF_DIRECTORY: u8 = 0x00;
    /// Allocation bitmap (benign primary)
    pub const ALLOCATION_BITMAP: u8 = 0x81;
    /// Upcase table (benign primary)
    pub const UPCASE_TABLE: u8 = 0x82;
    /// Volume label (benign primary)
    pub const VOLUME_LABEL: u8 = 0x83;
    /// File or directory (generic primary)
    pub const FILE: u8 = 0x85;
    /// Volume GUID (generic primary)
    pub const VOLUME_GUID: u8 = 0xA0;
    /// Stream extension (secondary)
    pub const STREAM_EXTENSION: u8 = 0xC0;
    /// File name fragment (secondary)
    pub const FILE_NAME: u8 = 0xC1;
    /// Vendor extension (secondary)
    pub const VENDOR_EXTENSION: u8 = 0xE0;
    /// Vendor allocation (secondary)
    pub const VENDOR_ALLOCATION: u8 = 0xE1;

    /// Set while the entry is in use; cleared when it is deleted
    pub const IN_USE: u8 = 0x80;
    /// The two top bits classify an in-use entry
    pub const CATEGORY_MASK: u8 = 0xC0;
    pub const CATEGORY_PRIMARY: u8 = 0x80;
    pub const CATEGORY_SECONDARY: u8 = 0xC0;
}

/// Size of a directory entry in bytes.
pub const DENTRY_SIZE: usize = 32;

/// Volume label entry (0x83)
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
pub struct RawVolumeLabelEntry {
    /// EntryType
    pub entry_type: u8,
    /// CharacterCount
    /// Length of the label in UTF-16 code units, at most 11
    pub char_count: u8,
    /// VolumeLabel
    /// 11 UTF-16LE code units
    pub label: [u8; 22],
    /// Reserved
    pub reserved: [u8; 8],
}

/// Allocation bitmap entry (0x81)
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
pub struct RawBitmapEntry {
    /// EntryType
    pub entry_type: u8,
    /// BitmapFlags
    /// Bit 0 selects the second bitmap on TexFAT volumes
    pub bitmap_flags: u8,
    /// Reserved
    pub reserved: [u8; 18],
    /// FirstCluster
    pub first_cluster: [u8; 4],
    /// DataLength
    /// Bitmap size in bytes
    pub data_length: [u8; 8],
}

/// Upcase table entry (0x82)
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
pub struct RawUpcaseEntry {
    /// EntryType
    pub entry_type: u8,
    /// Reserved1
    pub reserved1: [u8; 3],
    /// TableChecksum
    pub table_checksum: [u8; 4],
    /// Reserved2
    pub reserved2: [u8; 12],
    /// FirstCluster
    pub first_cluster: [u8; 4],
    /// DataLength
    /// Table size in bytes
    pub data_length: [u8; 8],
}

/// File entry (0x85)
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
pub struct RawFileEntry {
    /// EntryType
    pub entry_type: u8,
    /// SecondaryCount
    /// Number of secondary entries that follow and belong to this set
    pub secondary_count: u8,
    /// SetChecksum
    /// Over all bytes of the set except these two
    pub set_checksum: [u8; 2],
    /// FileAttributes
    pub attributes: [u8; 2],
    /// Reserved1
    pub reserved1: [u8; 2],
    /// CreateTimestamp
    pub create_time: [u8; 4],
    /// LastModifiedTimestamp
    pub modify_time: [u8; 4],
    /// LastAccessedTimestamp
    pub access_time: [u8; 4],
    /// Create10msIncrement
    pub create_time_cs: u8,
    /// LastModified10msIncrement
    pub modify_time_cs: u8,
    /// CreateUtcOffset
    pub create_tz: u8,
    /// LastModifiedUtcOffset
    pub modify_tz: u8,
    /// LastAccessedUtcOffset
    pub access_tz: u8,
    /// Reserved2
    pub reserved2: [u8; 7],
}

/// Volume GUID entry (0xA0)
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
pub struct RawGuidEntry {
    /// EntryType
    pub entry_type: u8,
    /// SecondaryCount
    /// Always 0, the GUID entry has no secondaries
    pub secondary_count: u8,
    /// SetChecksum
    pub set_checksum: [u8; 2],
    /// GeneralPrimaryFlags
    pub general_primary_flags: [u8; 2],
    /// VolumeGuid
    pub guid: [u8; 16],
    /// Reserved
    pub reserved: [u8; 10],
}

/// Stream extension entry (0xC0)
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
pub struct RawStreamEntry {
    /// EntryType
    pub entry_type: u8,
    /// GeneralSecondaryFlags
    /// Bit 0: allocation possible, bit 1: no FAT chain (contiguous)
    pub general_secondary_flags: u8,
    /// Reserved1
    pub reserved1: u8,
    /// NameLength
    /// Length of the file name in UTF-16 code units
    pub name_length: u8,
    /// NameHash
    /// Rolling hash over the upcased name
    pub name_hash: [u8; 2],
    /// Reserved2
    pub reserved2: [u8; 2],
    /// ValidDataLength
    pub valid_data_length: [u8; 8],
    /// Reserved3
    pub reserved3: [u8; 4],
    /// FirstCluster
    pub first_cluster: [u8; 4],
    /// DataLength
    pub data_length: [u8; 8],
}

/// File name entry (0xC1)
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::NoUninit, bytemuck::AnyBitPattern)]
pub struct RawFileNameEntry {
    /// EntryType
    pub entry_type: u8,
    /// GeneralSecondaryFlags
    pub general_secondary_flags: u8,
    /// FileName
    /// 15 UTF-16LE code units of the name
    pub name: [u8; 30],
}

/// One 32-byte directory entry, viewable as any of the typed layouts.
#[repr(C, packed)]
#[derive(Clone, Copy)]
pub union RawDentry {
    pub bytes: [u8; 32],
    pub label: RawVolumeLabelEntry,
    pub bitmap: RawBitmapEntry,
    pub upcase: RawUpcaseEntry,
    pub file: RawFileEntry,
    pub guid: RawGuidEntry,
    pub stream: RawStreamEntry,
    pub name: RawFileNameEntry,
}

// This isn't technically unsafe, since it is repr(C, packed), and all the fields have impls for it
unsafe impl bytemuck::Zeroable for RawDentry {}
unsafe impl bytemuck::NoUninit for RawDentry {}
unsafe impl bytemuck::AnyBitPattern for RawDentry {}

impl RawDentry {
    pub fn from_bytes(bytes: &[u8]) -> &RawDentry {
        bytemuck::from_bytes(bytes)
    }

    pub fn from_bytes_mut(bytes: &mut [u8]) -> &mut RawDentry {
        bytemuck::from_bytes_mut(bytes)
    }

    pub fn entry_type(&self) -> u8 {
        unsafe { self.bytes[0] }
    }

    pub fn is_end_of_directory(&self) -> bool {
        self.entry_type() == entry_type::END_OF_DIRECTORY
    }

    /// An in-use entry has the top bit of the type set; clearing it is how
    /// deletion is recorded.
    pub fn is_in_use(&self) -> bool {
        self.entry_type() & entry_type::IN_USE != 0
    }

    pub fn is_primary(&self) -> bool {
        self.is_in_use()
            && self.entry_type() & entry_type::CATEGORY_MASK == entry_type::CATEGORY_PRIMARY
    }

    pub fn is_secondary(&self) -> bool {
        self.entry_type() & entry_type::CATEGORY_MASK == entry_type::CATEGORY_SECONDARY
    }

    /// Bitmap, upcase and volume label entries form single-entry sets and
    /// carry neither a secondary count nor a set checksum.
    pub fn is_benign_primary(&self) -> bool {
        matches!(
            self.entry_type(),
            entry_type::ALLOCATION_BITMAP | entry_type::UPCASE_TABLE | entry_type::VOLUME_LABEL
        )
    }

    /// SecondaryCount of a generic primary. Only meaningful when
    /// [`Self::is_primary`] holds and the entry is not a benign primary.
    pub fn secondary_count(&self) -> u8 {
        unsafe { self.bytes[1] }
    }

    /// SetChecksum of a generic primary.
    pub fn set_checksum(&self) -> u16 {
        u16::from_le_bytes(unsafe { [self.bytes[2], self.bytes[3]] })
    }
}

impl core::fmt::Debug for RawDentry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RawDentry")
            .field("entry_type", &format_args!("{:#04x}", self.entry_type()))
            .finish()
    }
}
