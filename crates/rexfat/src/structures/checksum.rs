//! Checksums used by the on-disk structures
//!
//! exFAT uses one checksum shape everywhere: rotate the accumulator right
//! by one bit, then add the next input byte. The variants differ only in
//! accumulator width and in which byte offsets are skipped.

/// Checksum over a directory entry set.
///
/// `data` is the raw bytes of the whole set, primary entry first. Offsets
/// 2 and 3 hold the stored checksum itself and are skipped.
pub fn entry_set_checksum(data: &[u8]) -> u16 {
    let mut checksum: u16 = 0;
    for (i, byte) in data.iter().enumerate() {
        if i == 2 || i == 3 {
            continue;
        }
        checksum = checksum.rotate_right(1).wrapping_add(*byte as u16);
    }
    checksum
}

/// Checksum over the first 11 sectors of a boot region.
///
/// The volume flags (offsets 106 and 107) and percent-in-use (offset 112)
/// change at runtime and are excluded. The result is stored repeated
/// throughout the 12th sector.
pub fn boot_region_checksum(data: &[u8]) -> u32 {
    let mut checksum: u32 = 0;
    for (i, byte) in data.iter().enumerate() {
        if i == 106 || i == 107 || i == 112 {
            continue;
        }
        checksum = checksum.rotate_right(1).wrapping_add(*byte as u32);
    }
    checksum
}

/// Checksum over the upcase table bytes. No offsets are skipped.
pub fn table_checksum(data: &[u8]) -> u32 {
    let mut checksum: u32 = 0;
    for byte in data {
        checksum = checksum.rotate_right(1).wrapping_add(*byte as u32);
    }
    checksum
}

/// Name hash stored in a stream extension entry.
///
/// Computed over the UTF-16LE bytes of the upcased file name.
pub fn name_hash(name: &[u16]) -> u16 {
    let mut hash: u16 = 0;
    for unit in name {
        for byte in unit.to_le_bytes() {
            hash = hash.rotate_right(1).wrapping_add(byte as u16);
        }
    }
    hash
}

/// Fills a boot checksum sector with the given value repeated.
#[cfg(feature = "write")]
pub fn build_checksum_sector(checksum: u32, sector_size: usize) -> alloc::vec::Vec<u8> {
    let mut sector = alloc::vec![0u8; sector_size];
    for chunk in sector.chunks_exact_mut(4) {
        chunk.copy_from_slice(&checksum.to_le_bytes());
    }
    sector
}
