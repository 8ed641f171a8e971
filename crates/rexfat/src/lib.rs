//! A library for working with exFAT on-disk metadata
//!
//! This crate implements the metadata engine shared by exFAT tooling:
//! boot sector parsing and validation, cluster allocation bitmap
//! accounting, FAT chain traversal, and the directory entry set engine
//! that groups primary entries with their secondaries and verifies the
//! embedded checksums.
//!
//! When used with no features, the crate acts as a place for providing the
//! raw structures and checksums used by the exFAT file system.
//!
//! ## Cargo Features
//!
//! - **alloc**: Enables the 'alloc' feature, which allows for dynamic allocation of memory
//! - **std**: Enables the 'std' feature, which requires an 'std' environment
//! - **read**: Enables the 'read' feature, which allows for scanning exFAT volumes
//! - **write**: Enables the 'write' feature, which allows for constructing the
//!   on-disk structures (boot sector, entry sets, bitmap, FAT)

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

pub mod disk;
pub mod structures;
#[cfg(feature = "read")]
pub mod fs;
#[cfg(feature = "read")]
pub use fs::*;

/// Errors reported when the on-disk metadata violates the exFAT format.
///
/// All of these are recoverable at the engine level: they are reported
/// upward and never abort the process. A checksum mismatch inside a
/// directory entry set is deliberately *not* in this list; such sets are
/// still handed to the caller, marked invalid, so that a consistency
/// checker can observe them (see [`structures::directory::SetValidity`]).
/// [`FormatError::ChecksumMismatch`] covers whole-region checksums such
/// as the upcase table, where there is no partial result to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// The boot sector does not carry the exFAT signature.
    #[error("Boot sector is not exFAT")]
    BadSignature,
    /// A geometry field of the boot sector holds a value outside the
    /// ranges the format allows.
    #[error("Bogus geometry value: {0}")]
    BogusGeometry(&'static str),
    /// The bitmap descriptor declares a bitmap larger than the cluster
    /// count permits.
    #[error("Bitmap size {declared} exceeds maximum {max}")]
    BitmapTooLarge { declared: u64, max: u64 },
    /// A region checksum does not match its stored value.
    #[error("Checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    /// A cluster chain loops back on itself.
    #[error("Cluster chain cycle detected")]
    ChainCycle,
    /// A cluster index outside `2..cluster_count + 2` was dereferenced.
    #[error("Cluster {0} out of range")]
    ClusterOutOfRange(u32),
}

/// Errors that can occur when working with an exFAT volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ExfatError {
    /// An error occurred while reading or writing the device
    #[error(transparent)]
    Disk(#[from] disk::DiskError),
    /// The volume metadata violates the exFAT format
    #[error(transparent)]
    Format(#[from] FormatError),
}
