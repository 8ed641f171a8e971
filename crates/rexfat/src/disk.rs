//! This module contains structures and functions for working with disks.
//!
//! Disks are represented by the [`DiskReader`] and [`DiskWriter`] traits, which are implemented
//! for byte slices by default and for [`std::fs::File`] with the `std` feature. The errors
//! returned by these traits are [`DiskError`].

/// Errors that can occur when reading or writing to a disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DiskError {
    /// The range that was requested is out of bounds, e.g. the disk is smaller than the
    /// requested offset plus length. A short read is reported the same way.
    #[error("Index out of bounds")]
    OutOfBounds,
    /// An error occurred while reading or writing to the disk. This can happen randomly at any
    /// time, especially for hard drives, and should be handled by the caller.
    #[error("Disk error")]
    DiskError,
}

/// A trait for reading from a disk.
///
/// The engine addresses the device by byte offset; implementations decide how to map that
/// onto sectors. The struct implementing this trait should hold a reference to the data, or
/// other means of ensuring that the data is not modified while being read.
/// See [`DiskWriter`] for writing to a disk.
///
/// # Examples
/// ```
/// use rexfat::disk::{DiskReader, DiskError};
///
/// // This would be a real disk
/// let disk = [0u8; 1024];
/// let mut reader = &disk[..];
/// let mut buffer = [0u8; 512];
///
/// reader.read_bytes(0, &mut buffer)?;
/// reader.read_bytes(512, &mut buffer)?;
/// # Ok::<(), DiskError>(())
/// ```
pub trait DiskReader {
    /// Reads `buffer.len()` bytes starting at `offset` into the given buffer.
    ///
    /// # Errors
    /// This function will return an error if the requested range is out of bounds, or if
    /// there is an error while reading from the disk.
    fn read_bytes(&mut self, offset: u64, buffer: &mut [u8]) -> Result<(), DiskError>;
}

/// A trait for writing to a disk.
///
/// See [`DiskReader`] for reading from a disk.
///
/// # Examples
/// ```
/// use rexfat::disk::{DiskWriter, DiskError};
///
/// // This would be a real disk
/// let mut disk = [0u8; 1024];
/// let mut writer = &mut disk[..];
///
/// writer.write_bytes(0, &[0xFF; 512])?;
/// writer.write_bytes(512, &[0xFF; 512])?;
/// # Ok::<(), DiskError>(())
/// ```
pub trait DiskWriter {
    /// Writes the given buffer to the disk starting at `offset`.
    ///
    /// # Errors
    /// This function will return an error if the requested range is out of bounds, or if
    /// there is an error while writing to the disk.
    fn write_bytes(&mut self, offset: u64, buffer: &[u8]) -> Result<(), DiskError>;
}

/// A unified trait for [`DiskReader`] and [`DiskWriter`].
pub trait Disk: DiskReader + DiskWriter {}

/// Implementations of [`DiskReader`] and [`DiskWriter`] for byte slices.
#[doc(hidden)]
mod impls {
    use super::*;

    fn range(offset: u64, len: usize, disk_len: usize) -> Result<usize, DiskError> {
        let offset = usize::try_from(offset).map_err(|_| DiskError::OutOfBounds)?;
        let end = offset.checked_add(len).ok_or(DiskError::OutOfBounds)?;
        if end > disk_len {
            return Err(DiskError::OutOfBounds);
        }
        Ok(offset)
    }

    impl DiskReader for &[u8] {
        fn read_bytes(&mut self, offset: u64, buffer: &mut [u8]) -> Result<(), DiskError> {
            let offset = range(offset, buffer.len(), self.len())?;
            buffer.copy_from_slice(&self[offset..offset + buffer.len()]);
            Ok(())
        }
    }

    impl DiskReader for &mut [u8] {
        fn read_bytes(&mut self, offset: u64, buffer: &mut [u8]) -> Result<(), DiskError> {
            let offset = range(offset, buffer.len(), self.len())?;
            buffer.copy_from_slice(&self[offset..offset + buffer.len()]);
            Ok(())
        }
    }

    impl DiskWriter for &mut [u8] {
        fn write_bytes(&mut self, offset: u64, buffer: &[u8]) -> Result<(), DiskError> {
            let offset = range(offset, buffer.len(), self.len())?;
            self[offset..offset + buffer.len()].copy_from_slice(buffer);
            Ok(())
        }
    }

    impl Disk for &mut [u8] {}
}

#[cfg(feature = "std")]
mod std_impls {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};

    impl DiskReader for std::fs::File {
        fn read_bytes(&mut self, offset: u64, buffer: &mut [u8]) -> Result<(), DiskError> {
            self.seek(SeekFrom::Start(offset))
                .map_err(|_| DiskError::DiskError)?;
            self.read_exact(buffer).map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => DiskError::OutOfBounds,
                _ => DiskError::DiskError,
            })
        }
    }

    impl DiskWriter for std::fs::File {
        fn write_bytes(&mut self, offset: u64, buffer: &[u8]) -> Result<(), DiskError> {
            self.seek(SeekFrom::Start(offset))
                .map_err(|_| DiskError::DiskError)?;
            self.write_all(buffer).map_err(|_| DiskError::DiskError)
        }
    }

    impl Disk for std::fs::File {}
}
