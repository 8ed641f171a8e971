//! Raw byte structures for the exFAT file system
//!
//! Every structure here mirrors the on-disk layout bit for bit:
//! `repr(C, packed)`, one byte alignment, and little-endian multi-byte
//! fields kept as byte arrays. Decoding into host integers happens in the
//! info structures one level up.

pub mod boot_sector;
pub mod dentry;
