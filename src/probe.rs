//! Filesystem probes feeding the rotation check.
//!
//! Both are advisory: a failed stat is treated the same as an absent file and
//! never surfaces as an error.

use std::{fs, path::Path};

/// Current size of the file at `path` in bytes, or 0 if it cannot be stat'ed.
pub fn size(path: &Path) -> u64 {
    fs::metadata(path).map_or(0, |m| m.len())
}

/// Whether `path` currently names a regular file.
pub fn exists(path: &Path) -> bool {
    fs::metadata(path).map(|m| m.is_file()).unwrap_or(false)
}
