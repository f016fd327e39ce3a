//! Temporary files backing oversized output volumes.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use memmap2::MmapMut;

const SCRATCH_PREFIX: &str = "trakt-resample-";

/// Handle to the temporary file behind a disk-backed volume.
///
/// The owner deletes the file with [`ScratchFile::remove`] once the volume
/// has been persisted. A handle dropped without `remove` still deletes the
/// file, logging any failure.
#[derive(Debug)]
pub struct ScratchFile {
    path: PathBuf,
    removed: bool,
}

impl ScratchFile {
    /// Create a scratch file of `len` bytes in the system temp directory and
    /// map it read-write.
    pub fn create(len: u64) -> io::Result<(Self, MmapMut)> {
        Self::create_in(std::env::temp_dir(), len)
    }

    /// Create a scratch file of `len` bytes inside `dir` and map it read-write.
    pub fn create_in(dir: impl AsRef<Path>, len: u64) -> io::Result<(Self, MmapMut)> {
        let named = tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(".raw")
            .tempfile_in(dir)?;
        named.as_file().set_len(len)?;

        // The file is private to this process and only accessed through this map.
        let map = unsafe { MmapMut::map_mut(named.as_file())? };
        let (_file, path) = named.keep().map_err(|e| e.error)?;

        tracing::info!("Using disk-backed output at {} ({} bytes)", path.display(), len);
        Ok((Self { path, removed: false }, map))
    }

    /// Path of the scratch file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the scratch file.
    ///
    /// Any map over the file should be dropped first.
    pub fn remove(mut self) -> io::Result<()> {
        self.removed = true;
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        if !self.removed {
            if let Err(e) = fs::remove_file(&self.path) {
                if e.kind() != io::ErrorKind::NotFound {
                    tracing::warn!("Failed to delete scratch file {}: {}", self.path.display(), e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scratch_create_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let (scratch, mut map) = ScratchFile::create_in(dir.path(), 64).unwrap();
        assert!(scratch.path().exists());
        assert_eq!(map.len(), 64);
        map[0] = 7;

        let path = scratch.path().to_path_buf();
        drop(map);
        scratch.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_scratch_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let (scratch, map) = ScratchFile::create_in(dir.path(), 16).unwrap();
        let path = scratch.path().to_path_buf();
        drop(map);
        drop(scratch);
        assert!(!path.exists());
    }
}
