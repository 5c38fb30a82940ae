//! Image store: owns the bytes of one firmware image and guards every
//! mutation with a full-image backup.
//!
//! State per store: `Clean` → `BackingUp` → `Dirty` → `Clean`. Bytes only
//! change after a backup has been written; a failed backup leaves the bytes
//! and the state as they were. The backup-then-persist sequence is not atomic
//! across a crash, so an image reopened after an interruption may be partly
//! written; its newest backup is the recovery path.

use crate::backup::{self, Backup, BackupScheme};
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Backup failed, image left untouched: {0}")]
    Backup(#[source] io::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Patch at 0x{offset:X} ({len} bytes) runs past the image ({image_len} bytes)")]
    PatchOutOfBounds {
        offset: u64,
        len: usize,
        image_len: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageState {
    /// In memory and on disk agree.
    Clean,
    /// A backup is being written; no byte has changed yet.
    BackingUp,
    /// Backup exists and the in-memory bytes differ from disk.
    Dirty,
}

/// Bytes to place at an absolute offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub offset: u64,
    pub bytes: Vec<u8>,
}

impl Patch {
    pub fn new(offset: u64, bytes: Vec<u8>) -> Self {
        Self { offset, bytes }
    }

    /// One past the last patched byte; `None` on address overflow.
    pub fn end(&self) -> Option<u64> {
        self.offset.checked_add(self.bytes.len() as u64)
    }
}

pub struct ImageStore {
    path: Option<PathBuf>,
    bytes: Vec<u8>,
    state: ImageState,
    scheme: BackupScheme,
    backups: Vec<Backup>,
    snapshots: Vec<Vec<u8>>,
}

impl ImageStore {
    /// Load an image file with the default backup scheme.
    pub fn open(path: &Path) -> io::Result<Self> {
        Self::open_with_scheme(path, BackupScheme::default())
    }

    pub fn open_with_scheme(path: &Path, scheme: BackupScheme) -> io::Result<Self> {
        let bytes = fs::read(path)?;
        log::debug!("Opened {} ({} bytes, 0x{:X})", path.display(), bytes.len(), bytes.len());
        Ok(Self {
            path: Some(path.to_path_buf()),
            bytes,
            state: ImageState::Clean,
            scheme,
            backups: Vec::new(),
            snapshots: Vec::new(),
        })
    }

    /// An image that lives only in memory; backups are kept as in-memory snapshots.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            path: None,
            bytes,
            state: ImageState::Clean,
            scheme: BackupScheme::default(),
            backups: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn state(&self) -> ImageState {
        self.state
    }

    pub fn scheme(&self) -> BackupScheme {
        self.scheme
    }

    /// Backups taken by this store, oldest first.
    pub fn backups(&self) -> &[Backup] {
        &self.backups
    }

    /// Content of an in-memory backup.
    pub fn snapshot(&self, backup: &Backup) -> Option<&[u8]> {
        match backup {
            Backup::Memory(i) => self.snapshots.get(*i).map(|s| s.as_slice()),
            Backup::File(_) => None,
        }
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// File-backed stores copy what is on disk now, which can differ from
    /// `bytes` after a failed persist.
    fn take_backup(&mut self) -> io::Result<Backup> {
        let backup = match &self.path {
            Some(path) => {
                let on_disk = fs::read(path)?;
                if on_disk != self.bytes {
                    log::warn!(
                        "{} changed on disk since it was loaded; backing up the on-disk content",
                        path.display()
                    );
                }
                Backup::File(backup::write_backup(path, &on_disk, self.scheme)?)
            }
            None => {
                self.snapshots.push(self.bytes.clone());
                Backup::Memory(self.snapshots.len() - 1)
            }
        };
        self.backups.push(backup.clone());
        Ok(backup)
    }

    /// Snapshot the current image without modifying it.
    pub fn create_backup(&mut self) -> Result<Backup, StoreError> {
        let previous = self.state;
        self.state = ImageState::BackingUp;
        let result = self.take_backup();
        self.state = previous;
        result.map_err(StoreError::Backup)
    }

    /// Apply every patch, all or nothing: bounds are checked first, then a
    /// backup is taken, then the bytes change and are persisted.
    pub fn apply(&mut self, patches: &[Patch]) -> Result<Backup, StoreError> {
        let image_len = self.bytes.len();
        for p in patches {
            if p.end().map_or(true, |end| end > image_len as u64) {
                return Err(StoreError::PatchOutOfBounds {
                    offset: p.offset,
                    len: p.bytes.len(),
                    image_len,
                });
            }
        }

        let previous = self.state;
        self.state = ImageState::BackingUp;
        let backup = match self.take_backup() {
            Ok(b) => b,
            Err(e) => {
                self.state = previous;
                log::warn!("Backup failed, edit aborted: {}", e);
                return Err(StoreError::Backup(e));
            }
        };

        for p in patches {
            let start = p.offset as usize;
            self.bytes[start..start + p.bytes.len()].copy_from_slice(&p.bytes);
        }
        self.state = ImageState::Dirty;

        self.persist()?;
        Ok(backup)
    }

    /// Write the in-memory bytes back to the original path.
    pub fn persist(&mut self) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            let mut file = OpenOptions::new().write(true).truncate(true).open(path)?;
            file.write_all(&self.bytes)?;
            file.sync_all()?;
            log::info!("Wrote {} ({} bytes)", path.display(), self.bytes.len());
        }
        self.state = ImageState::Clean;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_apply_keeps_snapshot() {
        let mut store = ImageStore::from_bytes(vec![0u8; 16]);
        let backup = store.apply(&[Patch::new(4, vec![1, 2])]).unwrap();
        assert_eq!(store.state(), ImageState::Clean);
        assert_eq!(&store.bytes()[4..6], &[1, 2]);
        assert_eq!(store.snapshot(&backup).unwrap(), &[0u8; 16][..]);
        assert_eq!(store.backups().len(), 1);
    }

    #[test]
    fn test_patch_out_of_bounds_touches_nothing() {
        let mut store = ImageStore::from_bytes(vec![7u8; 8]);
        let err = store
            .apply(&[Patch::new(0, vec![1]), Patch::new(7, vec![1, 1])])
            .unwrap_err();
        assert!(matches!(err, StoreError::PatchOutOfBounds { offset: 7, .. }));
        assert_eq!(store.bytes(), &[7u8; 8]);
        assert!(store.backups().is_empty());
    }

    #[test]
    fn test_patch_address_overflow_rejected() {
        let mut store = ImageStore::from_bytes(vec![7u8; 8]);
        let err = store.apply(&[Patch::new(u64::MAX, vec![1, 2])]).unwrap_err();
        assert!(matches!(err, StoreError::PatchOutOfBounds { offset: u64::MAX, len: 2, .. }));
        assert_eq!(Patch::new(u64::MAX, vec![1]).end(), None);
        assert_eq!(store.bytes(), &[7u8; 8]);
        assert!(store.backups().is_empty());
    }

    #[test]
    fn test_backup_copies_on_disk_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecu.bin");
        fs::write(&path, [1u8; 8]).unwrap();
        let mut store = ImageStore::open(&path).unwrap();

        fs::write(&path, [2u8; 8]).unwrap();
        let Backup::File(backup_path) = store.create_backup().unwrap() else {
            panic!("expected a file backup");
        };
        assert_eq!(fs::read(&backup_path).unwrap(), vec![2u8; 8]);
        assert_eq!(store.bytes(), &[1u8; 8]);
    }

    #[test]
    fn test_file_apply_backs_up_then_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecu.bin");
        fs::write(&path, [9u8; 32]).unwrap();

        let mut store = ImageStore::open(&path).unwrap();
        let backup = store.apply(&[Patch::new(0, vec![1, 2, 3])]).unwrap();

        let Backup::File(backup_path) = backup else {
            panic!("expected a file backup");
        };
        assert_eq!(fs::read(&backup_path).unwrap(), vec![9u8; 32]);
        let on_disk = fs::read(&path).unwrap();
        assert_eq!(&on_disk[..3], &[1, 2, 3]);
        assert_eq!(&on_disk[3..], &[9u8; 29][..]);
        assert_eq!(store.state(), ImageState::Clean);
    }

    #[test]
    fn test_failed_backup_aborts_edit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ecu.bin");
        fs::write(&path, [5u8; 8]).unwrap();
        let mut store = ImageStore::open(&path).unwrap();

        // Pull the directory out from under the store so the backup cannot be created.
        fs::remove_file(&path).unwrap();
        dir.close().unwrap();

        let err = store.apply(&[Patch::new(0, vec![1])]).unwrap_err();
        assert!(matches!(err, StoreError::Backup(_)));
        assert_eq!(store.bytes(), &[5u8; 8]);
        assert_eq!(store.state(), ImageState::Clean);
    }

    #[test]
    fn test_create_backup_leaves_state() {
        let mut store = ImageStore::from_bytes(vec![1, 2, 3]);
        let b = store.create_backup().unwrap();
        assert_eq!(b, Backup::Memory(0));
        assert_eq!(store.state(), ImageState::Clean);
        assert_eq!(store.bytes(), &[1, 2, 3]);
    }
}
