//! Backup files: naming, durable creation, and discovery.
//!
//! A backup is a verbatim copy of the image written next to it as
//! `<path>.backup_<YYYYMMDDhhmmss>` (or `<path>.backup` with the plain scheme).
//! Names never collide: a taken name gets `_1`, `_2`, … appended.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const BACKUP_SUFFIX: &str = ".backup";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const MAX_COLLISIONS: u32 = 10_000;

/// Backup file naming convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupScheme {
    /// `<path>.backup_<YYYYMMDDhhmmss>`
    #[default]
    Timestamped,
    /// `<path>.backup`
    Plain,
}

/// Where a pre-write snapshot went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Backup {
    /// Sibling file of a file-backed image.
    File(PathBuf),
    /// Index into the store's in-memory snapshots.
    Memory(usize),
}

impl fmt::Display for Backup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Memory(i) => write!(f, "<memory snapshot #{}>", i),
        }
    }
}

/// Backup name before collision handling.
pub fn backup_base_name(path: &Path, scheme: BackupScheme, now: &DateTime<Local>) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(BACKUP_SUFFIX);
    if scheme == BackupScheme::Timestamped {
        name.push("_");
        name.push(now.format(TIMESTAMP_FORMAT).to_string());
    }
    PathBuf::from(name)
}

fn with_counter(base: &Path, n: u32) -> PathBuf {
    if n == 0 {
        return base.to_path_buf();
    }
    let mut name = base.as_os_str().to_os_string();
    name.push(format!("_{}", n));
    PathBuf::from(name)
}

/// Write `bytes` as a new backup of `path` and flush it to disk.
///
/// Returns the path actually used. An existing file is never overwritten.
pub fn write_backup(path: &Path, bytes: &[u8], scheme: BackupScheme) -> io::Result<PathBuf> {
    let base = backup_base_name(path, scheme, &Local::now());
    for n in 0..MAX_COLLISIONS {
        let candidate = with_counter(&base, n);
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(e),
        };
        if let Err(e) = file.write_all(bytes).and_then(|_| file.sync_all()) {
            let _ = fs::remove_file(&candidate);
            return Err(e);
        }
        log::info!("Backup created: {} ({} bytes)", candidate.display(), bytes.len());
        return Ok(candidate);
    }
    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        format!("no free backup name for {}", base.display()),
    ))
}

/// Backups of `path` found in its directory, sorted by name.
pub fn list_backups(path: &Path) -> io::Result<Vec<PathBuf>> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?
        .to_string_lossy()
        .to_string();
    let prefix = format!("{}{}", file_name, BACKUP_SUFFIX);

    let mut found: Vec<PathBuf> = fs::read_dir(dir)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| {
            p.is_file()
                && p.file_name()
                    .map(|n| n.to_string_lossy().starts_with(&prefix))
                    .unwrap_or(false)
        })
        .collect();
    found.sort();
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_backup_base_name() {
        let now = Local.with_ymd_and_hms(2026, 10, 16, 9, 5, 7).unwrap();
        let path = Path::new("/tmp/ecu.bin");
        assert_eq!(
            backup_base_name(path, BackupScheme::Timestamped, &now),
            PathBuf::from("/tmp/ecu.bin.backup_20261016090507")
        );
        assert_eq!(
            backup_base_name(path, BackupScheme::Plain, &now),
            PathBuf::from("/tmp/ecu.bin.backup")
        );
    }

    #[test]
    fn test_plain_backups_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("ecu.bin");
        fs::write(&image, [1u8, 2, 3]).unwrap();

        let first = write_backup(&image, &[1, 2, 3], BackupScheme::Plain).unwrap();
        let second = write_backup(&image, &[4, 5, 6], BackupScheme::Plain).unwrap();
        assert_eq!(first, dir.path().join("ecu.bin.backup"));
        assert_eq!(second, dir.path().join("ecu.bin.backup_1"));
        assert_eq!(fs::read(&first).unwrap(), vec![1, 2, 3]);
        assert_eq!(fs::read(&second).unwrap(), vec![4, 5, 6]);
    }

    #[test]
    fn test_timestamped_backups_same_second() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("ecu.bin");
        fs::write(&image, [0u8; 4]).unwrap();

        let a = write_backup(&image, &[0; 4], BackupScheme::Timestamped).unwrap();
        let b = write_backup(&image, &[0; 4], BackupScheme::Timestamped).unwrap();
        assert_ne!(a, b);
        assert!(a.exists() && b.exists());
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("ecu.bin.backup_"));
    }

    #[test]
    fn test_list_backups() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("ecu.bin");
        fs::write(&image, [0u8; 4]).unwrap();
        fs::write(dir.path().join("other.bin.backup"), [0u8; 4]).unwrap();
        assert!(list_backups(&image).unwrap().is_empty());

        write_backup(&image, &[0; 4], BackupScheme::Plain).unwrap();
        write_backup(&image, &[0; 4], BackupScheme::Timestamped).unwrap();
        let found = list_backups(&image).unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found[0], dir.path().join("ecu.bin.backup"));
    }

    #[test]
    fn test_write_backup_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("missing").join("ecu.bin");
        assert!(write_backup(&image, &[0], BackupScheme::Plain).is_err());
    }
}
