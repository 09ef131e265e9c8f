//! EMM archival collaborator
//!
//! EMMs whose nano carries the save flag are written twice: once as a text hex
//! dump and once as a binary record. A configured pending EMM file is replayed
//! to the card once after the next successful insertion.

use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Local};
use parking_lot::Mutex;
use smartcas_core::{EmmPacket, utils::hexdump};
use tracing::{debug, warn};

use crate::error::ArchiveError;

/// Storage for archived and pending EMMs
pub trait EmmArchive: Send + Sync + fmt::Debug {
    /// Store `contents` under `file_name`, returning where it was written
    fn store(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, ArchiveError>;

    /// Load the pending EMM, if one is queued
    fn load_pending(&self) -> Result<Option<EmmPacket>, ArchiveError>;

    /// Forget the pending EMM
    fn clear_pending(&self);
}

/// File names of one archived EMM
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveNames {
    /// Hex dump file
    pub text: String,
    /// Binary record file
    pub binary: String,
}

impl ArchiveNames {
    /// Names for an EMM archived at `at`
    pub fn new(unique: bool, at: DateTime<Local>) -> Self {
        let marker = if unique { "UNIQ" } else { "SHARED" };
        let stamp = at.format("%Y%m%d_%H_%M_%S");
        Self {
            text: format!("write_{marker}_{stamp}.txt"),
            binary: format!("write_{marker}_{stamp}.emm"),
        }
    }
}

/// Text form of an archived EMM: the declared section as an unspaced hex dump
pub fn text_record(packet: &EmmPacket) -> String {
    hexdump(packet.section(), false)
}

/// Collision suffixes tried before giving up on a file name
const MAX_COLLISIONS: usize = 1000;

/// `name` with `_<n>` inserted before its extension
fn suffixed(name: &str, n: usize) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_{n}.{ext}"),
        None => format!("{name}_{n}"),
    }
}

/// Archive rooted in a directory
///
/// Existing files are never overwritten: names already taken, such as two
/// EMMs archived within the same second, get a numeric suffix.
#[derive(Debug)]
pub struct DirArchive {
    dir: PathBuf,
    pending: Mutex<Option<PathBuf>>,
}

impl DirArchive {
    /// Create an archive writing into `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            pending: Mutex::new(None),
        }
    }

    /// Queue a pending EMM file; relative paths are resolved against the archive directory
    pub fn with_pending(self, file: impl AsRef<Path>) -> Self {
        let path = self.dir.join(file);
        *self.pending.lock() = Some(path);
        self
    }

    /// Archive directory
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Read a binary EMM record from `path`
    pub fn load(path: &Path) -> Result<EmmPacket, ArchiveError> {
        let record = fs::read(path).map_err(|e| ArchiveError::io(path, e))?;
        Ok(EmmPacket::from_bytes(&record)?)
    }
}

impl EmmArchive for DirArchive {
    fn store(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, ArchiveError> {
        let mut path = self.dir.join(file_name);
        for n in 1..=MAX_COLLISIONS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(contents)
                        .map_err(|e| ArchiveError::io(&path, e))?;
                    return Ok(path);
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(path = %path.display(), "Archive file exists, picking a new name");
                    path = self.dir.join(suffixed(file_name, n));
                }
                Err(e) => return Err(ArchiveError::io(&path, e)),
            }
        }
        Err(ArchiveError::io(
            &path,
            io::Error::from(io::ErrorKind::AlreadyExists),
        ))
    }

    fn load_pending(&self) -> Result<Option<EmmPacket>, ArchiveError> {
        let pending = self.pending.lock();
        match pending.as_deref() {
            Some(path) => {
                debug!(path = %path.display(), "Loading pending EMM");
                Self::load(path).map(Some)
            }
            None => Ok(None),
        }
    }

    fn clear_pending(&self) {
        self.pending.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use hex_literal::hex;

    #[test]
    fn test_archive_names() {
        let at = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();

        let names = ArchiveNames::new(true, at);
        assert_eq!(names.text, "write_UNIQ_20240309_07_05_01.txt");
        assert_eq!(names.binary, "write_UNIQ_20240309_07_05_01.emm");

        let names = ArchiveNames::new(false, at);
        assert_eq!(names.text, "write_SHARED_20240309_07_05_01.txt");
        assert_eq!(names.binary, "write_SHARED_20240309_07_05_01.emm");
    }

    #[test]
    fn test_text_record_covers_declared_section() {
        // Declared length 2, trailing byte beyond the section is not dumped
        let emm = EmmPacket::new(&hex!("8270020A0BFF")).unwrap();
        assert_eq!(text_record(&emm), "8270020A0B");
    }

    #[test]
    fn test_binary_record_survives_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = DirArchive::new(dir.path());
        let emm = EmmPacket::new(&hex!("8870040102030405")).unwrap();

        let path = archive.store("write_SHARED_x.emm", &emm.to_bytes()).unwrap();
        assert_eq!(path, dir.path().join("write_SHARED_x.emm"));
        assert_eq!(DirArchive::load(&path).unwrap(), emm);
    }

    #[test]
    fn test_store_never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let archive = DirArchive::new(dir.path());
        let name = "write_UNIQ_20240309_07_05_01.txt";

        let first = archive.store(name, b"8270020A0B").unwrap();
        let second = archive.store(name, b"8270020C0D").unwrap();
        let third = archive.store(name, b"8270020E0F").unwrap();

        assert_eq!(first, dir.path().join(name));
        assert_eq!(second, dir.path().join("write_UNIQ_20240309_07_05_01_1.txt"));
        assert_eq!(third, dir.path().join("write_UNIQ_20240309_07_05_01_2.txt"));
        assert_eq!(fs::read(&first).unwrap(), b"8270020A0B");
        assert_eq!(fs::read(&second).unwrap(), b"8270020C0D");
        assert_eq!(fs::read(&third).unwrap(), b"8270020E0F");
    }

    #[test]
    fn test_pending_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let emm = EmmPacket::new(&hex!("82700100")).unwrap();
        fs::write(dir.path().join("pending.emm"), emm.to_bytes()).unwrap();

        let archive = DirArchive::new(dir.path()).with_pending("pending.emm");
        assert_eq!(archive.load_pending().unwrap(), Some(emm));

        archive.clear_pending();
        assert_eq!(archive.load_pending().unwrap(), None);
    }

    #[test]
    fn test_missing_pending_file() {
        let dir = tempfile::tempdir().unwrap();
        let archive = DirArchive::new(dir.path()).with_pending("missing.emm");
        assert!(matches!(archive.load_pending(), Err(ArchiveError::Io { .. })));
    }

    #[test]
    fn test_store_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let archive = DirArchive::new(dir.path().join("nope"));
        assert!(matches!(
            archive.store("write_UNIQ_x.txt", b"82"),
            Err(ArchiveError::Io { .. })
        ));
    }
}
