//! Persistence for undo entries.

use super::entry::UndoEntry;
use crate::error::{EngineError, Result};
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Magic bytes for ledger files.
const LEDGER_MAGIC: &[u8; 4] = b"UND\0";

/// Current ledger format version.
const LEDGER_VERSION: u8 = 1;

const LEDGER_FILE: &str = "undo.ledger";

/// Sanity bound on the body length read from disk (100MB).
const MAX_LEDGER_BODY: u64 = 100 * 1024 * 1024;

/// Durable storage for the whole ledger.
///
/// Entries are saved as a full snapshot on every change. Eviction is the
/// ledger's job; a backend stores whatever it is given.
pub trait LedgerBackend: Send + Sync {
    fn load(&self) -> Result<Vec<UndoEntry>>;
    fn save(&self, entries: &[UndoEntry]) -> Result<()>;
}

/// Keeps the snapshot in memory. Sharing one across ledgers simulates a
/// process restart.
#[derive(Default)]
pub struct MemoryBackend {
    entries: Mutex<Vec<UndoEntry>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LedgerBackend for MemoryBackend {
    fn load(&self) -> Result<Vec<UndoEntry>> {
        Ok(self.entries.lock().clone())
    }

    fn save(&self, entries: &[UndoEntry]) -> Result<()> {
        *self.entries.lock() = entries.to_vec();
        Ok(())
    }
}

/// Single-file ledger in a directory held under an exclusive lock.
///
/// Layout: magic, version byte, u64 body length, MessagePack body, CRC32
/// of the body. Saves go to a temporary file that is renamed into place.
pub struct FileBackend {
    dir: PathBuf,

    /// Lock file for exclusive access.
    _lock_file: File,
}

impl FileBackend {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        let lock_file = Self::acquire_lock(&dir)?;
        Ok(Self {
            dir,
            _lock_file: lock_file,
        })
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(LEDGER_FILE)
    }

    fn acquire_lock(dir: &Path) -> Result<File> {
        let lock_file = File::create(dir.join("LOCK"))?;
        lock_file
            .try_lock_exclusive()
            .map_err(|_| EngineError::Locked)?;
        Ok(lock_file)
    }
}

impl LedgerBackend for FileBackend {
    fn load(&self) -> Result<Vec<UndoEntry>> {
        let path = self.path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let mut file = File::open(&path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != LEDGER_MAGIC {
            return Err(EngineError::InvalidFormat("Invalid ledger magic".into()));
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != LEDGER_VERSION {
            return Err(EngineError::InvalidFormat(format!(
                "Unsupported ledger version: {}",
                version[0]
            )));
        }

        let mut len_bytes = [0u8; 8];
        file.read_exact(&mut len_bytes)?;
        let len = u64::from_le_bytes(len_bytes);

        if len > MAX_LEDGER_BODY {
            return Err(EngineError::Corruption(format!(
                "ledger body length {} exceeds limit",
                len
            )));
        }

        let mut encoded = vec![0u8; len as usize];
        file.read_exact(&mut encoded)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored = u32::from_le_bytes(checksum_bytes);
        let computed = crc32fast::hash(&encoded);
        if stored != computed {
            return Err(EngineError::Corruption(format!(
                "ledger checksum mismatch: expected {:08x}, got {:08x}",
                stored, computed
            )));
        }

        Ok(rmp_serde::from_slice(&encoded)?)
    }

    fn save(&self, entries: &[UndoEntry]) -> Result<()> {
        let encoded = rmp_serde::to_vec(entries)?;
        if encoded.len() as u64 > MAX_LEDGER_BODY {
            return Err(EngineError::Serialization(format!(
                "ledger body of {} bytes exceeds limit",
                encoded.len()
            )));
        }
        let tmp = self.dir.join(format!("{}.tmp", LEDGER_FILE));

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;
            file.write_all(LEDGER_MAGIC)?;
            file.write_all(&[LEDGER_VERSION])?;
            file.write_all(&(encoded.len() as u64).to_le_bytes())?;
            file.write_all(&encoded)?;
            file.write_all(&crc32fast::hash(&encoded).to_le_bytes())?;
            file.sync_all()?;
        }

        fs::rename(&tmp, self.path())?;
        Ok(())
    }
}
