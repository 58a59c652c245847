//! Savestate engine
//!
//! One file per (program, movie, slot) in the configured states directory.
//! Writes go to a temporary file in the same directory which is then renamed
//! over the slot, so a failed save never damages the previous state.

pub mod error;
pub mod format;
pub mod io;

use chrono::{DateTime, Utc};
use oc_hle::ServiceManager;
use std::fs::{self, File};
use std::io::{BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

pub use error::{Result, SnapshotError};
pub use format::SnapshotHeader;

/// Number of user-visible savestate slots
pub const SAVESTATE_SLOT_COUNT: u32 = 10;
/// Savestate file extension
pub const SAVESTATE_EXTENSION: &str = "cst";

/// One populated slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavestateEntry {
    pub slot: u32,
    /// Wall-clock seconds since the Unix epoch
    pub timestamp: u64,
}

impl SavestateEntry {
    pub fn time(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(i64::try_from(self.timestamp).ok()?, 0)
    }
}

fn check_slot(slot: u32) -> Result<()> {
    if (1..=SAVESTATE_SLOT_COUNT).contains(&slot) {
        Ok(())
    } else {
        Err(SnapshotError::SlotOutOfRange(slot))
    }
}

/// Saves, loads and lists savestates in one directory
#[derive(Debug, Clone)]
pub struct SnapshotEngine {
    dir: PathBuf,
}

impl SnapshotEngine {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing a slot
    pub fn slot_path(&self, program_id: u64, movie_id: u64, slot: u32) -> PathBuf {
        self.dir.join(format!(
            "{:016X}.{:016X}.{:02}.{}",
            program_id, movie_id, slot, SAVESTATE_EXTENSION
        ))
    }

    /// Write every running service to `slot`
    pub fn save(&self, services: &ServiceManager, program_id: u64, movie_id: u64, slot: u32) -> Result<SavestateEntry> {
        check_slot(slot)?;

        let records = services.capture()?;
        let timestamp = u64::try_from(Utc::now().timestamp()).unwrap_or(0);
        let header = SnapshotHeader {
            program_id,
            movie_id,
            timestamp,
        };
        let mut bytes = Vec::new();
        format::write_snapshot(&mut bytes, &header, &records)?;

        fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        let path = self.slot_path(program_id, movie_id, slot);
        tmp.persist(&path).map_err(|e| e.error)?;

        info!(
            "Saved state to slot {} ({} modules, {} bytes)",
            slot,
            records.len(),
            bytes.len()
        );
        Ok(SavestateEntry { slot, timestamp })
    }

    /// Replace every running service with the contents of `slot`.
    ///
    /// On any error the services are left exactly as they were.
    pub fn load(&self, services: &mut ServiceManager, program_id: u64, movie_id: u64, slot: u32) -> Result<()> {
        check_slot(slot)?;

        let path = self.slot_path(program_id, movie_id, slot);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(SnapshotError::SlotEmpty(slot)),
            Err(e) => return Err(e.into()),
        };
        let (header, records) = format::read_snapshot(&mut BufReader::new(file))?;
        if header.program_id != program_id {
            return Err(SnapshotError::ProgramMismatch {
                expected: program_id,
                found: header.program_id,
            });
        }

        services.restore(&records)?;
        info!("Loaded state from slot {} ({} modules)", slot, records.len());
        Ok(())
    }

    /// Populated slots for a program/movie pair, in slot order
    pub fn list(&self, program_id: u64, movie_id: u64) -> Vec<SavestateEntry> {
        (1..=SAVESTATE_SLOT_COUNT)
            .filter_map(|slot| {
                let path = self.slot_path(program_id, movie_id, slot);
                let file = File::open(&path).ok()?;
                match format::read_header(&mut BufReader::new(file)) {
                    Ok(header) if header.program_id == program_id && header.movie_id == movie_id => {
                        Some(SavestateEntry {
                            slot,
                            timestamp: header.timestamp,
                        })
                    }
                    Ok(_) => {
                        debug!("Ignoring {}: identity does not match its name", path.display());
                        None
                    }
                    Err(e) => {
                        warn!("Ignoring unreadable savestate {}: {}", path.display(), e);
                        None
                    }
                }
            })
            .collect()
    }
}
