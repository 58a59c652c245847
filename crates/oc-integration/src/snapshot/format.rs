//! Savestate container
//!
//! ```text
//! magic      [u8; 8]  "OXSTATE\0"
//! version    u16
//! program_id u64
//! movie_id   u64
//! timestamp  u64      wall-clock seconds since the Unix epoch
//! count      u32
//! count x { key: u32 len + utf-8, payload: u32 len + bytes }
//! ```
//!
//! All integers are little-endian. Records are written in module activation
//! order; readers must not depend on that order.

use std::collections::HashSet;
use std::io::{Read, Write};

use oc_hle::ModuleRecord;

use super::error::{Result, SnapshotError};
use super::io::{ReadLeExt, WriteLeExt};

pub const SNAPSHOT_MAGIC: &[u8; 8] = b"OXSTATE\0";
pub const SNAPSHOT_VERSION: u16 = 1;

const MAX_KEY_LEN: u32 = 64;
const MAX_MODULES: u32 = 1024;
const MAX_PAYLOAD_LEN: u32 = 256 * 1024 * 1024;

/// Identity and creation time of a savestate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotHeader {
    pub program_id: u64,
    pub movie_id: u64,
    pub timestamp: u64,
}

pub fn write_snapshot<W: Write>(w: &mut W, header: &SnapshotHeader, modules: &[ModuleRecord]) -> Result<()> {
    w.write_all(SNAPSHOT_MAGIC)?;
    w.write_u16_le(SNAPSHOT_VERSION)?;
    w.write_u64_le(header.program_id)?;
    w.write_u64_le(header.movie_id)?;
    w.write_u64_le(header.timestamp)?;

    let count: u32 = modules
        .len()
        .try_into()
        .map_err(|_| SnapshotError::Corrupt("too many modules"))?;
    w.write_u32_le(count)?;
    for module in modules {
        w.write_string_u32(&module.key)?;
        w.write_len_prefixed_bytes_u32(&module.payload)?;
    }
    Ok(())
}

pub fn read_header<R: Read>(r: &mut R) -> Result<SnapshotHeader> {
    let mut magic = [0u8; 8];
    r.read_exact(&mut magic)?;
    if &magic != SNAPSHOT_MAGIC {
        return Err(SnapshotError::InvalidMagic);
    }
    let version = r.read_u16_le()?;
    if version != SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(version));
    }
    Ok(SnapshotHeader {
        program_id: r.read_u64_le()?,
        movie_id: r.read_u64_le()?,
        timestamp: r.read_u64_le()?,
    })
}

pub fn read_snapshot<R: Read>(r: &mut R) -> Result<(SnapshotHeader, Vec<ModuleRecord>)> {
    let header = read_header(r)?;

    let count = r.read_u32_le()?;
    if count > MAX_MODULES {
        return Err(SnapshotError::Corrupt("module count exceeds limit"));
    }
    let mut seen = HashSet::new();
    let mut modules = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let key = r.read_string_u32(MAX_KEY_LEN)?;
        let payload = r.read_len_prefixed_bytes_u32(MAX_PAYLOAD_LEN)?;
        if !seen.insert(key.clone()) {
            return Err(SnapshotError::Corrupt("duplicate module key"));
        }
        modules.push(ModuleRecord { key, payload });
    }

    let mut trailing = [0u8; 1];
    if r.read(&mut trailing)? != 0 {
        return Err(SnapshotError::Corrupt("trailing data after last module"));
    }
    Ok((header, modules))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header() -> SnapshotHeader {
        SnapshotHeader {
            program_id: 0x0004_0000_0005_5D00,
            movie_id: 0,
            timestamp: 1_700_000_000,
        }
    }

    fn record(key: &str, payload: &[u8]) -> ModuleRecord {
        ModuleRecord {
            key: key.to_string(),
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn test_write_read() {
        let modules = vec![record("ptm:u", &[1, 2, 3]), record("nfc:u", &[])];
        let mut bytes = Vec::new();
        write_snapshot(&mut bytes, &header(), &modules).unwrap();

        let (read_header, read_modules) = read_snapshot(&mut Cursor::new(&bytes)).unwrap();
        assert_eq!(read_header, header());
        assert_eq!(read_modules, modules);
    }

    #[test]
    fn test_bad_magic_and_version() {
        let mut bytes = Vec::new();
        write_snapshot(&mut bytes, &header(), &[]).unwrap();

        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            read_snapshot(&mut Cursor::new(&bad_magic)),
            Err(SnapshotError::InvalidMagic)
        ));

        let mut bad_version = bytes;
        bad_version[8] = 9;
        assert!(matches!(
            read_snapshot(&mut Cursor::new(&bad_version)),
            Err(SnapshotError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let modules = vec![record("ptm:u", &[1]), record("ptm:u", &[2])];
        let mut bytes = Vec::new();
        write_snapshot(&mut bytes, &header(), &modules).unwrap();
        assert!(matches!(
            read_snapshot(&mut Cursor::new(&bytes)),
            Err(SnapshotError::Corrupt("duplicate module key"))
        ));
    }

    #[test]
    fn test_trailing_data_rejected() {
        let mut bytes = Vec::new();
        write_snapshot(&mut bytes, &header(), &[record("cfg:u", &[0])]).unwrap();
        bytes.push(0);
        assert!(matches!(
            read_snapshot(&mut Cursor::new(&bytes)),
            Err(SnapshotError::Corrupt(_))
        ));
    }
}
