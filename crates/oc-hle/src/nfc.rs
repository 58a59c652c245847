//! nfc:u HLE - NFC reader (amiibo)
//!
//! The host can place an amiibo dump on the virtual reader; games observe it
//! through the tag state machine below.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{error, info, warn};

use crate::module::ModuleState;

/// Size of a raw NTAG215 dump
pub const AMIIBO_DUMP_SIZE: usize = 540;

/// Reader state as seen by the guest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TagState {
    #[default]
    NotInitialized,
    Initialized,
    Scanning,
    TagInRange,
    TagOutOfRange,
    TagDataLoaded,
}

/// Raw amiibo dump, always exactly [`AMIIBO_DUMP_SIZE`] bytes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct AmiiboData {
    raw: Vec<u8>,
}

impl AmiiboData {
    /// Take the first [`AMIIBO_DUMP_SIZE`] bytes of `raw`; `None` if it is shorter
    pub fn from_dump(mut raw: Vec<u8>) -> Option<Self> {
        if raw.len() < AMIIBO_DUMP_SIZE {
            return None;
        }
        raw.truncate(AMIIBO_DUMP_SIZE);
        Some(Self { raw })
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// Character/model identifier stored in page 21-22
    pub fn model_id(&self) -> u64 {
        let mut id = [0u8; 8];
        if let Some(bytes) = self.raw.get(84..92) {
            id.copy_from_slice(bytes);
        }
        u64::from_be_bytes(id)
    }
}

impl TryFrom<Vec<u8>> for AmiiboData {
    type Error = String;

    fn try_from(raw: Vec<u8>) -> Result<Self, Self::Error> {
        if raw.len() != AMIIBO_DUMP_SIZE {
            return Err(format!(
                "amiibo dump is {} bytes, expected {}",
                raw.len(),
                AMIIBO_DUMP_SIZE
            ));
        }
        Ok(Self { raw })
    }
}

impl From<AmiiboData> for Vec<u8> {
    fn from(amiibo: AmiiboData) -> Self {
        amiibo.raw
    }
}

/// nfc:u service state
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct NfcU {
    state: TagState,
    amiibo: Option<AmiiboData>,
}

impl ModuleState for NfcU {
    const KEY: &'static str = "nfc:u";
}

impl NfcU {
    pub fn state(&self) -> TagState {
        self.state
    }

    pub fn initialize(&mut self) {
        self.state = TagState::Initialized;
    }

    pub fn finalize(&mut self) {
        self.state = TagState::NotInitialized;
    }

    /// Start polling for tags. A tag already on the reader is picked up at once.
    pub fn start_tag_scanning(&mut self) -> bool {
        if self.state == TagState::NotInitialized {
            return false;
        }
        self.state = if self.amiibo.is_some() {
            TagState::TagInRange
        } else {
            TagState::Scanning
        };
        true
    }

    pub fn stop_tag_scanning(&mut self) {
        if self.state != TagState::NotInitialized {
            self.state = TagState::Initialized;
        }
    }

    /// Guest reads the tag that is in range
    pub fn load_tag_data(&mut self) -> Option<&AmiiboData> {
        if self.state != TagState::TagInRange {
            return None;
        }
        self.state = TagState::TagDataLoaded;
        self.amiibo.as_ref()
    }

    /// Read an amiibo dump from disk and place it on the reader
    pub fn load_amiibo(&mut self, path: &Path) -> bool {
        let raw = match fs::read(path) {
            Ok(raw) => raw,
            Err(e) => {
                error!("Could not read amiibo file {}: {}", path.display(), e);
                return false;
            }
        };
        let len = raw.len();
        match AmiiboData::from_dump(raw) {
            Some(amiibo) => {
                self.place_amiibo(amiibo);
                true
            }
            None => {
                warn!("Amiibo file {} is too small ({} bytes)", path.display(), len);
                false
            }
        }
    }

    /// Place an already decoded dump on the reader
    pub fn place_amiibo(&mut self, amiibo: AmiiboData) {
        info!("Amiibo {:016X} placed on reader", amiibo.model_id());
        self.amiibo = Some(amiibo);
        if self.state == TagState::Scanning {
            self.state = TagState::TagInRange;
        }
    }

    /// Take the amiibo off the reader
    pub fn remove_amiibo(&mut self) {
        if self.amiibo.take().is_some() {
            info!("Amiibo removed from reader");
        }
        if matches!(self.state, TagState::TagInRange | TagState::TagDataLoaded) {
            self.state = TagState::TagOutOfRange;
        }
    }

    pub fn amiibo(&self) -> Option<&AmiiboData> {
        self.amiibo.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn dump(model: u64) -> Vec<u8> {
        let mut raw = vec![0u8; AMIIBO_DUMP_SIZE];
        raw[84..92].copy_from_slice(&model.to_be_bytes());
        raw
    }

    fn amiibo(model: u64) -> AmiiboData {
        AmiiboData::from_dump(dump(model)).unwrap()
    }

    #[test]
    fn test_scanning_picks_up_tag() {
        let mut nfc = NfcU::default();
        assert!(!nfc.start_tag_scanning());

        nfc.initialize();
        assert!(nfc.start_tag_scanning());
        assert_eq!(nfc.state(), TagState::Scanning);

        nfc.place_amiibo(amiibo(0x0100_0000_0004_0002));
        assert_eq!(nfc.state(), TagState::TagInRange);
        assert_eq!(nfc.load_tag_data().unwrap().model_id(), 0x0100_0000_0004_0002);
        assert_eq!(nfc.state(), TagState::TagDataLoaded);

        nfc.remove_amiibo();
        assert_eq!(nfc.state(), TagState::TagOutOfRange);
        assert!(nfc.amiibo().is_none());
    }

    #[test]
    fn test_load_amiibo_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&dump(42)).unwrap();

        let mut nfc = NfcU::default();
        assert!(nfc.load_amiibo(file.path()));
        assert_eq!(nfc.amiibo().unwrap().model_id(), 42);
    }

    #[test]
    fn test_load_amiibo_rejects_short_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0u8; 16]).unwrap();

        let mut nfc = NfcU::default();
        assert!(!nfc.load_amiibo(file.path()));
        assert!(!nfc.load_amiibo(Path::new("/nonexistent/amiibo.bin")));
        assert!(nfc.amiibo().is_none());
    }

    #[test]
    fn test_short_dump_is_rejected() {
        assert!(AmiiboData::from_dump(vec![0u8; 16]).is_none());
        assert!(AmiiboData::try_from(vec![0u8; 16]).is_err());

        let long = AmiiboData::from_dump(vec![7u8; AMIIBO_DUMP_SIZE + 32]).unwrap();
        assert_eq!(long.raw().len(), AMIIBO_DUMP_SIZE);
    }

    #[test]
    fn test_short_dump_in_saved_state_fails_to_decode() {
        let config = bincode::config::standard();
        let forged = (TagState::TagInRange, Some(vec![0u8; 16]));
        let bytes = bincode::serde::encode_to_vec(&forged, config).unwrap();
        let decoded: Result<(NfcU, usize), _> = bincode::serde::decode_from_slice(&bytes, config);
        assert!(decoded.is_err());

        let mut nfc = NfcU::default();
        nfc.initialize();
        nfc.place_amiibo(amiibo(9));
        let bytes = bincode::serde::encode_to_vec(&nfc, config).unwrap();
        let (restored, _): (NfcU, usize) = bincode::serde::decode_from_slice(&bytes, config).unwrap();
        assert_eq!(restored.amiibo().unwrap().model_id(), 9);
    }
}
