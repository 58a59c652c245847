//! am:net HLE - Application Manager (title management)
//!
//! Tracks installed titles per media type and an in-flight install, which is
//! the part of AM that has to survive a savestate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::module::ModuleState;

/// Where a title is installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MediaType {
    Nand,
    Sdmc,
    GameCard,
}

/// Result of an install request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallStatus {
    Success,
    ErrorFailedToOpenFile,
    ErrorFileNotFound,
    ErrorAborted,
    ErrorInvalid,
    ErrorEncrypted,
}

/// Installed title metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleInfo {
    pub title_id: u64,
    pub version: u16,
    pub size: u64,
    pub media: MediaType,
}

/// Install in progress
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingImport {
    pub title: TitleInfo,
    pub written: u64,
}

/// am:net service state
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmNet {
    titles: BTreeMap<u64, TitleInfo>,
    import: Option<PendingImport>,
}

impl ModuleState for AmNet {
    const KEY: &'static str = "am:net";
}

impl AmNet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin importing a title. Only one import may be in flight.
    pub fn begin_import(&mut self, title: TitleInfo) -> InstallStatus {
        if self.import.is_some() {
            warn!("am:net: import of {:016X} rejected, another import is active", title.title_id);
            return InstallStatus::ErrorInvalid;
        }
        debug!("am:net: begin import {:016X} ({} bytes)", title.title_id, title.size);
        self.import = Some(PendingImport { title, written: 0 });
        InstallStatus::Success
    }

    /// Account for `bytes` written to the pending import. Returns `(written, total)`.
    pub fn write_import(&mut self, bytes: u64) -> Option<(u64, u64)> {
        let import = self.import.as_mut()?;
        import.written = (import.written + bytes).min(import.title.size);
        Some((import.written, import.title.size))
    }

    /// Commit the pending import
    pub fn finish_import(&mut self) -> InstallStatus {
        match self.import.take() {
            Some(import) if import.written == import.title.size => {
                debug!("am:net: installed {:016X}", import.title.title_id);
                self.titles.insert(import.title.title_id, import.title);
                InstallStatus::Success
            }
            Some(import) => {
                warn!(
                    "am:net: import of {:016X} incomplete ({}/{})",
                    import.title.title_id, import.written, import.title.size
                );
                InstallStatus::ErrorInvalid
            }
            None => InstallStatus::ErrorInvalid,
        }
    }

    /// Drop the pending import
    pub fn abort_import(&mut self) -> InstallStatus {
        match self.import.take() {
            Some(_) => InstallStatus::ErrorAborted,
            None => InstallStatus::ErrorInvalid,
        }
    }

    pub fn import_in_progress(&self) -> bool {
        self.import.is_some()
    }

    /// Remove an installed title
    pub fn delete_title(&mut self, title_id: u64) -> bool {
        self.titles.remove(&title_id).is_some()
    }

    pub fn title_info(&self, title_id: u64) -> Option<&TitleInfo> {
        self.titles.get(&title_id)
    }

    /// Title ids installed on `media`, ascending
    pub fn title_list(&self, media: MediaType) -> Vec<u64> {
        self.titles
            .values()
            .filter(|t| t.media == media)
            .map(|t| t.title_id)
            .collect()
    }

    pub fn title_count(&self, media: MediaType) -> usize {
        self.titles.values().filter(|t| t.media == media).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn title(id: u64, size: u64, media: MediaType) -> TitleInfo {
        TitleInfo {
            title_id: id,
            version: 0,
            size,
            media,
        }
    }

    #[test]
    fn test_import_flow() {
        let mut am = AmNet::new();
        assert_eq!(am.begin_import(title(0x0004000000055D00, 100, MediaType::Sdmc)), InstallStatus::Success);
        assert!(am.import_in_progress());
        assert_eq!(am.write_import(60), Some((60, 100)));
        assert_eq!(am.write_import(60), Some((100, 100)));
        assert_eq!(am.finish_import(), InstallStatus::Success);

        assert_eq!(am.title_list(MediaType::Sdmc), vec![0x0004000000055D00]);
        assert_eq!(am.title_count(MediaType::Nand), 0);
    }

    #[test]
    fn test_single_import_at_a_time() {
        let mut am = AmNet::new();
        am.begin_import(title(1, 10, MediaType::Nand));
        assert_eq!(am.begin_import(title(2, 10, MediaType::Nand)), InstallStatus::ErrorInvalid);
        assert_eq!(am.abort_import(), InstallStatus::ErrorAborted);
        assert_eq!(am.abort_import(), InstallStatus::ErrorInvalid);
    }

    #[test]
    fn test_incomplete_import_is_rejected() {
        let mut am = AmNet::new();
        am.begin_import(title(1, 10, MediaType::Nand));
        am.write_import(4);
        assert_eq!(am.finish_import(), InstallStatus::ErrorInvalid);
        assert!(am.title_info(1).is_none());
    }

    #[test]
    fn test_delete_title() {
        let mut am = AmNet::new();
        am.begin_import(title(7, 0, MediaType::GameCard));
        am.finish_import();
        assert!(am.delete_title(7));
        assert!(!am.delete_title(7));
    }
}
