use std::io;

use oc_core::{EmulatorError, ResultStatus};
use oc_hle::ModuleError;
use thiserror::Error;

use super::SAVESTATE_SLOT_COUNT;

pub type Result<T> = std::result::Result<T, SnapshotError>;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid savestate magic")]
    InvalidMagic,

    #[error("unsupported savestate version {0}")]
    UnsupportedVersion(u16),

    #[error("corrupt savestate: {0}")]
    Corrupt(&'static str),

    #[error("savestate slot {0} is out of range (1-{})", SAVESTATE_SLOT_COUNT)]
    SlotOutOfRange(u32),

    #[error("savestate slot {0} is empty")]
    SlotEmpty(u32),

    #[error("savestate was made by program {found:016X}, running {expected:016X}")]
    ProgramMismatch { expected: u64, found: u64 },

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("utf-8 decoding failed: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

impl From<&SnapshotError> for ResultStatus {
    fn from(_: &SnapshotError) -> Self {
        ResultStatus::ErrorSavestate
    }
}

impl From<SnapshotError> for EmulatorError {
    fn from(err: SnapshotError) -> Self {
        EmulatorError::Savestate(err.to_string())
    }
}
