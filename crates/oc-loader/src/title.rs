//! Program identifier helpers

use oc_core::ResultStatus;
use std::path::Path;

use crate::Loader;

/// High word shared by every system application title id
pub const SYSTEM_TITLE_HIGH: u32 = 0x0004_0010;

/// Whether a program id belongs to a system application
pub fn is_system_title(program_id: u64) -> bool {
    (program_id >> 32) as u32 == SYSTEM_TITLE_HIGH
}

/// Read the program id of the image at `path` without loading it
pub fn program_id_of(loader: &dyn Loader, path: &Path) -> Result<u64, ResultStatus> {
    loader.resolve(path)?.read_program_id()
}
