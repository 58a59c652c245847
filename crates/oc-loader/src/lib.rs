//! Program loading for oxidized-session
//!
//! The session layer resolves a path to a [`ProgramHandle`] through a
//! [`Loader`], then asks the handle to load itself into a fresh machine,
//! which yields the [`ExecutionCore`] the session loop drives.

pub mod image;
pub mod scan;
pub mod title;

use oc_core::ResultStatus;
use oc_hle::ServiceManager;
use std::path::Path;

pub use image::{FaultKind, ImageLoader, ProgramImage, ScriptedCore};
pub use scan::installed_programs;
pub use title::{is_system_title, program_id_of, SYSTEM_TITLE_HIGH};

/// Resolves program paths to loadable handles
pub trait Loader: Send + Sync {
    /// Identify the image at `path`. `ErrorGetLoader` when no format matches.
    fn resolve(&self, path: &Path) -> Result<Box<dyn ProgramHandle>, ResultStatus>;
}

/// A program image that has been identified but not yet loaded
pub trait ProgramHandle: Send {
    /// Title/program identifier stored in the image
    fn read_program_id(&self) -> Result<u64, ResultStatus>;

    /// Whether the image can be booted (as opposed to data or update titles)
    fn is_executable(&self) -> Result<bool, ResultStatus>;

    /// Load the program into a machine whose services are `services`
    fn load(&mut self, services: &mut ServiceManager) -> Result<Box<dyn ExecutionCore>, ResultStatus>;
}

/// Advances the emulated machine
pub trait ExecutionCore: Send {
    /// Run one quantum of guest time
    fn run_quantum(&mut self, services: &mut ServiceManager) -> ResultStatus;

    /// Human readable details for the last non-success status
    fn status_details(&self) -> String;
}
