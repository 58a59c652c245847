//! HLE (High Level Emulation) service modules for oxidized-session
//!
//! This crate provides the snapshot-able service registry, the per-machine
//! service manager and the OS services that ship with the emulator.

pub mod module;
pub mod context;

// System services
pub mod am;
pub mod cfg;
pub mod nfc;
pub mod ptm;

pub use module::{
    ModuleError, ModuleState, RegistryBuilder, RegistryEntry, RegistryError, ServiceModule,
    ServiceRegistry,
};
pub use context::{ModuleRecord, ServiceManager};
pub use am::AmNet;
pub use cfg::CfgU;
pub use nfc::NfcU;
pub use ptm::PtmU;
