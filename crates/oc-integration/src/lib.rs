//! Session layer for oxidized-session
//!
//! Ties the loader, services, graphics and input together into a single
//! host-controlled emulation session, with savestates and a recovery
//! channel back to the host frontend.

pub mod bridge;
pub mod host;
pub mod machine;
pub mod runner;
pub mod snapshot;

pub use bridge::{create_error_bridge, ErrorBridge, Frontend, HostEvent, HostLink};
pub use host::{AppletFactory, AppletKind, CameraFactory, HostHooks};
pub use machine::Machine;
pub use runner::{SessionController, SessionState, Signal};
pub use snapshot::{SavestateEntry, SnapshotEngine, SnapshotError, SAVESTATE_SLOT_COUNT};
