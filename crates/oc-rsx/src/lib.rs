//! Graphics context plumbing for oxidized-session
//!
//! Rendering itself lives behind [`GraphicsContext`]; this crate provides the
//! trait, API selection with fallback, the screen layout and a null context.

pub mod backend;
pub mod layout;
pub mod shader_cache;

pub use backend::{
    select_context, ContextFactory, DiskLoadCallback, GraphicsContext, HeadlessFactory, LoadCallbackStage,
    NullContext, SurfaceHandle,
};
pub use layout::{FramebufferLayout, Rect};
