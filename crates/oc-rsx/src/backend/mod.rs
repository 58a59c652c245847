//! Graphics contexts
//!
//! The session layer never renders; it only drives a context through the
//! lifecycle below. Methods take `&self` because the host thread and the
//! emulation thread both hold the context.

pub mod null;

use oc_core::GraphicsApi;
use std::fmt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::layout::FramebufferLayout;

pub use null::NullContext;

/// Host window surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceHandle {
    /// Opaque host identifier of the native window
    pub id: u64,
    pub width: u32,
    pub height: u32,
}

/// Stage of disk resource loading reported to the frontend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadCallbackStage {
    Prepare,
    Decompile,
    Build,
    Complete,
}

/// Progress callback for [`GraphicsContext::load_disk_resources`]
pub type DiskLoadCallback<'a> = dyn FnMut(LoadCallbackStage, usize, usize) + 'a;

/// A renderer bound to a host surface
pub trait GraphicsContext: Send + Sync + fmt::Debug {
    /// API this context was created for
    fn api(&self) -> GraphicsApi;

    /// Bind the context to the calling thread
    fn make_current(&self);

    /// Release the context from the calling thread
    fn done_current(&self);

    /// Replace the host surface. Returns whether anything changed.
    fn on_surface_changed(&self, surface: Option<SurfaceHandle>) -> bool;

    /// Tell the renderer to recreate its swapchain for the new surface
    fn notify_surface_changed(&self);

    /// Recompute the screen layout for the given orientation
    fn update_framebuffer_layout(&self, portrait: bool, swap_screens: bool);

    /// Current screen layout
    fn framebuffer_layout(&self) -> FramebufferLayout;

    /// Stop presenting frames; called when the session is stopping
    fn stop_presenting(&self);

    /// Present the last rendered frame. Returns false if nothing was shown.
    fn try_present(&self) -> bool;

    /// Service pending host window events
    fn poll_events(&self);

    /// Warm up the disk shader cache. Must return early once `stop` is set.
    fn load_disk_resources(&self, stop: &AtomicBool, callback: &mut DiskLoadCallback<'_>);
}

/// Constructs graphics contexts for the host platform
pub trait ContextFactory: Send + Sync {
    /// Create a context for `api`, or `None` if the host cannot provide it
    fn create(&self, api: GraphicsApi) -> Option<Arc<dyn GraphicsContext>>;
}

/// Pick a context for the configured API, falling back through the other
/// hardware APIs and finally to the null context.
pub fn select_context(factory: &dyn ContextFactory, requested: GraphicsApi) -> Arc<dyn GraphicsContext> {
    let fallbacks = [GraphicsApi::Vulkan, GraphicsApi::OpenGl];
    let candidates = std::iter::once(requested).chain(fallbacks.into_iter().filter(|api| *api != requested));

    for api in candidates {
        if api == GraphicsApi::Null {
            break;
        }
        if let Some(context) = factory.create(api) {
            if api != requested {
                warn!("Graphics API {:?} unavailable, using {:?}", requested, api);
            }
            info!("Created {:?} graphics context", api);
            return context;
        }
    }

    if requested != GraphicsApi::Null {
        warn!("No hardware graphics API available, using null context");
    }
    Arc::new(NullContext::new())
}

/// Factory for headless hosts; it only ever yields null contexts
#[derive(Debug, Default, Clone)]
pub struct HeadlessFactory {
    shader_cache: Option<std::path::PathBuf>,
}

impl HeadlessFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Null contexts created by this factory warm up the given shader cache
    pub fn with_shader_cache(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            shader_cache: Some(path.into()),
        }
    }
}

impl ContextFactory for HeadlessFactory {
    fn create(&self, api: GraphicsApi) -> Option<Arc<dyn GraphicsContext>> {
        if api != GraphicsApi::Null {
            return None;
        }
        let context = match &self.shader_cache {
            Some(path) => NullContext::with_shader_cache(path),
            None => NullContext::new(),
        };
        Some(Arc::new(context))
    }
}
