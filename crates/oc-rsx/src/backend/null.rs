//! Null graphics context for headless sessions and tests

use oc_core::GraphicsApi;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info};

use super::{DiskLoadCallback, GraphicsContext, LoadCallbackStage, SurfaceHandle};
use crate::layout::{FramebufferLayout, BOTTOM_SCREEN_HEIGHT, TOP_SCREEN_HEIGHT, TOP_SCREEN_WIDTH};
use crate::shader_cache::DiskShaderCache;

/// Graphics context that presents nothing but tracks every lifecycle call.
///
/// Frames are "presented" as long as presenting has not been stopped, so the
/// session's frame pacing and perf counters behave as with a real renderer.
#[derive(Debug)]
pub struct NullContext {
    api: GraphicsApi,
    shader_cache: Option<DiskShaderCache>,
    surface: Mutex<Option<SurfaceHandle>>,
    layout: Mutex<FramebufferLayout>,
    current: AtomicBool,
    presenting_stopped: AtomicBool,
    frames_presented: AtomicU64,
    surface_notifications: AtomicU64,
    events_polled: AtomicU64,
    shaders_loaded: AtomicU64,
}

impl NullContext {
    pub fn new() -> Self {
        Self::with_api(GraphicsApi::Null)
    }

    /// Null context reporting itself as `api`; lets tests stand in for hardware contexts
    pub fn with_api(api: GraphicsApi) -> Self {
        Self {
            api,
            shader_cache: None,
            surface: Mutex::new(None),
            layout: Mutex::new(FramebufferLayout::new(
                TOP_SCREEN_WIDTH,
                TOP_SCREEN_HEIGHT + BOTTOM_SCREEN_HEIGHT,
                true,
                false,
            )),
            current: AtomicBool::new(false),
            presenting_stopped: AtomicBool::new(false),
            frames_presented: AtomicU64::new(0),
            surface_notifications: AtomicU64::new(0),
            events_polled: AtomicU64::new(0),
            shaders_loaded: AtomicU64::new(0),
        }
    }

    pub fn with_shader_cache(dir: impl Into<PathBuf>) -> Self {
        Self {
            shader_cache: Some(DiskShaderCache::new(dir)),
            ..Self::new()
        }
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::Acquire)
    }

    pub fn is_presenting_stopped(&self) -> bool {
        self.presenting_stopped.load(Ordering::Acquire)
    }

    pub fn frames_presented(&self) -> u64 {
        self.frames_presented.load(Ordering::Relaxed)
    }

    pub fn surface_notifications(&self) -> u64 {
        self.surface_notifications.load(Ordering::Relaxed)
    }

    pub fn events_polled(&self) -> u64 {
        self.events_polled.load(Ordering::Relaxed)
    }

    pub fn shaders_loaded(&self) -> u64 {
        self.shaders_loaded.load(Ordering::Relaxed)
    }

    pub fn surface(&self) -> Option<SurfaceHandle> {
        *self.surface.lock()
    }
}

impl Default for NullContext {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsContext for NullContext {
    fn api(&self) -> GraphicsApi {
        self.api
    }

    fn make_current(&self) {
        self.presenting_stopped.store(false, Ordering::Release);
        self.current.store(true, Ordering::Release);
    }

    fn done_current(&self) {
        self.current.store(false, Ordering::Release);
    }

    fn on_surface_changed(&self, surface: Option<SurfaceHandle>) -> bool {
        let mut current = self.surface.lock();
        if *current == surface {
            return false;
        }
        *current = surface;
        if let Some(surface) = surface {
            let mut layout = self.layout.lock();
            *layout = FramebufferLayout::new(surface.width, surface.height, layout.portrait, layout.swap_screens);
        }
        true
    }

    fn notify_surface_changed(&self) {
        self.surface_notifications.fetch_add(1, Ordering::Relaxed);
    }

    fn update_framebuffer_layout(&self, portrait: bool, swap_screens: bool) {
        let mut layout = self.layout.lock();
        *layout = FramebufferLayout::new(layout.width, layout.height, portrait, swap_screens);
    }

    fn framebuffer_layout(&self) -> FramebufferLayout {
        *self.layout.lock()
    }

    fn stop_presenting(&self) {
        self.presenting_stopped.store(true, Ordering::Release);
    }

    fn try_present(&self) -> bool {
        if self.is_presenting_stopped() {
            return false;
        }
        self.frames_presented.fetch_add(1, Ordering::Relaxed);
        true
    }

    fn poll_events(&self) {
        self.events_polled.fetch_add(1, Ordering::Relaxed);
    }

    fn load_disk_resources(&self, stop: &AtomicBool, callback: &mut DiskLoadCallback<'_>) {
        let entries = match &self.shader_cache {
            Some(cache) => cache.entries().unwrap_or_else(|e| {
                debug!("Shader cache unavailable: {}", e);
                Vec::new()
            }),
            None => Vec::new(),
        };
        let total = entries.len();

        callback(LoadCallbackStage::Prepare, 0, total);
        for (i, path) in entries.iter().enumerate() {
            if stop.load(Ordering::Acquire) {
                debug!("Shader cache warm-up interrupted at {}/{}", i, total);
                return;
            }
            if DiskShaderCache::load_entry(path).is_some() {
                self.shaders_loaded.fetch_add(1, Ordering::Relaxed);
            }
            callback(LoadCallbackStage::Decompile, i + 1, total);
        }
        if total > 0 {
            info!("Loaded {} cached shaders", self.shaders_loaded());
        }
        callback(LoadCallbackStage::Complete, 0, 0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shader_cache::CachedShader;

    #[test]
    fn test_presenting_lifecycle() {
        let context = NullContext::new();
        context.make_current();
        assert!(context.is_current());
        assert!(context.try_present());

        context.stop_presenting();
        assert!(!context.try_present());
        assert_eq!(context.frames_presented(), 1);

        context.done_current();
        assert!(!context.is_current());
    }

    #[test]
    fn test_surface_changed() {
        let context = NullContext::new();
        let surface = SurfaceHandle {
            id: 1,
            width: 800,
            height: 960,
        };
        assert!(context.on_surface_changed(Some(surface)));
        assert!(!context.on_surface_changed(Some(surface)));
        assert_eq!(context.framebuffer_layout().width, 800);
        assert!(context.on_surface_changed(None));
    }

    #[test]
    fn test_surface_change_keeps_screen_swap() {
        let context = NullContext::new();
        context.update_framebuffer_layout(false, true);
        let swapped = context.framebuffer_layout();
        assert!(swapped.swap_screens);

        assert!(context.on_surface_changed(Some(SurfaceHandle {
            id: 2,
            width: 1280,
            height: 720,
        })));
        let layout = context.framebuffer_layout();
        assert!(layout.swap_screens);
        assert_eq!(layout, FramebufferLayout::new(1280, 720, false, true));
        assert!(layout.bottom_screen.left < layout.top_screen.left);
    }

    #[test]
    fn test_load_disk_resources_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskShaderCache::new(dir.path());
        for hash in 0..3 {
            cache
                .store(&CachedShader {
                    hash,
                    code: vec![0; 4],
                })
                .unwrap();
        }

        let context = NullContext::with_shader_cache(dir.path());
        let stop = AtomicBool::new(false);
        let mut stages = Vec::new();
        context.load_disk_resources(&stop, &mut |stage, progress, max| {
            stages.push((stage, progress, max));
        });

        assert_eq!(stages.first(), Some(&(LoadCallbackStage::Prepare, 0, 3)));
        assert_eq!(stages.last(), Some(&(LoadCallbackStage::Complete, 0, 0)));
        assert_eq!(context.shaders_loaded(), 3);
    }

    #[test]
    fn test_load_disk_resources_honours_stop() {
        let dir = tempfile::tempdir().unwrap();
        let cache = DiskShaderCache::new(dir.path());
        cache.store(&CachedShader { hash: 1, code: vec![] }).unwrap();

        let context = NullContext::with_shader_cache(dir.path());
        let stop = AtomicBool::new(true);
        let mut completed = false;
        context.load_disk_resources(&stop, &mut |stage, _, _| {
            completed |= stage == LoadCallbackStage::Complete;
        });
        assert!(!completed);
        assert_eq!(context.shaders_loaded(), 0);
    }
}
