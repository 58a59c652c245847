//! Shared fixtures for session tests
#![allow(dead_code)]

use oc_core::{Config, CoreError, GraphicsApi, ResultStatus};
use oc_hle::{PtmU, ServiceManager, ServiceRegistry};
use oc_integration::{create_error_bridge, Frontend, HostLink, SessionController};
use oc_loader::{ExecutionCore, Loader, ProgramHandle};
use oc_rsx::{
    ContextFactory, DiskLoadCallback, FramebufferLayout, GraphicsContext, LoadCallbackStage,
    NullContext, SurfaceHandle,
};
use parking_lot::Mutex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tempfile::TempDir;

pub const PROGRAM_ID: u64 = 0x0004_0000_0005_5D00;

/// Per-quantum step counts observed by the mock core
pub type Trace = Arc<Mutex<Vec<u32>>>;

/// Behaviour of the mock program
#[derive(Debug, Clone, Copy, Default)]
pub struct Script {
    /// Guest powers off after this many steps
    pub limit: Option<u32>,
    /// Status returned once at the given step
    pub fault: Option<(u32, ResultStatus)>,
}

/// Loader that boots a counting core for any path except ones named "missing"
pub struct MockLoader {
    pub script: Script,
    pub trace: Trace,
}

impl Loader for MockLoader {
    fn resolve(&self, path: &Path) -> Result<Box<dyn ProgramHandle>, ResultStatus> {
        if path.file_name().is_some_and(|name| name == "missing") {
            return Err(ResultStatus::ErrorGetLoader);
        }
        Ok(Box::new(MockHandle {
            script: self.script,
            trace: Arc::clone(&self.trace),
        }))
    }
}

struct MockHandle {
    script: Script,
    trace: Trace,
}

impl ProgramHandle for MockHandle {
    fn read_program_id(&self) -> Result<u64, ResultStatus> {
        Ok(PROGRAM_ID)
    }

    fn is_executable(&self) -> Result<bool, ResultStatus> {
        Ok(true)
    }

    fn load(&mut self, services: &mut ServiceManager) -> Result<Box<dyn ExecutionCore>, ResultStatus> {
        services.start::<PtmU>().map_err(|_| ResultStatus::ErrorLoader)?;
        self.trace.lock().clear();
        Ok(Box::new(TraceCore {
            script: self.script,
            trace: Arc::clone(&self.trace),
        }))
    }
}

/// Counts quanta in the ptm pedometer so savestates capture guest progress
struct TraceCore {
    script: Script,
    trace: Trace,
}

impl ExecutionCore for TraceCore {
    fn run_quantum(&mut self, services: &mut ServiceManager) -> ResultStatus {
        let Some(ptm) = services.get_mut::<PtmU>() else {
            return ResultStatus::ErrorUnknown;
        };
        ptm.add_steps(1);
        let step = ptm.step_count();
        self.trace.lock().push(step);

        match self.script.fault {
            Some((at, status)) if at == step => status,
            _ if self.script.limit.is_some_and(|limit| step >= limit) => ResultStatus::ShutdownRequested,
            _ => ResultStatus::Success,
        }
    }

    fn status_details(&self) -> String {
        "mock fault".to_string()
    }
}

/// Called from inside `done_current`, while teardown is in progress
pub type TeardownHook = Arc<Mutex<Option<Box<dyn Fn() + Send + Sync>>>>;

/// Null context that counts lifecycle calls
pub struct CountingContext {
    inner: NullContext,
    pub done_current: AtomicUsize,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    teardown_hook: TeardownHook,
}

impl fmt::Debug for CountingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingContext")
            .field("inner", &self.inner)
            .field("done_current", &self.done_current)
            .finish_non_exhaustive()
    }
}

impl CountingContext {
    pub fn shaders_loaded(&self) -> u64 {
        self.inner.shaders_loaded()
    }

    pub fn frames_presented(&self) -> u64 {
        self.inner.frames_presented()
    }

    pub fn surface_notifications(&self) -> u64 {
        self.inner.surface_notifications()
    }

    pub fn is_presenting_stopped(&self) -> bool {
        self.inner.is_presenting_stopped()
    }
}

impl GraphicsContext for CountingContext {
    fn api(&self) -> GraphicsApi {
        self.inner.api()
    }

    fn make_current(&self) {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(active, Ordering::SeqCst);
        self.inner.make_current();
    }

    fn done_current(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
        self.done_current.fetch_add(1, Ordering::SeqCst);
        if let Some(hook) = self.teardown_hook.lock().as_ref() {
            hook();
        }
        self.inner.done_current();
    }

    fn on_surface_changed(&self, surface: Option<SurfaceHandle>) -> bool {
        self.inner.on_surface_changed(surface)
    }

    fn notify_surface_changed(&self) {
        self.inner.notify_surface_changed();
    }

    fn update_framebuffer_layout(&self, portrait: bool, swap_screens: bool) {
        self.inner.update_framebuffer_layout(portrait, swap_screens);
    }

    fn framebuffer_layout(&self) -> FramebufferLayout {
        self.inner.framebuffer_layout()
    }

    fn stop_presenting(&self) {
        self.inner.stop_presenting();
    }

    fn try_present(&self) -> bool {
        self.inner.try_present()
    }

    fn poll_events(&self) {
        self.inner.poll_events();
    }

    fn load_disk_resources(&self, stop: &AtomicBool, callback: &mut DiskLoadCallback<'_>) {
        self.inner.load_disk_resources(stop, callback);
    }
}

/// Hands out counting contexts and remembers them
#[derive(Default)]
pub struct CountingFactory {
    pub contexts: Mutex<Vec<Arc<CountingContext>>>,
    active: Arc<AtomicUsize>,
    pub max_active: Arc<AtomicUsize>,
    pub teardown_hook: TeardownHook,
    /// Shader cache handed to contexts created from now on
    pub shader_cache: Mutex<Option<PathBuf>>,
}

impl CountingFactory {
    pub fn on_teardown(&self, hook: impl Fn() + Send + Sync + 'static) {
        *self.teardown_hook.lock() = Some(Box::new(hook));
    }

    pub fn clear_teardown_hook(&self) {
        self.teardown_hook.lock().take();
    }

    pub fn last(&self) -> Option<Arc<CountingContext>> {
        self.contexts.lock().last().cloned()
    }

    pub fn total_done_current(&self) -> usize {
        self.contexts
            .lock()
            .iter()
            .map(|c| c.done_current.load(Ordering::SeqCst))
            .sum()
    }
}

impl ContextFactory for CountingFactory {
    fn create(&self, api: GraphicsApi) -> Option<Arc<dyn GraphicsContext>> {
        let inner = match self.shader_cache.lock().as_ref() {
            Some(dir) if api == GraphicsApi::Null => NullContext::with_shader_cache(dir),
            _ => NullContext::with_api(api),
        };
        let context = Arc::new(CountingContext {
            inner,
            done_current: AtomicUsize::new(0),
            active: Arc::clone(&self.active),
            max_active: Arc::clone(&self.max_active),
            teardown_hook: Arc::clone(&self.teardown_hook),
        });
        self.contexts.lock().push(Arc::clone(&context));
        Some(context)
    }
}

/// Everything the host frontend was told
#[derive(Debug, Default)]
pub struct HostLog {
    pub errors: Vec<(CoreError, String)>,
    pub progress: Vec<(LoadCallbackStage, usize, usize)>,
    pub exits: Vec<ResultStatus>,
}

struct RecordingFrontend {
    log: Arc<Mutex<HostLog>>,
    resume: Arc<AtomicBool>,
}

impl Frontend for RecordingFrontend {
    fn on_error(&mut self, kind: CoreError, details: &str) -> bool {
        self.log.lock().errors.push((kind, details.to_string()));
        self.resume.load(Ordering::SeqCst)
    }

    fn on_progress(&mut self, stage: LoadCallbackStage, progress: usize, max: usize) {
        self.log.lock().progress.push((stage, progress, max));
    }

    fn on_exit(&mut self, status: ResultStatus) {
        self.log.lock().exits.push(status);
    }
}

/// A controller wired to mocks, with a host thread answering the bridge
pub struct Harness {
    pub controller: SessionController,
    pub trace: Trace,
    pub graphics: Arc<CountingFactory>,
    pub log: Arc<Mutex<HostLog>>,
    /// Answer given to every recovery request
    pub resume: Arc<AtomicBool>,
    pub dir: TempDir,
    host_done: Arc<AtomicBool>,
    host: Option<JoinHandle<()>>,
    link: Option<HostLink>,
}

impl Harness {
    pub fn new(script: Script) -> Self {
        Self::build(script, true)
    }

    /// Harness whose host end is never served; call [`Self::close_host`] to drop it
    pub fn without_host(script: Script) -> Self {
        Self::build(script, false)
    }

    fn build(script: Script, serve: bool) -> Self {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.core.quantum_us = 1_000;
        config.graphics.api = GraphicsApi::Null;
        config.paths = oc_core::config::PathConfig::with_base(dir.path().to_path_buf());

        let trace = Trace::default();
        let graphics = Arc::new(CountingFactory::default());
        let (bridge, link) = create_error_bridge();
        let controller = SessionController::with_registry(
            config.into_shared(),
            Arc::new(MockLoader {
                script,
                trace: Arc::clone(&trace),
            }),
            graphics.clone(),
            bridge,
            Arc::new(ServiceRegistry::with_default_modules().unwrap()),
        );

        let log = Arc::new(Mutex::new(HostLog::default()));
        let resume = Arc::new(AtomicBool::new(false));
        let host_done = Arc::new(AtomicBool::new(false));

        let (host, link) = if serve {
            let mut frontend = RecordingFrontend {
                log: Arc::clone(&log),
                resume: Arc::clone(&resume),
            };
            let done = Arc::clone(&host_done);
            let host = thread::spawn(move || {
                link.serve_until(&mut frontend, || done.load(Ordering::SeqCst));
            });
            (Some(host), None)
        } else {
            (None, Some(link))
        };

        Self {
            controller,
            trace,
            graphics,
            log,
            resume,
            dir,
            host_done,
            host,
            link,
        }
    }

    pub fn close_host(&mut self) {
        self.link = None;
    }

    pub fn program_path(&self) -> PathBuf {
        self.dir.path().join("game.bin")
    }

    pub fn states_dir(&self) -> PathBuf {
        self.controller.config().read().paths.states.clone()
    }

    /// Run `start` on its own execution thread
    pub fn spawn_start(&self) -> JoinHandle<ResultStatus> {
        let controller = self.controller.clone();
        let path = self.program_path();
        thread::spawn(move || controller.start(&path))
    }

    pub fn trace(&self) -> Vec<u32> {
        self.trace.lock().clone()
    }

    pub fn steps(&self) -> usize {
        self.trace.lock().len()
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.graphics.clear_teardown_hook();
        self.controller.stop();
        self.host_done.store(true, Ordering::SeqCst);
        if let Some(host) = self.host.take() {
            let _ = host.join();
        }
    }
}

/// Poll `condition` every millisecond for up to five seconds
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    condition()
}
