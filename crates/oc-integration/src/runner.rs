//! Session controller
//!
//! Owns the single emulation session of the process. The host thread calls
//! [`SessionController::start`] (or [`SessionController::run`]) on a thread it
//! dedicates to emulation; that call blocks until the session ends. Every
//! other method is safe to call from the host thread at any time.
//!
//! Only one session can exist at a time. `start` takes an exclusive guard and
//! holds it, through a [`Session`], until teardown has finished, so a second
//! `start` blocks until the first session reaches [`SessionState::Stopped`].

use oc_core::logging;
use oc_core::{Config, LoaderError, PerfCounters, PerfStats, ResultStatus, SharedConfig};
use oc_hle::{NfcU, ServiceRegistry};
use oc_input::{normalize_stick, InputManager, Rotation, ScreenRect};
use oc_loader::Loader;
use oc_rsx::{select_context, ContextFactory, GraphicsContext, LoadCallbackStage, SurfaceHandle};
use parking_lot::{Condvar, Mutex, MutexGuard, RwLock};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::bridge::ErrorBridge;
use crate::host::HostHooks;
use crate::machine::Machine;
use crate::snapshot::{SavestateEntry, SnapshotEngine};

/// Lifecycle of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// No session has been started yet
    Idle,
    /// Start is building the graphics context and loading the program
    Configuring,
    Running,
    Paused,
    /// Stop was requested; the loop has not exited yet
    Stopping,
    /// The last session has been torn down
    Stopped,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Configuring,
            2 => Self::Running,
            3 => Self::Paused,
            4 => Self::Stopping,
            5 => Self::Stopped,
            _ => Self::Idle,
        }
    }
}

/// Deferred savestate request, applied at the next loop boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Save(u32),
    Load(u32),
}

const SIGNAL_NONE: u64 = 0;
const SIGNAL_SAVE: u64 = 1;
const SIGNAL_LOAD: u64 = 2;

impl Signal {
    fn encode(self) -> u64 {
        match self {
            Self::Save(slot) => (SIGNAL_SAVE << 32) | u64::from(slot),
            Self::Load(slot) => (SIGNAL_LOAD << 32) | u64::from(slot),
        }
    }

    fn decode(raw: u64) -> Option<Self> {
        let slot = raw as u32;
        match raw >> 32 {
            SIGNAL_SAVE => Some(Self::Save(slot)),
            SIGNAL_LOAD => Some(Self::Load(slot)),
            _ => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Save(slot) => write!(f, "save to slot {}", slot),
            Self::Load(slot) => write!(f, "load from slot {}", slot),
        }
    }
}

/// Everything that exists only while a program is booted
struct LiveSession {
    machine: Arc<Mutex<Machine>>,
    graphics: Arc<dyn GraphicsContext>,
    perf: Arc<PerfCounters>,
    snapshots: SnapshotEngine,
    program_id: u64,
    movie_id: u64,
}

struct Inner {
    /// Held for the whole lifetime of a session
    session_lock: Mutex<()>,
    stop: AtomicBool,
    pause: AtomicBool,
    signal: AtomicU64,
    pause_lock: Mutex<()>,
    pause_cv: Condvar,
    state: AtomicU8,
    live: RwLock<Option<LiveSession>>,
    config: SharedConfig,
    config_path: Mutex<Option<PathBuf>>,
    loader: Arc<dyn Loader>,
    graphics_factory: Arc<dyn ContextFactory>,
    registry: Arc<ServiceRegistry>,
    hooks: HostHooks,
    bridge: ErrorBridge,
    input: InputManager,
    movie_id: AtomicU64,
    surface: Mutex<Option<SurfaceHandle>>,
    muted: AtomicBool,
}

impl Inner {
    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: SessionState) {
        let old = SessionState::from_u8(self.state.swap(state as u8, Ordering::AcqRel));
        if old != state {
            debug!("Session state {:?} -> {:?}", old, state);
        }
    }

    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let changed = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if changed {
            debug!("Session state {:?} -> {:?}", from, to);
        }
        changed
    }

    fn take_signal(&self) -> Option<Signal> {
        Signal::decode(self.signal.swap(SIGNAL_NONE, Ordering::AcqRel))
    }

    fn discard_signal(&self, reason: &str) {
        if let Some(signal) = self.take_signal() {
            debug!("Discarding pending {} ({})", signal, reason);
        }
    }

    /// Re-read the configuration file, if the controller has one
    fn reload_config(&self) -> oc_core::Result<()> {
        let Some(path) = self.config_path.lock().clone() else {
            return Ok(());
        };
        let config = Config::load_from(&path)?;
        *self.config.write() = config;
        info!("Reloaded settings from {}", path.display());
        Ok(())
    }

    /// Point touch input at the bottom screen of the current layout
    fn sync_touch_screen(&self, graphics: &dyn GraphicsContext) {
        let rect = graphics.framebuffer_layout().bottom_screen;
        self.input
            .set_touch_screen(ScreenRect::new(rect.left, rect.top, rect.width(), rect.height()));
    }

    fn apply_layout(&self) {
        let layout = self.config.read().layout.clone();
        self.input.set_screen_rotation(Rotation::from_degrees(layout.rotation));
        if let Some(live) = self.live.read().as_ref() {
            live.graphics.update_framebuffer_layout(layout.portrait, layout.swap_screen);
            self.sync_touch_screen(&*live.graphics);
        }
    }

    fn wake(&self) {
        let _guard = self.pause_lock.lock();
        self.pause_cv.notify_all();
    }
}

/// Host handle to the emulation session. Cheap to clone.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

impl fmt::Debug for SessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionController")
            .field("state", &self.inner.state())
            .field("program_id", &self.running_program_id())
            .finish()
    }
}

impl SessionController {
    /// Create a controller using the process-wide service registry
    pub fn new(
        config: SharedConfig,
        loader: Arc<dyn Loader>,
        graphics_factory: Arc<dyn ContextFactory>,
        bridge: ErrorBridge,
    ) -> oc_core::Result<Self> {
        let registry = ServiceRegistry::global()
            .map_err(|e| oc_core::EmulatorError::Module(e.to_string()))?;
        Ok(Self::with_registry(config, loader, graphics_factory, bridge, registry))
    }

    pub fn with_registry(
        config: SharedConfig,
        loader: Arc<dyn Loader>,
        graphics_factory: Arc<dyn ContextFactory>,
        bridge: ErrorBridge,
        registry: Arc<ServiceRegistry>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session_lock: Mutex::new(()),
                stop: AtomicBool::new(true),
                pause: AtomicBool::new(false),
                signal: AtomicU64::new(SIGNAL_NONE),
                pause_lock: Mutex::new(()),
                pause_cv: Condvar::new(),
                state: AtomicU8::new(SessionState::Idle as u8),
                live: RwLock::new(None),
                config,
                config_path: Mutex::new(None),
                loader,
                graphics_factory,
                registry,
                hooks: HostHooks::new(),
                bridge,
                input: InputManager::new(),
                movie_id: AtomicU64::new(0),
                surface: Mutex::new(None),
                muted: AtomicBool::new(false),
            }),
        }
    }

    /// Settings file re-read on every start and by [`Self::reload_settings`]
    pub fn set_config_path(&self, path: impl Into<PathBuf>) {
        *self.inner.config_path.lock() = Some(path.into());
    }

    pub fn config(&self) -> &SharedConfig {
        &self.inner.config
    }

    pub fn hooks(&self) -> &HostHooks {
        &self.inner.hooks
    }

    pub fn input(&self) -> &InputManager {
        &self.inner.input
    }

    pub fn state(&self) -> SessionState {
        self.inner.state()
    }

    /// Boot the program at `path` and run it until it stops.
    ///
    /// Blocks the calling thread for the whole session. Returns the loader's
    /// status if the program cannot be loaded, `ShutdownRequested` if the
    /// guest powered off, an error status if the host declined to recover,
    /// and `Success` after [`Self::stop`].
    pub fn start(&self, path: &Path) -> ResultStatus {
        if path.as_os_str().is_empty() {
            error!("No program path given");
            return ResultStatus::from(&LoaderError::EmptyPath);
        }

        let inner = &*self.inner;
        let guard = inner.session_lock.lock();
        inner.set_state(SessionState::Configuring);
        info!("Starting session for {}", path.display());

        if let Err(e) = inner.reload_config() {
            warn!("Keeping previous settings: {}", e);
        }
        let config = inner.config.read().clone();
        logging::log_settings(&config);

        let graphics = select_context(&*inner.graphics_factory, config.graphics.api);
        if let Some(surface) = *inner.surface.lock() {
            graphics.on_surface_changed(Some(surface));
        }
        graphics.update_framebuffer_layout(config.layout.portrait, config.layout.swap_screen);

        inner.hooks.install();
        inner.input.init();
        inner.input.set_screen_rotation(Rotation::from_degrees(config.layout.rotation));
        inner.sync_touch_screen(&*graphics);
        graphics.make_current();

        let session = Session {
            inner,
            graphics: Arc::clone(&graphics),
            _guard: guard,
        };

        let movie_id = inner.movie_id.load(Ordering::Acquire);
        let machine = match Machine::boot(&*inner.loader, Arc::clone(&inner.registry), path, movie_id) {
            Ok(machine) => machine,
            Err(status) => {
                error!("Failed to load {}: {}", path.display(), status);
                return status;
            }
        };
        let program_id = machine.program_id();
        let machine = Arc::new(Mutex::new(machine));
        let perf = Arc::new(PerfCounters::new(Duration::from_micros(config.core.quantum_us)));
        let snapshots = SnapshotEngine::new(&config.paths.states);

        *inner.live.write() = Some(LiveSession {
            machine: Arc::clone(&machine),
            graphics: Arc::clone(&graphics),
            perf: Arc::clone(&perf),
            snapshots: snapshots.clone(),
            program_id,
            movie_id,
        });

        {
            let _wake = inner.pause_lock.lock();
            if inner.state() == SessionState::Stopping {
                info!("Stop requested while configuring");
                return ResultStatus::Success;
            }
            inner.pause.store(false, Ordering::Release);
            inner.stop.store(false, Ordering::Release);
            inner.discard_signal("session start");
            inner.set_state(SessionState::Running);
        }
        if config.general.start_paused {
            self.pause();
        }

        if config.graphics.use_disk_shader_cache {
            graphics.load_disk_resources(&inner.stop, &mut |stage, progress, max| {
                inner.bridge.report_progress(stage, progress, max)
            });
        } else {
            debug!("Disk shader cache disabled");
            inner.bridge.report_progress(LoadCallbackStage::Prepare, 0, 0);
            inner.bridge.report_progress(LoadCallbackStage::Complete, 0, 0);
        }

        session.run_loop(&machine, &perf, &snapshots, pacing(&config))
    }

    /// Host entry point: stop any running session, then start `path`.
    /// Abnormal endings are reported to the frontend.
    pub fn run(&self, path: &Path) -> ResultStatus {
        if self.inner.live.read().is_some() {
            info!("Stopping previous session before starting {}", path.display());
            self.stop();
        }
        let status = self.start(path);
        if !status.is_success() {
            self.inner.bridge.report_exit(status);
        }
        status
    }

    pub fn pause(&self) {
        let inner = &*self.inner;
        if inner.stop.load(Ordering::Acquire) || inner.pause.swap(true, Ordering::AcqRel) {
            return;
        }
        inner.transition(SessionState::Running, SessionState::Paused);
        inner.input.disable_sensors();
        info!("Session paused");
    }

    pub fn resume(&self) {
        let inner = &*self.inner;
        if inner.stop.load(Ordering::Acquire) || !inner.pause.swap(false, Ordering::AcqRel) {
            return;
        }
        inner.transition(SessionState::Paused, SessionState::Running);
        inner.wake();
        inner.input.enable_sensors();
        info!("Session resumed");
    }

    /// Ask the session to end. Returns immediately; teardown happens on the
    /// thread running [`Self::start`].
    pub fn stop(&self) {
        let inner = &*self.inner;
        {
            let _wake = inner.pause_lock.lock();
            inner.stop.store(true, Ordering::Release);
            inner.pause.store(false, Ordering::Release);
            let _ = inner.state.fetch_update(Ordering::AcqRel, Ordering::Acquire, |raw| {
                match SessionState::from_u8(raw) {
                    SessionState::Configuring | SessionState::Running | SessionState::Paused => {
                        Some(SessionState::Stopping as u8)
                    }
                    _ => None,
                }
            });
            inner.pause_cv.notify_all();
        }
        if let Some(live) = inner.live.read().as_ref() {
            live.graphics.stop_presenting();
        }
        debug!("Stop requested");
    }

    pub fn is_running(&self) -> bool {
        !self.inner.stop.load(Ordering::Acquire)
    }

    pub fn is_paused(&self) -> bool {
        self.inner.pause.load(Ordering::Acquire)
    }

    /// Queue a savestate request. A newer request replaces an unconsumed one.
    pub fn send_signal(&self, signal: Signal) {
        if let Some(previous) = Signal::decode(self.inner.signal.swap(signal.encode(), Ordering::AcqRel)) {
            debug!("Pending {} replaced by {}", previous, signal);
        }
    }

    /// Populated savestate slots for a program/movie pair. Empty while no
    /// program is booted.
    pub fn list_savestates(&self, program_id: u64, movie_id: u64) -> Vec<SavestateEntry> {
        match self.inner.live.read().as_ref() {
            Some(live) => live.snapshots.list(program_id, movie_id),
            None => Vec::new(),
        }
    }

    /// Populated savestate slots of the running program
    pub fn savestate_info(&self) -> Vec<SavestateEntry> {
        match self.inner.live.read().as_ref() {
            Some(live) => live.snapshots.list(live.program_id, live.movie_id),
            None => Vec::new(),
        }
    }

    pub fn get_and_reset_perf_stats(&self) -> PerfStats {
        self.inner
            .live
            .read()
            .as_ref()
            .map(|live| live.perf.get_and_reset())
            .unwrap_or_default()
    }

    /// Quanta executed by the running session
    pub fn quanta_run(&self) -> u64 {
        self.inner
            .live
            .read()
            .as_ref()
            .map_or(0, |live| live.perf.total_quanta())
    }

    /// Movie id used for savestate naming on the next boot
    pub fn set_movie_id(&self, movie_id: u64) {
        self.inner.movie_id.store(movie_id, Ordering::Release);
    }

    pub fn running_program_id(&self) -> Option<u64> {
        self.inner.live.read().as_ref().map(|live| live.program_id)
    }

    pub fn program_id_of(&self, path: &Path) -> Result<u64, ResultStatus> {
        oc_loader::program_id_of(&*self.inner.loader, path)
    }

    pub fn is_system_title(&self, path: &Path) -> bool {
        self.program_id_of(path)
            .map(oc_loader::is_system_title)
            .unwrap_or(false)
    }

    pub fn installed_programs<P: AsRef<Path>>(&self, dirs: &[P]) -> Vec<PathBuf> {
        oc_loader::installed_programs(&*self.inner.loader, dirs)
    }

    // Surface and presentation

    /// New host window (or `None` when it was destroyed)
    pub fn surface_changed(&self, surface: Option<SurfaceHandle>) {
        *self.inner.surface.lock() = surface;
        if let Some(live) = self.inner.live.read().as_ref() {
            if live.graphics.on_surface_changed(surface) {
                live.graphics.notify_surface_changed();
            }
        }
    }

    pub fn surface_destroyed(&self) {
        self.surface_changed(None);
    }

    /// Present one frame. Returns whether anything was shown.
    pub fn do_frame(&self) -> bool {
        if !self.is_running() || self.is_paused() {
            return false;
        }
        let live = self.inner.live.read();
        let Some(live) = live.as_ref() else {
            return false;
        };
        let presented = live.graphics.try_present();
        if presented {
            live.perf.record_game_frame();
        }
        presented
    }

    pub fn update_framebuffer(&self, portrait: bool) {
        self.inner.config.write().layout.portrait = portrait;
        self.inner.apply_layout();
    }

    pub fn swap_screens(&self, swap: bool, rotation: i32) {
        {
            let mut config = self.inner.config.write();
            config.layout.swap_screen = swap;
            config.layout.rotation = rotation;
        }
        self.inner.apply_layout();
    }

    /// Audio volume the mixer should use right now
    pub fn effective_volume(&self) -> f32 {
        if self.inner.muted.load(Ordering::Acquire) {
            return 0.0;
        }
        let config = self.inner.config.read();
        if config.audio.enable {
            config.audio.volume.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }

    // Input

    fn powered_on(&self) -> bool {
        self.inner.live.read().is_some()
    }

    pub fn on_gamepad_event(&self, button: i32, pressed: bool) -> bool {
        if !self.powered_on() {
            return false;
        }
        if pressed {
            self.inner.input.press_key(button)
        } else {
            self.inner.input.release_key(button)
        }
    }

    pub fn on_gamepad_move(&self, axis: i32, x: f32, y: f32) -> bool {
        if !self.powered_on() {
            return false;
        }
        let (x, y) = normalize_stick(x, y);
        self.inner.input.move_joystick(axis, x, y)
    }

    /// Analog trigger
    pub fn on_gamepad_axis(&self, axis: i32, value: f32) -> bool {
        self.powered_on() && self.inner.input.analog_button_event(axis, value)
    }

    pub fn on_touch(&self, x: f32, y: f32, pressed: bool) -> bool {
        if !self.powered_on() {
            return false;
        }
        self.inner
            .input
            .touch_event((x + 0.5) as i32, (y + 0.5) as i32, pressed)
    }

    pub fn on_touch_moved(&self, x: f32, y: f32) -> bool {
        if !self.powered_on() {
            return false;
        }
        self.inner.input.touch_moved(x as i32, y as i32);
        true
    }

    // Services

    pub fn load_amiibo(&self, path: &Path) -> bool {
        let live = self.inner.live.read();
        let Some(live) = live.as_ref() else {
            return false;
        };
        let mut machine = live.machine.lock();
        match machine.services_mut().get_mut::<NfcU>() {
            Some(nfc) => nfc.load_amiibo(path),
            None => {
                warn!("Cannot load amiibo: nfc:u is not running");
                false
            }
        }
    }

    pub fn remove_amiibo(&self) -> bool {
        let live = self.inner.live.read();
        let Some(live) = live.as_ref() else {
            return false;
        };
        let mut machine = live.machine.lock();
        match machine.services_mut().get_mut::<NfcU>() {
            Some(nfc) => {
                nfc.remove_amiibo();
                true
            }
            None => false,
        }
    }

    /// Re-read settings and apply the layout to the live session
    pub fn reload_settings(&self) -> oc_core::Result<()> {
        self.inner.reload_config()?;
        logging::log_settings(&self.inner.config.read());
        self.inner.apply_layout();
        Ok(())
    }

    pub fn reload_camera_devices(&self) {
        self.inner.hooks.reload_camera_devices();
    }
}

/// Wall-clock budget of one quantum, shortened while turbo is on
fn pacing(config: &Config) -> Duration {
    let quantum = Duration::from_micros(config.core.quantum_us);
    if config.core.turbo_enabled && config.core.turbo_speed > 0 {
        quantum * 100 / config.core.turbo_speed
    } else {
        quantum
    }
}

/// A booted session. Dropping it tears everything down exactly once and
/// then releases the session guard.
struct Session<'a> {
    inner: &'a Inner,
    graphics: Arc<dyn GraphicsContext>,
    _guard: MutexGuard<'a, ()>,
}

impl Session<'_> {
    fn run_loop(
        &self,
        machine: &Mutex<Machine>,
        perf: &PerfCounters,
        snapshots: &SnapshotEngine,
        pacing: Duration,
    ) -> ResultStatus {
        let inner = self.inner;

        while !inner.stop.load(Ordering::Acquire) {
            if inner.pause.load(Ordering::Acquire) {
                inner.muted.store(true, Ordering::Release);
                {
                    let mut guard = inner.pause_lock.lock();
                    while inner.pause.load(Ordering::Acquire) && !inner.stop.load(Ordering::Acquire) {
                        inner.pause_cv.wait(&mut guard);
                    }
                }
                inner.muted.store(false, Ordering::Release);
                self.graphics.poll_events();
                continue;
            }

            if let Some(signal) = inner.take_signal() {
                if inner.stop.load(Ordering::Acquire) {
                    debug!("Discarding {}: session is stopping", signal);
                    break;
                }
                if let Err(status) = self.apply_signal(machine, snapshots, signal) {
                    return status;
                }
            }

            let started = Instant::now();
            let status = machine.lock().run_quantum();
            let elapsed = started.elapsed();
            perf.record_quantum(elapsed);

            match status {
                ResultStatus::Success => {
                    if let Some(rest) = pacing.checked_sub(elapsed) {
                        std::thread::sleep(rest);
                    }
                }
                ResultStatus::ShutdownRequested => {
                    info!("Guest requested shutdown");
                    return status;
                }
                status => {
                    let details = machine.lock().status_details();
                    if inner.bridge.escalate(status, &details) {
                        inner.input.enable_sensors();
                    } else if status == ResultStatus::ErrorExternalLinkDisconnected {
                        return ResultStatus::ShutdownRequested;
                    } else {
                        return status;
                    }
                }
            }
        }

        ResultStatus::Success
    }

    /// Apply a savestate request. `Err` carries the status to exit with when
    /// the host declines to continue after a failure.
    fn apply_signal(&self, machine: &Mutex<Machine>, snapshots: &SnapshotEngine, signal: Signal) -> Result<(), ResultStatus> {
        let result = match signal {
            Signal::Save(slot) => machine.lock().save_state(snapshots, slot).map(|_| ()),
            Signal::Load(slot) => machine.lock().load_state(snapshots, slot),
        };
        let Err(e) = result else {
            return Ok(());
        };

        let status = ResultStatus::from(&e);
        if self.inner.bridge.escalate(status, &format!("Failed to {}: {}", signal, e)) {
            self.inner.input.enable_sensors();
            Ok(())
        } else {
            Err(status)
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        let inner = self.inner;
        if inner.state() != SessionState::Configuring {
            inner.set_state(SessionState::Stopping);
        }

        if let Some(live) = inner.live.write().take() {
            live.machine.lock().shutdown();
        }
        self.graphics.done_current();
        inner.input.shutdown();
        inner.hooks.uninstall();

        {
            let _wake = inner.pause_lock.lock();
            inner.stop.store(true, Ordering::Release);
            inner.pause.store(false, Ordering::Release);
            inner.discard_signal("session ended");
        }
        inner.muted.store(false, Ordering::Release);
        inner.set_state(SessionState::Stopped);
        info!("Session torn down");
    }
}
