//! Performance counters
//!
//! The execution thread records every quantum, the host records presented
//! frames, and the host periodically samples and resets the window.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Snapshot returned to the host
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerfStats {
    /// Quanta completed per wall-clock second
    pub system_fps: f64,
    /// Frames presented per wall-clock second
    pub game_fps: f64,
    /// Average wall-clock time of one quantum, in seconds
    pub frametime: f64,
    /// Emulated time over wall-clock time (1.0 = full speed)
    pub emulation_speed: f64,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    quanta: u64,
    game_frames: u64,
    busy: Duration,
}

impl Window {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            quanta: 0,
            game_frames: 0,
            busy: Duration::ZERO,
        }
    }
}

/// Thread-safe accumulator for [`PerfStats`]
#[derive(Debug)]
pub struct PerfCounters {
    /// Emulated time represented by one quantum
    quantum: Duration,
    window: Mutex<Window>,
    /// Quanta since the counters were created; never reset
    total_quanta: AtomicU64,
}

impl PerfCounters {
    /// Create counters for a given emulated quantum length
    pub fn new(quantum: Duration) -> Self {
        Self {
            quantum,
            window: Mutex::new(Window::new()),
            total_quanta: AtomicU64::new(0),
        }
    }

    /// Record a completed quantum that took `elapsed` of wall-clock time
    pub fn record_quantum(&self, elapsed: Duration) {
        let mut window = self.window.lock();
        window.quanta += 1;
        window.busy += elapsed;
        self.total_quanta.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_quanta(&self) -> u64 {
        self.total_quanta.load(Ordering::Relaxed)
    }

    /// Record a frame presented by the graphics context
    pub fn record_game_frame(&self) {
        self.window.lock().game_frames += 1;
    }

    /// Compute the stats for the current window and start a new one
    pub fn get_and_reset(&self) -> PerfStats {
        let mut window = self.window.lock();
        let wall = window.started.elapsed().as_secs_f64();
        let stats = if wall > 0.0 && window.quanta > 0 {
            let quanta = window.quanta as f64;
            PerfStats {
                system_fps: quanta / wall,
                game_fps: window.game_frames as f64 / wall,
                frametime: window.busy.as_secs_f64() / quanta,
                emulation_speed: (self.quantum.as_secs_f64() * quanta) / wall,
            }
        } else {
            PerfStats::default()
        };
        *window = Window::new();
        stats
    }
}
