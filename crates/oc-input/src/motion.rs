//! Motion sensors (accelerometer and gyroscope)

use std::sync::atomic::{AtomicBool, Ordering};
use parking_lot::Mutex;

/// Sensor sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionSample {
    /// Acceleration in g
    pub accel: [f32; 3],
    /// Angular velocity in degrees per second
    pub gyro: [f32; 3],
}

/// Host motion sensor feed
///
/// Sensors are switched off while the session is paused so the host can
/// release the hardware; samples that arrive while disabled are dropped.
#[derive(Debug, Default)]
pub struct MotionSensors {
    enabled: AtomicBool,
    sample: Mutex<MotionSample>,
}

impl MotionSensors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
        *self.sample.lock() = MotionSample::default();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Push a new sample. Returns false when sensors are disabled.
    pub fn update(&self, sample: MotionSample) -> bool {
        if !self.is_enabled() {
            return false;
        }
        *self.sample.lock() = sample;
        true
    }

    pub fn sample(&self) -> MotionSample {
        *self.sample.lock()
    }
}
