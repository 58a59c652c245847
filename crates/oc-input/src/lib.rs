//! Input handling for oxidized-session
//!
//! Collects host button, analog, touch and motion events into the state the
//! emulated HID service reads each frame.

pub mod motion;
pub mod pad;
pub mod touch;

pub use motion::{MotionSample, MotionSensors};
pub use pad::{normalize_stick, PadButtons, PadState, Stick, ANALOG_BUTTON_THRESHOLD};
pub use touch::{Rotation, ScreenRect, TouchPoint, TouchState};

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, trace};

/// Input manager shared between the host thread and the emulation thread
#[derive(Debug, Default)]
pub struct InputManager {
    initialized: AtomicBool,
    pad: Mutex<PadState>,
    touch: Mutex<TouchState>,
    motion: MotionSensors,
}

impl InputManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the default input devices
    pub fn init(&self) {
        *self.pad.lock() = PadState::new();
        self.touch.lock().release();
        self.motion.enable();
        self.initialized.store(true, Ordering::Release);
        debug!("Input manager initialized");
    }

    /// Release every device
    pub fn shutdown(&self) {
        self.initialized.store(false, Ordering::Release);
        self.motion.disable();
        *self.pad.lock() = PadState::new();
        self.touch.lock().release();
        debug!("Input manager shut down");
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn enable_sensors(&self) {
        self.motion.enable();
    }

    pub fn disable_sensors(&self) {
        self.motion.disable();
    }

    pub fn sensors_enabled(&self) -> bool {
        self.motion.is_enabled()
    }

    pub fn motion(&self) -> &MotionSensors {
        &self.motion
    }

    /// Host button press. Returns whether the code maps to a console button.
    pub fn press_key(&self, code: i32) -> bool {
        self.set_key(code, true)
    }

    pub fn release_key(&self, code: i32) -> bool {
        self.set_key(code, false)
    }

    /// Analog trigger reported as a button
    pub fn analog_button_event(&self, code: i32, value: f32) -> bool {
        self.set_key(code, value > ANALOG_BUTTON_THRESHOLD)
    }

    /// Move a stick. `x` and `y` are expected to be normalized already.
    pub fn move_joystick(&self, axis: i32, x: f32, y: f32) -> bool {
        let Some(stick) = Stick::from_host_code(axis) else {
            return false;
        };
        trace!("Stick {:?} -> ({:.3}, {:.3})", stick, x, y);
        self.pad.lock().set_stick(stick, x, y);
        true
    }

    /// Touch press or release at framebuffer coordinates
    pub fn touch_event(&self, x: i32, y: i32, pressed: bool) -> bool {
        let mut touch = self.touch.lock();
        if pressed {
            touch.press(x, y)
        } else {
            touch.release();
            true
        }
    }

    pub fn touch_moved(&self, x: i32, y: i32) {
        self.touch.lock().moved(x, y);
    }

    pub fn set_touch_screen(&self, screen: ScreenRect) {
        self.touch.lock().set_screen(screen);
    }

    pub fn set_screen_rotation(&self, rotation: Rotation) {
        self.touch.lock().set_rotation(rotation);
    }

    /// Snapshot of the pad for the HID service
    pub fn pad_state(&self) -> PadState {
        *self.pad.lock()
    }

    pub fn touch_state(&self) -> TouchState {
        self.touch.lock().clone()
    }

    fn set_key(&self, code: i32, pressed: bool) -> bool {
        match PadButtons::from_host_code(code) {
            Some(button) => {
                self.pad.lock().set_button(button, pressed);
                true
            }
            None => false,
        }
    }
}
