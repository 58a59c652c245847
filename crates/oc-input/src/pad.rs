//! Controller/gamepad handling (HID pad)

use bitflags::bitflags;

bitflags! {
    /// Console button flags, in HID pad register order
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PadButtons: u32 {
        const A          = 0x0001;
        const B          = 0x0002;
        const SELECT     = 0x0004;
        const START      = 0x0008;
        const DPAD_RIGHT = 0x0010;
        const DPAD_LEFT  = 0x0020;
        const DPAD_UP    = 0x0040;
        const DPAD_DOWN  = 0x0080;
        const R          = 0x0100;
        const L          = 0x0200;
        const X          = 0x0400;
        const Y          = 0x0800;
        const ZL         = 0x4000;
        const ZR         = 0x8000;
        const HOME       = 0x0001_0000;
        const DEBUG      = 0x0002_0000;
        const GPIO14     = 0x0004_0000;
    }
}

/// Button identifiers sent by the host frontend
pub mod host_code {
    pub const BUTTON_A: i32 = 700;
    pub const BUTTON_B: i32 = 701;
    pub const BUTTON_X: i32 = 702;
    pub const BUTTON_Y: i32 = 703;
    pub const BUTTON_START: i32 = 704;
    pub const BUTTON_SELECT: i32 = 705;
    pub const BUTTON_HOME: i32 = 706;
    pub const BUTTON_ZL: i32 = 707;
    pub const BUTTON_ZR: i32 = 708;
    pub const DPAD_UP: i32 = 709;
    pub const DPAD_DOWN: i32 = 710;
    pub const DPAD_LEFT: i32 = 711;
    pub const DPAD_RIGHT: i32 = 712;
    pub const STICK_LEFT: i32 = 713;
    pub const STICK_C: i32 = 714;
    pub const TRIGGER_L: i32 = 773;
    pub const TRIGGER_R: i32 = 774;
    pub const BUTTON_DEBUG: i32 = 781;
    pub const BUTTON_GPIO14: i32 = 782;
}

impl PadButtons {
    /// Map a host button code to a console button
    pub fn from_host_code(code: i32) -> Option<Self> {
        use host_code::*;
        let button = match code {
            BUTTON_A => Self::A,
            BUTTON_B => Self::B,
            BUTTON_X => Self::X,
            BUTTON_Y => Self::Y,
            BUTTON_START => Self::START,
            BUTTON_SELECT => Self::SELECT,
            BUTTON_HOME => Self::HOME,
            BUTTON_ZL => Self::ZL,
            BUTTON_ZR => Self::ZR,
            DPAD_UP => Self::DPAD_UP,
            DPAD_DOWN => Self::DPAD_DOWN,
            DPAD_LEFT => Self::DPAD_LEFT,
            DPAD_RIGHT => Self::DPAD_RIGHT,
            TRIGGER_L => Self::L,
            TRIGGER_R => Self::R,
            BUTTON_DEBUG => Self::DEBUG,
            BUTTON_GPIO14 => Self::GPIO14,
            _ => return None,
        };
        Some(button)
    }
}

/// Analog sticks on the console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stick {
    CirclePad,
    CStick,
}

impl Stick {
    pub fn from_host_code(code: i32) -> Option<Self> {
        match code {
            host_code::STICK_LEFT => Some(Self::CirclePad),
            host_code::STICK_C => Some(Self::CStick),
            _ => None,
        }
    }
}

/// Analog triggers report pressed above this value
pub const ANALOG_BUTTON_THRESHOLD: f32 = 0.5;

/// Controller state
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PadState {
    pub buttons: PadButtons,
    /// Circle pad position, each axis in [-1, 1]
    pub circle_pad: (f32, f32),
    /// C-stick position, each axis in [-1, 1]
    pub c_stick: (f32, f32),
}

impl PadState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_button_pressed(&self, button: PadButtons) -> bool {
        self.buttons.contains(button)
    }

    pub fn set_button(&mut self, button: PadButtons, pressed: bool) {
        self.buttons.set(button, pressed);
    }

    pub fn set_stick(&mut self, stick: Stick, x: f32, y: f32) {
        match stick {
            Stick::CirclePad => self.circle_pad = (x, y),
            Stick::CStick => self.c_stick = (x, y),
        }
    }
}

/// Clamp a raw gamepad position into the unit circle.
///
/// The host sends y with the opposite sign of the console convention.
pub fn normalize_stick(x: f32, y: f32) -> (f32, f32) {
    let x = x.clamp(-1.0, 1.0);
    let y = (-y).clamp(-1.0, 1.0);
    let r = x * x + y * y;
    if r > 1.0 {
        let r = r.sqrt();
        (x / r, y / r)
    } else {
        (x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_state() {
        let mut state = PadState::new();
        assert!(!state.is_button_pressed(PadButtons::A));

        state.set_button(PadButtons::A, true);
        assert!(state.is_button_pressed(PadButtons::A));

        state.set_button(PadButtons::A, false);
        assert!(!state.is_button_pressed(PadButtons::A));
    }

    #[test]
    fn test_host_codes() {
        assert_eq!(PadButtons::from_host_code(700), Some(PadButtons::A));
        assert_eq!(PadButtons::from_host_code(773), Some(PadButtons::L));
        assert_eq!(PadButtons::from_host_code(1), None);
        assert_eq!(Stick::from_host_code(714), Some(Stick::CStick));
        assert_eq!(Stick::from_host_code(700), None);
    }

    #[test]
    fn test_normalize_stick() {
        assert_eq!(normalize_stick(0.5, 0.25), (0.5, -0.25));

        let (x, y) = normalize_stick(3.0, -3.0);
        assert!((x - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
        assert!((y - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);
    }
}
