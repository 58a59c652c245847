//! Touchscreen handling
//!
//! Host touches arrive in framebuffer pixels; the guest sees the bottom
//! screen in its own 320x240 coordinate space.

/// Native bottom screen size
pub const BOTTOM_SCREEN_WIDTH: u32 = 320;
pub const BOTTOM_SCREEN_HEIGHT: u32 = 240;

/// Rectangle in framebuffer pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScreenRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl ScreenRect {
    pub fn new(left: i32, top: i32, width: i32, height: i32) -> Self {
        Self {
            left,
            top,
            right: left + width,
            bottom: top + height,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// Screen rotation applied by the frontend, in quarter turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

impl Rotation {
    pub fn from_degrees(degrees: i32) -> Self {
        match degrees.rem_euclid(360) {
            90 => Self::Rotate90,
            180 => Self::Rotate180,
            270 => Self::Rotate270,
            _ => Self::Rotate0,
        }
    }
}

/// Current touch point, normalized to [0, 1] on the bottom screen
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TouchPoint {
    pub x: f32,
    pub y: f32,
}

/// Touch state of the bottom screen
#[derive(Debug, Clone, Default)]
pub struct TouchState {
    screen: ScreenRect,
    rotation: Rotation,
    pressed: bool,
    point: TouchPoint,
}

impl TouchState {
    pub fn new(screen: ScreenRect) -> Self {
        Self {
            screen,
            ..Self::default()
        }
    }

    pub fn set_screen(&mut self, screen: ScreenRect) {
        self.screen = screen;
    }

    pub fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    /// Press at framebuffer coordinates. Returns false outside the bottom screen.
    pub fn press(&mut self, x: i32, y: i32) -> bool {
        if !self.screen.contains(x, y) {
            return false;
        }
        self.pressed = true;
        self.point = self.map(x, y);
        true
    }

    /// Drag while pressed; positions outside the screen are clamped to its edge
    pub fn moved(&mut self, x: i32, y: i32) {
        if !self.pressed {
            return;
        }
        let x = x.clamp(self.screen.left, (self.screen.right - 1).max(self.screen.left));
        let y = y.clamp(self.screen.top, (self.screen.bottom - 1).max(self.screen.top));
        self.point = self.map(x, y);
    }

    pub fn release(&mut self) {
        self.pressed = false;
        self.point = TouchPoint::default();
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn point(&self) -> TouchPoint {
        self.point
    }

    /// Touch position in guest pixels
    pub fn guest_position(&self) -> Option<(u16, u16)> {
        self.pressed.then(|| {
            (
                (self.point.x * (BOTTOM_SCREEN_WIDTH - 1) as f32).round() as u16,
                (self.point.y * (BOTTOM_SCREEN_HEIGHT - 1) as f32).round() as u16,
            )
        })
    }

    fn map(&self, x: i32, y: i32) -> TouchPoint {
        let w = self.screen.width().max(1) as f32;
        let h = self.screen.height().max(1) as f32;
        let u = (x - self.screen.left) as f32 / w;
        let v = (y - self.screen.top) as f32 / h;
        let (u, v) = match self.rotation {
            Rotation::Rotate0 => (u, v),
            Rotation::Rotate90 => (v, 1.0 - u),
            Rotation::Rotate180 => (1.0 - u, 1.0 - v),
            Rotation::Rotate270 => (1.0 - v, u),
        };
        TouchPoint {
            x: u.clamp(0.0, 1.0),
            y: v.clamp(0.0, 1.0),
        }
    }
}
