//! Framebuffer layout
//!
//! Places the two emulated screens inside the host surface.

/// Native size of the top screen
pub const TOP_SCREEN_WIDTH: u32 = 400;
pub const TOP_SCREEN_HEIGHT: u32 = 240;
/// Native size of the bottom (touch) screen
pub const BOTTOM_SCREEN_WIDTH: u32 = 320;
pub const BOTTOM_SCREEN_HEIGHT: u32 = 240;

/// Rectangle in surface pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    fn sized(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            right: left + width as i32,
            bottom: top + height as i32,
        }
    }

    pub fn width(&self) -> i32 {
        self.right - self.left
    }

    pub fn height(&self) -> i32 {
        self.bottom - self.top
    }
}

/// Screen placement for one surface size and orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FramebufferLayout {
    pub width: u32,
    pub height: u32,
    pub portrait: bool,
    pub swap_screens: bool,
    pub top_screen: Rect,
    pub bottom_screen: Rect,
}

impl FramebufferLayout {
    /// Portrait stacks the screens vertically, landscape puts them side by side.
    /// With `swap_screens` the bottom screen takes the primary position.
    pub fn new(width: u32, height: u32, portrait: bool, swap_screens: bool) -> Self {
        let top = (TOP_SCREEN_WIDTH, TOP_SCREEN_HEIGHT);
        let bottom = (BOTTOM_SCREEN_WIDTH, BOTTOM_SCREEN_HEIGHT);
        let (first, second) = if swap_screens { (bottom, top) } else { (top, bottom) };

        let (total_w, total_h) = if portrait {
            (first.0.max(second.0), first.1 + second.1)
        } else {
            (first.0 + second.0, first.1.max(second.1))
        };
        let scale = (width as f32 / total_w as f32).min(height as f32 / total_h as f32);
        let scaled = |size: (u32, u32)| ((size.0 as f32 * scale) as u32, (size.1 as f32 * scale) as u32);
        let (fw, fh) = scaled(first);
        let (sw, sh) = scaled(second);

        let (first_rect, second_rect) = if portrait {
            let x1 = (width.saturating_sub(fw) / 2) as i32;
            let x2 = (width.saturating_sub(sw) / 2) as i32;
            (Rect::sized(x1, 0, fw, fh), Rect::sized(x2, fh as i32, sw, sh))
        } else {
            let y1 = (height.saturating_sub(fh) / 2) as i32;
            let y2 = (height.saturating_sub(sh) / 2) as i32;
            let x = (width.saturating_sub(fw + sw) / 2) as i32;
            (Rect::sized(x, y1, fw, fh), Rect::sized(x + fw as i32, y2, sw, sh))
        };

        let (top_screen, bottom_screen) = if swap_screens {
            (second_rect, first_rect)
        } else {
            (first_rect, second_rect)
        };

        Self {
            width,
            height,
            portrait,
            swap_screens,
            top_screen,
            bottom_screen,
        }
    }
}
