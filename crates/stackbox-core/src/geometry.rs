#![forbid(unsafe_code)]

//! Integer pixel geometry for overlay placement.
//!
//! All coordinates are CSS-pixel-like integers in the host document's
//! coordinate space. Sizes use the `{x, y}` convention of the option set
//! rather than `width`/`height` so option payloads and geometry agree.

/// A two-dimensional extent in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Size {
    pub x: i32,
    pub y: i32,
}

impl Size {
    pub const ZERO: Size = Size { x: 0, y: 0 };

    /// Create a new size.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// True when either dimension is below one pixel.
    ///
    /// This is the broken-image heuristic: loaders report sub-pixel or
    /// zero natural sizes for images that failed to decode.
    pub const fn is_degenerate(self) -> bool {
        self.x < 1 || self.y < 1
    }
}

/// A position in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Viewport measurements taken from the host document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ViewportMetrics {
    /// Visible viewport size.
    pub size: Size,
    /// Current scroll offset.
    pub scroll: Point,
    /// Full scrollable extent of the document.
    pub scroll_size: Size,
}

impl ViewportMetrics {
    pub const fn new(size: Size, scroll: Point, scroll_size: Size) -> Self {
        Self {
            size,
            scroll,
            scroll_size,
        }
    }
}

/// Target frame for a surface's window layer.
///
/// Applied verbatim by the presentation surface; the engine computes
/// frames, the surface turns them into styles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStyles {
    pub left: i32,
    pub top: i32,
    pub width: i32,
    pub height: i32,
    pub z_layer: u32,
}

impl FrameStyles {
    pub const fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Shrink `natural` to fit within `bounds`, preserving aspect ratio.
///
/// Two passes: an image that is both too wide and too tall after the
/// first correction gets a second one. Results are rounded to whole
/// pixels. A size already within bounds is returned unchanged. Returns
/// `Size::ZERO` when `bounds` has no positive extent.
pub fn aspect_fit(natural: Size, bounds: Size) -> Size {
    if bounds.x < 1 || bounds.y < 1 {
        return Size::ZERO;
    }
    let mut x = natural.x as f64;
    let mut y = natural.y as f64;
    for _ in 0..2 {
        if x > bounds.x as f64 {
            y *= bounds.x as f64 / x;
            x = bounds.x as f64;
        } else if y > bounds.y as f64 {
            x *= bounds.y as f64 / y;
            y = bounds.y as f64;
        }
    }
    Size::new(x.round() as i32, y.round() as i32)
}
