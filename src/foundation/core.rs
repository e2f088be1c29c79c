use crate::foundation::error::{HwcError, HwcResult};

pub use kurbo::Rect;

/// Which display back-end a call targets.
///
/// The primary panel and the external (HDMI) output share one scaler pool; the primary display
/// wins arbitration.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DisplayKind {
    /// Built-in panel.
    Primary,
    /// Hot-pluggable external output.
    External,
}

impl DisplayKind {
    /// Both displays, primary first.
    pub const ALL: [Self; 2] = [Self::Primary, Self::External];

    /// Dense index for per-display arrays.
    pub fn index(self) -> usize {
        match self {
            Self::Primary => 0,
            Self::External => 1,
        }
    }

    /// The display competing for the same scaler pool.
    pub fn other(self) -> Self {
        match self {
            Self::Primary => Self::External,
            Self::External => Self::Primary,
        }
    }
}

/// Integer width/height pair in pixels.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Size {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Size {
    /// Create a size.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Pixel count.
    pub fn area(self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    /// Swap width and height (used for 90/270 degree rotations).
    pub fn transposed(self) -> Self {
        Self {
            width: self.height,
            height: self.width,
        }
    }

    /// Return `true` when either dimension is zero.
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Return `true` when both dimensions lie inside `[min, max]`.
    pub fn within(self, min: Self, max: Self) -> bool {
        (min.width..=max.width).contains(&self.width)
            && (min.height..=max.height).contains(&self.height)
    }
}

/// Half-open integer rectangle `[left, right) x [top, bottom)` in display space.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct PxRect {
    /// Left edge (inclusive).
    pub left: i32,
    /// Top edge (inclusive).
    pub top: i32,
    /// Right edge (exclusive).
    pub right: i32,
    /// Bottom edge (exclusive).
    pub bottom: i32,
}

impl PxRect {
    /// Create a rectangle from its edges.
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Create a rectangle from an origin and a size.
    pub fn from_origin_size(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self {
            left: x,
            top: y,
            right: x.saturating_add(i32::try_from(w).unwrap_or(i32::MAX)),
            bottom: y.saturating_add(i32::try_from(h).unwrap_or(i32::MAX)),
        }
    }

    /// Rectangle anchored at the origin covering a whole display.
    pub fn from_size(size: Size) -> Self {
        Self::from_origin_size(0, 0, size.width, size.height)
    }

    /// Width, zero for inverted rectangles.
    pub fn width(self) -> u32 {
        u32::try_from(i64::from(self.right) - i64::from(self.left)).unwrap_or(0)
    }

    /// Height, zero for inverted rectangles.
    pub fn height(self) -> u32 {
        u32::try_from(i64::from(self.bottom) - i64::from(self.top)).unwrap_or(0)
    }

    /// Size of the rectangle.
    pub fn size(self) -> Size {
        Size::new(self.width(), self.height())
    }

    /// Pixel count.
    pub fn area(self) -> u64 {
        self.size().area()
    }

    /// Return `true` when the rectangle covers no pixel.
    pub fn is_empty(self) -> bool {
        self.left >= self.right || self.top >= self.bottom
    }

    /// Intersection, `None` when the rectangles share no pixel.
    pub fn intersect(self, other: Self) -> Option<Self> {
        let r = Self {
            left: self.left.max(other.left),
            top: self.top.max(other.top),
            right: self.right.min(other.right),
            bottom: self.bottom.min(other.bottom),
        };
        (!r.is_empty()).then_some(r)
    }

    /// Return `true` when `other` lies entirely inside `self`.
    pub fn contains_rect(self, other: Self) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }

    /// Smallest rectangle containing both. Empty operands are ignored.
    pub fn union(self, other: Self) -> Self {
        if self.is_empty() {
            return other;
        }
        if other.is_empty() {
            return self;
        }
        Self {
            left: self.left.min(other.left),
            top: self.top.min(other.top),
            right: self.right.max(other.right),
            bottom: self.bottom.max(other.bottom),
        }
    }
}

/// Convert a fractional source crop into the integer rectangle the hardware fetches.
///
/// Edges are expanded outward so the fetched area always covers the crop.
pub fn crop_to_px(crop: Rect) -> HwcResult<PxRect> {
    // Before `abs`: its min/max would drop a NaN edge.
    if ![crop.x0, crop.y0, crop.x1, crop.y1].iter().all(|v| v.is_finite()) {
        return Err(HwcError::invariant("source crop must be finite"));
    }
    let crop = crop.abs();
    let clamp = |v: f64| v.clamp(f64::from(i32::MIN), f64::from(i32::MAX)) as i32;
    Ok(PxRect::new(
        clamp(crop.x0.floor()),
        clamp(crop.y0.floor()),
        clamp(crop.x1.ceil()),
        clamp(crop.y1.ceil()),
    ))
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
