use crate::foundation::core::{DisplayKind, Size};
use crate::layer::format::PixelFormat;

/// Scale ratio limits of one processing pass. Both limits are integer factors, `1` forbids
/// scaling in that direction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ScaleEnvelope {
    /// Largest `src / dst` factor.
    pub max_downscale: u32,
    /// Largest `dst / src` factor.
    pub max_upscale: u32,
}

impl ScaleEnvelope {
    /// Return `true` when one pass can map `src` onto `dst`.
    pub fn admits(self, src: Size, dst: Size) -> bool {
        if src.is_empty() || dst.is_empty() {
            return false;
        }
        let fits = |s: u32, d: u32| {
            let (s, d) = (u64::from(s), u64::from(d));
            d <= s * u64::from(self.max_upscale) && s <= d * u64::from(self.max_downscale)
        };
        fits(src.width, dst.width) && fits(src.height, dst.height)
    }

    /// Envelope of two chained passes.
    pub fn squared(self) -> Self {
        Self {
            max_downscale: self.max_downscale.saturating_mul(self.max_downscale),
            max_upscale: self.max_upscale.saturating_mul(self.max_upscale),
        }
    }

    /// Size of the buffer between two chained passes mapping `src` onto `dst`.
    ///
    /// Each axis scales as far as the first pass allows; in-range axes keep the source size so
    /// the second pass does the whole job.
    pub fn intermediate(self, src: Size, dst: Size) -> Size {
        let axis = |s: u32, d: u32| {
            let up = s.saturating_mul(self.max_upscale);
            if d > up {
                up
            } else if u64::from(s) > u64::from(d) * u64::from(self.max_downscale) {
                s.div_ceil(self.max_downscale.max(1))
            } else {
                s
            }
        };
        Size::new(axis(src.width, dst.width), axis(src.height, dst.height))
    }
}

/// What a layer asks of a scaler unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScaleRequest {
    /// Source pixel format.
    pub format: PixelFormat,
    /// Source size after applying the layer's rotation.
    pub src: Size,
    /// Destination size.
    pub dst: Size,
    /// The layer carries a quarter turn or flip.
    pub transform: bool,
    /// The source is protected content.
    pub protected: bool,
}

/// How a memory-to-memory job is executed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PassPlan {
    /// Source straight into the destination ring.
    Single,
    /// Source into an intermediate buffer, then into the destination ring.
    TwoPass {
        /// Intermediate buffer size.
        intermediate: Size,
    },
}

impl PassPlan {
    /// Number of hardware runs per frame.
    pub fn passes(self) -> u8 {
        match self {
            Self::Single => 1,
            Self::TwoPass { .. } => 2,
        }
    }
}

/// Capability envelope of one scaler/converter unit.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScalerCaps {
    /// Smallest accepted source.
    pub min_src: Size,
    /// Largest accepted source.
    pub max_src: Size,
    /// Smallest producible destination.
    pub min_dst: Size,
    /// Largest producible destination.
    pub max_dst: Size,
    /// Accepted source formats.
    pub formats: Vec<PixelFormat>,
    /// Whether the unit can rotate and flip.
    pub rotation: bool,
    /// Single-pass scale limits.
    pub envelope: ScaleEnvelope,
    /// Whether jobs may be chained through an intermediate buffer.
    #[serde(default)]
    pub two_pass: bool,
    /// Whether the unit can read protected buffers.
    #[serde(default)]
    pub protected_content: bool,
}

impl ScalerCaps {
    /// Return `true` when the unit accepts `format` as a source.
    pub fn accepts_format(&self, format: PixelFormat) -> bool {
        self.formats.contains(&format)
    }

    /// Decide how the unit would run `req` in memory-to-memory mode, `None` if it cannot.
    pub fn plan(&self, req: &ScaleRequest) -> Option<PassPlan> {
        if !self.accepts_format(req.format)
            || (req.transform && !self.rotation)
            || (req.protected && !self.protected_content)
            || !req.src.within(self.min_src, self.max_src)
            || !req.dst.within(self.min_dst, self.max_dst)
        {
            return None;
        }
        if self.envelope.admits(req.src, req.dst) && !req.format.is_tiled() {
            return Some(PassPlan::Single);
        }
        if !self.two_pass || !self.envelope.squared().admits(req.src, req.dst) {
            return None;
        }
        let intermediate = self.envelope.intermediate(req.src, req.dst);
        let chained = intermediate.within(self.min_dst, self.max_dst)
            && intermediate.within(self.min_src, self.max_src)
            && self.envelope.admits(req.src, intermediate)
            && self.envelope.admits(intermediate, req.dst);
        chained.then_some(PassPlan::TwoPass { intermediate })
    }

    /// Reference envelope of the SoC's general-purpose scalers.
    pub fn reference() -> Self {
        Self {
            min_src: Size::new(16, 16),
            max_src: Size::new(4096, 4096),
            min_dst: Size::new(16, 16),
            max_dst: Size::new(4096, 4096),
            formats: vec![
                PixelFormat::Rgba8888,
                PixelFormat::Rgbx8888,
                PixelFormat::Bgra8888,
                PixelFormat::Rgb888,
                PixelFormat::Rgb565,
                PixelFormat::Nv12,
                PixelFormat::Nv21,
                PixelFormat::Yv12,
                PixelFormat::Nv12Tiled,
                PixelFormat::Yuyv,
            ],
            rotation: true,
            envelope: ScaleEnvelope {
                max_downscale: 16,
                max_upscale: 8,
            },
            two_pass: true,
            protected_content: true,
        }
    }
}

/// In-line path from a scaler straight into one display's window, skipping memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct LocalPathCaps {
    /// Display the path is wired to.
    pub display: DisplayKind,
    /// Scale limits while streaming.
    pub envelope: ScaleEnvelope,
}

impl LocalPathCaps {
    /// Return `true` when `req` can stream through the local path of a unit with `caps`.
    ///
    /// Visibility (fully on-screen) is checked by the caller, which knows the display bounds.
    pub fn admits(&self, caps: &ScalerCaps, req: &ScaleRequest) -> bool {
        !req.transform
            && !req.protected
            && !req.format.is_tiled()
            && caps.accepts_format(req.format)
            && req.src.within(caps.min_src, caps.max_src)
            && self.envelope.admits(req.src, req.dst)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scaler/caps.rs"]
mod tests;
