use crate::config::{DisplayConfig, ScalerUnitConfig};
use crate::foundation::core::{PxRect, Size};
use crate::foundation::error::HwcResult;
use crate::foundation::geometry::visible_rect;
use crate::layer::format::PixelFormat;
use crate::layer::model::{BlendMode, Layer};
use crate::scaler::caps::ScaleRequest;

/// Why a layer can never be handed to a window this cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IneligibleReason {
    /// The host marked the layer skip.
    Skip,
    /// Plane alpha is zero.
    Transparent,
    /// No buffer attached.
    NoBuffer,
    /// Display frame lies entirely outside the display.
    OffScreen,
    /// Windows cannot reproduce the blend mode.
    UnsupportedBlend,
    /// Source crop is not finite.
    InvalidCrop,
    /// Visible part is smaller than the smallest window.
    TooSmall,
    /// Format has no window mapping and no conversion was requested.
    UnsupportedFormat,
    /// No scaler unit of the board can perform the required conversion.
    NoScaler,
    /// Background layer that is not the bottom layer, or a second one.
    MisplacedBackground,
    /// The GPU output buffer; placed by the allocator, not classified.
    FramebufferTarget,
}

bitflags::bitflags! {
    /// Reasons a layer needs a scaler unit before a window can show it.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct ScalerReasons: u8 {
        /// YUV source needs color-space conversion.
        const CSC = 0x01;
        /// Source and destination sizes differ.
        const SCALE = 0x02;
        /// Rotation or flip.
        const ROTATE = 0x04;
        /// Horizontal edges violate the window byte alignment.
        const MISALIGNED = 0x08;
    }
}

/// Advisory classification of one layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Eligibility {
    /// Must be composed by the GPU.
    Ineligible(IneligibleReason),
    /// A window can scan the buffer out as is.
    Direct,
    /// A window can show the layer once a scaler unit converted it.
    NeedsScaler(ScalerReasons),
}

impl Eligibility {
    /// Return `true` when the allocator may try to place the layer.
    pub fn is_candidate(self) -> bool {
        !matches!(self, Self::Ineligible(_))
    }

    /// Return `true` when placement also requires a scaler unit.
    pub fn needs_scaler(self) -> bool {
        matches!(self, Self::NeedsScaler(_))
    }
}

/// Display facts the classifier needs.
#[derive(Clone, Copy, Debug)]
pub struct ClassifyContext<'a> {
    /// Display area.
    pub bounds: PxRect,
    /// Byte alignment of window edges.
    pub window_align_bytes: u32,
    /// Smallest window.
    pub min_window: Size,
    /// Scaler units of the board.
    pub scalers: &'a [ScalerUnitConfig],
}

impl<'a> ClassifyContext<'a> {
    /// Context for `display` on a board with `scalers`.
    pub fn new(display: &DisplayConfig, scalers: &'a [ScalerUnitConfig]) -> Self {
        Self {
            bounds: display.bounds(),
            window_align_bytes: display.window_align_bytes,
            min_window: display.min_window,
            scalers,
        }
    }
}

/// What a layer would ask of a scaler unit.
pub fn scale_request(layer: &Layer) -> HwcResult<ScaleRequest> {
    Ok(ScaleRequest {
        format: layer.format,
        src: layer.oriented_source_size()?,
        dst: layer.display_frame.size(),
        transform: !layer.transform.is_identity(),
        protected: layer.is_protected(),
    })
}

fn misaligned(visible: PxRect, format: PixelFormat, align: u32) -> bool {
    let bpp = i64::from(format.bytes_per_pixel());
    let align = i64::from(align.max(1));
    (i64::from(visible.left) * bpp).rem_euclid(align) != 0
        || (i64::from(visible.right) * bpp).rem_euclid(align) != 0
}

/// Classify one layer. Pure; the allocator makes the final decision.
pub fn classify(layer: &Layer, ctx: &ClassifyContext<'_>) -> Eligibility {
    use IneligibleReason as R;

    if layer.is_framebuffer_target() {
        return Eligibility::Ineligible(R::FramebufferTarget);
    }
    if layer.is_background() {
        return Eligibility::Direct;
    }
    if layer.is_skip() {
        return Eligibility::Ineligible(R::Skip);
    }
    if layer.plane_alpha == 0 {
        return Eligibility::Ineligible(R::Transparent);
    }
    if layer.handle.is_none() {
        return Eligibility::Ineligible(R::NoBuffer);
    }
    let Some(visible) = visible_rect(layer.display_frame, ctx.bounds) else {
        return Eligibility::Ineligible(R::OffScreen);
    };
    if layer.blending == BlendMode::Coverage && layer.format.has_alpha() {
        return Eligibility::Ineligible(R::UnsupportedBlend);
    }
    let Ok(req) = scale_request(layer) else {
        return Eligibility::Ineligible(R::InvalidCrop);
    };
    if visible.width() < ctx.min_window.width || visible.height() < ctx.min_window.height {
        return Eligibility::Ineligible(R::TooSmall);
    }

    let mut reasons = ScalerReasons::empty();
    if layer.format.is_yuv() {
        reasons |= ScalerReasons::CSC;
    }
    if req.src != req.dst {
        reasons |= ScalerReasons::SCALE;
    }
    if req.transform {
        reasons |= ScalerReasons::ROTATE;
    }

    if reasons.is_empty() {
        if layer.format.window_format().is_none() {
            return Eligibility::Ineligible(R::UnsupportedFormat);
        }
        if !misaligned(visible, layer.format, ctx.window_align_bytes) {
            return Eligibility::Direct;
        }
        reasons |= ScalerReasons::MISALIGNED;
    }

    let convertible = ctx.scalers.iter().any(|unit| {
        unit.caps.plan(&req).is_some()
            || unit
                .local_path
                .is_some_and(|local| local.admits(&unit.caps, &req))
    });
    if convertible {
        Eligibility::NeedsScaler(reasons)
    } else {
        Eligibility::Ineligible(R::NoScaler)
    }
}

/// Classify a whole layer list.
///
/// Only the bottom layer may be a background; any other background layer is ineligible.
pub fn classify_all(layers: &[Layer], ctx: &ClassifyContext<'_>) -> Vec<Eligibility> {
    layers
        .iter()
        .enumerate()
        .map(|(i, layer)| {
            if layer.is_background() && i != 0 {
                Eligibility::Ineligible(IneligibleReason::MisplacedBackground)
            } else {
                classify(layer, ctx)
            }
        })
        .collect()
}

#[cfg(test)]
#[path = "../../tests/unit/classify/eligibility.rs"]
mod tests;
