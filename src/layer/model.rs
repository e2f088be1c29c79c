use crate::foundation::core::{PxRect, Rect, Size, crop_to_px};
use crate::foundation::error::HwcResult;
use crate::layer::format::PixelFormat;

/// Opaque buffer identity, compared for change detection only.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct BufferHandle(pub u64);

/// Opaque sync fence.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct Fence(pub u64);

bitflags::bitflags! {
    /// Layer transform bits, in the order the hardware contract applies them:
    /// horizontal flip, vertical flip, then a clockwise quarter turn.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct Transform: u32 {
        /// Mirror horizontally.
        const FLIP_H = 0x01;
        /// Mirror vertically.
        const FLIP_V = 0x02;
        /// Clockwise quarter turn.
        const ROT_90 = 0x04;
        /// Half turn.
        const ROT_180 = 0x03;
        /// Counter-clockwise quarter turn.
        const ROT_270 = 0x07;
    }
}

bitflags::bitflags! {
    /// Gralloc usage bits relevant to composition.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct BufferUsage: u32 {
        /// Sampled by the GPU.
        const HW_TEXTURE = 0x0000_0100;
        /// Rendered by the GPU.
        const HW_RENDER = 0x0000_0200;
        /// Scanned out by a window.
        const HW_COMPOSER = 0x0000_0800;
        /// Shown on the external display.
        const EXTERNAL_DISP = 0x0000_2000;
        /// Secure content; no discounted fetch, no CPU access.
        const PROTECTED = 0x0000_4000;
    }
}

bitflags::bitflags! {
    /// Per-layer hints from the host.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
    pub struct LayerFlags: u32 {
        /// The host will draw this layer itself; never overlay it.
        const SKIP = 0x01;
    }
}

impl Transform {
    /// Return `true` when the transform includes a quarter turn, i.e. swaps axes.
    pub fn needs_rotation(self) -> bool {
        self.contains(Self::ROT_90)
    }

    /// Return `true` for the identity transform.
    pub fn is_identity(self) -> bool {
        self.is_empty()
    }
}

/// How a layer's pixels combine with what is below it.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    /// Opaque; alpha ignored.
    #[default]
    None,
    /// Source is premultiplied.
    Premultiplied,
    /// Source is straight alpha.
    Coverage,
}

/// Composition decision for a layer. The allocator's output.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CompositionKind {
    /// Scanned out by a hardware window.
    Overlay,
    /// Drawn by the GPU into the framebuffer target.
    #[default]
    Gpu,
    /// The GPU's output buffer itself (host-provided, usually last).
    FramebufferTarget,
    /// Solid background color, at most one, always at index 0.
    Background,
}

/// One visual surface to compose in the current cycle.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Layer {
    /// Buffer identity, `None` when the layer has no content.
    #[serde(default)]
    pub handle: Option<BufferHandle>,
    /// Buffer pixel format.
    pub format: PixelFormat,
    /// Buffer usage bits.
    #[serde(default)]
    pub usage: BufferUsage,
    /// Source crop in buffer space. May be fractional.
    pub source_crop: Rect,
    /// Destination in display space.
    pub display_frame: PxRect,
    /// Flip/rotate bits.
    #[serde(default)]
    pub transform: Transform,
    /// Blend mode.
    #[serde(default)]
    pub blending: BlendMode,
    /// Layer-wide alpha, 255 is opaque.
    #[serde(default = "opaque")]
    pub plane_alpha: u8,
    /// Host hints.
    #[serde(default)]
    pub flags: LayerFlags,
    /// Composition decision, written by `prepare`.
    #[serde(default)]
    pub composition: CompositionKind,
    /// Fence the producer signals when the buffer is ready.
    #[serde(default)]
    pub acquire_fence: Option<Fence>,
    /// Fence signalled when the hardware is done reading the buffer. Written by the composer.
    #[serde(default)]
    pub release_fence: Option<Fence>,
}

fn opaque() -> u8 {
    255
}

impl Layer {
    /// Plain layer showing `handle` cropped by `source_crop` at `display_frame`.
    pub fn new(
        handle: BufferHandle,
        format: PixelFormat,
        source_crop: Rect,
        display_frame: PxRect,
    ) -> Self {
        Self {
            handle: Some(handle),
            format,
            usage: BufferUsage::HW_COMPOSER | BufferUsage::HW_TEXTURE,
            source_crop,
            display_frame,
            transform: Transform::empty(),
            blending: BlendMode::None,
            plane_alpha: 255,
            flags: LayerFlags::empty(),
            composition: CompositionKind::Gpu,
            acquire_fence: None,
            release_fence: None,
        }
    }

    /// Unscaled layer whose crop matches its display frame size.
    pub fn unscaled(handle: BufferHandle, format: PixelFormat, display_frame: PxRect) -> Self {
        let crop = Rect::new(
            0.0,
            0.0,
            f64::from(display_frame.width()),
            f64::from(display_frame.height()),
        );
        Self::new(handle, format, crop, display_frame)
    }

    /// Solid background color layer covering `bounds`.
    pub fn background(bounds: PxRect) -> Self {
        Self {
            handle: None,
            composition: CompositionKind::Background,
            ..Self::unscaled(BufferHandle(0), PixelFormat::Rgbx8888, bounds)
        }
    }

    /// The GPU output buffer for this cycle.
    pub fn framebuffer_target(handle: BufferHandle, bounds: PxRect) -> Self {
        Self {
            composition: CompositionKind::FramebufferTarget,
            blending: BlendMode::Premultiplied,
            usage: BufferUsage::HW_COMPOSER | BufferUsage::HW_RENDER,
            ..Self::unscaled(handle, PixelFormat::Rgba8888, bounds)
        }
    }

    /// Builder-style transform override.
    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    /// Builder-style blend override.
    pub fn with_blending(mut self, blending: BlendMode) -> Self {
        self.blending = blending;
        self
    }

    /// Builder-style acquire fence.
    pub fn with_acquire_fence(mut self, fence: Fence) -> Self {
        self.acquire_fence = Some(fence);
        self
    }

    /// Mark the buffer as protected content.
    pub fn protected(mut self) -> Self {
        self.usage |= BufferUsage::PROTECTED;
        self
    }

    /// Mark the layer as host-drawn.
    pub fn skipped(mut self) -> Self {
        self.flags |= LayerFlags::SKIP;
        self
    }

    /// Return `true` for protected (secure) content.
    pub fn is_protected(&self) -> bool {
        self.usage.contains(BufferUsage::PROTECTED)
    }

    /// Return `true` when the host asked for this layer not to be overlaid.
    pub fn is_skip(&self) -> bool {
        self.flags.contains(LayerFlags::SKIP)
    }

    /// Return `true` for the solid-color background layer.
    pub fn is_background(&self) -> bool {
        self.composition == CompositionKind::Background
    }

    /// Return `true` for the GPU output buffer.
    pub fn is_framebuffer_target(&self) -> bool {
        self.composition == CompositionKind::FramebufferTarget
    }

    /// Integer source area the hardware fetches.
    pub fn source_px(&self) -> HwcResult<PxRect> {
        crop_to_px(self.source_crop)
    }

    /// Source size as seen after the layer's transform.
    pub fn oriented_source_size(&self) -> HwcResult<Size> {
        let s = self.source_px()?.size();
        Ok(if self.transform.needs_rotation() {
            s.transposed()
        } else {
            s
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layer/model.rs"]
mod tests;
