/// Buffer pixel formats a layer may carry.
///
/// Numeric values of the hardware contract are not needed here; the classifier only asks the
/// predicates below.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 32-bit RGBA.
    Rgba8888,
    /// 32-bit RGB with ignored alpha.
    Rgbx8888,
    /// 32-bit BGRA.
    Bgra8888,
    /// Packed 24-bit RGB.
    Rgb888,
    /// 16-bit RGB.
    Rgb565,
    /// Semi-planar 4:2:0, Cb first.
    Nv12,
    /// Semi-planar 4:2:0, Cr first.
    Nv21,
    /// Planar 4:2:0, Cr plane first.
    Yv12,
    /// Semi-planar 4:2:0 in the decoder's 64x32 macroblock tiling.
    Nv12Tiled,
    /// Interleaved 4:2:2.
    Yuyv,
}

/// Pixel layouts a hardware window can scan out directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFormat {
    /// 32bpp with per-pixel alpha.
    Argb8888,
    /// 32bpp, alpha ignored.
    Xrgb8888,
    /// 32bpp, swapped red/blue with alpha.
    Abgr8888,
    /// 16bpp.
    Rgb565,
}

impl PixelFormat {
    /// Window layout this format maps to without conversion.
    pub fn window_format(self) -> Option<WindowFormat> {
        match self {
            Self::Rgba8888 => Some(WindowFormat::Abgr8888),
            Self::Rgbx8888 => Some(WindowFormat::Xrgb8888),
            Self::Bgra8888 => Some(WindowFormat::Argb8888),
            Self::Rgb565 => Some(WindowFormat::Rgb565),
            Self::Rgb888
            | Self::Nv12
            | Self::Nv21
            | Self::Yv12
            | Self::Nv12Tiled
            | Self::Yuyv => None,
        }
    }

    /// YUV formats need color-space conversion before a window can show them.
    pub fn is_yuv(self) -> bool {
        matches!(
            self,
            Self::Nv12 | Self::Nv21 | Self::Yv12 | Self::Nv12Tiled | Self::Yuyv
        )
    }

    /// Tiled layouts cannot be fed to the local path and need a detiling pass.
    pub fn is_tiled(self) -> bool {
        matches!(self, Self::Nv12Tiled)
    }

    /// Return `true` when the format carries per-pixel alpha.
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba8888 | Self::Bgra8888)
    }

    /// Average bits per pixel across all planes.
    pub fn bits_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8888 | Self::Rgbx8888 | Self::Bgra8888 => 32,
            Self::Rgb888 => 24,
            Self::Rgb565 | Self::Yuyv => 16,
            Self::Nv12 | Self::Nv21 | Self::Yv12 | Self::Nv12Tiled => 12,
        }
    }

    /// Bytes per pixel of the first plane, used for window alignment checks.
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            Self::Rgba8888 | Self::Rgbx8888 | Self::Bgra8888 => 4,
            Self::Rgb888 => 3,
            Self::Rgb565 | Self::Yuyv => 2,
            Self::Nv12 | Self::Nv21 | Self::Yv12 | Self::Nv12Tiled => 1,
        }
    }
}

/// Format of scaler destination buffers handed to windows.
pub const SCALER_OUTPUT_FORMAT: PixelFormat = PixelFormat::Rgbx8888;
