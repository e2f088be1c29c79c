//! Hardware description consumed by the composer.
//!
//! A [`HwcConfig`] is either built in code ([`HwcConfig::default`] describes the reference SoC)
//! or parsed from JSON. It is validated once when a [`crate::Composer`] is constructed; the
//! per-frame path never re-checks it.

use crate::foundation::core::{DisplayKind, PxRect, Size};
use crate::foundation::error::{HwcError, HwcResult};
use crate::scaler::caps::{LocalPathCaps, ScaleEnvelope, ScalerCaps};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// One DMA channel shared by a group of windows.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChannelConfig {
    /// Pixel-throughput budget per frame.
    pub max_cost: u64,
    /// Largest number of rectangles on this channel that may cover one pixel. `0` behaves as `1`.
    pub max_overlap: u8,
}

impl ChannelConfig {
    /// Overlap depth actually enforced.
    pub fn overlap_limit(self) -> usize {
        usize::from(self.max_overlap.max(1))
    }
}

/// How much bandwidth the framebuffer window is charged.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FbCostPolicy {
    /// The whole display area, whatever the GPU actually covers.
    #[default]
    FullScreen,
    /// Bounding box of the layers folded into the framebuffer.
    Region,
}

/// Window/channel layout of one display back-end.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DisplayConfig {
    /// Panel width in pixels.
    pub width: u32,
    /// Panel height in pixels.
    pub height: u32,
    /// Number of hardware windows.
    pub window_count: usize,
    /// DMA channel index of each window.
    pub window_channels: Vec<usize>,
    /// DMA channels.
    pub channels: Vec<ChannelConfig>,
    /// Byte alignment a window needs on its horizontal edges.
    #[serde(default = "default_align")]
    pub window_align_bytes: u32,
    /// Smallest window the hardware accepts.
    #[serde(default = "default_min_window")]
    pub min_window: Size,
    /// Framebuffer bandwidth accounting.
    #[serde(default)]
    pub fb_cost: FbCostPolicy,
}

fn default_align() -> u32 {
    8
}

fn default_min_window() -> Size {
    Size::new(4, 4)
}

impl DisplayConfig {
    /// Display area in display space.
    pub fn bounds(&self) -> PxRect {
        PxRect::from_size(Size::new(self.width, self.height))
    }

    /// DMA channel of `window`.
    pub fn channel_of(&self, window: usize) -> HwcResult<usize> {
        self.window_channels.get(window).copied().ok_or_else(|| {
            HwcError::invariant(format!(
                "window {window} outside declared range 0..{}",
                self.window_count
            ))
        })
    }

    fn validate(&self, kind: DisplayKind) -> HwcResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(HwcError::config(format!("{kind:?} display size must be > 0")));
        }
        if i32::try_from(self.width).is_err() || i32::try_from(self.height).is_err() {
            return Err(HwcError::config(format!("{kind:?} display size out of range")));
        }
        if self.window_channels.len() != self.window_count {
            return Err(HwcError::config(format!(
                "{kind:?} window_channels has {} entries, expected {}",
                self.window_channels.len(),
                self.window_count
            )));
        }
        if let Some(&bad) = self
            .window_channels
            .iter()
            .find(|&&c| c >= self.channels.len())
        {
            return Err(HwcError::config(format!(
                "{kind:?} window mapped to channel {bad}, only {} declared",
                self.channels.len()
            )));
        }
        if self.window_align_bytes == 0 {
            return Err(HwcError::config("window_align_bytes must be > 0"));
        }
        Ok(())
    }
}

/// One physical scaler/converter unit.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ScalerUnitConfig {
    /// Capability envelope.
    pub caps: ScalerCaps,
    /// Display that owns the unit by default; `None` for a shared unit.
    #[serde(default)]
    pub home: Option<DisplayKind>,
    /// In-line path into a display's windows, if wired.
    #[serde(default)]
    pub local_path: Option<LocalPathCaps>,
}

/// Runtime switches.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct HwcOptions {
    /// Replay the last configuration when nothing folded into the framebuffer changed.
    pub skip_static_layers: bool,
    /// Debug switch: compose every layer on the GPU.
    pub force_gpu: bool,
    /// Upper bound of every fence wait.
    pub fence_timeout_ms: u64,
    /// Destination buffers per memory-to-memory binding.
    pub dst_ring_len: usize,
}

impl Default for HwcOptions {
    fn default() -> Self {
        Self {
            skip_static_layers: true,
            force_gpu: false,
            fence_timeout_ms: 1000,
            dst_ring_len: 3,
        }
    }
}

/// Complete hardware description.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct HwcConfig {
    /// Built-in panel.
    pub primary: DisplayConfig,
    /// External output, if the board has one.
    #[serde(default)]
    pub external: Option<DisplayConfig>,
    /// Scaler pool shared by both displays.
    #[serde(default)]
    pub scalers: Vec<ScalerUnitConfig>,
    /// Runtime switches.
    #[serde(default)]
    pub options: HwcOptions,
}

impl Default for HwcConfig {
    fn default() -> Self {
        let primary = DisplayConfig {
            width: 2560,
            height: 1600,
            window_count: 5,
            window_channels: vec![0, 0, 0, 1, 1],
            channels: vec![
                ChannelConfig {
                    max_cost: 2560 * 1600 * 2,
                    max_overlap: 2,
                },
                ChannelConfig {
                    max_cost: 2560 * 1600,
                    max_overlap: 1,
                },
            ],
            window_align_bytes: 8,
            min_window: default_min_window(),
            fb_cost: FbCostPolicy::FullScreen,
        };
        let external = DisplayConfig {
            width: 1920,
            height: 1080,
            window_count: 3,
            window_channels: vec![0, 0, 0],
            channels: vec![ChannelConfig {
                max_cost: 1920 * 1080 * 2,
                max_overlap: 2,
            }],
            window_align_bytes: 8,
            min_window: default_min_window(),
            fb_cost: FbCostPolicy::FullScreen,
        };
        let scalers = vec![
            ScalerUnitConfig {
                caps: ScalerCaps::reference(),
                home: Some(DisplayKind::Primary),
                local_path: Some(LocalPathCaps {
                    display: DisplayKind::Primary,
                    envelope: ScaleEnvelope {
                        max_downscale: 2,
                        max_upscale: 1,
                    },
                }),
            },
            ScalerUnitConfig {
                caps: ScalerCaps::reference(),
                home: None,
                local_path: None,
            },
            ScalerUnitConfig {
                caps: ScalerCaps::reference(),
                home: Some(DisplayKind::External),
                local_path: None,
            },
        ];
        Self {
            primary,
            external: Some(external),
            scalers,
            options: HwcOptions::default(),
        }
    }
}

impl HwcConfig {
    /// Parse a config from a JSON reader.
    pub fn from_reader<R: std::io::Read>(r: R) -> HwcResult<Self> {
        serde_json::from_reader(r).map_err(|e| HwcError::config(format!("parse config JSON: {e}")))
    }

    /// Parse a config from a JSON file on disk.
    pub fn from_path(path: impl AsRef<Path>) -> HwcResult<Self> {
        let path = path.as_ref();
        let f = File::open(path).map_err(|e| {
            HwcError::config(format!("open config JSON '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(f))
    }

    /// Layout of `kind`, `None` when the board has no such display.
    pub fn display(&self, kind: DisplayKind) -> Option<&DisplayConfig> {
        match kind {
            DisplayKind::Primary => Some(&self.primary),
            DisplayKind::External => self.external.as_ref(),
        }
    }

    /// Check internal consistency.
    pub fn validate(&self) -> HwcResult<()> {
        self.primary.validate(DisplayKind::Primary)?;
        if let Some(ext) = &self.external {
            ext.validate(DisplayKind::External)?;
        }
        for (i, unit) in self.scalers.iter().enumerate() {
            let caps = &unit.caps;
            if caps.envelope.max_downscale == 0 || caps.envelope.max_upscale == 0 {
                return Err(HwcError::config(format!(
                    "scaler {i}: scale limits must be >= 1"
                )));
            }
            if !caps.min_src.within(Size::new(1, 1), caps.max_src)
                || !caps.min_dst.within(Size::new(1, 1), caps.max_dst)
            {
                return Err(HwcError::config(format!(
                    "scaler {i}: min sizes must be >= 1 and <= max sizes"
                )));
            }
            if let Some(local) = &unit.local_path {
                if local.envelope.max_downscale == 0 || local.envelope.max_upscale == 0 {
                    return Err(HwcError::config(format!(
                        "scaler {i}: local path scale limits must be >= 1"
                    )));
                }
                if self.display(local.display).is_none() {
                    return Err(HwcError::config(format!(
                        "scaler {i}: local path wired to missing {:?} display",
                        local.display
                    )));
                }
            }
        }
        let mut local_owners = self
            .scalers
            .iter()
            .filter_map(|u| u.local_path.map(|l| l.display))
            .collect::<Vec<_>>();
        let n = local_owners.len();
        local_owners.sort();
        local_owners.dedup();
        if local_owners.len() != n {
            return Err(HwcError::config(
                "at most one local-path unit per display is supported",
            ));
        }
        if self.options.dst_ring_len == 0 {
            return Err(HwcError::config("dst_ring_len must be >= 1"));
        }
        Ok(())
    }
}
