//! hwcompose decides, once per composition cycle, which layers of a display are scanned out by
//! fixed-function overlay windows and which are folded into one GPU-composited framebuffer.
//!
//! The entry point is [`Composer`]:
//!
//! - Build it from a validated [`HwcConfig`] and the [`HwDevices`] it drives
//! - Call [`Composer::prepare`] with the layer list of a display to get a [`FramePlan`]
//! - Call [`Composer::commit`] to run the scalers and program the windows
//!
//! Hardware is reached only through the traits in [`hw::device`]; [`MemoryHardware`] implements
//! all of them in memory for tests and simulation.
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub mod alloc;
pub mod bind;
pub mod classify;
pub mod compose;
pub mod config;
pub mod hw;
/// Layer model.
pub mod layer;
pub mod scaler;

pub use crate::foundation::core::{DisplayKind, PxRect, Rect, Size, crop_to_px};
pub use crate::foundation::error::{HwcError, HwcResult};
pub use crate::foundation::geometry::{max_overlap_depth, overlap_depth_with, visible_rect};

pub use crate::alloc::allocator::{AllocOutcome, FbSpan};
pub use crate::compose::composer::Composer;
pub use crate::compose::display::OutputMode;
pub use crate::compose::plan::{CommitReport, FramePlan, WindowContent, WindowPlan};
pub use crate::compose::stats::DisplayStats;
pub use crate::config::{HwcConfig, HwcOptions};
pub use crate::hw::device::HwDevices;
pub use crate::hw::memory::MemoryHardware;
pub use crate::layer::format::PixelFormat;
pub use crate::layer::model::{
    BlendMode, BufferHandle, BufferUsage, CompositionKind, Fence, Layer, LayerFlags, Transform,
};
