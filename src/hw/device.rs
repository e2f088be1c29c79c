use crate::foundation::core::{DisplayKind, PxRect, Size};
use crate::foundation::error::HwcResult;
use crate::layer::format::{PixelFormat, WindowFormat};
use crate::layer::model::{BlendMode, BufferHandle, BufferUsage, Fence, Transform};
use std::time::Duration;

/// Geometry and format of one side of a scaler job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ImageDesc {
    /// Full buffer size.
    pub size: Size,
    /// Region read or written.
    pub crop: PxRect,
    /// Pixel format.
    pub format: PixelFormat,
}

/// Complete hardware program of a scaler unit.
///
/// Two jobs that compare equal can share a hardware program; only buffer pointers change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ScalerJob {
    /// Source side.
    pub src: ImageDesc,
    /// Destination side.
    pub dst: ImageDesc,
    /// Buffer between chained passes.
    pub intermediate: Option<ImageDesc>,
    /// Flip/rotate applied by the first pass.
    pub transform: Transform,
    /// Run in secure mode.
    pub protected: bool,
}

/// Where a scaler run writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerOutput {
    /// Into a memory buffer.
    Buffer(BufferHandle),
    /// Streamed into the windows of a display.
    LocalPath(DisplayKind),
}

/// Scaler/converter device capability (the V4L2 wrapper in production).
pub trait ScalerDevice {
    /// Program `unit` for `job`.
    fn configure(&mut self, unit: usize, job: &ScalerJob) -> HwcResult<()>;
    /// Run one pass of the configured job. Returns the fence signalled when `output` is written.
    fn run(
        &mut self,
        unit: usize,
        pass: u8,
        src: BufferHandle,
        acquire: Option<Fence>,
        output: ScalerOutput,
    ) -> HwcResult<Option<Fence>>;
    /// Stop streaming on `unit`.
    fn stop(&mut self, unit: usize) -> HwcResult<()>;
    /// Release the device node of `unit`.
    fn destroy(&mut self, unit: usize);
    /// Block until `fence` signals or `timeout` elapses. Returns `false` on timeout.
    fn wait_fence(&mut self, fence: Fence, timeout: Duration) -> bool;
}

/// Graphics buffer allocation capability (gralloc/ION in production).
pub trait BufferAllocator {
    /// Allocate a buffer.
    fn allocate(
        &mut self,
        size: Size,
        format: PixelFormat,
        usage: BufferUsage,
    ) -> HwcResult<BufferHandle>;
    /// Return a buffer.
    fn free(&mut self, buffer: BufferHandle);
}

/// What a window scans out.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowSourceBuffer {
    /// A memory buffer.
    Buffer(BufferHandle),
    /// The local path of a scaler unit.
    LocalPath {
        /// Unit feeding the window.
        unit: usize,
    },
    /// Solid background color; no memory fetch.
    SolidColor,
}

/// Register-level description of one window for one frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct WindowProgram {
    /// Destination in display space.
    pub display_frame: PxRect,
    /// Region of the source read.
    pub source_crop: PxRect,
    /// Scan-out layout.
    pub format: WindowFormat,
    /// Pixel source.
    pub source: WindowSourceBuffer,
    /// Fence to wait on before scanning out.
    pub acquire_fence: Option<Fence>,
    /// Blend mode.
    pub blending: BlendMode,
    /// Layer-wide alpha.
    pub plane_alpha: u8,
}

/// Final register commit capability.
pub trait WindowProgrammer {
    /// Stage `program` into `window` of `display`.
    fn program_window(
        &mut self,
        display: DisplayKind,
        window: usize,
        program: &WindowProgram,
    ) -> HwcResult<()>;
    /// Disable `window` of `display` for the next frame.
    fn disable_window(&mut self, display: DisplayKind, window: usize) -> HwcResult<()>;
    /// Latch all staged windows. Returns the fence signalled when the previous frame retires.
    fn flush(&mut self, display: DisplayKind) -> HwcResult<Option<Fence>>;
}

/// Every hardware capability the composer drives.
pub struct HwDevices {
    /// Scaler units.
    pub scaler: Box<dyn ScalerDevice>,
    /// Buffer allocator.
    pub buffers: Box<dyn BufferAllocator>,
    /// Window registers.
    pub windows: Box<dyn WindowProgrammer>,
}

impl std::fmt::Debug for HwDevices {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HwDevices").finish_non_exhaustive()
    }
}
