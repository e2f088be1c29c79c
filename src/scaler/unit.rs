use crate::foundation::core::DisplayKind;
use crate::foundation::error::{HwcError, HwcResult};
use crate::hw::device::{HwDevices, ScalerJob, ScalerOutput, WindowSourceBuffer};
use crate::layer::format::SCALER_OUTPUT_FORMAT;
use crate::layer::model::{BufferHandle, BufferUsage, Fence};
use std::time::Duration;

/// Who drives a scaler unit and how.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "display")]
pub enum BindingMode {
    /// Idle; any display may claim it.
    #[default]
    Unbound,
    /// Streaming straight into a window of `display`.
    Local(DisplayKind),
    /// Converting into destination buffers for `display`.
    M2m(DisplayKind),
}

impl BindingMode {
    /// Display holding the unit.
    pub fn owner(self) -> Option<DisplayKind> {
        match self {
            Self::Unbound => None,
            Self::Local(d) | Self::M2m(d) => Some(d),
        }
    }

    /// Check a mode change against the hand-off state machine.
    ///
    /// Allowed: unbound to either mode, local to memory-to-memory for the same display, either
    /// mode back to unbound, and staying put. A memory-to-memory unit never goes back to local
    /// without being released first.
    pub fn check_transition(self, to: Self) -> HwcResult<()> {
        let ok = match (self, to) {
            (a, b) if a == b => true,
            (Self::Unbound, _) | (_, Self::Unbound) => true,
            (Self::Local(a), Self::M2m(b)) => a == b,
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(HwcError::invariant(format!(
                "scaler binding {self:?} -> {to:?} not allowed"
            )))
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct RingSlot {
    buffer: BufferHandle,
    fence: Option<Fence>,
}

/// Result of processing one source frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScalerFrame {
    /// What the window should scan out.
    pub source: WindowSourceBuffer,
    /// Signalled when the output is complete and the source may be reused.
    pub fence: Option<Fence>,
    /// No hardware work was done; the previous output was reused.
    pub duplicate: bool,
}

/// Cumulative counters of one unit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct UnitStats {
    /// Hardware reprograms.
    pub configures: u64,
    /// Hardware runs, counting each pass.
    pub runs: u64,
    /// Frames skipped because the source did not change.
    pub duplicates: u64,
    /// Destination/intermediate buffers allocated.
    pub buffers_allocated: u64,
}

/// One physical scaler/converter engine and the resources bound to it.
#[derive(Debug)]
pub struct ScalerUnit {
    index: usize,
    mode: BindingMode,
    job: Option<ScalerJob>,
    pending_reconfig: bool,
    ring: Vec<RingSlot>,
    next_slot: usize,
    intermediate: Option<BufferHandle>,
    last_src: Option<BufferHandle>,
    last_frame: Option<ScalerFrame>,
    stats: UnitStats,
}

impl ScalerUnit {
    pub(crate) fn new(index: usize) -> Self {
        Self {
            index,
            mode: BindingMode::Unbound,
            job: None,
            pending_reconfig: false,
            ring: Vec::new(),
            next_slot: 0,
            intermediate: None,
            last_src: None,
            last_frame: None,
            stats: UnitStats::default(),
        }
    }

    /// Unit index in the board configuration.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Current binding.
    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    /// Last committed hardware program.
    pub fn job(&self) -> Option<&ScalerJob> {
        self.job.as_ref()
    }

    /// Cumulative counters.
    pub fn stats(&self) -> UnitStats {
        self.stats
    }

    pub(crate) fn ring_len(&self) -> usize {
        self.ring.len()
    }

    /// Move to `to`, releasing hardware state when the owner or path changes.
    pub(crate) fn bind(
        &mut self,
        devices: &mut HwDevices,
        to: BindingMode,
        timeout: Duration,
    ) -> HwcResult<()> {
        self.mode.check_transition(to)?;
        if self.mode != to {
            self.drain(devices, timeout);
            self.mode = to;
        }
        Ok(())
    }

    /// Make the unit ready to run `job`.
    ///
    /// Reprograms and reallocates only when `job` differs from the committed program. Returns
    /// `true` when the hardware was reconfigured. On failure the unit is left without a
    /// program so the next attempt starts clean.
    pub(crate) fn prepare(
        &mut self,
        devices: &mut HwDevices,
        job: ScalerJob,
        ring_len: usize,
        timeout: Duration,
    ) -> HwcResult<bool> {
        if self.mode == BindingMode::Unbound {
            return Err(HwcError::invariant(format!(
                "scaler {} prepared while unbound",
                self.index
            )));
        }
        if self.job.as_ref() == Some(&job) {
            return Ok(false);
        }

        self.drain(devices, timeout);
        devices.scaler.configure(self.index, &job)?;
        self.stats.configures += 1;
        self.job = Some(job);

        if let Err(e) = self.allocate_buffers(devices, &job, ring_len) {
            self.drain(devices, timeout);
            return Err(e);
        }
        self.pending_reconfig = true;
        Ok(true)
    }

    fn allocate_buffers(
        &mut self,
        devices: &mut HwDevices,
        job: &ScalerJob,
        ring_len: usize,
    ) -> HwcResult<()> {
        let mut usage = BufferUsage::HW_COMPOSER;
        if job.protected {
            usage |= BufferUsage::PROTECTED;
        }
        if let Some(mid) = job.intermediate {
            let buffer = devices.buffers.allocate(mid.size, mid.format, usage)?;
            self.stats.buffers_allocated += 1;
            self.intermediate = Some(buffer);
        }
        if matches!(self.mode, BindingMode::M2m(_)) {
            for _ in 0..ring_len {
                let buffer = devices
                    .buffers
                    .allocate(job.dst.size, SCALER_OUTPUT_FORMAT, usage)?;
                self.stats.buffers_allocated += 1;
                self.ring.push(RingSlot {
                    buffer,
                    fence: None,
                });
            }
        }
        Ok(())
    }

    /// Run the committed program on `src`.
    ///
    /// A source identical to the previous one, with no reconfiguration since, reuses the previous
    /// output and fence without touching the hardware.
    pub(crate) fn process(
        &mut self,
        devices: &mut HwDevices,
        src: BufferHandle,
        acquire: Option<Fence>,
        timeout: Duration,
    ) -> HwcResult<ScalerFrame> {
        let Some(job) = self.job else {
            return Err(HwcError::invariant(format!(
                "scaler {} run without a program",
                self.index
            )));
        };
        if !self.pending_reconfig
            && self.last_src == Some(src)
            && let Some(prev) = self.last_frame
        {
            self.stats.duplicates += 1;
            return Ok(ScalerFrame {
                duplicate: true,
                ..prev
            });
        }

        let (source, fence) = match self.mode {
            BindingMode::Local(display) => {
                let output = ScalerOutput::LocalPath(display);
                let fence = self.run_chain(devices, &job, src, acquire, output)?;
                (WindowSourceBuffer::LocalPath { unit: self.index }, fence)
            }
            BindingMode::M2m(_) => {
                if self.ring.is_empty() {
                    return Err(HwcError::invariant(format!(
                        "scaler {} has no destination ring",
                        self.index
                    )));
                }
                let slot = self.next_slot % self.ring.len();
                // The slot keeps its fence until the wait succeeds, so a later retry or drain
                // waits on it again.
                if let Some(busy) = self.ring[slot].fence {
                    if !devices.scaler.wait_fence(busy, timeout) {
                        return Err(HwcError::hardware(format!(
                            "scaler {}: destination slot {slot} still busy after {timeout:?}",
                            self.index
                        )));
                    }
                    self.ring[slot].fence = None;
                }
                let buffer = self.ring[slot].buffer;
                let output = ScalerOutput::Buffer(buffer);
                let fence = self.run_chain(devices, &job, src, acquire, output)?;
                self.ring[slot].fence = fence;
                self.next_slot = (slot + 1) % self.ring.len();
                (WindowSourceBuffer::Buffer(buffer), fence)
            }
            BindingMode::Unbound => {
                return Err(HwcError::invariant(format!(
                    "scaler {} run while unbound",
                    self.index
                )));
            }
        };

        let frame = ScalerFrame {
            source,
            fence,
            duplicate: false,
        };
        self.pending_reconfig = false;
        self.last_src = Some(src);
        self.last_frame = Some(frame);
        Ok(frame)
    }

    fn run_chain(
        &mut self,
        devices: &mut HwDevices,
        job: &ScalerJob,
        src: BufferHandle,
        acquire: Option<Fence>,
        output: ScalerOutput,
    ) -> HwcResult<Option<Fence>> {
        match (job.intermediate, self.intermediate) {
            (Some(_), Some(mid)) => {
                let to_mid = ScalerOutput::Buffer(mid);
                let first = devices.scaler.run(self.index, 0, src, acquire, to_mid)?;
                let second = devices.scaler.run(self.index, 1, mid, first, output)?;
                self.stats.runs += 2;
                Ok(second)
            }
            (Some(_), None) => Err(HwcError::invariant(format!(
                "scaler {} two-pass job without intermediate buffer",
                self.index
            ))),
            (None, _) => {
                let fence = devices.scaler.run(self.index, 0, src, acquire, output)?;
                self.stats.runs += 1;
                Ok(fence)
            }
        }
    }

    /// Stop the hardware, wait for outstanding output, and free every buffer. Keeps the binding.
    pub(crate) fn drain(&mut self, devices: &mut HwDevices, timeout: Duration) {
        if self.job.take().is_some()
            && let Err(e) = devices.scaler.stop(self.index)
        {
            tracing::warn!(unit = self.index, error = %e, "scaler stop failed");
        }
        for slot in self.ring.drain(..) {
            if let Some(f) = slot.fence
                && !devices.scaler.wait_fence(f, timeout)
            {
                tracing::warn!(unit = self.index, fence = f.0, "destination fence timed out");
            }
            devices.buffers.free(slot.buffer);
        }
        if let Some(mid) = self.intermediate.take() {
            devices.buffers.free(mid);
        }
        self.next_slot = 0;
        self.pending_reconfig = false;
        self.last_src = None;
        self.last_frame = None;
    }

    /// Drain and return to [`BindingMode::Unbound`].
    pub(crate) fn release(&mut self, devices: &mut HwDevices, timeout: Duration) {
        self.drain(devices, timeout);
        self.mode = BindingMode::Unbound;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/scaler/unit.rs"]
mod tests;
