use crate::foundation::core::{DisplayKind, Size};
use crate::foundation::error::{HwcError, HwcResult};
use crate::hw::device::{
    BufferAllocator, HwDevices, ScalerDevice, ScalerJob, ScalerOutput, WindowProgram,
    WindowProgrammer,
};
use crate::layer::format::PixelFormat;
use crate::layer::model::{BufferHandle, BufferUsage, Fence};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use std::time::Duration;

/// One call observed by [`MemoryHardware`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HwCall {
    /// `ScalerDevice::configure`.
    Configure {
        /// Unit index.
        unit: usize,
        /// Programmed job.
        job: ScalerJob,
    },
    /// `ScalerDevice::run`.
    Run {
        /// Unit index.
        unit: usize,
        /// Pass number, 0-based.
        pass: u8,
        /// Source buffer.
        src: BufferHandle,
        /// Output target.
        output: ScalerOutput,
    },
    /// `ScalerDevice::stop`.
    Stop {
        /// Unit index.
        unit: usize,
    },
    /// `ScalerDevice::destroy`.
    Destroy {
        /// Unit index.
        unit: usize,
    },
    /// `BufferAllocator::allocate` that succeeded.
    Allocate {
        /// New buffer.
        buffer: BufferHandle,
        /// Requested size.
        size: Size,
    },
    /// `BufferAllocator::free`.
    Free {
        /// Returned buffer.
        buffer: BufferHandle,
    },
    /// `WindowProgrammer::program_window`.
    Program {
        /// Display.
        display: DisplayKind,
        /// Window index.
        window: usize,
        /// Staged program.
        program: WindowProgram,
    },
    /// `WindowProgrammer::disable_window`.
    Disable {
        /// Display.
        display: DisplayKind,
        /// Window index.
        window: usize,
    },
    /// `WindowProgrammer::flush`.
    Flush {
        /// Display.
        display: DisplayKind,
    },
}

#[derive(Debug, Default)]
struct MemoryState {
    calls: Vec<HwCall>,
    live: BTreeSet<BufferHandle>,
    next_buffer: u64,
    next_fence: u64,
    buffer_capacity: Option<usize>,
    fail_configure: BTreeSet<usize>,
    fail_run: BTreeSet<usize>,
    stalled: BTreeSet<Fence>,
    program_errors: BTreeMap<(DisplayKind, usize), String>,
}

impl MemoryState {
    fn fence(&mut self) -> Fence {
        self.next_fence += 1;
        Fence(self.next_fence)
    }
}

/// In-memory hardware for tests, the simulator and debugging.
///
/// Clones share state, so a test can keep one handle for inspection while the composer owns
/// the boxed devices returned by [`MemoryHardware::devices`].
#[derive(Clone, Debug, Default)]
pub struct MemoryHardware {
    state: Rc<RefCell<MemoryState>>,
}

impl MemoryHardware {
    /// Create hardware with unlimited buffers and no injected failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Boxed device set sharing this hardware's state.
    pub fn devices(&self) -> HwDevices {
        HwDevices {
            scaler: Box::new(self.clone()),
            buffers: Box::new(self.clone()),
            windows: Box::new(self.clone()),
        }
    }

    /// Limit the number of live buffers; allocations beyond it fail.
    pub fn set_buffer_capacity(&self, capacity: Option<usize>) {
        self.state.borrow_mut().buffer_capacity = capacity;
    }

    /// Make `configure` on `unit` fail until cleared.
    pub fn fail_configure(&self, unit: usize, fail: bool) {
        let mut s = self.state.borrow_mut();
        if fail {
            s.fail_configure.insert(unit);
        } else {
            s.fail_configure.remove(&unit);
        }
    }

    /// Make `run` on `unit` fail until cleared.
    pub fn fail_run(&self, unit: usize, fail: bool) {
        let mut s = self.state.borrow_mut();
        if fail {
            s.fail_run.insert(unit);
        } else {
            s.fail_run.remove(&unit);
        }
    }

    /// Make waits on `fence` time out.
    pub fn stall_fence(&self, fence: Fence) {
        self.state.borrow_mut().stalled.insert(fence);
    }

    /// Signal a fence stalled by [`MemoryHardware::stall_fence`].
    pub fn signal_fence(&self, fence: Fence) {
        self.state.borrow_mut().stalled.remove(&fence);
    }

    /// Make programming `window` of `display` fail.
    pub fn fail_window(&self, display: DisplayKind, window: usize) {
        self.state
            .borrow_mut()
            .program_errors
            .insert((display, window), "EINVAL".to_string());
    }

    /// All calls so far, in order.
    pub fn calls(&self) -> Vec<HwCall> {
        self.state.borrow().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    /// Number of recorded calls matching `pred`.
    pub fn count(&self, pred: impl Fn(&HwCall) -> bool) -> usize {
        self.state.borrow().calls.iter().filter(|c| pred(c)).count()
    }

    /// Buffers allocated and not yet freed.
    pub fn live_buffers(&self) -> usize {
        self.state.borrow().live.len()
    }
}

impl ScalerDevice for MemoryHardware {
    fn configure(&mut self, unit: usize, job: &ScalerJob) -> HwcResult<()> {
        let mut s = self.state.borrow_mut();
        if s.fail_configure.contains(&unit) {
            return Err(HwcError::hardware(format!("unit {unit}: S_FMT rejected")));
        }
        s.calls.push(HwCall::Configure { unit, job: *job });
        Ok(())
    }

    fn run(
        &mut self,
        unit: usize,
        pass: u8,
        src: BufferHandle,
        _acquire: Option<Fence>,
        output: ScalerOutput,
    ) -> HwcResult<Option<Fence>> {
        let mut s = self.state.borrow_mut();
        if s.fail_run.contains(&unit) {
            return Err(HwcError::hardware(format!("unit {unit}: QBUF failed")));
        }
        s.calls.push(HwCall::Run {
            unit,
            pass,
            src,
            output,
        });
        Ok(Some(s.fence()))
    }

    fn stop(&mut self, unit: usize) -> HwcResult<()> {
        self.state.borrow_mut().calls.push(HwCall::Stop { unit });
        Ok(())
    }

    fn destroy(&mut self, unit: usize) {
        self.state.borrow_mut().calls.push(HwCall::Destroy { unit });
    }

    fn wait_fence(&mut self, fence: Fence, _timeout: Duration) -> bool {
        !self.state.borrow().stalled.contains(&fence)
    }
}

impl BufferAllocator for MemoryHardware {
    fn allocate(
        &mut self,
        size: Size,
        _format: PixelFormat,
        _usage: BufferUsage,
    ) -> HwcResult<BufferHandle> {
        let mut s = self.state.borrow_mut();
        if s.buffer_capacity.is_some_and(|cap| s.live.len() >= cap) {
            return Err(HwcError::out_of_memory(format!(
                "{}x{} buffer: pool exhausted",
                size.width, size.height
            )));
        }
        s.next_buffer += 1;
        let buffer = BufferHandle(0x1000_0000 + s.next_buffer);
        s.live.insert(buffer);
        s.calls.push(HwCall::Allocate { buffer, size });
        Ok(buffer)
    }

    fn free(&mut self, buffer: BufferHandle) {
        let mut s = self.state.borrow_mut();
        s.live.remove(&buffer);
        s.calls.push(HwCall::Free { buffer });
    }
}

impl WindowProgrammer for MemoryHardware {
    fn program_window(
        &mut self,
        display: DisplayKind,
        window: usize,
        program: &WindowProgram,
    ) -> HwcResult<()> {
        let mut s = self.state.borrow_mut();
        if let Some(e) = s.program_errors.get(&(display, window)) {
            return Err(HwcError::hardware(format!("window {window}: {e}")));
        }
        s.calls.push(HwCall::Program {
            display,
            window,
            program: *program,
        });
        Ok(())
    }

    fn disable_window(&mut self, display: DisplayKind, window: usize) -> HwcResult<()> {
        self.state
            .borrow_mut()
            .calls
            .push(HwCall::Disable { display, window });
        Ok(())
    }

    fn flush(&mut self, display: DisplayKind) -> HwcResult<Option<Fence>> {
        let mut s = self.state.borrow_mut();
        s.calls.push(HwCall::Flush { display });
        Ok(Some(s.fence()))
    }
}
