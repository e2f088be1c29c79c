use crate::alloc::allocator::{AllocInput, allocate};
use crate::alloc::attempt::ScalerPath;
use crate::bind::{BindOptions, ScalerBinding, bind_scalers};
use crate::classify::{ClassifyContext, classify_all};
use crate::compose::display::{DisplayAllocatorState, OutputMode};
use crate::compose::plan::{CommitReport, FramePlan, WindowContent, WindowPlan};
use crate::compose::stats::DisplayStats;
use crate::config::{HwcConfig, HwcOptions, ScalerUnitConfig};
use crate::foundation::core::{DisplayKind, PxRect};
use crate::foundation::error::{HwcError, HwcResult};
use crate::hw::device::{HwDevices, WindowProgram, WindowSourceBuffer};
use crate::layer::format::{SCALER_OUTPUT_FORMAT, WindowFormat};
use crate::layer::model::{BlendMode, Fence, Layer};
use crate::scaler::pool::{PoolStats, ScalerPool, UnitSnapshot};
use crate::scaler::unit::BindingMode;
use std::time::Duration;

/// Per-frame composition driver for both displays.
///
/// Owns the scaler pool and the state of each display. Calls for one display are serialized by
/// the host; `prepare` and `commit` never fail, errors become GPU fallbacks.
#[derive(Debug)]
pub struct Composer {
    scalers: Vec<ScalerUnitConfig>,
    options: HwcOptions,
    devices: HwDevices,
    pool: ScalerPool,
    displays: [Option<DisplayAllocatorState>; 2],
}

impl Composer {
    /// Build a composer for `config` driving `devices`.
    ///
    /// The primary display starts connected, the external one waits for
    /// [`Composer::connect_external`].
    pub fn new(config: HwcConfig, devices: HwDevices) -> HwcResult<Self> {
        config.validate()?;
        let HwcConfig {
            primary,
            external,
            scalers,
            options,
        } = config;
        Ok(Self {
            pool: ScalerPool::new(scalers.clone()),
            scalers,
            options,
            devices,
            displays: [
                Some(DisplayAllocatorState::new(DisplayKind::Primary, primary, true)),
                external.map(|c| DisplayAllocatorState::new(DisplayKind::External, c, false)),
            ],
        })
    }

    /// Runtime switches in effect.
    pub fn options(&self) -> &HwcOptions {
        &self.options
    }

    /// State of `display`, `None` when the board has no such display.
    pub fn display(&self, display: DisplayKind) -> Option<&DisplayAllocatorState> {
        self.displays[display.index()].as_ref()
    }

    /// Cumulative counters of `display`.
    pub fn stats(&self, display: DisplayKind) -> Option<DisplayStats> {
        self.display(display).map(DisplayAllocatorState::stats)
    }

    /// Output mode of `display`.
    pub fn output_mode(&self, display: DisplayKind) -> Option<OutputMode> {
        self.display(display).map(DisplayAllocatorState::output_mode)
    }

    /// Scaler pool.
    pub fn pool(&self) -> &ScalerPool {
        &self.pool
    }

    fn bind_options(&self) -> BindOptions {
        BindOptions {
            ring_len: self.options.dst_ring_len,
            fence_timeout: Duration::from_millis(self.options.fence_timeout_ms),
        }
    }

    /// Decide the composition of `layers` for the next frame of display `kind`.
    ///
    /// Writes each layer's `composition` and returns the plan [`Composer::commit`] will execute.
    #[tracing::instrument(level = "debug", skip(self, layers), fields(layers = layers.len()))]
    pub fn prepare(
        &mut self,
        kind: DisplayKind,
        layers: &mut [Layer],
        geometry_changed: bool,
    ) -> FramePlan {
        let opts = self.bind_options();
        let Self {
            scalers,
            options,
            devices,
            pool,
            displays,
        } = self;
        let Some(state) = displays[kind.index()].as_mut().filter(|s| s.connected) else {
            tracing::warn!("prepare on a display that is not connected");
            let plan = FramePlan::detached(kind, layers);
            plan.apply_kinds(layers);
            return plan;
        };
        state.stats.frames += 1;

        if pool.take_preempted(kind) {
            tracing::debug!("scaler binding preempted, static scene dropped");
            state.stats.preemptions += 1;
            state.static_scene.invalidate();
            sync_output_mode(state, pool, scalers.len());
        }

        if options.force_gpu {
            pool.release_unused(devices, kind, &[], opts.fence_timeout);
            let plan = FramePlan::full_gpu(kind, &state.config, layers, 0, false);
            state.static_scene.invalidate();
            return finish_prepare(state, layers, plan);
        }

        if options.skip_static_layers
            && let Some(plan) = state.static_scene.try_replay(layers, geometry_changed)
        {
            tracing::debug!(folded = plan.folded().count(), "static scene replayed");
            state.stats.static_replays += 1;
            if plan.is_full_gpu() {
                state.stats.full_gpu_frames += 1;
            }
            state.last_plan = Some(plan.clone());
            return plan;
        }

        let plan = match plan_frame(state, pool, devices, scalers, layers, opts) {
            Ok(plan) => plan,
            Err(e) => {
                if matches!(e, HwcError::Invariant(_)) {
                    tracing::error!(error = %e, "allocation failed, composing on the GPU");
                } else {
                    tracing::warn!(error = %e, "allocation failed, composing on the GPU");
                }
                state.stats.degraded_frames += 1;
                FramePlan::full_gpu(kind, &state.config, layers, 0, true)
            }
        };

        let keep: Vec<usize> = plan.scaler_units().collect();
        pool.release_unused(devices, kind, &keep, opts.fence_timeout);
        sync_output_mode(state, pool, scalers.len());

        state.stats.passes += plan.attempts as u64;
        state.stats.demotions += plan.demoted as u64;
        if options.skip_static_layers {
            state.static_scene.remember(layers, &plan);
        }
        finish_prepare(state, layers, plan)
    }

    /// Run the scalers and program the windows of the plan `prepare` returned for display `kind`.
    ///
    /// Scaler-fed and direct layers get their release fence; unused windows are disabled.
    #[tracing::instrument(level = "debug", skip(self, layers), fields(layers = layers.len()))]
    pub fn commit(&mut self, kind: DisplayKind, layers: &mut [Layer]) -> CommitReport {
        let timeout = Duration::from_millis(self.options.fence_timeout_ms);
        let Self {
            devices,
            pool,
            displays,
            ..
        } = self;
        let Some(state) = displays[kind.index()].as_mut().filter(|s| s.connected) else {
            tracing::warn!("commit on a display that is not connected");
            return CommitReport::default();
        };
        let Some(plan) = state.last_plan.clone() else {
            tracing::warn!("commit without a prepared plan");
            return CommitReport::default();
        };
        let mut report = CommitReport {
            static_replay: plan.static_replay,
            ..CommitReport::default()
        };
        if plan.kinds.len() != layers.len() {
            tracing::error!(
                planned = plan.kinds.len(),
                "layer list changed between prepare and commit"
            );
            state.static_scene.invalidate();
            state.stats.commit_failures += 1;
            report.failures = 1;
            return report;
        }

        let mut used = vec![false; state.config.window_count];
        let mut direct = Vec::new();
        for w in &plan.windows {
            let program = match &w.content {
                WindowContent::Background { layer } => background_program(w, &layers[*layer]),
                WindowContent::Framebuffer => {
                    let Some(target) = layers.iter().find(|l| l.is_framebuffer_target()) else {
                        tracing::warn!(window = w.window, "no framebuffer target supplied");
                        report.failures += 1;
                        continue;
                    };
                    let cached = if plan.static_replay {
                        state.static_scene.fb_target()
                    } else {
                        None
                    };
                    let Some(handle) = cached.or(target.handle) else {
                        tracing::warn!(window = w.window, "framebuffer target has no buffer");
                        report.failures += 1;
                        continue;
                    };
                    if !plan.static_replay {
                        state.static_scene.note_fb_target(handle);
                    }
                    WindowProgram {
                        display_frame: w.frame,
                        source_crop: w.frame,
                        format: target.format.window_format().unwrap_or(WindowFormat::Abgr8888),
                        source: WindowSourceBuffer::Buffer(handle),
                        acquire_fence: if cached.is_some() {
                            None
                        } else {
                            target.acquire_fence
                        },
                        blending: BlendMode::Premultiplied,
                        plane_alpha: 255,
                    }
                }
                WindowContent::Layer { layer, scaler } => {
                    let built = match scaler {
                        None => direct_program(w, &layers[*layer]).map(|p| (p, None)),
                        Some(b) => {
                            scaled_program(pool, devices, kind, w, b, &layers[*layer], timeout)
                                .map(|(p, fence, dup)| {
                                    if dup {
                                        report.duplicates_skipped += 1;
                                    } else {
                                        report.scaler_runs += 1;
                                    }
                                    (p, Some(fence))
                                })
                                .inspect_err(|_| pool.release(devices, b.unit, timeout))
                        }
                    };
                    match built {
                        Ok((program, None)) => {
                            direct.push(*layer);
                            program
                        }
                        Ok((program, Some(release))) => {
                            layers[*layer].release_fence = release;
                            program
                        }
                        Err(e) => {
                            tracing::warn!(
                                window = w.window,
                                layer = *layer,
                                error = %e,
                                "window left unprogrammed"
                            );
                            report.failures += 1;
                            continue;
                        }
                    }
                }
            };
            match devices.windows.program_window(kind, w.window, &program) {
                Ok(()) => {
                    if let Some(slot) = used.get_mut(w.window) {
                        *slot = true;
                    }
                    report.programmed += 1;
                }
                Err(e) => {
                    tracing::warn!(window = w.window, error = %e, "window programming failed");
                    report.failures += 1;
                }
            }
        }

        for (window, _) in used.iter().enumerate().filter(|(_, u)| !**u) {
            match devices.windows.disable_window(kind, window) {
                Ok(()) => report.disabled += 1,
                Err(e) => tracing::warn!(window, error = %e, "window disable failed"),
            }
        }
        match devices.windows.flush(kind) {
            Ok(fence) => report.retire_fence = fence,
            Err(e) => {
                tracing::warn!(error = %e, "window flush failed");
                report.failures += 1;
            }
        }
        for i in direct {
            layers[i].release_fence = report.retire_fence;
        }
        if let Some(target) = layers.iter_mut().find(|l| l.is_framebuffer_target()) {
            target.release_fence = report.retire_fence;
        }

        if report.failures > 0 {
            state.static_scene.invalidate();
            state.stats.commit_failures += report.failures as u64;
        }
        state.stats.duplicate_frames += report.duplicates_skipped as u64;
        report
    }

    /// Mark the external display as plugged in.
    pub fn connect_external(&mut self) -> HwcResult<()> {
        let state = self.displays[DisplayKind::External.index()]
            .as_mut()
            .ok_or_else(|| HwcError::config("board has no external display"))?;
        state.connected = true;
        tracing::debug!("external display connected");
        Ok(())
    }

    /// Tear down the external display after it was unplugged.
    pub fn disconnect_external(&mut self) {
        self.teardown(DisplayKind::External);
        if let Some(state) = self.displays[DisplayKind::External.index()].as_mut() {
            state.connected = false;
            tracing::debug!("external display disconnected");
        }
    }

    /// Blank `display`: release every scaler it holds and disable its windows.
    pub fn teardown(&mut self, display: DisplayKind) {
        let timeout = Duration::from_millis(self.options.fence_timeout_ms);
        let Some(state) = self.displays[display.index()].as_mut() else {
            return;
        };
        self.pool.release_display(&mut self.devices, display, timeout);
        if state.connected {
            for window in 0..state.config.window_count {
                if let Err(e) = self.devices.windows.disable_window(display, window) {
                    tracing::warn!(window, error = %e, "window disable failed");
                }
            }
            if let Err(e) = self.devices.windows.flush(display) {
                tracing::warn!(error = %e, "window flush failed");
            }
        }
        state.reset();
    }

    /// Leave the hardware-local output mode of `display`. Returns `true` if a local binding
    /// existed.
    pub fn teardown_local_path(&mut self, display: DisplayKind) -> bool {
        let timeout = Duration::from_millis(self.options.fence_timeout_ms);
        let released = self.pool.release_local(&mut self.devices, display, timeout);
        if let Some(state) = self.displays[display.index()].as_mut() {
            state.output_mode = OutputMode::Composited;
            if released {
                state.static_scene.invalidate();
            }
        }
        released
    }

    /// Pretty JSON snapshot of both displays and the scaler pool.
    pub fn dump(&self) -> HwcResult<String> {
        let dump = Dump {
            displays: self
                .displays
                .iter()
                .flatten()
                .map(|s| DisplayDump {
                    display: s.kind,
                    connected: s.connected,
                    output_mode: s.output_mode,
                    static_scene: s.static_scene.is_primed(),
                    stats: s.stats,
                    last_plan: s.last_plan.as_ref(),
                })
                .collect(),
            pool: self.pool.stats(),
            units: self.pool.snapshot(),
        };
        Ok(serde_json::to_string_pretty(&dump).map_err(anyhow::Error::from)?)
    }
}

#[derive(serde::Serialize)]
struct Dump<'a> {
    displays: Vec<DisplayDump<'a>>,
    pool: PoolStats,
    units: Vec<UnitSnapshot>,
}

#[derive(serde::Serialize)]
struct DisplayDump<'a> {
    display: DisplayKind,
    connected: bool,
    output_mode: OutputMode,
    static_scene: bool,
    stats: DisplayStats,
    last_plan: Option<&'a FramePlan>,
}

/// A display stays in hardware-local mode for as long as one of its units holds a local binding.
fn sync_output_mode(state: &mut DisplayAllocatorState, pool: &ScalerPool, units: usize) {
    let local_held = (0..units).any(|u| pool.mode(u) == BindingMode::Local(state.kind));
    state.output_mode = if local_held {
        OutputMode::HardwareLocal
    } else {
        OutputMode::Composited
    };
}

fn finish_prepare(
    state: &mut DisplayAllocatorState,
    layers: &mut [Layer],
    plan: FramePlan,
) -> FramePlan {
    if plan.is_full_gpu() {
        state.stats.full_gpu_frames += 1;
    }
    plan.apply_kinds(layers);
    state.last_plan = Some(plan.clone());
    plan
}

/// Classify, allocate and bind. A layer whose scaler cannot be set up is pinned to the GPU and
/// the allocation is run again.
fn plan_frame(
    state: &mut DisplayAllocatorState,
    pool: &mut ScalerPool,
    devices: &mut HwDevices,
    scalers: &[ScalerUnitConfig],
    layers: &[Layer],
    opts: BindOptions,
) -> HwcResult<FramePlan> {
    let display = state.kind;
    let eligibility = classify_all(layers, &ClassifyContext::new(&state.config, scalers));
    let bounds = state.config.bounds();
    let mut pinned: Vec<usize> = Vec::new();
    let mut earlier_attempts = 0;

    loop {
        let budget = pool.budget(display);
        let allocation = allocate(
            layers,
            &eligibility,
            &AllocInput {
                display: &state.config,
                scalers,
                budget: &budget,
                pinned: &pinned,
            },
        )?;
        match bind_scalers(pool, devices, display, layers, &allocation, bounds, opts) {
            Ok(report) => {
                state.stats.scaler_reconfigurations += report.reconfigured as u64;
                return Ok(FramePlan::from_allocation(
                    display,
                    &allocation,
                    &report.bindings,
                    layers,
                    earlier_attempts,
                ));
            }
            Err(failure) => {
                if !failure.error.is_recoverable_by_demotion() || pinned.contains(&failure.layer)
                {
                    return Err(failure.error);
                }
                tracing::debug!(
                    layer = failure.layer,
                    unit = failure.unit,
                    error = %failure.error,
                    "scaler setup failed, layer pinned to GPU"
                );
                earlier_attempts += allocation.attempts;
                pinned.push(failure.layer);
            }
        }
    }
}

fn background_program(w: &WindowPlan, layer: &Layer) -> WindowProgram {
    WindowProgram {
        display_frame: w.frame,
        source_crop: PxRect::from_size(w.frame.size()),
        format: WindowFormat::Xrgb8888,
        source: WindowSourceBuffer::SolidColor,
        acquire_fence: None,
        blending: BlendMode::None,
        plane_alpha: layer.plane_alpha,
    }
}

/// Window fetching the layer's buffer as is. Direct layers are unscaled, so trimming the
/// off-screen part of the frame trims the crop by the same amount.
fn direct_program(w: &WindowPlan, layer: &Layer) -> HwcResult<WindowProgram> {
    let handle = layer
        .handle
        .ok_or_else(|| HwcError::invariant("direct layer without a buffer"))?;
    let format = layer
        .format
        .window_format()
        .ok_or_else(|| HwcError::invariant(format!("{:?} has no window format", layer.format)))?;
    let crop = layer.source_px()?;
    let frame = layer.display_frame;
    Ok(WindowProgram {
        display_frame: w.frame,
        source_crop: PxRect {
            left: crop.left + (w.frame.left - frame.left),
            top: crop.top + (w.frame.top - frame.top),
            right: crop.right - (frame.right - w.frame.right),
            bottom: crop.bottom - (frame.bottom - w.frame.bottom),
        },
        format,
        source: WindowSourceBuffer::Buffer(handle),
        acquire_fence: layer.acquire_fence,
        blending: layer.blending,
        plane_alpha: layer.plane_alpha,
    })
}

/// Run the bound scaler on the layer's buffer and point the window at its output.
///
/// Returns the program, the fence releasing the layer's buffer, and whether the run was skipped
/// as a duplicate.
fn scaled_program(
    pool: &mut ScalerPool,
    devices: &mut HwDevices,
    display: DisplayKind,
    w: &WindowPlan,
    binding: &ScalerBinding,
    layer: &Layer,
    timeout: Duration,
) -> HwcResult<(WindowProgram, Option<Fence>, bool)> {
    let handle = layer
        .handle
        .ok_or_else(|| HwcError::invariant("scaled layer without a buffer"))?;
    let unit = pool
        .unit_mut(binding.unit)
        .filter(|u| u.mode().owner() == Some(display))
        .ok_or_else(|| {
            HwcError::resource(format!("scaler {} no longer bound to {display:?}", binding.unit))
        })?;
    let out = unit.process(devices, handle, layer.acquire_fence, timeout)?;

    let frame = layer.display_frame;
    let source_crop = match binding.path {
        ScalerPath::Local => w.frame,
        ScalerPath::M2m { .. } => PxRect {
            left: w.frame.left - frame.left,
            top: w.frame.top - frame.top,
            right: w.frame.right - frame.left,
            bottom: w.frame.bottom - frame.top,
        },
    };
    let format = SCALER_OUTPUT_FORMAT
        .window_format()
        .unwrap_or(WindowFormat::Xrgb8888);
    let program = WindowProgram {
        display_frame: w.frame,
        source_crop,
        format,
        source: out.source,
        acquire_fence: out.fence,
        blending: layer.blending,
        plane_alpha: layer.plane_alpha,
    };
    Ok((program, out.fence, out.duplicate))
}

#[cfg(test)]
#[path = "../../tests/unit/compose/composer.rs"]
mod tests;
