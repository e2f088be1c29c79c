use crate::alloc::allocator::{AllocOutcome, Allocation, FbSpan};
use crate::alloc::cost::framebuffer_cost;
use crate::bind::ScalerBinding;
use crate::config::{DisplayConfig, FbCostPolicy};
use crate::foundation::core::{DisplayKind, PxRect};
use crate::foundation::geometry::{bounding_rect, visible_rect};
use crate::layer::model::{CompositionKind, Fence, Layer};

/// What one hardware window shows.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum WindowContent {
    /// Solid background color.
    Background {
        /// Layer index.
        layer: usize,
    },
    /// A layer scanned out directly or through a scaler.
    Layer {
        /// Layer index.
        layer: usize,
        /// Scaler feeding the window, if any.
        scaler: Option<ScalerBinding>,
    },
    /// The GPU-composited framebuffer target.
    Framebuffer,
}

/// One programmed window.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct WindowPlan {
    /// Window index.
    pub window: usize,
    /// DMA channel of the window.
    pub channel: usize,
    /// Bandwidth charged.
    pub cost: u64,
    /// Destination in display space, clipped to the display.
    pub frame: PxRect,
    /// Pixel source.
    pub content: WindowContent,
}

/// Frame configuration decided by `prepare` and executed by `commit`.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct FramePlan {
    /// Target display.
    pub display: DisplayKind,
    /// How the allocator finished.
    pub outcome: AllocOutcome,
    /// Packing passes run, summed over binder retries.
    pub attempts: usize,
    /// Programmed windows in ascending window order.
    pub windows: Vec<WindowPlan>,
    /// Composition of every layer.
    pub kinds: Vec<CompositionKind>,
    /// Layers folded into the framebuffer.
    pub fb_span: Option<FbSpan>,
    /// Overlay candidates that ended up on the GPU.
    pub demoted: usize,
    /// The previous plan was reused unchanged.
    ///
    /// Folded layers still read [`CompositionKind::Gpu`] so the plan is identical to the one it
    /// replays. Commit scans out the framebuffer target remembered with that plan and ignores the
    /// one handed in this cycle, so the host need not redraw it.
    pub static_replay: bool,
    /// An internal error forced the frame to full GPU composition.
    pub degraded: bool,
}

impl FramePlan {
    pub(crate) fn from_allocation(
        display: DisplayKind,
        allocation: &Allocation,
        bindings: &[ScalerBinding],
        layers: &[Layer],
        extra_attempts: usize,
    ) -> Self {
        let mut windows: Vec<WindowPlan> = allocation
            .placements
            .iter()
            .map(|p| {
                let content = if layers[p.layer].is_background() {
                    WindowContent::Background { layer: p.layer }
                } else {
                    WindowContent::Layer {
                        layer: p.layer,
                        scaler: bindings.iter().find(|b| b.layer == p.layer).copied(),
                    }
                };
                WindowPlan {
                    window: p.window,
                    channel: p.channel,
                    cost: p.cost,
                    frame: p.visible,
                    content,
                }
            })
            .collect();
        if let Some(fb) = allocation.framebuffer {
            windows.push(WindowPlan {
                window: fb.window,
                channel: fb.channel,
                cost: fb.cost,
                frame: fb.frame,
                content: WindowContent::Framebuffer,
            });
        }
        windows.sort_by_key(|w| w.window);

        Self {
            display,
            outcome: allocation.outcome,
            attempts: allocation.attempts + extra_attempts,
            windows,
            kinds: allocation.kinds.clone(),
            fb_span: allocation.fb_span,
            demoted: allocation.demoted,
            static_replay: false,
            degraded: false,
        }
    }

    /// Every layer on the GPU, shown through window 0.
    pub(crate) fn full_gpu(
        display: DisplayKind,
        config: &DisplayConfig,
        layers: &[Layer],
        demoted: usize,
        degraded: bool,
    ) -> Self {
        let bounds = config.bounds();
        let kinds: Vec<CompositionKind> = layers
            .iter()
            .map(|l| {
                if l.is_framebuffer_target() {
                    CompositionKind::FramebufferTarget
                } else {
                    CompositionKind::Gpu
                }
            })
            .collect();
        let folded: Vec<usize> = layers
            .iter()
            .enumerate()
            .filter(|(_, l)| !l.is_framebuffer_target())
            .map(|(i, _)| i)
            .collect();
        let fb_span = match (folded.first(), folded.last()) {
            (Some(&first), Some(&last)) => Some(FbSpan { first, last }),
            _ => None,
        };

        let mut windows = Vec::new();
        if let (Some(_), Some(&channel)) = (fb_span, config.window_channels.first()) {
            let region = bounding_rect(
                folded
                    .iter()
                    .filter_map(|&i| visible_rect(layers[i].display_frame, bounds)),
            );
            windows.push(WindowPlan {
                window: 0,
                channel,
                cost: framebuffer_cost(config.fb_cost, bounds, region),
                frame: match config.fb_cost {
                    FbCostPolicy::FullScreen => bounds,
                    FbCostPolicy::Region => region.unwrap_or_default(),
                },
                content: WindowContent::Framebuffer,
            });
        }

        Self {
            display,
            outcome: AllocOutcome::Exhausted,
            attempts: 0,
            windows,
            kinds,
            fb_span,
            demoted,
            static_replay: false,
            degraded,
        }
    }

    /// Plan for a display that is absent or unplugged: no windows at all.
    pub(crate) fn detached(display: DisplayKind, layers: &[Layer]) -> Self {
        Self {
            display,
            outcome: AllocOutcome::Exhausted,
            attempts: 0,
            windows: Vec::new(),
            kinds: layers
                .iter()
                .map(|l| {
                    if l.is_framebuffer_target() {
                        CompositionKind::FramebufferTarget
                    } else {
                        CompositionKind::Gpu
                    }
                })
                .collect(),
            fb_span: None,
            demoted: 0,
            static_replay: false,
            degraded: false,
        }
    }

    /// Number of windows showing a layer (background excluded).
    pub fn overlay_count(&self) -> usize {
        self.windows
            .iter()
            .filter(|w| matches!(w.content, WindowContent::Layer { .. }))
            .count()
    }

    /// Return `true` when no layer is on a window.
    pub fn is_full_gpu(&self) -> bool {
        self.windows
            .iter()
            .all(|w| w.content == WindowContent::Framebuffer)
    }

    /// The framebuffer window, if any.
    pub fn framebuffer_window(&self) -> Option<&WindowPlan> {
        self.windows
            .iter()
            .find(|w| w.content == WindowContent::Framebuffer)
    }

    /// Scaler binding feeding `layer`.
    pub fn binding(&self, layer: usize) -> Option<&ScalerBinding> {
        self.windows.iter().find_map(|w| match &w.content {
            WindowContent::Layer {
                layer: l,
                scaler: Some(b),
            } if *l == layer => Some(b),
            _ => None,
        })
    }

    /// Units bound by this plan.
    pub fn scaler_units(&self) -> impl Iterator<Item = usize> + '_ {
        self.windows.iter().filter_map(|w| match &w.content {
            WindowContent::Layer {
                scaler: Some(b), ..
            } => Some(b.unit),
            _ => None,
        })
    }

    /// Layers the framebuffer holds.
    pub fn folded(&self) -> impl Iterator<Item = usize> + '_ {
        self.kinds
            .iter()
            .enumerate()
            .filter(|(_, k)| **k == CompositionKind::Gpu)
            .map(|(i, _)| i)
    }

    pub(crate) fn apply_kinds(&self, layers: &mut [Layer]) {
        for (layer, kind) in layers.iter_mut().zip(&self.kinds) {
            layer.composition = *kind;
        }
    }
}

/// What `commit` did for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct CommitReport {
    /// Windows programmed.
    pub programmed: usize,
    /// Windows disabled.
    pub disabled: usize,
    /// Scaler runs issued.
    pub scaler_runs: usize,
    /// Scaler runs skipped because the source was unchanged.
    pub duplicates_skipped: usize,
    /// Windows left unprogrammed after a hardware failure.
    pub failures: usize,
    /// The committed plan was a static replay.
    pub static_replay: bool,
    /// Fence signalled when this frame's buffers may be reused.
    pub retire_fence: Option<Fence>,
}

#[cfg(test)]
#[path = "../../tests/unit/compose/plan.rs"]
mod tests;
