use crate::alloc::attempt::{
    AllocationAttempt, AttemptContext, FbReservation, PlaceError, Placement, Rejection,
};
use crate::alloc::cost::framebuffer_cost;
use crate::classify::Eligibility;
use crate::config::{DisplayConfig, FbCostPolicy, ScalerUnitConfig};
use crate::foundation::core::PxRect;
use crate::foundation::error::{HwcError, HwcResult};
use crate::foundation::geometry::{bounding_rect, visible_rect};
use crate::layer::model::{CompositionKind, Layer};
use crate::scaler::pool::ScalerBudget;

/// Terminal state of the attempt loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocOutcome {
    /// Every layer outside the framebuffer span has a window.
    Converged,
    /// Nothing could stay on a window; the frame is fully GPU-composited.
    Exhausted,
}

/// Inclusive Z range of layers composited by the GPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FbSpan {
    /// Lowest layer index.
    pub first: usize,
    /// Highest layer index.
    pub last: usize,
}

impl FbSpan {
    /// Return `true` when `index` is inside the span.
    pub fn contains(self, index: usize) -> bool {
        (self.first..=self.last).contains(&index)
    }

    fn grow(span: Option<Self>, index: usize) -> Self {
        match span {
            Some(s) => Self {
                first: s.first.min(index),
                last: s.last.max(index),
            },
            None => Self {
                first: index,
                last: index,
            },
        }
    }
}

/// Per-frame inputs besides the layers.
#[derive(Clone, Copy, Debug)]
pub struct AllocInput<'a> {
    /// Window/channel layout.
    pub display: &'a DisplayConfig,
    /// Scaler unit descriptions.
    pub scalers: &'a [ScalerUnitConfig],
    /// Units the display may reserve.
    pub budget: &'a ScalerBudget,
    /// Layers forced to GPU composition, e.g. after a scaler failure.
    pub pinned: &'a [usize],
}

/// Result of one allocation.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Allocation {
    /// Terminal state.
    pub outcome: AllocOutcome,
    /// Packing passes run.
    pub attempts: usize,
    /// Layers on windows, in window order.
    pub placements: Vec<Placement>,
    /// Framebuffer window, when any layer is GPU-composited.
    pub framebuffer: Option<FbReservation>,
    /// Layers folded into the framebuffer.
    pub fb_span: Option<FbSpan>,
    /// Resolved composition of every layer.
    pub kinds: Vec<CompositionKind>,
    /// Overlay candidates that ended up on the GPU.
    pub demoted: usize,
    /// Bandwidth charged per DMA channel.
    pub channel_cost: Vec<u64>,
}

impl Allocation {
    /// Placement of `layer`, if it got a window.
    pub fn placement(&self, layer: usize) -> Option<&Placement> {
        self.placements.iter().find(|p| p.layer == layer)
    }

    /// Layers the framebuffer holds.
    pub fn folded(&self) -> impl Iterator<Item = usize> + '_ {
        self.kinds
            .iter()
            .enumerate()
            .filter(|(_, k)| **k == CompositionKind::Gpu)
            .map(|(i, _)| i)
    }
}

enum Pass {
    Fit(Vec<Placement>, Option<FbReservation>, Vec<u64>),
    Failed(usize, Rejection),
}

fn fb_region(layers: &[Layer], span: FbSpan, bounds: PxRect) -> Option<PxRect> {
    bounding_rect(
        layers[span.first..=span.last]
            .iter()
            .filter(|l| !l.is_framebuffer_target())
            .filter_map(|l| visible_rect(l.display_frame, bounds)),
    )
}

fn reserve_framebuffer(
    attempt: &mut AllocationAttempt<'_>,
    layers: &[Layer],
    span: FbSpan,
    window: usize,
    ctx: &AttemptContext<'_>,
) -> HwcResult<()> {
    let region = fb_region(layers, span, ctx.bounds);
    let cost = framebuffer_cost(ctx.display.fb_cost, ctx.bounds, region);
    let frame = match ctx.display.fb_cost {
        FbCostPolicy::FullScreen => ctx.bounds,
        FbCostPolicy::Region => region.unwrap_or_default(),
    };
    attempt.reserve_framebuffer(window, cost, frame)
}

fn run_pass(
    layers: &[Layer],
    eligibility: &[Eligibility],
    candidate: &[bool],
    span: Option<FbSpan>,
    ctx: &AttemptContext<'_>,
) -> HwcResult<Pass> {
    let mut attempt = AllocationAttempt::new(ctx);

    if let Some(span) = span {
        let below = candidate[..span.first].iter().filter(|c| **c).count();
        let window = below.min(ctx.display.window_count.saturating_sub(1));
        reserve_framebuffer(&mut attempt, layers, span, window, ctx)?;
    }

    for (i, layer) in layers.iter().enumerate() {
        if !candidate[i] || span.is_some_and(|s| s.contains(i)) {
            continue;
        }
        let below = span.is_some_and(|s| i < s.first);
        match attempt.try_place(i, layer, eligibility[i], below) {
            Ok(()) => {}
            Err(PlaceError::Rejected(r)) => return Ok(Pass::Failed(i, r)),
            Err(PlaceError::Fatal(e)) => return Err(e),
        }
    }

    let (placements, fb, cost) = attempt.finish();
    Ok(Pass::Fit(placements, fb, cost))
}

/// Pack the layers of one display into its windows.
///
/// Layers that cannot be placed are folded into a contiguous Z span composited by the GPU and
/// shown through one framebuffer window. Each failed pass grows the span by at least one layer,
/// so at most one pass per overlay candidate runs.
#[tracing::instrument(level = "trace", skip_all, fields(layers = layers.len()))]
pub fn allocate(
    layers: &[Layer],
    eligibility: &[Eligibility],
    input: &AllocInput<'_>,
) -> HwcResult<Allocation> {
    if eligibility.len() != layers.len() {
        return Err(HwcError::invariant(format!(
            "{} classifications for {} layers",
            eligibility.len(),
            layers.len()
        )));
    }
    let ctx = AttemptContext {
        display: input.display,
        scalers: input.scalers,
        budget: input.budget,
        bounds: input.display.bounds(),
    };

    let candidate: Vec<bool> = eligibility
        .iter()
        .enumerate()
        .map(|(i, e)| e.is_candidate() && !input.pinned.contains(&i))
        .collect();
    let total = candidate.iter().filter(|c| **c).count();

    let mut span = layers
        .iter()
        .enumerate()
        .filter(|(i, l)| !candidate[*i] && !l.is_framebuffer_target())
        .fold(None, |s, (i, _)| Some(FbSpan::grow(s, i)));

    let mut attempts = 0;
    if input.display.window_count == 0 {
        return Ok(full_gpu(layers, eligibility, span, attempts));
    }
    if span.is_none() && total == 0 {
        return Ok(Allocation {
            outcome: AllocOutcome::Converged,
            attempts,
            placements: Vec::new(),
            framebuffer: None,
            fb_span: None,
            kinds: resolve_kinds(layers, &[]),
            demoted: 0,
            channel_cost: vec![0; input.display.channels.len()],
        });
    }

    loop {
        if let Some(s) = span
            && (s.first..=s.last).filter(|&i| candidate[i]).count() == total
        {
            let mut attempt = AllocationAttempt::new(&ctx);
            reserve_framebuffer(&mut attempt, layers, s, 0, &ctx)?;
            let (_, framebuffer, channel_cost) = attempt.finish();
            return Ok(Allocation {
                framebuffer,
                channel_cost,
                ..full_gpu(layers, eligibility, span, attempts)
            });
        }

        attempts += 1;
        if attempts > total.max(1) {
            return Err(HwcError::invariant(format!(
                "allocator did not settle after {attempts} passes"
            )));
        }

        match run_pass(layers, eligibility, &candidate, span, &ctx)? {
            Pass::Fit(placements, framebuffer, channel_cost) => {
                let kinds = resolve_kinds(layers, &placements);
                return Ok(Allocation {
                    outcome: AllocOutcome::Converged,
                    attempts,
                    placements,
                    framebuffer,
                    fb_span: span,
                    demoted: count_demoted(eligibility, &kinds),
                    kinds,
                    channel_cost,
                });
            }
            Pass::Failed(layer, reason) => {
                tracing::debug!(layer, ?reason, attempt = attempts, "layer demoted to GPU");
                span = Some(FbSpan::grow(span, layer));
            }
        }
    }
}

fn resolve_kinds(layers: &[Layer], placements: &[Placement]) -> Vec<CompositionKind> {
    let mut kinds: Vec<CompositionKind> = layers
        .iter()
        .map(|l| {
            if l.is_framebuffer_target() {
                CompositionKind::FramebufferTarget
            } else {
                CompositionKind::Gpu
            }
        })
        .collect();
    for p in placements {
        kinds[p.layer] = if layers[p.layer].is_background() {
            CompositionKind::Background
        } else {
            CompositionKind::Overlay
        };
    }
    kinds
}

fn count_demoted(eligibility: &[Eligibility], kinds: &[CompositionKind]) -> usize {
    eligibility
        .iter()
        .zip(kinds)
        .filter(|(e, k)| e.is_candidate() && **k == CompositionKind::Gpu)
        .count()
}

fn full_gpu(
    layers: &[Layer],
    eligibility: &[Eligibility],
    span: Option<FbSpan>,
    attempts: usize,
) -> Allocation {
    let kinds = resolve_kinds(layers, &[]);
    Allocation {
        outcome: AllocOutcome::Exhausted,
        attempts,
        placements: Vec::new(),
        framebuffer: None,
        fb_span: span,
        demoted: count_demoted(eligibility, &kinds),
        kinds,
        channel_cost: Vec::new(),
    }
}

#[cfg(test)]
#[path = "../../tests/unit/alloc/allocator.rs"]
mod tests;
