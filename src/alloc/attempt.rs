use crate::alloc::cost::layer_cost;
use crate::classify::{Eligibility, scale_request};
use crate::config::{DisplayConfig, ScalerUnitConfig};
use crate::foundation::core::PxRect;
use crate::foundation::error::{HwcError, HwcResult};
use crate::foundation::geometry::{overlap_depth_with, visible_rect};
use crate::layer::model::Layer;
use crate::scaler::caps::PassPlan;
use crate::scaler::pool::ScalerBudget;
use smallvec::SmallVec;

/// Why a layer did not fit in the current attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// Every window at or above the layer's Z position is taken.
    NoWindow,
    /// The window's DMA channel would exceed its budget.
    OverBudget,
    /// Too many rectangles on the channel would cover one pixel.
    Overlap,
    /// No scaler unit left that can convert the layer.
    NoScaler,
}

/// How a placed layer reaches its window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case", tag = "path")]
pub enum ScalerPath {
    /// Streamed through the unit's in-line path.
    Local,
    /// Converted into a destination buffer first.
    M2m {
        /// Pass chain.
        plan: PassPlan,
    },
}

/// Scaler unit set aside for a placed layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ScalerReservation {
    /// Unit index.
    pub unit: usize,
    /// Path through the unit.
    pub path: ScalerPath,
}

/// A layer assigned to a window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct Placement {
    /// Layer index.
    pub layer: usize,
    /// Window index.
    pub window: usize,
    /// DMA channel of the window.
    pub channel: usize,
    /// Bandwidth charged.
    pub cost: u64,
    /// On-screen part of the layer.
    pub visible: PxRect,
    /// Scaler unit feeding the window.
    pub scaler: Option<ScalerReservation>,
}

/// Window holding the GPU-composited framebuffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FbReservation {
    /// Window index.
    pub window: usize,
    /// DMA channel of the window.
    pub channel: usize,
    /// Bandwidth charged.
    pub cost: u64,
    /// Part of the display the window shows.
    pub frame: PxRect,
}

pub(crate) enum PlaceError {
    Rejected(Rejection),
    Fatal(HwcError),
}

impl From<HwcError> for PlaceError {
    fn from(e: HwcError) -> Self {
        Self::Fatal(e)
    }
}

impl From<Rejection> for PlaceError {
    fn from(r: Rejection) -> Self {
        Self::Rejected(r)
    }
}

/// Inputs shared by every attempt of one allocation.
pub(crate) struct AttemptContext<'a> {
    pub(crate) display: &'a DisplayConfig,
    pub(crate) scalers: &'a [ScalerUnitConfig],
    pub(crate) budget: &'a ScalerBudget,
    pub(crate) bounds: PxRect,
}

/// Working state of one packing pass.
pub(crate) struct AllocationAttempt<'a> {
    ctx: &'a AttemptContext<'a>,
    channel_cost: SmallVec<[u64; 4]>,
    channel_rects: SmallVec<[SmallVec<[PxRect; 8]>; 4]>,
    cursor: usize,
    framebuffer: Option<FbReservation>,
    reserved_units: SmallVec<[usize; 4]>,
    placed_layers: usize,
    placements: Vec<Placement>,
}

impl<'a> AllocationAttempt<'a> {
    pub(crate) fn new(ctx: &'a AttemptContext<'a>) -> Self {
        let channels = ctx.display.channels.len();
        Self {
            ctx,
            channel_cost: SmallVec::from_elem(0, channels),
            channel_rects: (0..channels).map(|_| SmallVec::new()).collect(),
            cursor: 0,
            framebuffer: None,
            reserved_units: SmallVec::new(),
            placed_layers: 0,
            placements: Vec::new(),
        }
    }

    /// Reserve `window` for the framebuffer. Never rejected; only a bad window index fails.
    pub(crate) fn reserve_framebuffer(
        &mut self,
        window: usize,
        cost: u64,
        frame: PxRect,
    ) -> HwcResult<()> {
        let channel = self.ctx.display.channel_of(window)?;
        let slot = self.channel_cost.get_mut(channel).ok_or_else(|| {
            HwcError::invariant(format!("framebuffer window {window} on missing channel"))
        })?;
        *slot = slot.saturating_add(cost);
        if !frame.is_empty() {
            self.channel_rects[channel].push(frame);
        }
        self.framebuffer = Some(FbReservation {
            window,
            channel,
            cost,
            frame,
        });
        Ok(())
    }

    fn next_window(&self, below_framebuffer: bool) -> Result<usize, Rejection> {
        let mut window = self.cursor;
        if let Some(fb) = self.framebuffer {
            if below_framebuffer {
                if window >= fb.window {
                    return Err(Rejection::NoWindow);
                }
            } else {
                window = window.max(fb.window + 1);
            }
        }
        if window >= self.ctx.display.window_count {
            return Err(Rejection::NoWindow);
        }
        Ok(window)
    }

    fn reserve_scaler(&self, layer: &Layer) -> Result<ScalerReservation, PlaceError> {
        let req = scale_request(layer)?;
        let free = |unit: &usize| !self.reserved_units.contains(unit);

        if self.placed_layers == 0
            && let Some(local) = self.ctx.budget.local.filter(|l| free(&l.unit))
            && self.ctx.bounds.contains_rect(layer.display_frame)
            && let Some(unit_cfg) = self.ctx.scalers.get(local.unit)
            && local.caps.admits(&unit_cfg.caps, &req)
        {
            return Ok(ScalerReservation {
                unit: local.unit,
                path: ScalerPath::Local,
            });
        }

        self.ctx
            .budget
            .m2m
            .iter()
            .filter(|u| free(u))
            .find_map(|&unit| {
                let plan = self.ctx.scalers.get(unit)?.caps.plan(&req)?;
                Some(ScalerReservation {
                    unit,
                    path: ScalerPath::M2m { plan },
                })
            })
            .ok_or(PlaceError::Rejected(Rejection::NoScaler))
    }

    /// Try to put layer `index` on the next window. Nothing is recorded on rejection.
    pub(crate) fn try_place(
        &mut self,
        index: usize,
        layer: &Layer,
        eligibility: Eligibility,
        below_framebuffer: bool,
    ) -> Result<(), PlaceError> {
        let window = self.next_window(below_framebuffer)?;
        let channel = self.ctx.display.channel_of(window)?;
        let limits = *self.ctx.display.channels.get(channel).ok_or_else(|| {
            HwcError::invariant(format!("window {window} mapped to missing channel {channel}"))
        })?;

        let cost = layer_cost(layer, eligibility, self.ctx.bounds);
        let visible = visible_rect(layer.display_frame, self.ctx.bounds).unwrap_or_default();
        let background = layer.is_background();
        if !background {
            if self.channel_cost[channel].saturating_add(cost) > limits.max_cost {
                return Err(Rejection::OverBudget.into());
            }
            if overlap_depth_with(&self.channel_rects[channel], visible) > limits.overlap_limit() {
                return Err(Rejection::Overlap.into());
            }
        }
        let scaler = if eligibility.needs_scaler() {
            Some(self.reserve_scaler(layer)?)
        } else {
            None
        };

        self.cursor = window + 1;
        self.channel_cost[channel] += cost;
        if !background {
            self.channel_rects[channel].push(visible);
            self.placed_layers += 1;
        }
        if let Some(s) = scaler {
            self.reserved_units.push(s.unit);
        }
        self.placements.push(Placement {
            layer: index,
            window,
            channel,
            cost,
            visible,
            scaler,
        });
        Ok(())
    }

    pub(crate) fn finish(self) -> (Vec<Placement>, Option<FbReservation>, Vec<u64>) {
        (
            self.placements,
            self.framebuffer,
            self.channel_cost.into_vec(),
        )
    }
}
