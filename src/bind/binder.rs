use crate::alloc::allocator::Allocation;
use crate::alloc::attempt::{ScalerPath, ScalerReservation};
use crate::foundation::core::{DisplayKind, PxRect, Size};
use crate::foundation::error::{HwcError, HwcResult};
use crate::hw::device::{HwDevices, ImageDesc, ScalerJob};
use crate::layer::format::SCALER_OUTPUT_FORMAT;
use crate::layer::model::Layer;
use crate::scaler::caps::PassPlan;
use crate::scaler::pool::ScalerPool;
use crate::scaler::unit::BindingMode;
use std::time::Duration;

/// A placed layer and the scaler unit feeding its window.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ScalerBinding {
    /// Layer index.
    pub layer: usize,
    /// Unit index.
    pub unit: usize,
    /// Local or memory-to-memory.
    pub path: ScalerPath,
    /// Hardware program.
    pub job: ScalerJob,
}

/// Binding that could not be committed; the layer must go to the GPU.
#[derive(Debug)]
pub struct BindFailure {
    /// Layer index.
    pub layer: usize,
    /// Unit that failed.
    pub unit: usize,
    /// Cause.
    pub error: HwcError,
}

/// Committed bindings of one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindReport {
    /// One entry per scaler-fed window, in window order.
    pub bindings: Vec<ScalerBinding>,
    /// Units reprogrammed this frame.
    pub reconfigured: usize,
    /// A local-path binding was made.
    pub local_path: bool,
}

/// Binder knobs taken from the runtime options.
#[derive(Clone, Copy, Debug)]
pub struct BindOptions {
    /// Destination buffers per memory-to-memory binding.
    pub ring_len: usize,
    /// Upper bound of every fence wait.
    pub fence_timeout: Duration,
}

/// Hardware program for `layer` going through `reservation`.
///
/// Memory-to-memory output is a buffer the size of the display frame; the window then crops
/// whatever is off-screen. Local output lands at the frame's position in display space.
pub fn scaler_job(
    layer: &Layer,
    reservation: ScalerReservation,
    bounds: PxRect,
) -> HwcResult<ScalerJob> {
    let crop = layer.source_px()?;
    let src_size = Size::new(
        u32::try_from(crop.right.max(0)).unwrap_or(0),
        u32::try_from(crop.bottom.max(0)).unwrap_or(0),
    );
    let dst_size = layer.display_frame.size();
    if src_size.is_empty() || dst_size.is_empty() {
        return Err(HwcError::invariant("scaler job with empty source or destination"));
    }
    let src = ImageDesc {
        size: src_size,
        crop,
        format: layer.format,
    };

    let (dst, intermediate) = match reservation.path {
        ScalerPath::Local => (
            ImageDesc {
                size: bounds.size(),
                crop: layer.display_frame,
                format: SCALER_OUTPUT_FORMAT,
            },
            None,
        ),
        ScalerPath::M2m { plan } => {
            let dst = ImageDesc {
                size: dst_size,
                crop: PxRect::from_size(dst_size),
                format: SCALER_OUTPUT_FORMAT,
            };
            let mid = match plan {
                PassPlan::Single => None,
                PassPlan::TwoPass { intermediate } => Some(ImageDesc {
                    size: intermediate,
                    crop: PxRect::from_size(intermediate),
                    format: SCALER_OUTPUT_FORMAT,
                }),
            };
            (dst, mid)
        }
    };

    Ok(ScalerJob {
        src,
        dst,
        intermediate,
        transform: layer.transform,
        protected: layer.is_protected(),
    })
}

/// Claim and program the scaler units `allocation` reserved for display `kind`.
///
/// Stops at the first failure. A unit whose configuration or buffers failed is released before
/// returning, so the next attempt starts from an unbound unit.
#[tracing::instrument(level = "debug", skip_all, fields(kind = ?kind))]
pub fn bind_scalers(
    pool: &mut ScalerPool,
    devices: &mut HwDevices,
    kind: DisplayKind,
    layers: &[Layer],
    allocation: &Allocation,
    bounds: PxRect,
    opts: BindOptions,
) -> Result<BindReport, BindFailure> {
    let mut report = BindReport::default();
    for p in &allocation.placements {
        let Some(reservation) = p.scaler else {
            continue;
        };
        let fail = |error: HwcError| BindFailure {
            layer: p.layer,
            unit: reservation.unit,
            error,
        };
        let layer = layers
            .get(p.layer)
            .ok_or_else(|| fail(HwcError::invariant(format!("layer {} missing", p.layer))))?;
        let job = scaler_job(layer, reservation, bounds).map_err(fail)?;
        let mode = match reservation.path {
            ScalerPath::Local => BindingMode::Local(kind),
            ScalerPath::M2m { .. } => BindingMode::M2m(kind),
        };

        let unit = pool
            .acquire(devices, reservation.unit, mode, opts.fence_timeout)
            .map_err(fail)?;
        match unit.prepare(devices, job, opts.ring_len, opts.fence_timeout) {
            Ok(reconfigured) => {
                if reconfigured {
                    report.reconfigured += 1;
                }
            }
            Err(e) => {
                tracing::warn!(
                    layer = p.layer,
                    unit = reservation.unit,
                    error = %e,
                    "scaler binding failed"
                );
                pool.release(devices, reservation.unit, opts.fence_timeout);
                return Err(fail(e));
            }
        }

        report.local_path |= reservation.path == ScalerPath::Local;
        report.bindings.push(ScalerBinding {
            layer: p.layer,
            unit: reservation.unit,
            path: reservation.path,
            job,
        });
    }
    Ok(report)
}
