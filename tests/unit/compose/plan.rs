use super::*;
use crate::alloc::allocator::{AllocInput, allocate};
use crate::alloc::attempt::ScalerPath;
use crate::classify::{ClassifyContext, classify_all};
use crate::config::HwcConfig;
use crate::foundation::core::{Rect, Size};
use crate::hw::device::{ImageDesc, ScalerJob};
use crate::layer::format::PixelFormat;
use crate::layer::model::{BufferHandle, Transform};
use crate::scaler::caps::PassPlan;
use crate::scaler::pool::ScalerPool;

fn bounds() -> PxRect {
    HwcConfig::default().primary.bounds()
}

fn rgb(id: u64, x: i32, y: i32, w: u32, h: u32) -> Layer {
    Layer::unscaled(
        BufferHandle(id),
        PixelFormat::Rgbx8888,
        PxRect::from_origin_size(x, y, w, h),
    )
}

fn allocation(layers: &[Layer]) -> Allocation {
    let cfg = HwcConfig::default();
    let elig = classify_all(layers, &ClassifyContext::new(&cfg.primary, &cfg.scalers));
    let budget = ScalerPool::new(cfg.scalers.clone()).budget(DisplayKind::Primary);
    allocate(
        layers,
        &elig,
        &AllocInput {
            display: &cfg.primary,
            scalers: &cfg.scalers,
            budget: &budget,
            pinned: &[],
        },
    )
    .unwrap()
}

fn binding(layer: usize, unit: usize) -> ScalerBinding {
    let desc = ImageDesc {
        size: Size::new(64, 64),
        crop: PxRect::new(0, 0, 64, 64),
        format: PixelFormat::Nv12,
    };
    ScalerBinding {
        layer,
        unit,
        path: ScalerPath::M2m {
            plan: PassPlan::Single,
        },
        job: ScalerJob {
            src: desc,
            dst: desc,
            intermediate: None,
            transform: Transform::empty(),
            protected: false,
        },
    }
}

#[test]
fn windows_follow_placements_and_framebuffer_in_window_order() {
    let layers = vec![
        Layer::background(bounds()),
        rgb(1, 0, 0, 2560, 1600),
        // 24-bit RGB has no window mapping and folds into the framebuffer.
        Layer::unscaled(
            BufferHandle(2),
            PixelFormat::Rgb888,
            PxRect::from_origin_size(0, 0, 64, 64),
        ),
        Layer::framebuffer_target(BufferHandle(9), bounds()),
    ];
    let a = allocation(&layers);
    let plan = FramePlan::from_allocation(DisplayKind::Primary, &a, &[], &layers, 0);

    let windows: Vec<usize> = plan.windows.iter().map(|w| w.window).collect();
    assert_eq!(windows, vec![0, 1, 2]);
    assert_eq!(plan.windows[0].content, WindowContent::Background { layer: 0 });
    assert_eq!(
        plan.windows[1].content,
        WindowContent::Layer {
            layer: 1,
            scaler: None
        }
    );
    assert_eq!(plan.windows[2].content, WindowContent::Framebuffer);
    assert_eq!(plan.overlay_count(), 1);
    assert!(!plan.is_full_gpu());
    assert_eq!(plan.folded().collect::<Vec<_>>(), vec![2]);
    assert_eq!(plan.framebuffer_window().map(|w| w.window), Some(2));
}

#[test]
fn bindings_attach_to_their_layer_window() {
    let layers = vec![rgb(1, 0, 0, 64, 64), rgb(2, 64, 0, 64, 64)];
    let a = allocation(&layers);
    let plan = FramePlan::from_allocation(DisplayKind::Primary, &a, &[binding(1, 2)], &layers, 3);

    assert_eq!(plan.attempts, a.attempts + 3);
    assert!(plan.binding(0).is_none());
    assert_eq!(plan.binding(1).map(|b| b.unit), Some(2));
    assert_eq!(plan.scaler_units().collect::<Vec<_>>(), vec![2]);
}

#[test]
fn full_gpu_plan_shows_the_framebuffer_on_window_zero() {
    let cfg = HwcConfig::default();
    let layers = vec![
        rgb(1, 0, 0, 100, 100),
        rgb(2, 50, 50, 100, 100),
        Layer::framebuffer_target(BufferHandle(9), bounds()),
    ];
    let plan = FramePlan::full_gpu(DisplayKind::Primary, &cfg.primary, &layers, 2, true);

    assert!(plan.degraded);
    assert!(plan.is_full_gpu());
    assert_eq!(plan.outcome, AllocOutcome::Exhausted);
    assert_eq!(
        plan.kinds,
        vec![
            CompositionKind::Gpu,
            CompositionKind::Gpu,
            CompositionKind::FramebufferTarget
        ]
    );
    assert_eq!(plan.fb_span, Some(FbSpan { first: 0, last: 1 }));
    let fb = plan.framebuffer_window().unwrap();
    assert_eq!(fb.window, 0);
    assert_eq!(fb.frame, bounds());
    assert_eq!(fb.cost, bounds().area());
}

#[test]
fn full_gpu_region_policy_charges_the_folded_area() {
    let mut cfg = HwcConfig::default();
    cfg.primary.fb_cost = FbCostPolicy::Region;
    let layers = vec![rgb(1, 0, 0, 100, 100), rgb(2, 50, 50, 100, 100)];
    let plan = FramePlan::full_gpu(DisplayKind::Primary, &cfg.primary, &layers, 0, false);

    let fb = plan.framebuffer_window().unwrap();
    assert_eq!(fb.frame, PxRect::new(0, 0, 150, 150));
    assert_eq!(fb.cost, 150 * 150);
}

#[test]
fn detached_plan_has_no_windows() {
    let layers = vec![
        rgb(1, 0, 0, 100, 100),
        Layer::framebuffer_target(BufferHandle(9), bounds()),
    ];
    let plan = FramePlan::detached(DisplayKind::External, &layers);
    assert!(plan.windows.is_empty());
    assert_eq!(
        plan.kinds,
        vec![CompositionKind::Gpu, CompositionKind::FramebufferTarget]
    );
}

#[test]
fn apply_kinds_writes_composition_in_place() {
    let mut layers = vec![
        rgb(1, 0, 0, 100, 100),
        Layer::new(
            BufferHandle(2),
            PixelFormat::Rgbx8888,
            Rect::new(0.0, 0.0, 10.0, 10.0),
            PxRect::from_origin_size(0, 0, 100, 100),
        ),
    ];
    let a = allocation(&layers);
    let plan = FramePlan::from_allocation(DisplayKind::Primary, &a, &[], &layers, 0);
    plan.apply_kinds(&mut layers);
    for (layer, kind) in layers.iter().zip(&plan.kinds) {
        assert_eq!(layer.composition, *kind);
    }
}
