use super::*;
use crate::alloc::attempt::ScalerPath;
use crate::classify::{ClassifyContext, classify_all};
use crate::config::{ChannelConfig, HwcConfig};
use crate::foundation::core::{DisplayKind, Rect};
use crate::foundation::geometry::max_overlap_depth;
use crate::layer::format::PixelFormat;
use crate::layer::model::BufferHandle;
use crate::scaler::caps::PassPlan;
use crate::scaler::pool::ScalerPool;

fn single_channel(windows: usize, max_cost: u64, max_overlap: u8) -> DisplayConfig {
    DisplayConfig {
        width: 1000,
        height: 1000,
        window_count: windows,
        window_channels: vec![0; windows],
        channels: vec![ChannelConfig {
            max_cost,
            max_overlap,
        }],
        window_align_bytes: 8,
        min_window: crate::foundation::core::Size::new(4, 4),
        fb_cost: FbCostPolicy::Region,
    }
}

fn rgb(id: u64, x: i32, y: i32, w: u32, h: u32) -> Layer {
    Layer::unscaled(
        BufferHandle(id),
        PixelFormat::Rgbx8888,
        PxRect::from_origin_size(x, y, w, h),
    )
}

fn run(display: &DisplayConfig, scalers: &[ScalerUnitConfig], layers: &[Layer]) -> Allocation {
    run_pinned(display, scalers, layers, &[])
}

fn run_pinned(
    display: &DisplayConfig,
    scalers: &[ScalerUnitConfig],
    layers: &[Layer],
    pinned: &[usize],
) -> Allocation {
    let elig = classify_all(layers, &ClassifyContext::new(display, scalers));
    let budget = ScalerPool::new(scalers.to_vec()).budget(DisplayKind::Primary);
    allocate(
        layers,
        &elig,
        &AllocInput {
            display,
            scalers,
            budget: &budget,
            pinned,
        },
    )
    .unwrap()
}

#[test]
fn background_and_three_disjoint_layers_all_fit() {
    let cfg = HwcConfig::default();
    let layers = vec![
        Layer::background(cfg.primary.bounds()),
        rgb(1, 0, 0, 400, 400),
        rgb(2, 800, 0, 400, 400),
        rgb(3, 1600, 0, 400, 400),
    ];
    let a = run(&cfg.primary, &cfg.scalers, &layers);

    assert_eq!(a.outcome, AllocOutcome::Converged);
    assert_eq!(a.attempts, 1);
    assert_eq!(a.demoted, 0);
    assert_eq!(a.framebuffer, None);
    assert_eq!(
        a.kinds,
        vec![
            CompositionKind::Background,
            CompositionKind::Overlay,
            CompositionKind::Overlay,
            CompositionKind::Overlay,
        ]
    );
    let windows: Vec<usize> = a.placements.iter().map(|p| p.window).collect();
    assert_eq!(windows, vec![0, 1, 2, 3]);
}

// Region policy: the framebuffer only charges the folded layers, so the tail alone moves.
#[test]
fn over_budget_tail_is_folded_into_the_framebuffer() {
    let display = single_channel(6, 45_000, 2);
    let layers = vec![
        Layer::background(display.bounds()),
        rgb(1, 0, 0, 100, 100),
        rgb(2, 200, 0, 100, 100),
        rgb(3, 400, 0, 100, 100),
        rgb(4, 600, 0, 100, 100),
        rgb(5, 600, 0, 100, 100),
    ];
    let a = run(&display, &[], &layers);

    assert_eq!(a.outcome, AllocOutcome::Converged);
    assert_eq!(a.attempts, 3);
    assert_eq!(a.demoted, 2);
    assert_eq!(a.fb_span, Some(FbSpan { first: 4, last: 5 }));
    assert_eq!(&a.kinds[1..4], &[CompositionKind::Overlay; 3]);
    assert_eq!(&a.kinds[4..], &[CompositionKind::Gpu; 2]);

    let fb = a.framebuffer.unwrap();
    assert_eq!(fb.window, 4);
    assert_eq!(fb.frame, PxRect::from_origin_size(600, 0, 100, 100));
    assert_eq!(a.channel_cost, vec![40_000]);
}

#[test]
fn full_screen_framebuffer_cost_folds_every_layer_above_the_background() {
    let display = DisplayConfig {
        fb_cost: FbCostPolicy::FullScreen,
        ..single_channel(6, 45_000, 2)
    };
    let layers = vec![
        Layer::background(display.bounds()),
        rgb(1, 0, 0, 100, 100),
        rgb(2, 200, 0, 100, 100),
        rgb(3, 400, 0, 100, 100),
        rgb(4, 600, 0, 100, 100),
        rgb(5, 600, 0, 100, 100),
    ];
    let a = run(&display, &[], &layers);

    // The full-screen charge alone exceeds the channel, so the span reaches down to layer 1.
    assert_eq!(a.outcome, AllocOutcome::Converged);
    assert_eq!(a.attempts, 3);
    assert_eq!(a.demoted, 5);
    assert_eq!(a.fb_span, Some(FbSpan { first: 1, last: 5 }));
    assert_eq!(a.kinds[0], CompositionKind::Background);
    assert_eq!(&a.kinds[1..], &[CompositionKind::Gpu; 5]);

    let fb = a.framebuffer.unwrap();
    assert_eq!(fb.window, 1);
    assert_eq!(fb.frame, display.bounds());
    assert_eq!(a.channel_cost, vec![1_000_000]);
}

#[test]
fn demotion_covers_the_whole_z_range_between_gpu_layers() {
    let display = single_channel(8, 1_000_000, 2);
    let layers = vec![
        rgb(1, 0, 0, 100, 100).skipped(),
        rgb(2, 200, 0, 100, 100),
        rgb(3, 400, 0, 100, 100).skipped(),
        rgb(4, 600, 0, 100, 100),
    ];
    let a = run(&display, &[], &layers);

    assert_eq!(a.fb_span, Some(FbSpan { first: 0, last: 2 }));
    assert_eq!(a.kinds[1], CompositionKind::Gpu);
    assert_eq!(a.kinds[3], CompositionKind::Overlay);
    assert_eq!(a.framebuffer.unwrap().window, 0);
    assert_eq!(a.placement(3).unwrap().window, 1);
}

#[test]
fn overlap_limit_of_zero_forbids_any_intersection() {
    let display = single_channel(4, 1_000_000, 0);
    let layers = vec![rgb(1, 0, 0, 100, 100), rgb(2, 200, 0, 100, 100)];
    let a = run(&display, &[], &layers);
    assert_eq!(a.kinds, vec![CompositionKind::Overlay; 2]);

    // The framebuffer window holding the second layer would still intersect the first.
    let layers = vec![rgb(1, 0, 0, 100, 100), rgb(2, 50, 50, 100, 100)];
    let a = run(&display, &[], &layers);
    assert_eq!(a.outcome, AllocOutcome::Exhausted);
    assert_eq!(a.attempts, 2);
    assert_eq!(a.kinds, vec![CompositionKind::Gpu; 2]);
}

#[test]
fn triple_overlap_is_rejected_on_a_limit_two_channel() {
    let display = single_channel(5, 1_000_000, 2);
    let layers = vec![
        rgb(1, 0, 0, 100, 100),
        rgb(2, 50, 50, 100, 100),
        rgb(3, 60, 60, 100, 100),
    ];
    let a = run(&display, &[], &layers);
    assert_eq!(a.outcome, AllocOutcome::Converged);
    assert_eq!(a.attempts, 3);
    assert_eq!(
        a.kinds,
        vec![
            CompositionKind::Overlay,
            CompositionKind::Gpu,
            CompositionKind::Gpu,
        ]
    );
    assert_eq!(a.fb_span, Some(FbSpan { first: 1, last: 2 }));
}

#[test]
fn no_candidates_folds_everything() {
    let display = single_channel(3, 1_000_000, 2);
    let layers = vec![
        rgb(1, 0, 0, 100, 100).skipped(),
        Layer::framebuffer_target(BufferHandle(9), display.bounds()),
    ];
    let a = run(&display, &[], &layers);
    assert_eq!(a.outcome, AllocOutcome::Exhausted);
    assert_eq!(a.attempts, 0);
    assert_eq!(
        a.kinds,
        vec![CompositionKind::Gpu, CompositionKind::FramebufferTarget]
    );
    assert_eq!(a.framebuffer.unwrap().window, 0);
}

#[test]
fn empty_layer_list_converges_without_passes() {
    let display = single_channel(3, 1_000_000, 2);
    let a = run(&display, &[], &[]);
    assert_eq!(a.outcome, AllocOutcome::Converged);
    assert_eq!(a.attempts, 0);
}

#[test]
fn zero_windows_degrade_to_full_gpu() {
    let mut display = single_channel(0, 1_000_000, 2);
    display.window_channels.clear();
    let a = run(&display, &[], &[rgb(1, 0, 0, 100, 100)]);
    assert_eq!(a.outcome, AllocOutcome::Exhausted);
    assert_eq!(a.kinds, vec![CompositionKind::Gpu]);
    assert_eq!(a.framebuffer, None);
}

#[test]
fn pinned_layers_go_to_the_gpu() {
    let display = single_channel(4, 1_000_000, 2);
    let layers = vec![rgb(1, 0, 0, 100, 100), rgb(2, 200, 0, 100, 100)];
    let a = run_pinned(&display, &[], &layers, &[1]);
    assert_eq!(a.kinds, vec![CompositionKind::Overlay, CompositionKind::Gpu]);
    assert_eq!(a.demoted, 1);
}

#[test]
fn local_path_takes_a_modest_downscale() {
    let cfg = HwcConfig::default();
    let layers = vec![Layer::new(
        BufferHandle(1),
        PixelFormat::Nv12,
        Rect::new(0.0, 0.0, 1920.0, 1080.0),
        PxRect::from_origin_size(0, 0, 1280, 720),
    )];
    let a = run(&cfg.primary, &cfg.scalers, &layers);
    let s = a.placements[0].scaler.unwrap();
    assert_eq!(s.unit, 0);
    assert_eq!(s.path, ScalerPath::Local);
}

#[test]
fn upscale_beyond_the_local_envelope_uses_memory_to_memory() {
    let cfg = HwcConfig::default();
    let layers = vec![Layer::new(
        BufferHandle(1),
        PixelFormat::Nv12,
        Rect::new(0.0, 0.0, 1280.0, 720.0),
        PxRect::from_origin_size(0, 0, 2560, 1440),
    )];
    let a = run(&cfg.primary, &cfg.scalers, &layers);
    let s = a.placements[0].scaler.unwrap();
    assert_eq!(
        s.path,
        ScalerPath::M2m {
            plan: PassPlan::Single
        }
    );
}

#[test]
fn extreme_upscale_plans_two_passes() {
    let cfg = HwcConfig::default();
    let layers = vec![Layer::new(
        BufferHandle(1),
        PixelFormat::Nv12,
        Rect::new(0.0, 0.0, 100.0, 100.0),
        PxRect::from_origin_size(0, 0, 1000, 1000),
    )];
    let a = run(&cfg.primary, &cfg.scalers, &layers);
    let s = a.placements[0].scaler.unwrap();
    assert!(matches!(
        s.path,
        ScalerPath::M2m {
            plan: PassPlan::TwoPass { .. }
        }
    ));
}

#[test]
fn layers_beyond_the_scaler_pool_are_demoted() {
    let mut cfg = HwcConfig::default();
    cfg.scalers.truncate(1);
    cfg.scalers[0].local_path = None;
    let yuv = |id: u64, x: i32| {
        Layer::unscaled(
            BufferHandle(id),
            PixelFormat::Nv12,
            PxRect::from_origin_size(x, 0, 320, 240),
        )
    };
    let a = run(&cfg.primary, &cfg.scalers, &[yuv(1, 0), yuv(2, 640)]);
    assert_eq!(a.kinds, vec![CompositionKind::Overlay, CompositionKind::Gpu]);
}

struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn below(&mut self, n: u64) -> u64 {
        self.next() % n
    }
}

fn random_layers(rng: &mut Lcg, n: usize) -> Vec<Layer> {
    let formats = [
        PixelFormat::Rgbx8888,
        PixelFormat::Rgba8888,
        PixelFormat::Rgb565,
        PixelFormat::Nv12,
    ];
    let mut layers = Vec::with_capacity(n + 2);
    if rng.below(2) == 0 {
        layers.push(Layer::background(PxRect::new(0, 0, 2560, 1600)));
    }
    for id in 0..n as u64 {
        let w = 16 + rng.below(2000) as u32;
        let h = 16 + rng.below(1400) as u32;
        let x = rng.below(2700) as i32 - 100;
        let y = rng.below(1700) as i32 - 100;
        let format = formats[rng.below(formats.len() as u64) as usize];
        let frame = PxRect::from_origin_size(x, y, w, h);
        let mut l = Layer::unscaled(BufferHandle(id + 1), format, frame);
        if rng.below(8) == 0 {
            l = l.skipped();
        }
        if rng.below(6) == 0 {
            l = l.protected();
        }
        layers.push(l);
    }
    layers.push(Layer::framebuffer_target(
        BufferHandle(999),
        PxRect::new(0, 0, 2560, 1600),
    ));
    layers
}

#[test]
fn random_frames_respect_every_invariant() {
    let cfg = HwcConfig::default();
    let display = &cfg.primary;
    let mut rng = Lcg(0x5eed);

    for round in 0..400 {
        let n = (round % 9) as usize;
        let layers = random_layers(&mut rng, n);
        let a = run(display, &cfg.scalers, &layers);

        assert!(a.attempts <= layers.len(), "round {round}: {} passes", a.attempts);

        for (ch, limits) in display.channels.iter().enumerate() {
            let placed: Vec<&Placement> =
                a.placements.iter().filter(|p| p.channel == ch).collect();
            let cost: u64 = placed.iter().map(|p| p.cost).sum();
            assert!(cost <= limits.max_cost, "round {round}: channel {ch} over budget");

            let rects: Vec<PxRect> = placed
                .iter()
                .filter(|p| !layers[p.layer].is_background())
                .map(|p| p.visible)
                .collect();
            assert!(max_overlap_depth(&rects) <= limits.overlap_limit());
        }

        let overlays = a.placements.len();
        if a.kinds.contains(&CompositionKind::Gpu) {
            assert!(overlays < display.window_count, "round {round}");
            let fb = a.framebuffer.unwrap();
            assert!(a.placements.iter().all(|p| p.window != fb.window));
        } else {
            assert!(overlays <= display.window_count);
        }

        let mut last_window = None;
        for p in &a.placements {
            assert!(last_window.is_none_or(|w| p.window > w), "round {round}");
            last_window = Some(p.window);
        }

        if let Some(span) = a.fb_span {
            let fb = a.framebuffer.unwrap();
            for p in &a.placements {
                assert!(!span.contains(p.layer));
                assert_eq!(p.layer < span.first, p.window < fb.window, "round {round}");
            }
        }

        let units: Vec<usize> = a
            .placements
            .iter()
            .filter_map(|p| p.scaler.map(|s| s.unit))
            .collect();
        let mut dedup = units.clone();
        dedup.sort_unstable();
        dedup.dedup();
        assert_eq!(units.len(), dedup.len(), "round {round}: scaler reserved twice");
    }
}
