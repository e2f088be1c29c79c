use super::*;
use crate::foundation::core::Rect;
use crate::hw::memory::{HwCall, MemoryHardware};
use crate::layer::format::PixelFormat;
use crate::layer::model::{BufferHandle, CompositionKind};

fn composer(cfg: HwcConfig) -> (Composer, MemoryHardware) {
    let hw = MemoryHardware::new();
    let c = Composer::new(cfg, hw.devices()).unwrap();
    (c, hw)
}

fn bounds() -> PxRect {
    HwcConfig::default().primary.bounds()
}

fn fb_target() -> Layer {
    Layer::framebuffer_target(BufferHandle(900), bounds())
}

fn upscaled_video(id: u64) -> Layer {
    Layer::new(
        BufferHandle(id),
        PixelFormat::Nv12,
        Rect::new(0.0, 0.0, 960.0, 540.0),
        PxRect::from_origin_size(0, 0, 1920, 1080),
    )
}

#[test]
fn construction_rejects_invalid_config() {
    let mut cfg = HwcConfig::default();
    cfg.primary.window_channels.clear();
    let hw = MemoryHardware::new();
    assert!(matches!(
        Composer::new(cfg, hw.devices()),
        Err(HwcError::Config(_))
    ));
}

#[test]
fn force_gpu_composes_everything_on_the_gpu() {
    let mut cfg = HwcConfig::default();
    cfg.options.force_gpu = true;
    let (mut c, _hw) = composer(cfg);
    let mut layers = vec![
        Layer::background(bounds()),
        upscaled_video(1),
        fb_target(),
    ];

    let plan = c.prepare(DisplayKind::Primary, &mut layers, true);
    assert!(plan.is_full_gpu());
    assert!(!plan.degraded);
    assert_eq!(
        layers.iter().map(|l| l.composition).collect::<Vec<_>>(),
        vec![
            CompositionKind::Gpu,
            CompositionKind::Gpu,
            CompositionKind::FramebufferTarget
        ]
    );
    let stats = c.stats(DisplayKind::Primary).unwrap();
    assert_eq!(stats.full_gpu_frames, 1);
    assert_eq!(stats.demotions, 0);
    assert!(c.pool().snapshot().iter().all(|u| !u.created));
}

#[test]
fn buffer_exhaustion_pins_the_layer_and_reallocates() {
    let (mut c, hw) = composer(HwcConfig::default());
    hw.set_buffer_capacity(Some(0));
    let mut layers = vec![upscaled_video(1), fb_target()];

    let plan = c.prepare(DisplayKind::Primary, &mut layers, true);
    assert!(!plan.degraded);
    assert_eq!(plan.kinds[0], CompositionKind::Gpu);
    assert_eq!(plan.demoted, 1);
    assert_eq!(plan.framebuffer_window().map(|w| w.window), Some(0));
    assert!(plan.scaler_units().next().is_none());
    assert!(
        c.pool()
            .snapshot()
            .iter()
            .all(|u| u.mode == crate::scaler::unit::BindingMode::Unbound)
    );
    assert_eq!(hw.live_buffers(), 0);
}

#[test]
fn configure_failure_pins_the_layer() {
    let (mut c, hw) = composer(HwcConfig::default());
    hw.fail_configure(0, true);
    hw.fail_configure(1, true);
    hw.fail_configure(2, true);
    let mut layers = vec![upscaled_video(1), fb_target()];

    let plan = c.prepare(DisplayKind::Primary, &mut layers, true);
    assert_eq!(plan.kinds[0], CompositionKind::Gpu);
    assert!(!plan.degraded);
    assert_eq!(c.stats(DisplayKind::Primary).unwrap().scaler_reconfigurations, 0);
}

#[test]
fn run_failure_leaves_the_window_dark_and_drops_the_static_scene() {
    let (mut c, hw) = composer(HwcConfig::default());
    let mut layers = vec![upscaled_video(1), fb_target()];
    let plan = c.prepare(DisplayKind::Primary, &mut layers, true);
    let unit = plan.binding(0).unwrap().unit;
    assert!(c.display(DisplayKind::Primary).unwrap().has_static_scene());

    hw.fail_run(unit, true);
    let report = c.commit(DisplayKind::Primary, &mut layers);
    assert_eq!(report.failures, 1);
    assert_eq!(report.programmed, 0);
    assert_eq!(report.disabled, 5);
    assert_eq!(c.pool().mode(unit), crate::scaler::unit::BindingMode::Unbound);
    assert!(!c.display(DisplayKind::Primary).unwrap().has_static_scene());
    assert_eq!(c.stats(DisplayKind::Primary).unwrap().commit_failures, 1);

    hw.fail_run(unit, false);
    let plan = c.prepare(DisplayKind::Primary, &mut layers, false);
    assert!(!plan.static_replay);
    assert!(plan.binding(0).is_some());
    let report = c.commit(DisplayKind::Primary, &mut layers);
    assert_eq!(report.failures, 0);
    assert_eq!(report.scaler_runs, 1);
}

#[test]
fn commit_without_prepare_does_nothing() {
    let (mut c, hw) = composer(HwcConfig::default());
    let mut layers = vec![fb_target()];
    let report = c.commit(DisplayKind::Primary, &mut layers);
    assert_eq!(report, CommitReport::default());
    assert!(hw.calls().is_empty());
}

#[test]
fn commit_rejects_a_resized_layer_list() {
    let (mut c, _hw) = composer(HwcConfig::default());
    let mut layers = vec![upscaled_video(1), fb_target()];
    c.prepare(DisplayKind::Primary, &mut layers, true);
    layers.pop();
    let report = c.commit(DisplayKind::Primary, &mut layers);
    assert_eq!(report.failures, 1);
    assert!(!c.display(DisplayKind::Primary).unwrap().has_static_scene());
}

#[test]
fn failing_window_is_counted_and_disabled() {
    let (mut c, hw) = composer(HwcConfig::default());
    hw.fail_window(DisplayKind::Primary, 0);
    let mut layers = vec![
        Layer::unscaled(
            BufferHandle(1),
            PixelFormat::Rgbx8888,
            PxRect::from_origin_size(0, 0, 64, 64),
        ),
        fb_target(),
    ];
    c.prepare(DisplayKind::Primary, &mut layers, true);
    let report = c.commit(DisplayKind::Primary, &mut layers);
    assert_eq!(report.failures, 1);
    assert_eq!(
        hw.count(|call| matches!(
            call,
            HwCall::Disable {
                window: 0,
                ..
            }
        )),
        1
    );
}

#[test]
fn direct_program_trims_the_crop_with_the_frame() {
    let layer = Layer::unscaled(
        BufferHandle(1),
        PixelFormat::Rgbx8888,
        PxRect::from_origin_size(-100, 0, 400, 400),
    );
    let w = WindowPlan {
        window: 0,
        channel: 0,
        cost: 0,
        frame: PxRect::new(0, 0, 300, 400),
        content: WindowContent::Layer {
            layer: 0,
            scaler: None,
        },
    };
    let program = direct_program(&w, &layer).unwrap();
    assert_eq!(program.display_frame, PxRect::new(0, 0, 300, 400));
    assert_eq!(program.source_crop, PxRect::new(100, 0, 400, 400));
    assert_eq!(program.format, WindowFormat::Xrgb8888);
}

#[test]
fn partially_visible_scaled_layer_crops_the_scaler_output() {
    let (mut c, hw) = composer(HwcConfig::default());
    let mut layers = vec![
        Layer::new(
            BufferHandle(1),
            PixelFormat::Nv12,
            Rect::new(0.0, 0.0, 640.0, 360.0),
            PxRect::from_origin_size(-320, 0, 1280, 720),
        ),
        fb_target(),
    ];
    let plan = c.prepare(DisplayKind::Primary, &mut layers, true);
    assert!(matches!(
        plan.binding(0).map(|b| b.path),
        Some(ScalerPath::M2m { .. })
    ));
    c.commit(DisplayKind::Primary, &mut layers);

    let programs: Vec<WindowProgram> = hw
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            HwCall::Program { program, .. } => Some(program),
            _ => None,
        })
        .collect();
    let scaled = programs
        .iter()
        .find(|p| matches!(p.source, WindowSourceBuffer::Buffer(b) if b.0 >= 0x1000_0000))
        .unwrap();
    assert_eq!(scaled.display_frame, PxRect::new(0, 0, 960, 720));
    assert_eq!(scaled.source_crop, PxRect::new(320, 0, 1280, 720));
    assert_eq!(scaled.format, WindowFormat::Xrgb8888);
}

#[test]
fn dump_lists_displays_and_units() {
    let (mut c, _hw) = composer(HwcConfig::default());
    let mut layers = vec![upscaled_video(1), fb_target()];
    c.prepare(DisplayKind::Primary, &mut layers, true);

    let text = c.dump().unwrap();
    let v: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(v["displays"].as_array().unwrap().len(), 2);
    assert_eq!(v["displays"][0]["display"], "primary");
    assert_eq!(v["displays"][0]["stats"]["frames"], 1);
    assert_eq!(v["units"].as_array().unwrap().len(), 3);
    assert!(v["displays"][0]["last_plan"]["windows"].is_array());
}
