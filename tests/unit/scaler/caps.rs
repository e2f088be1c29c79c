use super::*;

fn req(format: PixelFormat, src: (u32, u32), dst: (u32, u32)) -> ScaleRequest {
    ScaleRequest {
        format,
        src: Size::new(src.0, src.1),
        dst: Size::new(dst.0, dst.1),
        transform: false,
        protected: false,
    }
}

#[test]
fn envelope_bounds_are_inclusive() {
    let env = ScaleEnvelope {
        max_downscale: 2,
        max_upscale: 2,
    };
    assert!(env.admits(Size::new(100, 100), Size::new(200, 50)));
    assert!(!env.admits(Size::new(100, 100), Size::new(201, 100)));
    assert!(!env.admits(Size::new(100, 100), Size::new(100, 49)));
    assert!(!env.admits(Size::new(0, 100), Size::new(100, 100)));
}

#[test]
fn moderate_yuv_upscale_runs_in_one_pass() {
    let caps = ScalerCaps::reference();
    let plan = caps.plan(&req(PixelFormat::Nv12, (1280, 720), (2560, 1440)));
    assert_eq!(plan, Some(PassPlan::Single));
}

#[test]
fn extreme_upscale_chains_through_an_intermediate() {
    let caps = ScalerCaps::reference();
    let plan = caps
        .plan(&req(PixelFormat::Nv12, (100, 100), (1000, 1000)))
        .unwrap();
    assert_eq!(
        plan,
        PassPlan::TwoPass {
            intermediate: Size::new(800, 800)
        }
    );
    assert_eq!(plan.passes(), 2);
}

#[test]
fn tiled_sources_always_take_two_passes() {
    let caps = ScalerCaps::reference();
    let plan = caps
        .plan(&req(PixelFormat::Nv12Tiled, (1280, 720), (1280, 720)))
        .unwrap();
    assert_eq!(
        plan,
        PassPlan::TwoPass {
            intermediate: Size::new(1280, 720)
        }
    );
}

#[test]
fn upscale_beyond_two_passes_is_rejected() {
    let caps = ScalerCaps::reference();
    assert_eq!(caps.plan(&req(PixelFormat::Nv12, (16, 16), (4096, 4096))), None);
}

#[test]
fn rotation_and_protection_need_matching_caps() {
    let mut caps = ScalerCaps::reference();
    caps.rotation = false;
    caps.protected_content = false;
    let mut r = req(PixelFormat::Nv12, (640, 480), (640, 480));
    r.transform = true;
    assert_eq!(caps.plan(&r), None);
    r.transform = false;
    r.protected = true;
    assert_eq!(caps.plan(&r), None);
}

#[test]
fn local_path_rejects_upscale_beyond_its_envelope() {
    let caps = ScalerCaps::reference();
    let local = LocalPathCaps {
        display: DisplayKind::Primary,
        envelope: ScaleEnvelope {
            max_downscale: 2,
            max_upscale: 1,
        },
    };
    assert!(local.admits(&caps, &req(PixelFormat::Nv12, (1920, 1080), (1280, 720))));
    assert!(!local.admits(&caps, &req(PixelFormat::Nv12, (1280, 720), (2560, 1440))));
    assert!(!local.admits(&caps, &req(PixelFormat::Nv12Tiled, (1280, 720), (1280, 720))));
}
