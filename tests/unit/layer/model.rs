use super::*;

#[test]
fn transform_bits_follow_the_hardware_contract() {
    assert_eq!(Transform::ROT_180, Transform::FLIP_H | Transform::FLIP_V);
    assert_eq!(Transform::ROT_270, Transform::ROT_180 | Transform::ROT_90);
    assert!(Transform::ROT_270.needs_rotation());
    assert!(!Transform::ROT_180.needs_rotation());
}

#[test]
fn every_flip_rotate_combination_is_a_distinct_bit_pattern() {
    let quarter_turns = [
        Transform::empty(),
        Transform::ROT_90,
        Transform::ROT_180,
        Transform::ROT_270,
    ];
    let mut seen = std::collections::HashSet::new();
    for rot in quarter_turns {
        seen.insert(rot);
        seen.insert(rot ^ Transform::FLIP_H);
    }
    assert_eq!(seen.len(), 8);
}

#[test]
fn rotated_layers_report_transposed_source() {
    let layer = Layer::new(
        BufferHandle(1),
        PixelFormat::Nv12,
        Rect::new(0.0, 0.0, 640.0, 480.0),
        PxRect::new(0, 0, 480, 640),
    )
    .with_transform(Transform::ROT_90);
    assert_eq!(layer.oriented_source_size().unwrap(), Size::new(480, 640));
}

#[test]
fn named_predicates_match_bits() {
    let layer = Layer::unscaled(BufferHandle(3), PixelFormat::Rgba8888, PxRect::new(0, 0, 8, 8))
        .protected()
        .skipped();
    assert!(layer.is_protected());
    assert!(layer.is_skip());
    assert!(!layer.is_background());
    assert!(Layer::background(PxRect::new(0, 0, 8, 8)).is_background());
}

#[test]
fn layers_parse_from_json_with_defaults() {
    let json = serde_json::json!({
        "handle": 7,
        "format": "nv12",
        "source_crop": { "x0": 0.0, "y0": 0.0, "x1": 1280.0, "y1": 720.0 },
        "display_frame": { "left": 0, "top": 0, "right": 1920, "bottom": 1080 }
    });
    let layer: Layer = serde_json::from_value(json).unwrap();
    assert_eq!(layer.handle, Some(BufferHandle(7)));
    assert_eq!(layer.plane_alpha, 255);
    assert_eq!(layer.composition, CompositionKind::Gpu);
    assert!(layer.transform.is_identity());
}
