use crate::classify::Eligibility;
use crate::config::FbCostPolicy;
use crate::foundation::core::PxRect;
use crate::foundation::geometry::visible_pixels;
use crate::layer::format::SCALER_OUTPUT_FORMAT;
use crate::layer::model::Layer;

/// Pixel-throughput cost of fetching `layer` through a window.
///
/// Costs are in 32bpp-pixel units: a 16bpp layer costs half its visible area. Protected content
/// is charged its full destination area. The background is a solid color and costs nothing.
pub fn layer_cost(layer: &Layer, eligibility: Eligibility, bounds: PxRect) -> u64 {
    if layer.is_background() {
        return 0;
    }
    if layer.is_protected() {
        return layer.display_frame.area();
    }
    let visible = visible_pixels(layer.display_frame, bounds);
    let bpp = if eligibility.needs_scaler() {
        SCALER_OUTPUT_FORMAT.bits_per_pixel()
    } else {
        layer.format.bits_per_pixel()
    };
    visible * u64::from(bpp) / 32
}

/// Cost charged to the framebuffer window.
///
/// `region` is the bounding box of the layers folded into the framebuffer, `None` when they are
/// all off-screen.
pub fn framebuffer_cost(policy: FbCostPolicy, bounds: PxRect, region: Option<PxRect>) -> u64 {
    match policy {
        FbCostPolicy::FullScreen => bounds.area(),
        FbCostPolicy::Region => region.map_or(0, PxRect::area),
    }
}
