use crate::foundation::core::PxRect;
use crate::layer::format::PixelFormat;
use crate::layer::model::{BlendMode, CompositionKind, Layer};
use xxhash_rust::xxh3::Xxh3;

const XXH3_SEED: u64 = 0x5c3e_91d7_a4f0_2b68;

/// Structural signature of a layer list.
///
/// Buffer handles and fences are deliberately left out so a video frame flipping buffers keeps
/// its signature; the static cache compares handles separately.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) struct LayerSignature {
    pub(crate) hi: u64,
    pub(crate) lo: u64,
}

pub(crate) fn layer_signature(layers: &[Layer]) -> LayerSignature {
    let mut h = StableHasher::new();
    h.write_u32(layers.len() as u32);
    for l in layers {
        write_layer(&mut h, l);
    }
    h.finish()
}

struct StableHasher {
    inner: Xxh3,
}

impl StableHasher {
    fn new() -> Self {
        Self {
            inner: Xxh3::with_seed(XXH3_SEED),
        }
    }

    fn write_bytes(&mut self, b: &[u8]) {
        self.inner.update(b);
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(u8::from(v));
    }

    fn write_u32(&mut self, v: u32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_i32(&mut self, v: i32) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_bytes(&v.to_bits().to_le_bytes());
    }

    fn finish(self) -> LayerSignature {
        let v = self.inner.digest128();
        LayerSignature {
            hi: (v >> 64) as u64,
            lo: v as u64,
        }
    }
}

fn write_layer(h: &mut StableHasher, l: &Layer) {
    // Role only; the composition written by the previous frame must not perturb the signature.
    h.write_u8(match l.composition {
        CompositionKind::Background => 1,
        CompositionKind::FramebufferTarget => 2,
        CompositionKind::Overlay | CompositionKind::Gpu => 0,
    });
    h.write_bool(l.handle.is_some());
    h.write_u8(format_tag(l.format));
    h.write_u32(l.usage.bits());
    h.write_f64(l.source_crop.x0);
    h.write_f64(l.source_crop.y0);
    h.write_f64(l.source_crop.x1);
    h.write_f64(l.source_crop.y1);
    write_rect(h, l.display_frame);
    h.write_u32(l.transform.bits());
    h.write_u8(match l.blending {
        BlendMode::None => 0,
        BlendMode::Premultiplied => 1,
        BlendMode::Coverage => 2,
    });
    h.write_u8(l.plane_alpha);
    h.write_u32(l.flags.bits());
}

fn write_rect(h: &mut StableHasher, r: PxRect) {
    h.write_i32(r.left);
    h.write_i32(r.top);
    h.write_i32(r.right);
    h.write_i32(r.bottom);
}

fn format_tag(f: PixelFormat) -> u8 {
    match f {
        PixelFormat::Rgba8888 => 0,
        PixelFormat::Rgbx8888 => 1,
        PixelFormat::Bgra8888 => 2,
        PixelFormat::Rgb888 => 3,
        PixelFormat::Rgb565 => 4,
        PixelFormat::Nv12 => 5,
        PixelFormat::Nv21 => 6,
        PixelFormat::Yv12 => 7,
        PixelFormat::Nv12Tiled => 8,
        PixelFormat::Yuyv => 9,
    }
}
