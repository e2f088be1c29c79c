use crate::compose::fingerprint::{LayerSignature, layer_signature};
use crate::compose::plan::FramePlan;
use crate::layer::model::{BufferHandle, Fence, Layer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FoldedLayer {
    index: usize,
    handle: Option<BufferHandle>,
    acquire: Option<Fence>,
}

/// Last plan of a display plus what it takes to prove the next frame looks the same.
///
/// Only the layers folded into the framebuffer are compared by handle: overlays pick up new
/// buffers at commit time without a new plan.
#[derive(Clone, Debug, Default)]
pub(crate) struct StaticSceneCache {
    signature: Option<LayerSignature>,
    folded: Vec<FoldedLayer>,
    plan: Option<FramePlan>,
    fb_target: Option<BufferHandle>,
}

impl StaticSceneCache {
    pub(crate) fn invalidate(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn is_primed(&self) -> bool {
        self.plan.is_some()
    }

    /// Framebuffer target committed with the cached plan.
    pub(crate) fn fb_target(&self) -> Option<BufferHandle> {
        self.fb_target
    }

    pub(crate) fn note_fb_target(&mut self, handle: BufferHandle) {
        if self.plan.is_some() {
            self.fb_target = Some(handle);
        }
    }

    pub(crate) fn remember(&mut self, layers: &[Layer], plan: &FramePlan) {
        if plan.degraded {
            self.invalidate();
            return;
        }
        self.folded = plan
            .folded()
            .filter_map(|index| {
                layers.get(index).map(|l| FoldedLayer {
                    index,
                    handle: l.handle,
                    acquire: l.acquire_fence,
                })
            })
            .collect();
        self.signature = Some(layer_signature(layers));
        self.plan = Some(FramePlan {
            static_replay: false,
            ..plan.clone()
        });
        self.fb_target = None;
    }

    /// Reuse the cached plan when nothing the framebuffer depends on changed.
    ///
    /// On a hit the folded layers are released on their previous acquire fence, since the GPU
    /// will not read them again.
    pub(crate) fn try_replay(
        &mut self,
        layers: &mut [Layer],
        geometry_changed: bool,
    ) -> Option<FramePlan> {
        if geometry_changed || layers.iter().any(Layer::is_skip) {
            self.invalidate();
            return None;
        }
        let plan = self.plan.as_ref()?;
        if self.signature != Some(layer_signature(layers)) {
            return None;
        }
        if self
            .folded
            .iter()
            .any(|f| layers.get(f.index).map(|l| l.handle) != Some(f.handle))
        {
            return None;
        }

        let mut replay = plan.clone();
        replay.static_replay = true;
        for f in &mut self.folded {
            let l = &mut layers[f.index];
            l.release_fence = f.acquire;
            f.acquire = l.acquire_fence;
        }
        replay.apply_kinds(layers);
        Some(replay)
    }
}

#[cfg(test)]
#[path = "../../tests/unit/compose/static_scene.rs"]
mod tests;
