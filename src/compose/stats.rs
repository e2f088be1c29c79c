/// Cumulative counters of one display.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize)]
pub struct DisplayStats {
    /// `prepare` calls.
    pub frames: u64,
    /// Frames that reused the previous plan.
    pub static_replays: u64,
    /// Frames with no layer on a window.
    pub full_gpu_frames: u64,
    /// Frames forced to full GPU by an internal error.
    pub degraded_frames: u64,
    /// Overlay candidates sent to the GPU, summed over frames.
    pub demotions: u64,
    /// Allocator packing passes, summed over frames.
    pub passes: u64,
    /// Scaler units reprogrammed.
    pub scaler_reconfigurations: u64,
    /// Scaler runs skipped because the source buffer was unchanged.
    pub duplicate_frames: u64,
    /// Windows left unprogrammed by `commit`.
    pub commit_failures: u64,
    /// Scaler bindings lost to the other display.
    pub preemptions: u64,
}
