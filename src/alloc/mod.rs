//! Bandwidth/overlap/window allocator.
//!
//! Packs overlay candidates into a display's windows under per-DMA-channel bandwidth and overlap
//! limits, folding what does not fit into one GPU-composited framebuffer window.

/// Packing passes and their result.
pub mod allocator;
/// Working state of one pass.
pub mod attempt;
/// Bandwidth cost model.
pub mod cost;
