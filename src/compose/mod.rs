//! Per-display cycle driver: static-scene short-circuit, allocation, binding and commit.

/// The composer.
pub mod composer;
/// Per-display state.
pub mod display;
mod fingerprint;
/// Frame plans and commit reports.
pub mod plan;
mod static_scene;
/// Per-display counters.
pub mod stats;
