//! Hardware capabilities consumed by the composer.

/// Capability traits.
pub mod device;
/// In-memory implementations for tests and simulation.
pub mod memory;
