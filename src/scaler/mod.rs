//! Scaler resource model: capability envelopes, units and the shared pool.

/// Capability envelopes and pass planning.
pub mod caps;
/// Shared pool and arbitration.
pub mod pool;
/// One unit and its destination ring.
pub mod unit;
