/// Pixel formats and their window mappings.
pub mod format;
/// Per-cycle layer description.
pub mod model;
