//! Per-layer eligibility classifier.
//!
//! Decides whether a layer may be handed to a hardware window at all and whether it needs a
//! scaler unit on the way. The result is advisory: the allocator makes the final call.

mod eligibility;

pub use eligibility::{
    ClassifyContext, Eligibility, IneligibleReason, ScalerReasons, classify, classify_all,
    scale_request,
};
