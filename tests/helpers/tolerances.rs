//! Tolerance constants for evaluation tests.

/// Exact copies, identity transforms and verbatim scalar heads.
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Policy optimism blending, computed in f64 and narrowed to f32.
pub const BLEND_EPSILON: f32 = 1e-5;

/// Values rounded through half precision near unit magnitude.
pub const FP16_EPSILON: f32 = 1e-3;
