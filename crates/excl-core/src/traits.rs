//! Model traits for the excl workspace.
//!
//! Inference code depends on these traits rather than on the concrete
//! model types in `excl-model`, so the optimizer and the likelihood
//! machinery never need to know about channels or modifiers.

use crate::Result;

/// A statistical model exposed as a negative log-likelihood over a flat
/// parameter vector.
pub trait LogDensityModel: Send + Sync {
    /// Number of fit parameters.
    fn dim(&self) -> usize;

    /// Parameter names, in parameter order.
    fn parameter_names(&self) -> Vec<String>;

    /// Parameter bounds (min, max), in parameter order.
    fn parameter_bounds(&self) -> Vec<(f64, f64)>;

    /// Suggested initial values, in parameter order.
    fn parameter_init(&self) -> Vec<f64>;

    /// Negative log-likelihood at `params`.
    fn nll(&self, params: &[f64]) -> Result<f64>;
}

/// A model with a designated parameter of interest.
pub trait PoiModel {
    /// Index of the parameter of interest, if one is defined.
    fn poi_index(&self) -> Option<usize>;
}

/// A model that can produce a copy with one parameter frozen.
pub trait FixedParamModel: Sized {
    /// Copy of the model with parameter `param_idx` pinned to `value`.
    fn with_fixed_param(&self, param_idx: usize, value: f64) -> Self;
}
