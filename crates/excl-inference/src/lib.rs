//! # excl-inference
//!
//! Frequentist inference for counting models:
//! - bounded L-BFGS maximum likelihood estimation
//! - asymptotic CLs hypothesis tests (qtilde test statistic)
//! - upper-limit scans over a POI grid
//!
//! Inference code depends on the `LogDensityModel` trait from
//! `excl-core`, not on model internals; only the CLs calculator is
//! concrete over [`excl_model::CountingModel`] because it needs Asimov
//! dataset construction.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Asymptotic CLs hypothesis tests.
pub mod hypotest;
/// Upper-limit scans.
pub mod limits;
/// Maximum likelihood estimation.
pub mod mle;
/// Bounded quasi-Newton minimization.
pub mod optimizer;

pub use hypotest::{hypothesis_test, AsymptoticCalculator, HypotestResult, ScanState};
pub use limits::{upper_limit, upper_limit_scan, UpperLimitResult};
pub use mle::MaximumLikelihoodEstimator;
pub use optimizer::{LbfgsOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
