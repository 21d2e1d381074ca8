//! Maximum likelihood estimation.
//!
//! Minimizes the negative log-likelihood of any [`LogDensityModel`].
//! `fit_minimum` returns the bare optimizer result; `fit` adds a
//! numerical Hessian at the minimum and parameter uncertainties from the
//! inverted covariance matrix.

use crate::optimizer::{LbfgsOptimizer, ObjectiveFunction, OptimizationResult, OptimizerConfig};
use excl_core::traits::LogDensityModel;
use excl_core::{Error, FitResult, Result};
use nalgebra::DMatrix;

struct NllObjective<'a, M: LogDensityModel + ?Sized> {
    model: &'a M,
}

impl<M: LogDensityModel + ?Sized> ObjectiveFunction for NllObjective<'_, M> {
    fn eval(&self, params: &[f64]) -> Result<f64> {
        self.model.nll(params)
    }
}

/// Maximum likelihood estimator.
#[derive(Debug, Clone, Default)]
pub struct MaximumLikelihoodEstimator {
    config: OptimizerConfig,
}

impl MaximumLikelihoodEstimator {
    /// Create an estimator with the default optimizer configuration.
    pub fn new() -> Self {
        Self { config: OptimizerConfig::default() }
    }

    /// Create an estimator with a custom optimizer configuration.
    pub fn with_config(config: OptimizerConfig) -> Self {
        Self { config }
    }

    /// Access the optimizer configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Minimize the NLL from the model's suggested initial values.
    pub fn fit_minimum<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
    ) -> Result<OptimizationResult> {
        let init = model.parameter_init();
        self.fit_minimum_from(model, &init)
    }

    /// Minimize the NLL from an explicit starting point (warm start).
    ///
    /// Scans over correlated POI values are much faster when each fit
    /// starts from the previous converged point instead of
    /// `parameter_init()`.
    pub fn fit_minimum_from<M: LogDensityModel + ?Sized>(
        &self,
        model: &M,
        initial_params: &[f64],
    ) -> Result<OptimizationResult> {
        if initial_params.len() != model.dim() {
            return Err(Error::Validation(format!(
                "initial parameter length {} does not match model dimension {}",
                initial_params.len(),
                model.dim()
            )));
        }
        let objective = NllObjective { model };
        let optimizer = LbfgsOptimizer::new(self.config.clone());
        optimizer.minimize(&objective, initial_params, &model.parameter_bounds())
    }

    /// Full fit: minimum plus uncertainties from the inverted numerical
    /// Hessian (diagonal approximation when the inversion fails).
    pub fn fit<M: LogDensityModel + ?Sized>(&self, model: &M) -> Result<FitResult> {
        let opt = self.fit_minimum(model)?;
        let objective = NllObjective { model };

        let hessian = Self::compute_hessian(&objective, &opt.parameters)?;
        let n = opt.parameters.len();

        match Self::invert_hessian(&hessian) {
            Some(covariance) => {
                let mut uncertainties = Vec::with_capacity(n);
                let mut all_ok = true;
                for i in 0..n {
                    let var = covariance[(i, i)];
                    if var.is_finite() && var > 0.0 {
                        uncertainties.push(var.sqrt());
                    } else {
                        all_ok = false;
                        break;
                    }
                }
                if all_ok {
                    let cov_flat: Vec<f64> = covariance.iter().copied().collect();
                    return Ok(FitResult::with_covariance(
                        opt.parameters,
                        uncertainties,
                        cov_flat,
                        opt.fval,
                        opt.converged,
                        opt.n_fev,
                    ));
                }
                log::warn!("covariance diagonal invalid; falling back to Hessian diagonal");
            }
            None => {
                log::warn!("Hessian inversion failed; falling back to Hessian diagonal");
            }
        }

        let uncertainties = Self::diagonal_uncertainties(&hessian, n);
        Ok(FitResult::new(opt.parameters, uncertainties, opt.fval, opt.converged, opt.n_fev))
    }

    /// Numerical Hessian: forward differences of the gradient,
    /// symmetrised as H = (H + Hᵀ) / 2.
    fn compute_hessian(
        objective: &dyn ObjectiveFunction,
        best_params: &[f64],
    ) -> Result<DMatrix<f64>> {
        let n = best_params.len();
        let grad_center = objective.gradient(best_params)?;

        let mut hessian = DMatrix::zeros(n, n);
        for j in 0..n {
            let eps = 1e-4 * best_params[j].abs().max(1.0);

            let mut params_plus = best_params.to_vec();
            params_plus[j] += eps;
            let grad_plus = objective.gradient(&params_plus)?;

            for i in 0..n {
                hessian[(i, j)] = (grad_plus[i] - grad_center[i]) / eps;
            }
        }

        let ht = hessian.transpose();
        Ok((&hessian + &ht) * 0.5)
    }

    /// Invert the Hessian into a covariance matrix.
    ///
    /// A numerically estimated Hessian can be slightly indefinite even at
    /// a valid minimum, so Cholesky is retried with geometrically grown
    /// diagonal damping before falling back to an LU inverse. Returns
    /// `None` when no attempt yields positive variances.
    fn invert_hessian(hessian: &DMatrix<f64>) -> Option<DMatrix<f64>> {
        let n = hessian.nrows();
        let identity = DMatrix::identity(n, n);
        let diag_scale = (0..n).map(|i| hessian[(i, i)].abs()).fold(0.0_f64, f64::max).max(1.0);

        let mut damped = hessian.clone();
        let mut damping = 0.0_f64;
        for attempt in 0..10 {
            if let Some(chol) = nalgebra::linalg::Cholesky::new(damped.clone()) {
                return Some(chol.solve(&identity));
            }
            if attempt == 9 {
                break;
            }
            let next = if damping == 0.0 { diag_scale * 1e-9 } else { damping * 10.0 };
            let add = next - damping;
            for i in 0..n {
                damped[(i, i)] += add;
            }
            damping = next;
        }

        let cov = damped.lu().try_inverse()?;
        for i in 0..n {
            let v = cov[(i, i)];
            if !(v.is_finite() && v > 0.0) {
                return None;
            }
        }
        Some(cov)
    }

    fn diagonal_uncertainties(hessian: &DMatrix<f64>, n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let denom = hessian[(i, i)].abs().max(1e-12);
                1.0 / denom.sqrt()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Two independent Gaussians: NLL = Σ 0.5 ((x_i - c_i) / s_i)^2.
    struct TwoGaussians;

    impl LogDensityModel for TwoGaussians {
        fn dim(&self) -> usize {
            2
        }

        fn parameter_names(&self) -> Vec<String> {
            vec!["a".to_string(), "b".to_string()]
        }

        fn parameter_bounds(&self) -> Vec<(f64, f64)> {
            vec![(-10.0, 10.0), (-10.0, 10.0)]
        }

        fn parameter_init(&self) -> Vec<f64> {
            vec![0.0, 0.0]
        }

        fn nll(&self, params: &[f64]) -> Result<f64> {
            let a = (params[0] - 1.0) / 0.5;
            let b = (params[1] + 2.0) / 2.0;
            Ok(0.5 * (a * a + b * b))
        }
    }

    #[test]
    fn test_fit_minimum_finds_gaussian_means() {
        let mle = MaximumLikelihoodEstimator::new();
        let result = mle.fit_minimum(&TwoGaussians).unwrap();

        assert!(result.converged, "{}", result.message);
        assert_relative_eq!(result.parameters[0], 1.0, epsilon = 1e-4);
        assert_relative_eq!(result.parameters[1], -2.0, epsilon = 1e-4);
    }

    #[test]
    fn test_fit_recovers_gaussian_widths() {
        let mle = MaximumLikelihoodEstimator::new();
        let result = mle.fit(&TwoGaussians).unwrap();

        assert!(result.converged);
        // Uncertainties are the Gaussian widths; the Hessian is exact for
        // a quadratic NLL up to finite-difference noise.
        assert_relative_eq!(result.uncertainties[0], 0.5, epsilon = 1e-3);
        assert_relative_eq!(result.uncertainties[1], 2.0, epsilon = 1e-2);
        assert!(result.covariance.is_some());
        // Independent parameters: negligible correlation.
        assert!(result.correlation(0, 1).unwrap().abs() < 1e-3);
    }

    #[test]
    fn test_fit_minimum_from_rejects_bad_length() {
        let mle = MaximumLikelihoodEstimator::new();
        let err = mle.fit_minimum_from(&TwoGaussians, &[0.0]).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_warm_start_converges() {
        let mle = MaximumLikelihoodEstimator::new();
        let result = mle.fit_minimum_from(&TwoGaussians, &[0.9, -1.9]).unwrap();
        assert!(result.converged);
        assert_relative_eq!(result.parameters[0], 1.0, epsilon = 1e-4);
    }
}
