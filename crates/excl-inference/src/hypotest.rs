//! Asymptotic CLs hypothesis tests.
//!
//! Implements the qtilde test statistic with the standard asymptotic
//! approximation: the profile likelihood ratio is mapped to
//! `-muhat/sigma` space, where the background-only and signal-plus-
//! background distributions are unit normals, so p-values and the
//! expected "Brazil band" follow from normal quantiles without
//! pseudo-experiments.

use crate::mle::MaximumLikelihoodEstimator;
use excl_core::traits::LogDensityModel;
use excl_core::{Error, Result};
use excl_model::CountingModel;
use serde::Serialize;

/// Expected-band quantiles in `-muhat/sigma` space.
///
/// Index 0 corresponds to the -2σ band edge (background fluctuates down,
/// smallest CLs), index 4 to +2σ.
pub const NSIGMA_ORDER: [f64; 5] = [2.0, 1.0, 0.0, -1.0, -2.0];

const CLB_MIN: f64 = 1e-300;

fn normal_cdf(x: f64) -> f64 {
    // Φ(x) = 0.5 * erfc(-x / sqrt(2)); erfc keeps the far tails accurate.
    0.5 * statrs::function::erf::erfc(-x / std::f64::consts::SQRT_2)
}

#[inline]
fn safe_cls(clsb: f64, clb: f64) -> f64 {
    // CLb can underflow to 0 in the far tails; there CLsb underflows too
    // and the physically meaningful ratio tends to 0.
    if !(clsb.is_finite() && clb.is_finite()) {
        return 0.0;
    }
    if clb <= CLB_MIN {
        return if clsb <= CLB_MIN { 0.0 } else { 1.0 };
    }
    (clsb / clb).clamp(0.0, 1.0)
}

/// Expected CLs band for a given Asimov `sqrt(q_mu,A)`, ordered
/// `[-2σ, -1σ, median, +1σ, +2σ]`.
pub fn expected_cls_band(sqrtq_a: f64) -> [f64; 5] {
    let mut out = [0.0; 5];
    for (i, t) in NSIGMA_ORDER.into_iter().enumerate() {
        let clsb = normal_cdf(-(t + sqrtq_a));
        let clb = normal_cdf(-t);
        out[i] = safe_cls(clsb, clb);
    }
    out
}

/// Result of an asymptotic CLs test at a single POI value.
#[derive(Debug, Clone, Serialize)]
pub struct HypotestResult {
    /// Tested POI value.
    pub mu_test: f64,
    /// Observed CLs.
    pub cls: f64,
    /// Observed CLs+b.
    pub clsb: f64,
    /// Observed CLb.
    pub clb: f64,
    /// Observed qtilde value.
    pub q_mu: f64,
    /// Asimov qtilde value.
    pub q_mu_a: f64,
    /// Unconditional best-fit POI on the observed data.
    pub mu_hat: f64,
    /// Expected CLs band `[-2σ, -1σ, median, +1σ, +2σ]`.
    pub expected: [f64; 5],
}

/// Warm-start cache for conditional fits across an ordered POI scan.
#[derive(Debug, Clone, Default)]
pub struct ScanState {
    data_params: Option<Vec<f64>>,
    asimov_params: Option<Vec<f64>>,
}

/// Asymptotic CLs calculator.
///
/// Construction performs and caches the expensive pieces: the free fit to
/// the observed data and the background-only Asimov dataset with its own
/// free fit. Each [`hypotest`](Self::hypotest) call then needs only the
/// two conditional fits at the tested POI.
#[derive(Debug, Clone)]
pub struct AsymptoticCalculator {
    poi: usize,
    data_model: CountingModel,
    asimov_model: CountingModel,
    free_data_nll: f64,
    free_data_mu_hat: f64,
    free_asimov_nll: f64,
    free_asimov_mu_hat: f64,
}

impl AsymptoticCalculator {
    /// Build the calculator for a model with bound observations.
    ///
    /// The Asimov dataset is built for the background-only hypothesis:
    /// nuisances are fitted with the POI fixed at 0, the observed main
    /// bins are replaced by the resulting expectation, and the Gaussian
    /// constraints are re-centered at the fitted nuisance values.
    pub fn new(mle: &MaximumLikelihoodEstimator, model: &CountingModel) -> Result<Self> {
        let poi = model
            .poi_index()
            .ok_or_else(|| Error::InvalidModel("model has no parameter of interest".to_string()))?;

        let free_data = mle.fit_minimum(model)?;
        if !free_data.converged {
            return Err(Error::FitConvergence(format!(
                "free fit on observed data: {} (n_iter={}, n_fev={})",
                free_data.message, free_data.n_iter, free_data.n_fev
            )));
        }
        let free_data_nll = free_data.fval;
        let free_data_mu_hat = free_data.parameters[poi];

        let fixed0 = mle.fit_minimum(&model.with_fixed_param(poi, 0.0))?;
        if !fixed0.converged {
            return Err(Error::FitConvergence(format!(
                "background-only fit for the Asimov dataset: {} (n_iter={}, n_fev={})",
                fixed0.message, fixed0.n_iter, fixed0.n_fev
            )));
        }
        let expected_main = model.expected_data(&fixed0.parameters)?;
        let asimov_model = model
            .with_observed_main(&expected_main)?
            .with_constraint_centers(&fixed0.parameters)?;

        let free_asimov = mle.fit_minimum(&asimov_model)?;
        if !free_asimov.converged {
            return Err(Error::FitConvergence(format!(
                "free fit on the Asimov dataset: {} (n_iter={}, n_fev={})",
                free_asimov.message, free_asimov.n_iter, free_asimov.n_fev
            )));
        }

        Ok(Self {
            poi,
            data_model: model.clone(),
            asimov_model,
            free_data_nll,
            free_data_mu_hat,
            free_asimov_nll: free_asimov.fval,
            free_asimov_mu_hat: free_asimov.parameters[poi],
        })
    }

    /// Conditional qtilde: profile likelihood ratio with the POI fixed,
    /// one-sided (zero when the best fit prefers more signal than tested).
    fn conditional_qmu(
        &self,
        mle: &MaximumLikelihoodEstimator,
        model: &CountingModel,
        free_nll: f64,
        free_mu_hat: f64,
        mu_test: f64,
        warm: &mut Option<Vec<f64>>,
    ) -> Result<f64> {
        let fixed = model.with_fixed_param(self.poi, mu_test);
        let init = match warm {
            Some(params) => {
                let mut p = params.clone();
                if self.poi < p.len() {
                    p[self.poi] = mu_test;
                }
                p
            }
            None => fixed.parameter_init(),
        };

        let result = mle.fit_minimum_from(&fixed, &init)?;
        if result.converged {
            // Only warm-start from converged fits; a bad point can
            // destabilize the rest of the scan.
            *warm = Some(result.parameters.clone());
        } else {
            log::warn!(
                "conditional fit did not converge at mu_test={}: {} (continuing with best found)",
                mu_test,
                result.message
            );
        }

        let llr = 2.0 * (result.fval - free_nll);
        let mut q = llr.max(0.0);
        if free_mu_hat > mu_test {
            q = 0.0;
        }
        Ok(q)
    }

    /// Asymptotic CLs at `mu_test`, with the expected band.
    pub fn hypotest(
        &self,
        mle: &MaximumLikelihoodEstimator,
        mu_test: f64,
    ) -> Result<HypotestResult> {
        self.hypotest_warm(mle, mu_test, &mut ScanState::default())
    }

    /// Like [`hypotest`](Self::hypotest), but warm-starting the
    /// conditional fits from `state` (updated in place). Intended for
    /// ordered scans where consecutive POI values are highly correlated.
    pub fn hypotest_warm(
        &self,
        mle: &MaximumLikelihoodEstimator,
        mu_test: f64,
        state: &mut ScanState,
    ) -> Result<HypotestResult> {
        let q_mu = self.conditional_qmu(
            mle,
            &self.data_model,
            self.free_data_nll,
            self.free_data_mu_hat,
            mu_test,
            &mut state.data_params,
        )?;
        let q_mu_a = self.conditional_qmu(
            mle,
            &self.asimov_model,
            self.free_asimov_nll,
            self.free_asimov_mu_hat,
            mu_test,
            &mut state.asimov_params,
        )?;

        let sqrtq = q_mu.sqrt();
        let sqrtq_a = q_mu_a.sqrt();

        // qtilde transformation to -muhat/sigma space.
        let teststat = if sqrtq <= sqrtq_a {
            sqrtq - sqrtq_a
        } else {
            (q_mu - q_mu_a) / (2.0 * sqrtq_a.max(1e-16))
        };

        let clsb = normal_cdf(-(teststat + sqrtq_a));
        let clb = normal_cdf(-teststat);
        let cls = safe_cls(clsb, clb);

        Ok(HypotestResult {
            mu_test,
            cls,
            clsb,
            clb,
            q_mu,
            q_mu_a,
            mu_hat: self.free_data_mu_hat,
            expected: expected_cls_band(sqrtq_a),
        })
    }
}

/// Asymptotic CLs test for a model and caller-supplied observations.
///
/// `observations` holds the observed main-bin counts; the full
/// observation vector is their concatenation with the model's implied
/// auxiliary data. A wrong length fails with
/// [`Error::DimensionMismatch`].
pub fn hypothesis_test(
    model: &CountingModel,
    observations: &[f64],
    poi_test: f64,
) -> Result<HypotestResult> {
    let data: Vec<f64> = observations.iter().copied().chain(model.auxdata()).collect();
    let model = model.with_observations(&data)?;
    let mle = MaximumLikelihoodEstimator::new();
    let calculator = AsymptoticCalculator::new(&mle, &model)?;
    calculator.hypotest(&mle, poi_test)
}
