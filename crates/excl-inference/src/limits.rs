//! Upper-limit scans.
//!
//! Evaluates observed and expected CLs on a caller-supplied POI grid and
//! interpolates each curve's first downward crossing of the target
//! level. A grid that never crosses the level is a recoverable error
//! ([`Error::LimitOutOfRange`]): the caller widens the grid and retries.

use crate::hypotest::{AsymptoticCalculator, ScanState};
use crate::mle::MaximumLikelihoodEstimator;
use excl_core::{Error, Result};
use excl_model::CountingModel;
use serde::Serialize;

/// Observed and expected upper limits at a given CLs level.
#[derive(Debug, Clone, Serialize)]
pub struct UpperLimitResult {
    /// Target CLs level (alpha).
    pub alpha: f64,
    /// Observed upper limit on the POI.
    pub observed: f64,
    /// Expected upper limits `[-2σ, -1σ, median, +1σ, +2σ]`.
    pub expected: [f64; 5],
}

impl UpperLimitResult {
    /// Median expected upper limit.
    pub fn expected_median(&self) -> f64 {
        self.expected[2]
    }
}

/// First downward crossing of `alpha`, scanning from low to high POI.
///
/// CLs is expected to be non-increasing along the grid; numerical noise
/// can break that locally, in which case the first crossing wins. Returns
/// `None` when the curve never reaches `alpha`.
fn first_crossing(alpha: f64, xs: &[f64], ys: &[f64]) -> Option<f64> {
    for i in 0..xs.len().saturating_sub(1) {
        let y0 = ys[i];
        let y1 = ys[i + 1];
        if (y0 - alpha).abs() < 1e-18 {
            return Some(xs[i]);
        }
        if y0 > alpha && y1 <= alpha {
            if (y1 - y0).abs() < 1e-18 {
                return Some(xs[i + 1]);
            }
            let t = (alpha - y0) / (y1 - y0);
            return Some(xs[i] + t * (xs[i + 1] - xs[i]));
        }
    }
    None
}

/// Scan-based upper limits for a calculator with bound observations.
///
/// `scan` must be strictly increasing with at least two points. Each
/// point costs two conditional fits; consecutive fits are warm-started
/// from the previous converged point.
pub fn upper_limit_scan(
    calculator: &AsymptoticCalculator,
    mle: &MaximumLikelihoodEstimator,
    scan: &[f64],
    alpha: f64,
) -> Result<UpperLimitResult> {
    if scan.len() < 2 {
        return Err(Error::Validation("scan must have at least 2 points".to_string()));
    }
    if !(0.0 < alpha && alpha < 1.0) {
        return Err(Error::Validation(format!("alpha must be in (0, 1), got {}", alpha)));
    }
    if !scan.windows(2).all(|w| w[1] > w[0]) {
        return Err(Error::Validation("scan values must be strictly increasing".to_string()));
    }

    let mut observed_cls = Vec::with_capacity(scan.len());
    let mut expected_cls: Vec<[f64; 5]> = Vec::with_capacity(scan.len());
    let mut state = ScanState::default();
    for &mu in scan {
        let r = calculator.hypotest_warm(mle, mu, &mut state)?;
        observed_cls.push(r.cls);
        expected_cls.push(r.expected);
    }

    let lo = scan[0];
    let hi = scan[scan.len() - 1];
    let out_of_range = || Error::LimitOutOfRange { level: alpha, lo, hi };

    let observed = first_crossing(alpha, scan, &observed_cls).ok_or_else(out_of_range)?;

    let mut expected = [0.0; 5];
    for (j, slot) in expected.iter_mut().enumerate() {
        let band: Vec<f64> = expected_cls.iter().map(|b| b[j]).collect();
        *slot = first_crossing(alpha, scan, &band).ok_or_else(out_of_range)?;
    }

    Ok(UpperLimitResult { alpha, observed, expected })
}

/// Upper limits for a model and caller-supplied observations.
///
/// Binds `observations` (main bins concatenated with the model's implied
/// auxiliary data) and runs [`upper_limit_scan`] over `scan` at level
/// `alpha`.
pub fn upper_limit(
    model: &CountingModel,
    observations: &[f64],
    scan: &[f64],
    alpha: f64,
) -> Result<UpperLimitResult> {
    let data: Vec<f64> = observations.iter().copied().chain(model.auxdata()).collect();
    let model = model.with_observations(&data)?;
    let mle = MaximumLikelihoodEstimator::new();
    let calculator = AsymptoticCalculator::new(&mle, &model)?;
    upper_limit_scan(&calculator, &mle, scan, alpha)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hypotest::hypothesis_test;
    use excl_model::build_model;

    fn linspace(start: f64, stop: f64, points: usize) -> Vec<f64> {
        let step = (stop - start) / (points as f64 - 1.0);
        (0..points).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn test_first_crossing_interpolates() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 0.8, 0.4, 0.1];
        let x = first_crossing(0.6, &xs, &ys).unwrap();
        // Between x=1 (0.8) and x=2 (0.4): 0.6 sits midway.
        assert!((x - 1.5).abs() < 1e-12, "x = {x}");
    }

    #[test]
    fn test_first_crossing_picks_first_on_noise() {
        let xs = [0.0, 1.0, 2.0, 3.0];
        let ys = [1.0, 0.2, 0.8, 0.0];
        let x = first_crossing(0.5, &xs, &ys).unwrap();
        let expected = (0.5 - 1.0) / (0.2 - 1.0);
        assert!((x - expected).abs() < 1e-12, "x = {x}");
    }

    #[test]
    fn test_first_crossing_none_when_flat() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [1.0, 1.0, 1.0];
        assert!(first_crossing(0.05, &xs, &ys).is_none());
    }

    #[test]
    fn test_first_crossing_exact_grid_point() {
        let xs = [0.0, 1.0, 2.0];
        let ys = [1.0, 0.05, 0.01];
        let x = first_crossing(0.05, &xs, &ys).unwrap();
        assert!((x - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_strong_signal_limit_is_small() {
        let model = build_model(50.0, 100.0, 5.0).unwrap();
        let scan = linspace(0.0, 10.0, 101);
        let result = upper_limit(&model, &[100.0], &scan, 0.05).unwrap();

        assert!(result.observed > 0.0 && result.observed < 10.0);
        // 50 signal events against a ~10-event background fluctuation:
        // the limit lands well below mu=2.
        assert!(result.observed < 2.0, "observed limit = {}", result.observed);
        // Band limits are ordered like the band itself.
        for w in result.expected.windows(2) {
            assert!(w[0] <= w[1] + 1e-9, "expected limits not ordered: {:?}", result.expected);
        }
        assert!(result.expected_median() > 0.0);
    }

    #[test]
    fn test_limit_consistency_with_hypotest() {
        let model = build_model(10.0, 100.0, 10.0).unwrap();
        let scan = linspace(0.0, 10.0, 201);
        let result = upper_limit(&model, &[100.0], &scan, 0.05).unwrap();

        let check = hypothesis_test(&model, &[100.0], result.observed).unwrap();
        assert!(
            (check.cls - 0.05).abs() < 1e-2,
            "CLs at the limit should be near the level: {} at mu={}",
            check.cls,
            result.observed
        );
    }

    #[test]
    fn test_cls_is_approximately_monotonic() {
        let model = build_model(10.0, 100.0, 10.0).unwrap();
        let scan = linspace(0.0, 5.0, 11);
        let data: Vec<f64> = [100.0].iter().copied().chain(model.auxdata()).collect();
        let bound = model.with_observations(&data).unwrap();
        let mle = MaximumLikelihoodEstimator::new();
        let calculator = AsymptoticCalculator::new(&mle, &bound).unwrap();

        let mut state = ScanState::default();
        let mut previous = f64::INFINITY;
        for &mu in &scan {
            let cls = calculator.hypotest_warm(&mle, mu, &mut state).unwrap().cls;
            assert!(
                cls <= previous + 5e-3,
                "CLs should not increase along the scan: {cls} after {previous} at mu={mu}"
            );
            previous = cls;
        }
    }

    #[test]
    fn test_insensitive_scan_is_out_of_range() {
        // Negligible signal and a huge excess: CLs stays at 1 across the
        // default grid and no limit can be quoted.
        let model = build_model(0.001, 100.0, 10.0).unwrap();
        let scan = linspace(0.0, 10.0, 21);
        let err = upper_limit(&model, &[1000.0], &scan, 0.05).unwrap_err();
        match err {
            Error::LimitOutOfRange { level, lo, hi } => {
                assert!((level - 0.05).abs() < 1e-12);
                assert!((lo - 0.0).abs() < 1e-12);
                assert!((hi - 10.0).abs() < 1e-12);
            }
            other => panic!("expected LimitOutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_scan_validation() {
        let model = build_model(10.0, 100.0, 10.0).unwrap();
        assert!(matches!(
            upper_limit(&model, &[100.0], &[1.0], 0.05),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            upper_limit(&model, &[100.0], &[0.0, 1.0], 1.5),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            upper_limit(&model, &[100.0], &[1.0, 0.5], 0.05),
            Err(Error::Validation(_))
        ));
    }
}
