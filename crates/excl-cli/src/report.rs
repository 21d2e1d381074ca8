//! Analysis report: serializable results plus the text rendering.

use excl_core::FitResult;
use excl_inference::{HypotestResult, UpperLimitResult};
use serde::Serialize;

/// Input configuration echoed into the report.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisConfig {
    pub signal: f64,
    pub background: f64,
    pub bkg_uncertainty: f64,
    pub observed: f64,
    pub poi_test: f64,
    pub scan_min: f64,
    pub scan_max: f64,
    pub scan_steps: usize,
    pub level: f64,
}

/// Status of the upper-limit section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitStatus {
    /// The scan produced observed and expected limits.
    Ok,
    /// CLs never crossed the level inside the scanned range.
    OutsideScanRange,
}

/// Full result of the `run` workflow.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub config: AnalysisConfig,
    /// Parameter names, in fit order.
    pub parameters: Vec<String>,
    /// Unconditional fit to the observed data.
    pub best_fit: FitResult,
    /// Hypothesis test at `config.poi_test`.
    pub hypotest: HypotestResult,
    pub limit_status: LimitStatus,
    /// Upper limits; absent when the scan never crossed the level.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upper_limit: Option<UpperLimitResult>,
}

const BAND_LABELS: [&str; 5] = ["-2 sigma", "-1 sigma", "median  ", "+1 sigma", "+2 sigma"];

/// Render the human-readable console report.
pub fn render_text(report: &AnalysisReport) -> String {
    let cfg = &report.config;
    let cl_percent = 100.0 * (1.0 - cfg.level);
    let mut out = String::new();
    let rule = "=".repeat(60);
    let thin = "-".repeat(60);

    out.push_str(&rule);
    out.push_str("\nCLs limit setting\n");
    out.push_str(&rule);
    out.push_str("\n\nModel configuration:\n");
    out.push_str(&format!("  observed events:      {}\n", cfg.observed));
    out.push_str(&format!(
        "  expected background:  {} +/- {}\n",
        cfg.background, cfg.bkg_uncertainty
    ));
    out.push_str(&format!("  expected signal:      {}\n", cfg.signal));
    out.push_str(&format!("  parameters:           {}\n", report.parameters.join(", ")));

    if let (Some(mu_hat), Some(mu_err)) =
        (report.best_fit.parameters.first(), report.best_fit.uncertainties.first())
    {
        out.push_str(&format!("  best-fit mu:          {:.3} +/- {:.3}\n", mu_hat, mu_err));
    }

    out.push('\n');
    out.push_str(&thin);
    out.push_str(&format!("\nHypothesis test (mu = {})\n", cfg.poi_test));
    out.push_str(&thin);
    out.push_str(&format!("\n\n  CLs observed:        {:.4}\n", report.hypotest.cls));
    out.push_str("\n  CLs expected band:\n");
    for (label, value) in BAND_LABELS.iter().zip(report.hypotest.expected.iter()) {
        out.push_str(&format!("    {}:          {:.4}\n", label, value));
    }
    if report.hypotest.cls < cfg.level {
        out.push_str(&format!(
            "\n  signal hypothesis EXCLUDED at {:.0}% CL (CLs < {})\n",
            cl_percent, cfg.level
        ));
    } else {
        out.push_str(&format!(
            "\n  signal hypothesis NOT excluded at {:.0}% CL (CLs >= {})\n",
            cl_percent, cfg.level
        ));
    }

    out.push('\n');
    out.push_str(&thin);
    out.push_str(&format!("\nUpper limit ({:.0}% CL)\n", cl_percent));
    out.push_str(&thin);
    out.push('\n');
    match &report.upper_limit {
        Some(limit) => {
            out.push_str(&format!(
                "\n  observed upper limit on mu: {:.3}\n",
                limit.observed
            ));
            out.push_str(&format!(
                "  median expected:            {:.3}\n",
                limit.expected_median()
            ));
        }
        None => {
            out.push_str(&format!(
                "\n  CLs does not cross {} within the scanned range [{}, {}];\n",
                cfg.level, cfg.scan_min, cfg.scan_max
            ));
            out.push_str("  widen the scan to quote an upper limit\n");
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_report(upper_limit: Option<UpperLimitResult>) -> AnalysisReport {
        let limit_status =
            if upper_limit.is_some() { LimitStatus::Ok } else { LimitStatus::OutsideScanRange };
        AnalysisReport {
            config: AnalysisConfig {
                signal: 10.0,
                background: 100.0,
                bkg_uncertainty: 10.0,
                observed: 100.0,
                poi_test: 1.0,
                scan_min: 0.0,
                scan_max: 10.0,
                scan_steps: 21,
                level: 0.05,
            },
            parameters: vec!["mu".to_string(), "bkg_uncertainty[0]".to_string()],
            best_fit: FitResult::new(vec![0.0, 1.0], vec![0.8, 0.1], 3.1, true, 40),
            hypotest: HypotestResult {
                mu_test: 1.0,
                cls: 0.37,
                clsb: 0.18,
                clb: 0.5,
                q_mu: 0.8,
                q_mu_a: 0.8,
                mu_hat: 0.0,
                expected: [0.02, 0.08, 0.23, 0.5, 0.8],
            },
            limit_status,
            upper_limit,
        }
    }

    #[test]
    fn test_text_report_mentions_cls_and_verdict() {
        let text = render_text(&dummy_report(Some(UpperLimitResult {
            alpha: 0.05,
            observed: 3.2,
            expected: [1.5, 2.0, 2.9, 4.0, 5.4],
        })));
        assert!(text.contains("CLs observed:        0.3700"));
        assert!(text.contains("NOT excluded at 95% CL"));
        assert!(text.contains("observed upper limit on mu: 3.200"));
        assert!(text.contains("median expected:            2.900"));
    }

    #[test]
    fn test_text_report_degrades_gracefully() {
        let text = render_text(&dummy_report(None));
        assert!(text.contains("does not cross 0.05 within the scanned range [0, 10]"));
        assert!(text.contains("widen the scan"));
    }

    #[test]
    fn test_json_report_skips_missing_limit() {
        let value = serde_json::to_value(dummy_report(None)).unwrap();
        assert!(value.get("upper_limit").is_none());
        assert_eq!(value["limit_status"], "outside_scan_range");
    }
}
