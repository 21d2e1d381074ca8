//! Counting-experiment model builders.
//!
//! The classic single-bin counting setup: one channel, a signal sample
//! scaled by a free `mu` normfactor, and a background sample whose
//! statistical uncertainty is constrained by an auxiliary measurement.

use crate::model::CountingModel;
use crate::schema::{
    Channel, Measurement, MeasurementConfig, Modifier, Observation, Sample, Workspace,
};
use excl_core::{Error, Result};

fn require_non_negative(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() {
        return Err(Error::InvalidModel(format!("{} must be finite, got {}", name, value)));
    }
    if value < 0.0 {
        return Err(Error::InvalidModel(format!("{} must be non-negative, got {}", name, value)));
    }
    Ok(())
}

/// Build the single-bin counting workspace specification.
///
/// The returned document serializes to the standard channels → samples →
/// modifiers JSON schema and can be fed to any fitting tool speaking
/// that convention.
///
/// # Errors
/// [`Error::InvalidModel`] if any yield is negative or non-finite, or if
/// `bkg_uncertainty` is zero (a singular staterror constraint).
pub fn counting_workspace(
    signal: f64,
    background: f64,
    bkg_uncertainty: f64,
    observed: f64,
) -> Result<Workspace> {
    require_non_negative("signal", signal)?;
    require_non_negative("background", background)?;
    require_non_negative("bkg_uncertainty", bkg_uncertainty)?;
    require_non_negative("observed", observed)?;
    if bkg_uncertainty == 0.0 {
        return Err(Error::InvalidModel(
            "bkg_uncertainty must be positive: a zero-width staterror constraint is degenerate"
                .to_string(),
        ));
    }

    Ok(Workspace {
        channels: vec![Channel {
            name: "singlechannel".to_string(),
            samples: vec![
                Sample {
                    name: "signal".to_string(),
                    data: vec![signal],
                    modifiers: vec![Modifier::NormFactor { name: "mu".to_string(), data: None }],
                },
                Sample {
                    name: "background".to_string(),
                    data: vec![background],
                    modifiers: vec![Modifier::StatError {
                        name: "bkg_uncertainty".to_string(),
                        data: vec![bkg_uncertainty],
                    }],
                },
            ],
        }],
        observations: vec![Observation {
            name: "singlechannel".to_string(),
            data: vec![observed],
        }],
        measurements: vec![Measurement {
            name: "Measurement".to_string(),
            config: MeasurementConfig { poi: "mu".to_string(), parameters: vec![] },
        }],
        version: Some("1.0.0".to_string()),
    })
}

/// Build and compile the single-bin counting model.
///
/// Observed data defaults to the background-only expectation; analysis
/// entry points rebind observations from caller-supplied vectors.
pub fn build_model(signal: f64, background: f64, bkg_uncertainty: f64) -> Result<CountingModel> {
    let ws = counting_workspace(signal, background, bkg_uncertainty, background)?;
    CountingModel::from_workspace(&ws)
}
