//! Compiled counting model.
//!
//! Converts a [`Workspace`] specification into the internal form used by
//! inference: a flat, ordered parameter vector (POI first), channels with
//! modifier references resolved to parameter indices, and bound observed
//! data. The negative log-likelihood is a product of per-bin Poisson
//! terms and Gaussian constraint terms for the constrained nuisances.

use crate::schema::{Modifier, Workspace};
use excl_core::traits::{FixedParamModel, LogDensityModel, PoiModel};
use excl_core::{Error, Result};
use statrs::function::gamma::ln_gamma;
use std::collections::HashMap;

/// Expectations are floored at this value so empty bins stay finite in
/// the Poisson log-term.
const EXPECTED_FLOOR: f64 = 1e-10;

const POI_BOUNDS: (f64, f64) = (0.0, 10.0);
const GAMMA_BOUNDS: (f64, f64) = (1e-10, 10.0);
const ALPHA_BOUNDS: (f64, f64) = (-5.0, 5.0);

/// Compiled statistical model for one or more counting channels.
#[derive(Debug, Clone)]
pub struct CountingModel {
    parameters: Vec<Parameter>,
    poi_index: Option<usize>,
    channels: Vec<ModelChannel>,
}

/// Fit parameter derived from the workspace modifiers.
#[derive(Debug, Clone)]
pub struct Parameter {
    /// Parameter name (indexed names like `stat[0]` for per-bin nuisances).
    pub name: String,
    /// Suggested initial value.
    pub init: f64,
    /// Search bounds (min, max).
    pub bounds: (f64, f64),
    /// Whether the parameter carries a Gaussian constraint.
    pub constrained: bool,
    /// Constraint center (auxiliary measurement value).
    pub constraint_center: Option<f64>,
    /// Constraint width.
    pub constraint_width: Option<f64>,
}

#[derive(Debug, Clone)]
struct ModelChannel {
    name: String,
    samples: Vec<ModelSample>,
    /// Observed main-bin counts; auxiliary data lives in the constraint centers.
    observed: Vec<f64>,
}

#[derive(Debug, Clone)]
struct ModelSample {
    nominal: Vec<f64>,
    modifiers: Vec<ModelModifier>,
}

#[derive(Debug, Clone)]
enum ModelModifier {
    /// Free multiplicative normalization.
    NormFactor { param_idx: usize },
    /// Normalization uncertainty, exponential interpolation between hi/lo.
    NormSys { param_idx: usize, hi: f64, lo: f64 },
    /// Per-bin statistical uncertainty (one gamma parameter per bin).
    StatError { param_indices: Vec<usize> },
}

/// Exponential interpolation for normsys: positive and multiplicative
/// for the whole alpha range.
fn normsys_factor(alpha: f64, hi: f64, lo: f64) -> f64 {
    if alpha >= 0.0 {
        hi.powf(alpha)
    } else {
        lo.powf(-alpha)
    }
}

impl CountingModel {
    /// Compile a workspace specification.
    pub fn from_workspace(ws: &Workspace) -> Result<Self> {
        let mut parameters: Vec<Parameter> = Vec::new();
        let mut param_map: HashMap<String, usize> = HashMap::new();

        // Per-staterror sums used to derive the relative constraint width.
        struct StatErrorAccum {
            sum_nominal: Vec<f64>,
            sum_uncert_sq: Vec<f64>,
        }
        let mut staterror_accum: HashMap<String, StatErrorAccum> = HashMap::new();

        let poi_name = ws.measurements.first().map(|m| m.config.poi.as_str()).unwrap_or("mu");

        // POI is always parameter 0.
        param_map.insert(poi_name.to_string(), 0);
        parameters.push(Parameter {
            name: poi_name.to_string(),
            init: 1.0,
            bounds: POI_BOUNDS,
            constrained: false,
            constraint_center: None,
            constraint_width: None,
        });
        let poi_index = Some(0);

        // First pass: collect parameters from modifiers.
        for channel in &ws.channels {
            for sample in &channel.samples {
                for modifier in &sample.modifiers {
                    match modifier {
                        Modifier::NormFactor { name, .. } => {
                            if !param_map.contains_key(name) {
                                param_map.insert(name.clone(), parameters.len());
                                parameters.push(Parameter {
                                    name: name.clone(),
                                    init: 1.0,
                                    bounds: POI_BOUNDS,
                                    constrained: false,
                                    constraint_center: None,
                                    constraint_width: None,
                                });
                            }
                        }
                        Modifier::NormSys { name, data } => {
                            if !(data.hi > 0.0 && data.lo > 0.0) {
                                return Err(Error::InvalidModel(format!(
                                    "normsys '{}' factors must be positive, got hi={} lo={}",
                                    name, data.hi, data.lo
                                )));
                            }
                            if !param_map.contains_key(name) {
                                param_map.insert(name.clone(), parameters.len());
                                parameters.push(Parameter {
                                    name: name.clone(),
                                    init: 0.0,
                                    bounds: ALPHA_BOUNDS,
                                    constrained: true,
                                    constraint_center: Some(0.0),
                                    constraint_width: Some(1.0),
                                });
                            }
                        }
                        Modifier::StatError { name, data } => {
                            // One gamma parameter per bin.
                            for bin_idx in 0..data.len() {
                                let param_name = format!("{}[{}]", name, bin_idx);
                                if !param_map.contains_key(&param_name) {
                                    param_map.insert(param_name.clone(), parameters.len());
                                    parameters.push(Parameter {
                                        name: param_name,
                                        init: 1.0,
                                        bounds: GAMMA_BOUNDS,
                                        constrained: true,
                                        constraint_center: Some(1.0),
                                        // Width filled in once all samples are seen.
                                        constraint_width: Some(1.0),
                                    });
                                }
                            }

                            let entry = staterror_accum.entry(name.clone()).or_insert_with(|| {
                                StatErrorAccum {
                                    sum_nominal: vec![0.0; data.len()],
                                    sum_uncert_sq: vec![0.0; data.len()],
                                }
                            });
                            if entry.sum_nominal.len() != data.len() {
                                return Err(Error::InvalidModel(format!(
                                    "staterror '{}' bin length mismatch: {} != {}",
                                    name,
                                    entry.sum_nominal.len(),
                                    data.len()
                                )));
                            }
                            if data.len() != sample.data.len() {
                                return Err(Error::InvalidModel(format!(
                                    "staterror '{}' has {} uncertainties for {} bins",
                                    name,
                                    data.len(),
                                    sample.data.len()
                                )));
                            }
                            for (bin_idx, (sigma_abs, nominal)) in
                                data.iter().zip(&sample.data).enumerate()
                            {
                                entry.sum_nominal[bin_idx] += *nominal;
                                entry.sum_uncert_sq[bin_idx] += sigma_abs * sigma_abs;
                            }
                        }
                    }
                }
            }
        }

        // Relative staterror widths: sqrt(sum sigma^2) / sum nominal per bin.
        // A vanishing width would be a singular constraint.
        for (name, accum) in staterror_accum {
            for bin_idx in 0..accum.sum_nominal.len() {
                let denom = accum.sum_nominal[bin_idx];
                let sigma_rel =
                    if denom > 0.0 { accum.sum_uncert_sq[bin_idx].sqrt() / denom } else { 0.0 };
                if sigma_rel <= 0.0 {
                    return Err(Error::InvalidModel(format!(
                        "staterror '{}' is degenerate in bin {} (zero uncertainty)",
                        name, bin_idx
                    )));
                }

                let param_name = format!("{}[{}]", name, bin_idx);
                if let Some(&pidx) = param_map.get(&param_name) {
                    parameters[pidx].constraint_width = Some(sigma_rel);
                }
            }
        }

        // Measurement overrides: scalar inits/bounds broadcast across
        // indexed parameters.
        if let Some(measurement) = ws.measurements.first() {
            for cfg in &measurement.config.parameters {
                for param in parameters.iter_mut() {
                    let matches = param.name == cfg.name
                        || param
                            .name
                            .strip_prefix(cfg.name.as_str())
                            .map(|rest| rest.starts_with('[') && rest.ends_with(']'))
                            .unwrap_or(false);
                    if !matches {
                        continue;
                    }
                    if let Some(&init) = cfg.inits.first() {
                        param.init = init;
                    }
                    if let Some(b) = cfg.bounds.first() {
                        param.bounds = (b[0], b[1]);
                    }
                }
            }
        }

        // Second pass: build channels with resolved parameter indices.
        let mut channels = Vec::new();
        for ws_channel in &ws.channels {
            let observed = ws
                .observations
                .iter()
                .find(|o| o.name == ws_channel.name)
                .ok_or_else(|| {
                    Error::InvalidModel(format!(
                        "workspace missing observations for channel '{}'",
                        ws_channel.name
                    ))
                })?
                .data
                .clone();

            let n_bins = ws_channel.samples.first().map(|s| s.data.len()).unwrap_or(0);
            if n_bins == 0 {
                return Err(Error::InvalidModel(format!(
                    "channel '{}' has no bins (empty sample data)",
                    ws_channel.name
                )));
            }
            if observed.len() != n_bins {
                return Err(Error::InvalidModel(format!(
                    "channel '{}' observations length mismatch: expected {}, got {}",
                    ws_channel.name,
                    n_bins,
                    observed.len()
                )));
            }

            let mut samples = Vec::new();
            for ws_sample in &ws_channel.samples {
                if ws_sample.data.len() != n_bins {
                    return Err(Error::InvalidModel(format!(
                        "channel '{}' sample '{}' bin length mismatch: expected {}, got {}",
                        ws_channel.name,
                        ws_sample.name,
                        n_bins,
                        ws_sample.data.len()
                    )));
                }

                let mut modifiers = Vec::new();
                for ws_modifier in &ws_sample.modifiers {
                    match ws_modifier {
                        Modifier::NormFactor { name, .. } => {
                            if let Some(&idx) = param_map.get(name) {
                                modifiers.push(ModelModifier::NormFactor { param_idx: idx });
                            }
                        }
                        Modifier::NormSys { name, data } => {
                            if let Some(&idx) = param_map.get(name) {
                                modifiers.push(ModelModifier::NormSys {
                                    param_idx: idx,
                                    hi: data.hi,
                                    lo: data.lo,
                                });
                            }
                        }
                        Modifier::StatError { name, data } => {
                            let mut param_indices = Vec::with_capacity(data.len());
                            for bin_idx in 0..data.len() {
                                let param_name = format!("{}[{}]", name, bin_idx);
                                if let Some(&idx) = param_map.get(&param_name) {
                                    param_indices.push(idx);
                                }
                            }
                            modifiers.push(ModelModifier::StatError { param_indices });
                        }
                    }
                }

                samples.push(ModelSample { nominal: ws_sample.data.clone(), modifiers });
            }

            channels.push(ModelChannel { name: ws_channel.name.clone(), samples, observed });
        }

        // Keep the flattened data vector deterministic across input orderings.
        channels.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(Self { parameters, poi_index, channels })
    }

    fn validate_params_len(&self, got: usize) -> Result<()> {
        let expected = self.parameters.len();
        if got != expected {
            return Err(Error::Validation(format!(
                "parameter length mismatch: expected {}, got {}",
                expected, got
            )));
        }
        Ok(())
    }

    /// Number of fit parameters.
    pub fn n_params(&self) -> usize {
        self.parameters.len()
    }

    /// Index of the parameter of interest.
    pub fn poi_index(&self) -> Option<usize> {
        self.poi_index
    }

    /// Fit parameters, in parameter order.
    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    /// Total number of main (primary) bins across channels.
    pub fn n_main_bins(&self) -> usize {
        self.channels.iter().map(|c| c.observed.len()).sum()
    }

    /// Auxiliary data implied by the constrained modifiers: the constraint
    /// centers, in parameter order.
    pub fn auxdata(&self) -> Vec<f64> {
        self.parameters
            .iter()
            .filter_map(|p| if p.constrained { p.constraint_center } else { None })
            .collect()
    }

    /// Expected length of the full observation vector (main bins plus
    /// auxiliary entries).
    pub fn data_len(&self) -> usize {
        self.n_main_bins() + self.auxdata().len()
    }

    /// Copy of the model with one parameter pinned to a value.
    ///
    /// Bounds are clamped to the value so the optimizer cannot move it.
    pub fn with_fixed_param(&self, param_idx: usize, value: f64) -> Self {
        let mut out = self.clone();
        if let Some(p) = out.parameters.get_mut(param_idx) {
            p.init = value;
            p.bounds = (value, value);
        }
        out
    }

    /// Copy of the model with overridden observed main-bin data.
    ///
    /// `observed_main` must be the flat concatenation of per-channel main
    /// bins (channels in name order), without auxiliary entries.
    pub fn with_observed_main(&self, observed_main: &[f64]) -> Result<Self> {
        let expected = self.n_main_bins();
        if observed_main.len() != expected {
            return Err(Error::DimensionMismatch { expected, got: observed_main.len() });
        }

        let mut out = self.clone();
        let mut offset = 0;
        for channel in &mut out.channels {
            let n_bins = channel.observed.len();
            channel.observed.clear();
            channel.observed.extend_from_slice(&observed_main[offset..offset + n_bins]);
            offset += n_bins;
        }
        Ok(out)
    }

    /// Copy of the model with the Gaussian constraint centers replaced by
    /// the given parameter values.
    ///
    /// Used to build Asimov datasets: the auxiliary "observations" become
    /// the fitted nuisance values, removing pulls while keeping widths.
    pub fn with_constraint_centers(&self, centers: &[f64]) -> Result<Self> {
        self.validate_params_len(centers.len())?;

        let mut out = self.clone();
        for (i, p) in out.parameters.iter_mut().enumerate() {
            if p.constrained && p.constraint_center.is_some() {
                p.constraint_center = Some(centers[i]);
            }
        }
        Ok(out)
    }

    /// Copy of the model with a full observation vector bound.
    ///
    /// `data` is the observed main bins concatenated with the auxiliary
    /// entries (one per constrained parameter, in parameter order). Any
    /// other length is rejected.
    pub fn with_observations(&self, data: &[f64]) -> Result<Self> {
        let n_main = self.n_main_bins();
        let expected = self.data_len();
        if data.len() != expected {
            return Err(Error::DimensionMismatch { expected, got: data.len() });
        }

        let mut out = self.with_observed_main(&data[..n_main])?;
        let mut aux = data[n_main..].iter().copied();
        for p in out.parameters.iter_mut() {
            if p.constrained && p.constraint_center.is_some() {
                let value = aux.next().ok_or_else(|| {
                    Error::Computation("auxiliary data exhausted while binding observations".into())
                })?;
                p.constraint_center = Some(value);
            }
        }
        Ok(out)
    }

    /// Expected main-bin counts at the given parameter values, flattened
    /// across channels (name order).
    pub fn expected_data(&self, params: &[f64]) -> Result<Vec<f64>> {
        self.validate_params_len(params.len())?;

        let get = |idx: usize| -> Result<f64> {
            params.get(idx).copied().ok_or_else(|| {
                Error::Validation(format!(
                    "modifier parameter index out of range: idx={} len={}",
                    idx,
                    params.len()
                ))
            })
        };

        let mut result = Vec::with_capacity(self.n_main_bins());
        for channel in &self.channels {
            let n_bins = channel.observed.len();
            let mut acc = vec![0.0; n_bins];

            for sample in &channel.samples {
                let mut factors = vec![1.0; n_bins];
                for modifier in &sample.modifiers {
                    match modifier {
                        ModelModifier::NormFactor { param_idx } => {
                            let norm = get(*param_idx)?;
                            for f in &mut factors {
                                *f *= norm;
                            }
                        }
                        ModelModifier::NormSys { param_idx, hi, lo } => {
                            let alpha = get(*param_idx)?;
                            let factor = normsys_factor(alpha, *hi, *lo);
                            for f in &mut factors {
                                *f *= factor;
                            }
                        }
                        ModelModifier::StatError { param_indices } => {
                            for (bin_idx, &idx) in param_indices.iter().enumerate() {
                                if bin_idx < factors.len() {
                                    factors[bin_idx] *= get(idx)?;
                                }
                            }
                        }
                    }
                }
                for (slot, (&nominal, &factor)) in
                    acc.iter_mut().zip(sample.nominal.iter().zip(factors.iter()))
                {
                    *slot += nominal * factor;
                }
            }
            result.extend(acc);
        }
        Ok(result)
    }

    /// Negative log-likelihood at the given parameter values.
    ///
    /// Poisson terms over the main bins plus Gaussian constraint terms
    /// (including normalization constants, so values are comparable
    /// across models).
    pub fn nll(&self, params: &[f64]) -> Result<f64> {
        self.validate_params_len(params.len())?;
        let expected = self.expected_data(params)?;

        let mut nll = 0.0;
        let mut bin_idx = 0;
        for channel in &self.channels {
            for &obs in &channel.observed {
                let exp = expected[bin_idx].max(EXPECTED_FLOOR);
                nll += exp;
                if obs > 0.0 {
                    nll += ln_gamma(obs + 1.0) - obs * exp.ln();
                }
                bin_idx += 1;
            }
        }

        for (idx, param) in self.parameters.iter().enumerate() {
            if !param.constrained {
                continue;
            }
            if let (Some(center), Some(width)) =
                (param.constraint_center, param.constraint_width)
            {
                if width > 0.0 {
                    let pull = (params[idx] - center) / width;
                    nll += 0.5 * pull * pull
                        + width.ln()
                        + 0.5 * (2.0 * std::f64::consts::PI).ln();
                }
            }
        }

        Ok(nll)
    }
}

impl LogDensityModel for CountingModel {
    fn dim(&self) -> usize {
        self.n_params()
    }

    fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }

    fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        self.parameters.iter().map(|p| p.bounds).collect()
    }

    fn parameter_init(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.init).collect()
    }

    fn nll(&self, params: &[f64]) -> Result<f64> {
        CountingModel::nll(self, params)
    }
}

impl PoiModel for CountingModel {
    fn poi_index(&self) -> Option<usize> {
        CountingModel::poi_index(self)
    }
}

impl FixedParamModel for CountingModel {
    fn with_fixed_param(&self, param_idx: usize, value: f64) -> Self {
        CountingModel::with_fixed_param(self, param_idx, value)
    }
}
