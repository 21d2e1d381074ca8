//! JSON model specification schema.
//!
//! The document shape follows the pyhf workspace convention: a workspace
//! holds channels, per-channel observations, and measurement configs.
//! Only the modifier types this toolkit models are accepted.

use serde::{Deserialize, Serialize};

/// Top-level model specification document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    /// Measurement channels (regions)
    pub channels: Vec<Channel>,
    /// Observed data, one entry per channel
    pub observations: Vec<Observation>,
    /// Measurement configurations
    pub measurements: Vec<Measurement>,
    /// Schema version
    #[serde(default)]
    pub version: Option<String>,
}

/// Channel (region)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    /// Channel name
    pub name: String,
    /// Samples in this channel
    pub samples: Vec<Sample>,
}

/// Sample (process)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    /// Sample name
    pub name: String,
    /// Expected event counts per bin
    pub data: Vec<f64>,
    /// Modifiers attached to this sample
    pub modifiers: Vec<Modifier>,
}

/// Modifier (free parameter or constrained systematic)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Modifier {
    /// normfactor: free-floating multiplicative normalization (e.g. the POI)
    #[serde(rename = "normfactor")]
    NormFactor {
        /// Modifier name.
        name: String,
        /// Optional modifier payload (unused).
        #[serde(default)]
        data: Option<serde_json::Value>,
    },

    /// normsys: normalization uncertainty with hi/lo factors,
    /// Gaussian-constrained at 0
    #[serde(rename = "normsys")]
    NormSys {
        /// Modifier name.
        name: String,
        /// Up/down multiplicative factors.
        data: NormSysData,
    },

    /// staterror: per-bin statistical uncertainty, Gaussian-constrained at 1
    #[serde(rename = "staterror")]
    StatError {
        /// Modifier name.
        name: String,
        /// Absolute per-bin uncertainties (σ).
        data: Vec<f64>,
    },
}

impl Modifier {
    /// Modifier name, regardless of kind.
    pub fn name(&self) -> &str {
        match self {
            Modifier::NormFactor { name, .. }
            | Modifier::NormSys { name, .. }
            | Modifier::StatError { name, .. } => name,
        }
    }
}

/// normsys data (hi/lo factors)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormSysData {
    /// High (up) multiplicative factor.
    pub hi: f64,
    /// Low (down) multiplicative factor.
    pub lo: f64,
}

/// Observed per-bin event counts for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Observation {
    /// Channel name this observation belongs to
    pub name: String,
    /// Observed event counts per bin
    pub data: Vec<f64>,
}

/// Measurement configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Measurement {
    /// Measurement name
    pub name: String,
    /// Configuration
    pub config: MeasurementConfig,
}

/// Measurement config
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeasurementConfig {
    /// Name of the parameter of interest
    pub poi: String,
    /// Per-parameter overrides
    #[serde(default)]
    pub parameters: Vec<ParameterConfig>,
}

/// Per-parameter override (init and search bounds).
///
/// Scalar entries broadcast across indexed parameters such as
/// `staterror[0]`, `staterror[1]`, ...
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterConfig {
    /// Parameter name (base name for indexed parameters)
    pub name: String,
    /// Initial values
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inits: Vec<f64>,
    /// Bounds [[min, max]]
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bounds: Vec<[f64; 2]>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modifier_tags_roundtrip() {
        let sample = Sample {
            name: "background".to_string(),
            data: vec![100.0],
            modifiers: vec![
                Modifier::NormFactor { name: "mu".to_string(), data: None },
                Modifier::StatError { name: "stat".to_string(), data: vec![10.0] },
                Modifier::NormSys {
                    name: "norm".to_string(),
                    data: NormSysData { hi: 1.1, lo: 0.9 },
                },
            ],
        };

        let json = serde_json::to_string(&sample).unwrap();
        assert!(json.contains("\"type\":\"normfactor\""));
        assert!(json.contains("\"type\":\"staterror\""));
        assert!(json.contains("\"type\":\"normsys\""));

        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back.modifiers.len(), 3);
        assert_eq!(back.modifiers[1].name(), "stat");
    }

    #[test]
    fn test_workspace_parses_without_version() {
        let json = r#"{
            "channels": [],
            "observations": [],
            "measurements": [{"name": "m", "config": {"poi": "mu"}}]
        }"#;
        let ws: Workspace = serde_json::from_str(json).unwrap();
        assert!(ws.version.is_none());
        assert!(ws.measurements[0].config.parameters.is_empty());
    }
}
