//! # excl-model
//!
//! Declarative model specifications for counting experiments and their
//! compiled form.
//!
//! The JSON-facing schema (channels → samples → modifiers) follows the
//! pyhf workspace convention, so specifications written here can be
//! consumed by any fitting tool speaking that format. [`CountingModel`]
//! is the compiled representation used for inference.

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Counting-experiment builders.
pub mod counting;
/// Compiled model.
pub mod model;
/// JSON specification schema.
pub mod schema;

pub use counting::{build_model, counting_workspace};
pub use model::{CountingModel, Parameter};
pub use schema::{
    Channel, Measurement, MeasurementConfig, Modifier, NormSysData, Observation, ParameterConfig,
    Sample, Workspace,
};
