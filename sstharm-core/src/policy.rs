//! Per-source processing policy
//!
//! Observations and model output differ at nearly every stage: the SST variable
//! name, the depth level to drop, the end of the analysis window, and how cells
//! are weighted. [`SourcePolicy`] gathers those choices once, when the catalog
//! entry is resolved, so later stages read a field instead of re-deriving
//! provenance from catalog position.

use crate::descriptor::Provenance;
use crate::weights::WeightingStrategy;
use serde::{Deserialize, Serialize};

/// Canonical SST variable name
pub const SST: &str = "sst";
/// Cell area variable name in model grid files
pub const AREA: &str = "areacello";
/// CMIP6 variable name for sea surface temperature
pub const MODEL_SST: &str = "tos";

/// Last year of the observational analysis window
pub const OBSERVATION_END_YEAR: i32 = 2020;
/// Last year of the model projection window
pub const PROJECTION_END_YEAR: i32 = 2100;

/// A singleton level dimension to select and drop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelSelection {
    pub dim: String,
    pub level: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SourcePolicy {
    pub provenance: Provenance,
    pub weighting: WeightingStrategy,
    /// Inclusive final year of the analysis window
    pub window_end_year: i32,
    /// Name of the SST variable in the raw files
    pub source_variable: String,
    pub level: Option<LevelSelection>,
}

impl SourcePolicy {
    pub fn observation() -> Self {
        Self {
            provenance: Provenance::Observation,
            weighting: WeightingStrategy::LatitudeCosine,
            window_end_year: OBSERVATION_END_YEAR,
            source_variable: SST.to_string(),
            level: Some(LevelSelection {
                dim: "zlev".to_string(),
                level: 0.0,
            }),
        }
    }

    pub fn model() -> Self {
        Self {
            provenance: Provenance::Model,
            weighting: WeightingStrategy::NormalizedCellArea,
            window_end_year: PROJECTION_END_YEAR,
            source_variable: MODEL_SST.to_string(),
            level: None,
        }
    }

    /// ACDD `coverage_content_type` for outputs derived from this source
    pub fn coverage_content_type(&self) -> &'static str {
        match self.provenance {
            Provenance::Observation => "physicalMeasurement",
            Provenance::Model => "modelResult",
        }
    }
}
