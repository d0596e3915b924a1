//! Run configuration
//!
//! Every pipeline receives a [`RunConfig`] explicitly; there is no
//! process-wide path state. Configurations are usually loaded from TOML:
//!
//! ```toml
//! catalog_dir = "/scratch/lists"
//! grid_dir = "/scratch/grid"
//! sst_dir = "/scratch/sst"
//! output_dir = "/scratch/sst_indices"
//! scenario = "ssp585"
//! ```
//!
//! `region_label` defaults to `tas` and `extraction_box` to
//! `[138, 155, -49, -35]`.

use crate::descriptor::HISTORICAL;
use crate::errors::{HarmonizeError, HarmonizeResult};
use crate::longitude::BoundingBox;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Future-scenario experiment paired with the historical run
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    #[default]
    Ssp126,
    Ssp585,
}

impl Scenario {
    pub fn experiment_id(&self) -> &'static str {
        match self {
            Scenario::Ssp126 => "ssp126",
            Scenario::Ssp585 => "ssp585",
        }
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.experiment_id())
    }
}

impl FromStr for Scenario {
    type Err = HarmonizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ssp126" => Ok(Scenario::Ssp126),
            "ssp585" => Ok(Scenario::Ssp585),
            other => Err(HarmonizeError::Config(format!(
                "unsupported scenario `{other}`, expected ssp126 or ssp585"
            ))),
        }
    }
}

fn default_region_label() -> String {
    "tas".to_string()
}

fn default_extraction_box() -> [f64; 4] {
    BoundingBox::tasmania().as_bounds()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    /// Directory holding the `cmip6_gadi_*.txt` catalogs
    pub catalog_dir: PathBuf,
    /// Stored cell-area artifacts
    pub grid_dir: PathBuf,
    /// Stored regional SST artifacts
    pub sst_dir: PathBuf,
    /// Regional index artifacts
    pub output_dir: PathBuf,
    #[serde(default)]
    pub scenario: Scenario,
    #[serde(default = "default_region_label")]
    pub region_label: String,
    /// `[west, east, south, north]`, longitudes 0–360
    #[serde(default = "default_extraction_box")]
    pub extraction_box: [f64; 4],
    /// Mount point prepended to catalog identifiers when opening files.
    /// Identifiers are parsed as written in the catalog either way.
    #[serde(default)]
    pub archive_root: Option<PathBuf>,
}

impl RunConfig {
    /// Configuration rooted at one directory, with the default layout
    /// `lists/`, `grid/`, `sst/` and `sst_indices/`.
    pub fn rooted_at(root: &Path, scenario: Scenario) -> Self {
        Self {
            catalog_dir: root.join("lists"),
            grid_dir: root.join("grid"),
            sst_dir: root.join("sst"),
            output_dir: root.join("sst_indices"),
            scenario,
            region_label: default_region_label(),
            extraction_box: default_extraction_box(),
            archive_root: None,
        }
    }

    pub fn from_toml_str(text: &str) -> HarmonizeResult<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| HarmonizeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> HarmonizeResult<()> {
        if self.region_label.is_empty() || self.region_label.contains(['.', '/']) {
            return Err(HarmonizeError::Config(format!(
                "region label `{}` must be non-empty and contain no `.` or `/`",
                self.region_label
            )));
        }
        self.bounding_box().map(|_| ())
    }

    pub fn bounding_box(&self) -> HarmonizeResult<BoundingBox> {
        BoundingBox::from_bounds(self.extraction_box)
    }

    /// Catalog for an experiment, e.g. `cmip6_gadi_historical.txt`.
    pub fn catalog_path(&self, experiment: &str) -> PathBuf {
        self.catalog_dir.join(format!("cmip6_gadi_{experiment}.txt"))
    }

    pub fn historical_catalog(&self) -> PathBuf {
        self.catalog_path(HISTORICAL)
    }

    pub fn scenario_catalog(&self) -> PathBuf {
        self.catalog_path(self.scenario.experiment_id())
    }

    pub fn area_catalog(&self) -> PathBuf {
        self.catalog_path(crate::policy::AREA)
    }

    /// Directory holding the files of a catalog identifier.
    pub fn archive_path(&self, identifier: &str) -> PathBuf {
        match &self.archive_root {
            Some(root) => root.join(identifier.trim().trim_start_matches('/')),
            None => PathBuf::from(identifier.trim()),
        }
    }
}
