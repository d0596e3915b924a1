//! Output assembly: artifact names and ACDD attributes
//!
//! Incoming attributes are cleared before stamping. The SST variable carries
//! `coverage_content_type` so that observational measurements and model
//! results stay distinguishable downstream.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sstharm_core::aggregate::RegionalIndexSeries;
use sstharm_core::calendar::CfDateTime;
use sstharm_core::dataset::{missing_as_null, Dataset, GriddedField};
use sstharm_core::descriptor::ResolvedSource;
use sstharm_core::errors::{HarmonizeError, HarmonizeResult};
use sstharm_core::longitude::BoundingBox;
use sstharm_core::regions::RegionMaskSet;
use std::collections::BTreeMap;

pub const CONVENTIONS: &str = "ACDD-1.3";
pub const KEYWORDS: &str =
    "marine heatwave; extreme event; impact; ocean warming; Tasmania; CMIP6 projections";
pub const STANDARD_NAME: &str = "sea_surface_temperature";

/// The three artifacts the pipelines produce.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ArtifactKind {
    RegionSst,
    CellArea,
    Indices,
}

impl ArtifactKind {
    fn prefix(&self) -> &'static str {
        match self {
            ArtifactKind::RegionSst => "sst",
            ArtifactKind::CellArea => "areacello",
            ArtifactKind::Indices => "sst_indices",
        }
    }

    fn subject(&self) -> &'static str {
        match self {
            ArtifactKind::RegionSst => "Sea surface temperature data",
            ArtifactKind::CellArea => "Cell area data",
            ArtifactKind::Indices => "Sea surface temperature indices",
        }
    }

    /// File stem `<prefix>.<region>.<label>`
    pub fn stem(&self, region_label: &str, source_label: &str) -> String {
        format!("{}.{region_label}.{source_label}", self.prefix())
    }

    /// Stem prefix matching every artifact of one source name
    pub fn name_prefix(&self, region_label: &str, source_name: &str) -> String {
        format!("{}.{region_label}.{source_name}.", self.prefix())
    }
}

fn region_phrase(region_label: &str) -> String {
    match region_label {
        "tas" => "the Tasmanian region".to_string(),
        other => format!("the {other} region"),
    }
}

fn hemisphere(value: f64, positive: char, negative: char) -> String {
    if value < 0.0 {
        format!("{}{negative}", -value)
    } else {
        format!("{value}{positive}")
    }
}

/// e.g. `Sea surface temperature data for the Tasmanian region (138E-155E, 49S-35S)`
pub fn title(kind: ArtifactKind, region_label: &str, bbox: &BoundingBox) -> String {
    format!(
        "{} for {} ({}-{}, {}-{})",
        kind.subject(),
        region_phrase(region_label),
        hemisphere(bbox.west, 'E', 'W'),
        hemisphere(bbox.east, 'E', 'W'),
        hemisphere(bbox.south, 'N', 'S'),
        hemisphere(bbox.north, 'N', 'S'),
    )
}

/// Global attributes shared by every artifact.
pub fn global_attributes(
    kind: ArtifactKind,
    source: &ResolvedSource,
    region_label: &str,
    bbox: &BoundingBox,
) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("title".to_string(), title(kind, region_label, bbox)),
        ("source_data".to_string(), source.label.clone()),
        ("keywords".to_string(), KEYWORDS.to_string()),
        ("Conventions".to_string(), CONVENTIONS.to_string()),
        (
            "date_created".to_string(),
            Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        ),
    ])
}

fn sst_attributes(
    units: Option<&str>,
    long_name: &str,
    source: &ResolvedSource,
) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::from([
        ("standard_name".to_string(), STANDARD_NAME.to_string()),
        ("long_name".to_string(), long_name.to_string()),
        (
            "coverage_content_type".to_string(),
            source.policy.coverage_content_type().to_string(),
        ),
    ]);
    if let Some(units) = units {
        attrs.insert("units".to_string(), units.to_string());
    }
    attrs
}

/// Stamp a regional SST field and wrap it for persistence.
pub fn assemble_region_sst(
    mut field: GriddedField,
    source: &ResolvedSource,
    region_label: &str,
    bbox: &BoundingBox,
) -> Dataset {
    let units = field.units().map(str::to_string);
    field.attrs = sst_attributes(units.as_deref(), "Sea surface temperature", source);
    let mut dataset = field.into_dataset();
    dataset.attrs = global_attributes(ArtifactKind::RegionSst, source, region_label, bbox);
    dataset
}

/// Replace the global attributes of a trimmed cell-area dataset.
///
/// Variable attributes follow the input files.
pub fn assemble_cell_area(
    mut dataset: Dataset,
    source: &ResolvedSource,
    region_label: &str,
    bbox: &BoundingBox,
) -> Dataset {
    dataset.attrs = global_attributes(ArtifactKind::CellArea, source, region_label, bbox);
    dataset
}

/// The region coordinate of an index artifact.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionAxis {
    /// Region set header, e.g. `Tasmanian case study regions`
    pub name: String,
    pub codes: Vec<String>,
    pub names: Vec<String>,
    pub attrs: BTreeMap<String, String>,
}

/// Area-average SST laid out (region, time).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexVariable {
    #[serde(with = "missing_as_null")]
    pub values: ndarray::Array2<f64>,
    pub attrs: BTreeMap<String, String>,
}

/// Persisted regional index record for one source.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IndexArtifact {
    pub region: RegionAxis,
    pub time: Vec<CfDateTime>,
    pub sst: IndexVariable,
    pub attrs: BTreeMap<String, String>,
}

impl IndexArtifact {
    /// Gather per-region series into one record.
    ///
    /// Every series must share the same time axis, which is the case for
    /// output of [`weighted_regional_means`](sstharm_core::aggregate::weighted_regional_means).
    pub fn assemble(
        series: &[RegionalIndexSeries],
        masks: &RegionMaskSet,
        units: Option<&str>,
        source: &ResolvedSource,
        region_label: &str,
        bbox: &BoundingBox,
    ) -> HarmonizeResult<Self> {
        let time = series.first().map(|s| s.times().to_vec()).unwrap_or_default();
        if let Some(other) = series.iter().find(|s| s.times() != time.as_slice()) {
            return Err(HarmonizeError::Error(format!(
                "region {} has a different time axis",
                other.region_code
            )));
        }
        let values = ndarray::Array2::from_shape_fn((series.len(), time.len()), |(r, t)| {
            series[r].values()[t]
        });
        Ok(Self {
            region: RegionAxis {
                name: masks.header().to_string(),
                codes: series.iter().map(|s| s.region_code.clone()).collect(),
                names: series.iter().map(|s| s.region_name.clone()).collect(),
                attrs: BTreeMap::from([("long_name".to_string(), "region index".to_string())]),
            },
            time,
            sst: IndexVariable {
                values,
                attrs: sst_attributes(units, "Area-average sea surface temperature", source),
            },
            attrs: global_attributes(ArtifactKind::Indices, source, region_label, bbox),
        })
    }

    /// Series of one region, by code
    pub fn region_values(&self, code: &str) -> Option<Vec<f64>> {
        let row = self.region.codes.iter().position(|c| c == code)?;
        Some(self.sst.values.row(row).to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sstharm_core::calendar::CalendarKind;
    use sstharm_core::dataset::HorizontalGrid;
    use sstharm_core::descriptor::resolve_entry;
    use sstharm_core::regions::RegionSet;

    const OBS: &str = "/g/data/ua8/NOAA_OISST/AVHRR/v2-1_modified/";

    #[test]
    fn title_matches_region_box() {
        assert_eq!(
            title(ArtifactKind::RegionSst, "tas", &BoundingBox::tasmania()),
            "Sea surface temperature data for the Tasmanian region (138E-155E, 49S-35S)"
        );
        assert_eq!(
            ArtifactKind::CellArea.stem("tas", "CESM2.historical.r4i1p1f1"),
            "areacello.tas.CESM2.historical.r4i1p1f1"
        );
        assert_eq!(ArtifactKind::CellArea.name_prefix("tas", "CESM2"), "areacello.tas.CESM2.");
    }

    #[test]
    fn observation_indices_are_measurements() {
        let source = resolve_entry(0, OBS, OBS).unwrap();
        let grid = HorizontalGrid::rectilinear(&[-43.0], &[147.0]);
        let masks = RegionSet::tasmania().mask_3d(&grid).unwrap();
        let mut series = RegionalIndexSeries::new("tas_all", "Whole Tas region");
        series.push(CfDateTime::ymd(CalendarKind::Standard, 1990, 1, 1).unwrap(), 12.5);

        let artifact = IndexArtifact::assemble(
            &[series],
            &masks,
            Some("degC"),
            &source,
            "tas",
            &BoundingBox::tasmania(),
        )
        .unwrap();
        assert_eq!(artifact.sst.attrs["coverage_content_type"], "physicalMeasurement");
        assert_eq!(artifact.sst.attrs["units"], "degC");
        assert_eq!(artifact.region.attrs["long_name"], "region index");
        assert_eq!(artifact.attrs["source_data"], "NOAA_OISST.AVHRR.v2-1_modified");
        assert_eq!(artifact.attrs["Conventions"], "ACDD-1.3");
        assert_eq!(artifact.region_values("tas_all"), Some(vec![12.5]));
    }
}
